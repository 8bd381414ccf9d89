//! Ollama Backend Implementation
//!
//! Statement generator for Ollama (local LLM server). Each role gets its
//! persona text from [`Personas`]; the prompt is assembled here and sent to
//! the non-streaming generate endpoint, because the relay layer produces the
//! typing effect itself.
//!
//! # Ollama API
//!
//! - `/api/generate` - Generate completions (`stream: false`)
//! - `/api/tags` - List available models (used for health checks)

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{GenerationRequest, Role, StatementGenerator};

/// Persona and instruction text for every role
///
/// Deserialized from `[generation.personas]`; any field left out keeps its
/// built-in text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personas {
    /// One persona per seat, in seat order
    pub speakers: Vec<String>,
    /// Critic instructions
    pub critic: String,
    /// Punch-line rewrite instructions
    pub relay_a: String,
    /// Simplification instructions
    pub relay_b: String,
    /// Translation instructions for the pulse channel
    pub translator: String,
}

impl Default for Personas {
    fn default() -> Self {
        Self {
            speakers: vec![
                "You are a free-market economist. You argue from incentives and prices.".into(),
                "You are a sharp-tongued comedian who mocks weak arguments.".into(),
                "You are a labour organiser who speaks for working people.".into(),
                "You are a cautious civil servant who weighs practical trade-offs.".into(),
                "You are an environmental scientist who cites evidence.".into(),
                "You are an ordinary citizen who asks what this means for daily life.".into(),
            ],
            critic: "You moderate a debate. Point out the weakest argument so far and \
                     tell the next speaker what to address."
                .into(),
            relay_a: "Rewrite the statement as a single punchy line, keeping its point.".into(),
            relay_b: "Rewrite the statement in simple words a child could follow.".into(),
            translator: "Translate the statement into plain English. Output only the \
                         translation."
                .into(),
        }
    }
}

impl Personas {
    fn instructions(&self, role: Role) -> &str {
        match role {
            Role::Speaker(seat) => self
                .speakers
                .get(seat.index())
                .map_or("You are a debate participant.", String::as_str),
            Role::Critic => &self.critic,
            Role::RelayA => &self.relay_a,
            Role::RelayB => &self.relay_b,
            Role::Translator => &self.translator,
        }
    }
}

/// Ollama statement generator
#[derive(Clone)]
pub struct OllamaBackend {
    /// Host address
    host: String,
    /// Port number
    port: u16,
    /// Model used for every role
    model: String,
    /// Sampling temperature
    temperature: f32,
    /// Role instructions
    personas: Personas,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS backend
    /// initialisation failure).
    pub fn new(host: impl Into<String>, port: u16, model: impl Into<String>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            host: host.into(),
            port,
            model: model.into(),
            temperature: 0.7,
            personas: Personas::default(),
            http_client,
        })
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// Set role instructions
    #[must_use]
    pub fn with_personas(mut self, personas: Personas) -> Self {
        self.personas = personas;
        self
    }

    /// Get the base URL
    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    /// Check if the server is reachable
    ///
    /// Probes the tags endpoint with a short timeout.
    pub async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }

    /// Assemble the prompt for one request
    fn build_prompt(&self, request: &GenerationRequest) -> String {
        let mut prompt = String::new();
        prompt.push_str(self.personas.instructions(request.role));
        prompt.push_str("\n\n");

        match request.role {
            Role::RelayA | Role::RelayB | Role::Translator => {
                prompt.push_str(&format!("Statement by {}:\n", request.speaker));
                prompt.push_str(request.source_text.as_deref().unwrap_or_default());
                return prompt;
            }
            Role::Speaker(_) | Role::Critic => {}
        }

        prompt.push_str(&format!("Debate topic: {}\n", request.topic));
        if !request.history.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            prompt.push_str(&request.transcript());
            prompt.push('\n');
        }
        if let Some(ref feedback) = request.feedback {
            prompt.push_str(&format!("\nThe moderator said: {feedback}\nAddress it.\n"));
        }
        if request.topic_changed {
            prompt.push_str("\nThe topic has just changed. Open the new topic.\n");
        }
        if request.debate_ending {
            prompt.push_str("\nThe debate is ending. Give a short closing remark.\n");
        }

        match request.role {
            Role::Critic => prompt.push_str("\nGive your feedback in two sentences."),
            _ => prompt.push_str(&format!(
                "\nRespond as {} in two or three sentences.",
                request.speaker
            )),
        }
        prompt
    }
}

#[async_trait]
impl StatementGenerator for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": self.build_prompt(request),
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let response = self
            .http_client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        let data: serde_json::Value = response.json().await?;
        let content = data
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::trim)
            .unwrap_or_default();

        if content.is_empty() {
            anyhow::bail!("Ollama returned an empty response for {}", request.role);
        }
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Seat;
    use crate::session::{Statement, StatementKind};

    fn backend() -> OllamaBackend {
        OllamaBackend::new("localhost", 11434, "llama3").unwrap()
    }

    #[test]
    fn test_ollama_backend_creation() {
        let backend = OllamaBackend::new("example.com", 8080, "llama3").unwrap();
        assert_eq!(backend.base_url(), "http://example.com:8080");
        assert_eq!(backend.generate_url(), "http://example.com:8080/api/generate");
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OllamaBackend::new("127.0.0.1", 1, "llama3").unwrap();
        assert!(!backend.health_check().await);
    }

    #[test]
    fn test_speaker_prompt() {
        let request = GenerationRequest::new(Role::Speaker(Seat::Second), "BOB", "rent control")
            .with_history(vec![Statement::new(
                "FRITZ",
                "Price caps cut supply.",
                StatementKind::Speech,
            )])
            .with_feedback(Some("Nobody has cited data.".into()))
            .with_flags(true, false);
        let prompt = backend().build_prompt(&request);

        assert!(prompt.starts_with("You are a sharp-tongued comedian"));
        assert!(prompt.contains("Debate topic: rent control"));
        assert!(prompt.contains("FRITZ: Price caps cut supply."));
        assert!(prompt.contains("The moderator said: Nobody has cited data."));
        assert!(prompt.contains("The topic has just changed"));
        assert!(!prompt.contains("The debate is ending"));
        assert!(prompt.ends_with("Respond as BOB in two or three sentences."));
    }

    #[test]
    fn test_relay_prompt_uses_source_text() {
        let request = GenerationRequest::new(Role::RelayA, "BOB", "rent control")
            .with_source_text("Landlords are people too.");
        let prompt = backend().build_prompt(&request);
        assert!(prompt.contains("Statement by BOB:\nLandlords are people too."));
        assert!(!prompt.contains("Debate topic"));
    }

    #[test]
    fn test_personas_partial_toml() {
        let personas: Personas = toml::from_str(r#"critic = "Be brief.""#).unwrap();
        assert_eq!(personas.critic, "Be brief.");
        assert_eq!(personas.speakers.len(), 6);
    }
}
