//! Scripted generator for tests
//!
//! Stands in for a real model: outputs come from a per-role script (falling
//! back to a deterministic `"<speaker> #<n>"` line), failures and delays can
//! be injected, and every request is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{GenerationRequest, Role, StatementGenerator};

/// One scripted reaction to a call
#[derive(Clone, Debug)]
pub enum Scripted {
    /// Return this text
    Reply(String),
    /// Fail with this message
    Fail(String),
    /// Sleep, then return this text
    Delayed(Duration, String),
}

/// Deterministic [`StatementGenerator`] for tests
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<Role, VecDeque<Scripted>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicU64,
    echo_translator: bool,
}

impl ScriptedGenerator {
    /// Create a generator with no scripts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the translator return its source text unchanged
    #[must_use]
    pub fn with_echo_translator(mut self) -> Self {
        self.echo_translator = true;
        self
    }

    /// Queue a reaction for the next call in `role`
    pub fn push(&self, role: Role, scripted: Scripted) {
        self.scripts.lock().entry(role).or_default().push_back(scripted);
    }

    /// Queue a reply for the next call in `role`
    pub fn reply(&self, role: Role, text: impl Into<String>) {
        self.push(role, Scripted::Reply(text.into()));
    }

    /// Queue a failure for the next call in `role`
    pub fn fail(&self, role: Role, message: impl Into<String>) {
        self.push(role, Scripted::Fail(message.into()));
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Requests received for one role
    pub fn requests_for(&self, role: Role) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.role == role)
            .cloned()
            .collect()
    }

    /// Number of calls received
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatementGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().push(request.clone());

        let scripted = self
            .scripts
            .lock()
            .get_mut(&request.role)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(Scripted::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None if self.echo_translator && request.role == Role::Translator => {
                Ok(request.source_text.clone().unwrap_or_default())
            }
            None => Ok(format!("{} #{n}", request.speaker)),
        }
    }
}
