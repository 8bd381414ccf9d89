//! TOML Configuration File Support
//!
//! Centralized configuration loading for the debate daemon, supporting a TOML
//! file at `~/.config/agora/agora.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [debate]
//! topic_interval = 30
//! feedback_interval = 2
//! duration_secs = 1500
//! history_window = 40
//! topic_exhaustion = "wrap"
//! topics = ["Should cities ban cars?", "Is remote work here to stay?"]
//! speakers = ["FRITZ", "BOB", "DONNA", "BEN", "JOHN", "CITIZEN"]
//!
//! [debate.continuations]
//! second = ["relay_a"]
//! fourth = [{ speaker = "fifth" }, "relay_b"]
//!
//! [generation]
//! timeout_secs = 60
//! max_retries = 1
//! max_consecutive_failures = 3
//! model = "llama3.2"
//! host = "localhost"
//! port = 11434
//!
//! [generation.personas]
//! critic = "You moderate a debate."
//!
//! [relay]
//! chunk_size = 1
//! delay_ms = 40
//!
//! [pulse]
//! enabled = true
//! group = 100
//! window = 5
//!
//! [server]
//! bind_address = "0.0.0.0:4001"
//! checkpoint_dir = "/var/lib/agora/checkpoints"
//! session_id = "1"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::Personas;
use crate::conductor::ConductorSettings;
use crate::relay::RelaySettings;
use crate::scheduler::{Continuation, SchedulerSettings, Seat};
use crate::topics::{default_topics, TopicExhaustion, TopicList};

/// Default bind address of the WebSocket server
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:4001";
/// Default id of the single debate session
pub const DEFAULT_SESSION_ID: &str = "1";
/// Default generation model
pub const DEFAULT_MODEL: &str = "llama3.2";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[debate]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateToml {
    /// Driving turns between topic rotations
    pub topic_interval: Option<u32>,
    /// Interrupt-point evaluations between critic turns
    pub feedback_interval: Option<u32>,
    /// Session length in seconds
    pub duration_secs: Option<u64>,
    /// Statements visible to a speaker
    pub history_window: Option<usize>,
    /// Policy when rotation runs past the last topic
    pub topic_exhaustion: Option<TopicExhaustion>,
    /// Ordered topic list
    pub topics: Option<Vec<String>>,
    /// Six speaker display names
    pub speakers: Option<Vec<String>>,
    /// Post-processing chains keyed by seat name (`"second"`)
    pub continuations: Option<BTreeMap<String, Vec<Continuation>>>,
}

/// `[generation]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationToml {
    /// Per-attempt timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Retries after the first failed attempt
    pub max_retries: Option<u32>,
    /// Consecutive failed turns tolerated before halting
    pub max_consecutive_failures: Option<u32>,
    /// Model name
    pub model: Option<String>,
    /// Backend host
    pub host: Option<String>,
    /// Backend port
    pub port: Option<u16>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Role instructions
    pub personas: Option<Personas>,
}

/// `[relay]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Characters per typing frame
    pub chunk_size: Option<usize>,
    /// Pause between frames in milliseconds
    pub delay_ms: Option<u64>,
}

/// `[pulse]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseToml {
    /// Whether statements are translated and sent to the side channel
    pub enabled: Option<bool>,
    /// Display group
    pub group: Option<u32>,
    /// Rotating slot count
    pub window: Option<u32>,
}

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// WebSocket listen address
    pub bind_address: Option<String>,
    /// Checkpoint directory; in-memory checkpoints when unset
    pub checkpoint_dir: Option<PathBuf>,
    /// Session id
    pub session_id: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgoraToml {
    /// Debate section
    pub debate: DebateToml,
    /// Generation section
    pub generation: GenerationToml,
    /// Relay section
    pub relay: RelayToml,
    /// Pulse section
    pub pulse: PulseToml,
    /// Server section
    pub server: ServerToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Generation backend settings
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationConfig {
    /// Model name
    pub model: String,
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Sampling temperature
    pub temperature: f32,
    /// Role instructions
    pub personas: Personas,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            host: "localhost".to_string(),
            port: 11434,
            temperature: 0.7,
            personas: Personas::default(),
        }
    }
}

/// Server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// WebSocket listen address
    pub bind_address: String,
    /// Checkpoint directory; in-memory checkpoints when `None`
    pub checkpoint_dir: Option<PathBuf>,
    /// Session id
    pub session_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            checkpoint_dir: None,
            session_id: DEFAULT_SESSION_ID.to_string(),
        }
    }
}

/// Resolved configuration of the debate daemon
///
/// Use [`load_config`] or [`load_config_from_path`] to build one with proper
/// priority handling, then [`AgoraConfig::validate`] before use.
#[derive(Clone, Debug)]
pub struct AgoraConfig {
    /// Scheduler settings
    pub scheduler: SchedulerSettings,
    /// Debate topics
    pub topics: Vec<String>,
    /// Typing cadence
    pub relay: RelaySettings,
    /// Pulse display group
    pub pulse_group: u32,
    /// Pulse display slot count
    pub pulse_window: u32,
    /// Generation backend
    pub generation: GenerationConfig,
    /// Server
    pub server: ServerConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for AgoraConfig {
    fn default() -> Self {
        let conductor = ConductorSettings::default();
        Self {
            scheduler: SchedulerSettings::default(),
            topics: default_topics(),
            relay: conductor.relay,
            pulse_group: conductor.pulse_group,
            pulse_window: conductor.pulse_window,
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl AgoraConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check the values the scheduler and relay cannot run without
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.chunk_size == 0 {
            return Err(invalid("relay.chunk_size must be at least 1"));
        }
        if self.topics.is_empty() {
            return Err(invalid("debate.topics must not be empty"));
        }
        if self.scheduler.speakers.len() != Seat::ALL.len() {
            return Err(invalid(format!(
                "debate.speakers needs exactly {} names, got {}",
                Seat::ALL.len(),
                self.scheduler.speakers.len()
            )));
        }
        if self.scheduler.history_window == 0 {
            return Err(invalid("debate.history_window must be at least 1"));
        }
        if self.pulse_window == 0 {
            return Err(invalid("pulse.window must be at least 1"));
        }
        for (seat, chain) in &self.scheduler.continuations {
            if !seat.in_cycle() {
                return Err(invalid(format!(
                    "continuations of {seat:?} never run; only first, second and fourth speak in the cycle"
                )));
            }
            for step in chain {
                if let Continuation::Speaker(next) = step {
                    if next.in_cycle() {
                        return Err(invalid(format!(
                            "{next:?} is a cycle seat and cannot be a continuation"
                        )));
                    }
                }
            }
        }
        if self.server.session_id.trim().is_empty() {
            return Err(invalid("server.session_id must not be empty"));
        }
        Ok(())
    }

    /// Scheduler settings
    #[must_use]
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        self.scheduler.clone()
    }

    /// Conductor settings
    #[must_use]
    pub fn conductor_settings(&self) -> ConductorSettings {
        ConductorSettings {
            relay: self.relay,
            pulse_group: self.pulse_group,
            pulse_window: self.pulse_window,
        }
    }

    /// Topic list, `None` when empty
    #[must_use]
    pub fn topic_list(&self) -> Option<TopicList> {
        TopicList::new(self.topics.clone())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/agora/agora.toml` or
/// `~/.config/agora/agora.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("agora").join("agora.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<AgoraConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if its continuation keys are not seat names.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<AgoraConfig, ConfigError> {
    let mut config = AgoraConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: AgoraToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut AgoraConfig, toml: &AgoraToml) -> Result<(), ConfigError> {
    let debate = &toml.debate;
    if let Some(interval) = debate.topic_interval {
        config.scheduler.topic_interval = interval;
    }
    if let Some(interval) = debate.feedback_interval {
        config.scheduler.feedback_interval = interval;
    }
    if let Some(secs) = debate.duration_secs {
        config.scheduler.duration_secs = secs;
    }
    if let Some(window) = debate.history_window {
        config.scheduler.history_window = window;
    }
    if let Some(policy) = debate.topic_exhaustion {
        config.scheduler.topic_exhaustion = policy;
    }
    if let Some(ref topics) = debate.topics {
        config.topics = topics.clone();
    }
    if let Some(ref speakers) = debate.speakers {
        config.scheduler.speakers = speakers.clone();
    }
    if let Some(ref chains) = debate.continuations {
        let mut continuations = BTreeMap::new();
        for (name, chain) in chains {
            let seat = Seat::from_name(name).ok_or_else(|| {
                invalid(format!("unknown seat '{name}' in debate.continuations"))
            })?;
            continuations.insert(seat, chain.clone());
        }
        config.scheduler.continuations = continuations;
    }

    let generation = &toml.generation;
    if let Some(secs) = generation.timeout_secs {
        config.scheduler.generation_timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = generation.max_retries {
        config.scheduler.max_retries = retries;
    }
    if let Some(failures) = generation.max_consecutive_failures {
        config.scheduler.max_consecutive_failures = failures;
    }
    if let Some(ref model) = generation.model {
        config.generation.model = model.clone();
    }
    if let Some(ref host) = generation.host {
        config.generation.host = host.clone();
    }
    if let Some(port) = generation.port {
        config.generation.port = port;
    }
    if let Some(temperature) = generation.temperature {
        config.generation.temperature = temperature;
    }
    if let Some(ref personas) = generation.personas {
        config.generation.personas = personas.clone();
    }

    if let Some(size) = toml.relay.chunk_size {
        config.relay.chunk_size = size;
    }
    if let Some(ms) = toml.relay.delay_ms {
        config.relay.delay = Duration::from_millis(ms);
    }

    if let Some(enabled) = toml.pulse.enabled {
        config.scheduler.pulse_enabled = enabled;
    }
    if let Some(group) = toml.pulse.group {
        config.pulse_group = group;
    }
    if let Some(window) = toml.pulse.window {
        config.pulse_window = window;
    }

    if let Some(ref address) = toml.server.bind_address {
        config.server.bind_address = address.clone();
    }
    if toml.server.checkpoint_dir.is_some() {
        config.server.checkpoint_dir = toml.server.checkpoint_dir.clone();
    }
    if let Some(ref id) = toml.server.session_id {
        config.server.session_id = id.clone();
    }
    Ok(())
}

/// Parse a numeric environment value; unparsable values are ignored
fn env_number<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

/// Apply environment variable overrides using `lookup` to read variables
fn apply_env_config(config: &mut AgoraConfig, lookup: impl Fn(&str) -> Option<String>) {
    let mut touched = false;

    if let Some(n) = env_number("DEBATE_TOPIC_INTERVAL", lookup("DEBATE_TOPIC_INTERVAL")) {
        config.scheduler.topic_interval = n;
        touched = true;
    }
    if let Some(n) = env_number("DEBATE_FEEDBACK_INTERVAL", lookup("DEBATE_FEEDBACK_INTERVAL")) {
        config.scheduler.feedback_interval = n;
        touched = true;
    }
    if let Some(secs) = env_number("DEBATE_DURATION_SECS", lookup("DEBATE_DURATION_SECS")) {
        config.scheduler.duration_secs = secs;
        touched = true;
    }
    if let Some(size) = env_number("DEBATE_CHUNK_SIZE", lookup("DEBATE_CHUNK_SIZE")) {
        config.relay.chunk_size = size;
        touched = true;
    }
    if let Some(ms) = env_number("DEBATE_TYPING_DELAY_MS", lookup("DEBATE_TYPING_DELAY_MS")) {
        config.relay.delay = Duration::from_millis(ms);
        touched = true;
    }
    if let Some(secs) = env_number(
        "DEBATE_GENERATION_TIMEOUT_SECS",
        lookup("DEBATE_GENERATION_TIMEOUT_SECS"),
    ) {
        config.scheduler.generation_timeout = Duration::from_secs(secs);
        touched = true;
    }
    if let Some(model) = lookup("DEBATE_MODEL") {
        config.generation.model = model;
        touched = true;
    }
    if let Some(host) = lookup("OLLAMA_HOST") {
        config.generation.host = host;
        touched = true;
    }
    if let Some(port) = env_number("OLLAMA_PORT", lookup("OLLAMA_PORT")) {
        config.generation.port = port;
        touched = true;
    }
    if let Some(address) = lookup("DEBATE_BIND_ADDRESS") {
        config.server.bind_address = address;
        touched = true;
    }
    if let Some(dir) = lookup("DEBATE_CHECKPOINT_DIR") {
        config.server.checkpoint_dir = Some(PathBuf::from(dir));
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Command-line overrides, applied after file and environment
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address
    pub bind_address: Option<String>,
    /// Checkpoint directory
    pub checkpoint_dir: Option<PathBuf>,
    /// Session id
    pub session_id: Option<String>,
    /// Generation model
    pub model: Option<String>,
}

impl ConfigOverrides {
    /// Create empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the listen address
    #[must_use]
    pub fn with_bind_address(mut self, address: String) -> Self {
        self.bind_address = Some(address);
        self
    }

    /// Override the checkpoint directory
    #[must_use]
    pub fn with_checkpoint_dir(mut self, dir: PathBuf) -> Self {
        self.checkpoint_dir = Some(dir);
        self
    }

    /// Override the session id
    #[must_use]
    pub fn with_session_id(mut self, id: String) -> Self {
        self.session_id = Some(id);
        self
    }

    /// Override the generation model
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Apply the overrides; the source becomes [`ConfigSource::Cli`] if any is set
    pub fn apply(&self, config: &mut AgoraConfig) {
        let mut touched = false;
        if let Some(ref address) = self.bind_address {
            config.server.bind_address = address.clone();
            touched = true;
        }
        if let Some(ref dir) = self.checkpoint_dir {
            config.server.checkpoint_dir = Some(dir.clone());
            touched = true;
        }
        if let Some(ref id) = self.session_id {
            config.server.session_id = id.clone();
            touched = true;
        }
        if let Some(ref model) = self.model {
            config.generation.model = model.clone();
            touched = true;
        }
        if touched {
            config.source = ConfigSource::Cli;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(content: &str) -> Result<AgoraConfig, ConfigError> {
        let mut config = AgoraConfig::default();
        let toml: AgoraToml = toml::from_str(content)?;
        apply_toml_config(&mut config, &toml)?;
        Ok(config)
    }

    #[test]
    fn test_default_config() {
        let config = AgoraConfig::default();
        assert_eq!(config.scheduler.topic_interval, 30);
        assert_eq!(config.scheduler.feedback_interval, 2);
        assert_eq!(config.scheduler.duration_secs, 1500);
        assert_eq!(config.relay.chunk_size, 1);
        assert_eq!(config.relay.delay, Duration::from_millis(40));
        assert_eq!(config.server.bind_address, "0.0.0.0:4001");
        assert_eq!(config.server.session_id, "1");
        assert!(config.server.checkpoint_dir.is_none());
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("agora/agora.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let config = parse(
            r#"
            [debate]
            topic_interval = 10
            feedback_interval = 0
            topic_exhaustion = "end_debate"
            topics = ["one", "two"]

            [debate.continuations]
            second = ["relay_a", "relay_b"]
            fourth = [{ speaker = "fifth" }]

            [generation]
            timeout_secs = 5
            model = "mistral"

            [generation.personas]
            critic = "Be harsh."

            [relay]
            chunk_size = 3
            delay_ms = 10

            [pulse]
            enabled = false

            [server]
            checkpoint_dir = "/tmp/agora"
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.topic_interval, 10);
        assert_eq!(config.scheduler.feedback_interval, 0);
        assert_eq!(config.scheduler.topic_exhaustion, TopicExhaustion::EndDebate);
        assert_eq!(config.topics, vec!["one", "two"]);
        assert_eq!(
            config.scheduler.continuations.get(&Seat::Fourth),
            Some(&vec![Continuation::Speaker(Seat::Fifth)])
        );
        assert_eq!(
            config.scheduler.continuations.get(&Seat::Second).map(Vec::len),
            Some(2)
        );
        assert_eq!(config.scheduler.generation_timeout, Duration::from_secs(5));
        assert_eq!(config.generation.model, "mistral");
        assert_eq!(config.generation.personas.critic, "Be harsh.");
        assert_eq!(
            config.generation.personas.relay_a,
            Personas::default().relay_a
        );
        assert_eq!(config.relay.chunk_size, 3);
        assert!(!config.scheduler.pulse_enabled);
        assert_eq!(config.server.checkpoint_dir, Some(PathBuf::from("/tmp/agora")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_toml() {
        let config = parse("").unwrap();
        assert_eq!(config.topics, default_topics());
        assert_eq!(config.scheduler.max_retries, 1);
    }

    #[test]
    fn test_unknown_seat_is_rejected() {
        let err = parse("[debate.continuations]\nseventh = [\"relay_a\"]").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AgoraConfig::default();
        config.relay.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = AgoraConfig::default();
        config.topics.clear();
        assert!(config.validate().is_err());
        assert!(config.topic_list().is_none());

        let mut config = AgoraConfig::default();
        config.scheduler.speakers.pop();
        assert!(config.validate().is_err());

        let mut config = AgoraConfig::default();
        config
            .scheduler
            .continuations
            .insert(Seat::Third, vec![Continuation::RelayA]);
        assert!(config.validate().is_err());

        let mut config = AgoraConfig::default();
        config
            .scheduler
            .continuations
            .insert(Seat::First, vec![Continuation::Speaker(Seat::Second)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_graceful() {
        let config =
            load_config_from_path(Some(PathBuf::from("/nonexistent/agora.toml"))).unwrap();
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_file_is_loaded() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\nchunk_size = 4").unwrap();
        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.relay.chunk_size, 4);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_malformed_toml_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[relay\nchunk_size = ").unwrap();
        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = parse("[relay]\nchunk_size = 4\n[generation]\nmodel = \"file\"").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("DEBATE_CHUNK_SIZE", "2"),
            ("DEBATE_MODEL", "env-model"),
            ("DEBATE_DURATION_SECS", "not-a-number"),
            ("DEBATE_CHECKPOINT_DIR", "/var/lib/agora"),
        ]);
        apply_env_config(&mut config, |key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.relay.chunk_size, 2);
        assert_eq!(config.generation.model, "env-model");
        assert_eq!(config.scheduler.duration_secs, 1500);
        assert_eq!(
            config.server.checkpoint_dir,
            Some(PathBuf::from("/var/lib/agora"))
        );
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = AgoraConfig::default();
        apply_env_config(&mut config, |key| {
            (key == "DEBATE_BIND_ADDRESS").then(|| "127.0.0.1:9000".to_string())
        });
        ConfigOverrides::new()
            .with_bind_address("127.0.0.1:4002".to_string())
            .with_session_id("debate-7".to_string())
            .apply(&mut config);

        assert_eq!(config.server.bind_address, "127.0.0.1:4002");
        assert_eq!(config.server.session_id, "debate-7");
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = AgoraConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_conductor_settings() {
        let config = parse("[pulse]\ngroup = 7\nwindow = 3").unwrap();
        let settings = config.conductor_settings();
        assert_eq!(settings.pulse_group, 7);
        assert_eq!(settings.pulse_window, 3);
        assert_eq!(settings.relay, config.relay);
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}
