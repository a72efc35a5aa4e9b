//! Configuration module for the Voicegate server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use voicegate::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default dialogue model, matching the Gemini Live preview deployment.
pub const DEFAULT_MODEL: &str = "models/gemini-live-2.5-flash-preview";

/// Default prebuilt voice for audio responses.
pub const DEFAULT_VOICE: &str = "Puck";

/// Default language code for speech configuration.
pub const DEFAULT_LANGUAGE_CODE: &str = "en-IN";

/// Default debounce window for coalescing model audio chunks (milliseconds).
pub const DEFAULT_DEBOUNCE_MS: u64 = 40;

/// Default idle timeout before a stale client connection is closed (seconds).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default bounded wait for the model stream to open (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default context-window compression trigger (tokens).
pub const DEFAULT_CONTEXT_TRIGGER_TOKENS: u32 = 25_600;

/// Default context-window compression sliding-window target (tokens).
pub const DEFAULT_CONTEXT_TARGET_TOKENS: u32 = 12_800;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the Voicegate server:
/// - Server settings (host, port, TLS)
/// - Dialogue model settings (API key, model id, voice, language, system instruction)
/// - Audio pipeline tunables (debounce window, timeouts)
/// - Security settings (CORS)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// API key for the dialogue model. Required to open sessions; the server
    /// boots without it but every connection is rejected with an error message.
    pub gemini_api_key: Option<String>,

    /// Dialogue model identifier, e.g. "models/gemini-live-2.5-flash-preview"
    pub model: String,

    /// Override for the model WebSocket endpoint. `None` uses the production
    /// endpoint; set it to point at a local stand-in server.
    pub gemini_endpoint: Option<String>,

    /// Prebuilt voice name for audio responses
    pub voice: String,

    /// Language code for speech configuration
    pub language_code: String,

    /// System instruction constraining assistant behavior (optional)
    pub system_instruction: Option<String>,

    /// Context-window compression trigger threshold (tokens)
    pub context_trigger_tokens: u32,

    /// Context-window compression sliding-window target (tokens)
    pub context_target_tokens: u32,

    /// Debounce window for coalescing model audio chunks (milliseconds)
    pub debounce_ms: u64,

    /// Idle timeout before a stale client connection is closed (seconds)
    pub idle_timeout_secs: u64,

    /// Bounded wait for the model stream to open (seconds)
    pub connect_timeout_secs: u64,

    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            tls: None,
            gemini_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            gemini_endpoint: None,
            voice: DEFAULT_VOICE.to_string(),
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            system_instruction: None,
            context_trigger_tokens: DEFAULT_CONTEXT_TRIGGER_TOKENS,
            context_target_tokens: DEFAULT_CONTEXT_TARGET_TOKENS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            cors_allowed_origins: None,
        }
    }
}

/// YAML representation of the configuration file. Every field is optional;
/// unset fields fall back to environment variables and then defaults.
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    host: Option<String>,
    port: Option<u16>,
    tls: Option<YamlTlsConfig>,
    gemini_api_key: Option<String>,
    model: Option<String>,
    gemini_endpoint: Option<String>,
    voice: Option<String>,
    language_code: Option<String>,
    system_instruction: Option<String>,
    context_trigger_tokens: Option<u32>,
    context_target_tokens: Option<u32>,
    debounce_ms: Option<u64>,
    idle_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    cors_allowed_origins: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YamlTlsConfig {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables filling
    /// any fields the file leaves unset.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let yaml: YamlConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::default();
        config.apply_env();
        config.apply_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    /// The socket address string, e.g. "0.0.0.0:3000".
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether TLS is configured.
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(port) = port.parse()
        {
            self.port = port;
        }
        if let (Ok(cert), Ok(key)) = (std::env::var("TLS_CERT_PATH"), std::env::var("TLS_KEY_PATH"))
        {
            self.tls = Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            });
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY")
            && !key.is_empty()
        {
            self.gemini_api_key = Some(key);
        }
        if let Ok(model) = std::env::var("VOICEGATE_MODEL") {
            self.model = model;
        }
        if let Ok(endpoint) = std::env::var("VOICEGATE_GEMINI_ENDPOINT") {
            self.gemini_endpoint = Some(endpoint);
        }
        if let Ok(voice) = std::env::var("VOICEGATE_VOICE") {
            self.voice = voice;
        }
        if let Ok(lang) = std::env::var("VOICEGATE_LANGUAGE") {
            self.language_code = lang;
        }
        if let Ok(instruction) = std::env::var("VOICEGATE_SYSTEM_INSTRUCTION") {
            self.system_instruction = Some(instruction);
        }
        if let Ok(ms) = std::env::var("VOICEGATE_DEBOUNCE_MS")
            && let Ok(ms) = ms.parse()
        {
            self.debounce_ms = ms;
        }
        if let Ok(secs) = std::env::var("VOICEGATE_IDLE_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse()
        {
            self.idle_timeout_secs = secs;
        }
        if let Ok(secs) = std::env::var("VOICEGATE_CONNECT_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse()
        {
            self.connect_timeout_secs = secs;
        }
        if let Ok(origins) = std::env::var("CORS_ALLOWED_ORIGINS") {
            self.cors_allowed_origins = Some(origins);
        }
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(host) = yaml.host {
            self.host = host;
        }
        if let Some(port) = yaml.port {
            self.port = port;
        }
        if let Some(tls) = yaml.tls {
            self.tls = Some(TlsConfig {
                cert_path: tls.cert_path,
                key_path: tls.key_path,
            });
        }
        if let Some(key) = yaml.gemini_api_key {
            self.gemini_api_key = Some(key);
        }
        if let Some(model) = yaml.model {
            self.model = model;
        }
        if let Some(endpoint) = yaml.gemini_endpoint {
            self.gemini_endpoint = Some(endpoint);
        }
        if let Some(voice) = yaml.voice {
            self.voice = voice;
        }
        if let Some(lang) = yaml.language_code {
            self.language_code = lang;
        }
        if let Some(instruction) = yaml.system_instruction {
            self.system_instruction = Some(instruction);
        }
        if let Some(tokens) = yaml.context_trigger_tokens {
            self.context_trigger_tokens = tokens;
        }
        if let Some(tokens) = yaml.context_target_tokens {
            self.context_target_tokens = tokens;
        }
        if let Some(ms) = yaml.debounce_ms {
            self.debounce_ms = ms;
        }
        if let Some(secs) = yaml.idle_timeout_secs {
            self.idle_timeout_secs = secs;
        }
        if let Some(secs) = yaml.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(origins) = yaml.cors_allowed_origins {
            self.cors_allowed_origins = Some(origins);
        }
    }

    /// Validate that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.model.is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if self.context_target_tokens >= self.context_trigger_tokens {
            return Err(ConfigError::Invalid(format!(
                "context_target_tokens ({}) must be below context_trigger_tokens ({})",
                self.context_target_tokens, self.context_trigger_tokens
            )));
        }
        if self.debounce_ms == 0 || self.debounce_ms > 1000 {
            return Err(ConfigError::Invalid(format!(
                "debounce_ms ({}) must be within 1..=1000",
                self.debounce_ms
            )));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "idle_timeout_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
