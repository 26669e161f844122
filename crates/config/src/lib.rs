//! Configuration loading, validation, and management for toolchat.
//!
//! Loads configuration from `~/.toolchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.toolchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub default_top_p: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Explicit stop sequences. When unset the model preset decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Set when the file pins any sampling field; presets then leave them alone.
    #[serde(skip)]
    pinned_sampling: bool,
}

const SAMPLING_KEYS: [&str; 3] = [
    "default_temperature",
    "default_top_p",
    "default_max_tokens",
];

fn default_provider() -> String {
    "together".into()
}
fn default_model() -> String {
    MIXTRAL_8X7B.into()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_tokens() -> u32 {
    512
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_top_p", &self.default_top_p)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("stop", &self.stop)
            .field("agent", &self.agent)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Settings for the tool-calling orchestration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model invocations per user message
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Timeout for a single model call
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Timeout for a single tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Run the tools of one assistant turn concurrently
    #[serde(default)]
    pub parallel_tools: bool,

    /// Appended as the first turn of an empty conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_tool_iterations() -> usize {
    10
}
fn default_model_timeout_secs() -> u64 {
    120
}
fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            model_timeout_secs: default_model_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            parallel_tools: false,
            system_prompt: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

pub const MIXTRAL_8X7B: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";
pub const LLAMA_31_405B: &str = "meta-llama/Meta-Llama-3.1-405B-Instruct-Turbo";

/// Sampling settings known to work well for a model family.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPreset {
    pub model: &'static str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub stop: &'static [&'static str],
}

const PRESETS: &[ModelPreset] = &[
    ModelPreset {
        model: MIXTRAL_8X7B,
        max_tokens: 512,
        temperature: 1.0,
        top_p: Some(0.9),
        stop: &["</s>", "[INST]", "[/INST]"],
    },
    ModelPreset {
        model: LLAMA_31_405B,
        max_tokens: 1024,
        temperature: 0.0,
        top_p: None,
        stop: &["<|eot_id|>"],
    },
];

/// Look up the preset for a model, matching on the family name.
pub fn preset_for(model: &str) -> Option<&'static ModelPreset> {
    let lower = model.to_lowercase();
    if let Some(p) = PRESETS.iter().find(|p| p.model.eq_ignore_ascii_case(model)) {
        return Some(p);
    }
    if lower.contains("mixtral") {
        return PRESETS.iter().find(|p| p.model == MIXTRAL_8X7B);
    }
    if lower.contains("llama-3") {
        return PRESETS.iter().find(|p| p.model == LLAMA_31_405B);
    }
    None
}

/// Preset stop sequences for a model, empty when the model is unknown.
pub fn stop_sequences_for(model: &str) -> Vec<String> {
    preset_for(model)
        .map(|p| p.stop.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolchat/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `TOOLCHAT_API_KEY` (highest priority)
    /// - `TOGETHER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let parse_error = |e: toml::de::Error| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let table: toml::Table = toml::from_str(&content).map_err(parse_error)?;
        let pinned_sampling = SAMPLING_KEYS.iter().any(|key| table.contains_key(*key));
        let mut config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(parse_error)?;

        config.pinned_sampling = pinned_sampling;
        let model = config.default_model.clone();
        config.use_model(&model);

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply environment-style overrides from a lookup function.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("TOOLCHAT_API_KEY")
                .or_else(|| lookup("TOGETHER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("TOOLCHAT_PROVIDER") {
            self.default_provider = provider;
        }

        // The model precedence: env, then the provider's own default, then the file.
        let model = lookup("TOOLCHAT_MODEL").or_else(|| {
            self.providers
                .get(&self.default_provider)
                .and_then(|p| p.default_model.clone())
        });
        if let Some(model) = model {
            self.use_model(&model);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.default_top_p <= 0.0 || self.default_top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "default_top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The stop sequences to send: the explicit list, else the model preset.
    pub fn effective_stop(&self) -> Vec<String> {
        match &self.stop {
            Some(stop) => stop.clone(),
            None => stop_sequences_for(&self.default_model),
        }
    }

    /// Switch to a model and adopt its preset sampling settings,
    /// unless the config file pinned them.
    pub fn use_model(&mut self, model: &str) {
        self.default_model = model.to_string();
        if self.pinned_sampling {
            return;
        }
        if let Some(preset) = preset_for(model) {
            self.default_max_tokens = preset.max_tokens;
            self.default_temperature = preset.temperature;
            if let Some(top_p) = preset.top_p {
                self.default_top_p = top_p;
            }
        }
    }

    /// TOML rendering with every secret replaced.
    pub fn redacted_toml(&self) -> String {
        let mut config = self.clone();
        if config.api_key.is_some() {
            config.api_key = Some("[REDACTED]".into());
        }
        for provider in config.providers.values_mut() {
            if provider.api_key.is_some() {
                provider.api_key = Some("[REDACTED]".into());
            }
        }
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_top_p: default_top_p(),
            default_max_tokens: default_max_tokens(),
            stop: None,
            agent: AgentConfig::default(),
            providers: HashMap::new(),
            pinned_sampling: false,
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
