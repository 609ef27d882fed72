//! Configuration loading, validation, and management for Switchboard.
//!
//! Loads configuration from `~/.switchboard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use switchboard_core::ServerSpec;

/// The root configuration structure.
///
/// Maps directly to `~/.switchboard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Planning oracle settings
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Routing and server lifecycle settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Reasoning loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Capability servers to connect at startup
    #[serde(default)]
    pub servers: Vec<ServerSpec>,
}

/// How planner output is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    /// Native tool calling; capabilities are sent as function definitions
    #[default]
    ToolCalling,
    /// Thought/Action/Action Input/Final Answer text protocol
    React,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Provider label, used in logs
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Chat-completions base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (overridable via environment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub mode: PlannerMode,

    /// Upper bound on one planning call
    #[serde(default = "default_planner_timeout_secs")]
    pub timeout_secs: u64,

    /// Replaces the built-in system prompt when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_planner_timeout_secs() -> u64 {
    60
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            mode: PlannerMode::default(),
            timeout_secs: default_planner_timeout_secs(),
            system_prompt: None,
        }
    }
}

impl PlannerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for PlannerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("mode", &self.mode)
            .field("timeout_secs", &self.timeout_secs)
            .field("system_prompt", &self.system_prompt.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Default per-invocation timeout
    #[serde(default = "default_invocation_timeout_ms")]
    pub invocation_timeout_ms: u64,

    /// Bound on handshake and discovery
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,

    /// Consecutive transport failures before a server is marked disconnected
    #[serde(default = "default_max_transport_failures")]
    pub max_transport_failures: u32,

    /// Pause before the single reconnection attempt
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

fn default_invocation_timeout_ms() -> u64 {
    30_000
}
fn default_discovery_timeout_ms() -> u64 {
    10_000
}
fn default_max_transport_failures() -> u32 {
    3
}
fn default_reconnect_backoff_ms() -> u64 {
    500
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: default_invocation_timeout_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            max_transport_failures: default_max_transport_failures(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Planning cycles allowed per turn
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,

    /// Wall-clock bound on a whole turn (unset = none)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_deadline_ms: Option<u64>,
}

fn default_max_cycles() -> u32 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            turn_deadline_ms: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchboard/config.toml).
    ///
    /// Also checks environment variables:
    /// - `SWITCHBOARD_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `SWITCHBOARD_MODEL`
    /// - `SWITCHBOARD_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("SWITCHBOARD_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.planner.api_key = Some(key);
        }
        if let Some(model) = lookup("SWITCHBOARD_MODEL") {
            self.planner.model = model;
        }
        if let Some(url) = lookup("SWITCHBOARD_BASE_URL") {
            self.planner.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchboard")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.planner.temperature) {
            return Err(ConfigError::ValidationError(
                "planner.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.planner.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "planner.timeout_secs must be > 0".into(),
            ));
        }
        if self.router.invocation_timeout_ms == 0 || self.router.discovery_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "router timeouts must be > 0".into(),
            ));
        }
        if self.router.max_transport_failures == 0 {
            return Err(ConfigError::ValidationError(
                "router.max_transport_failures must be >= 1".into(),
            ));
        }
        if self.agent.max_cycles == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_cycles must be >= 1".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            server
                .validate()
                .map_err(ConfigError::ValidationError)?;
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    ///
    /// Includes the built-in utils server so a fresh install has something
    /// to route to.
    pub fn default_toml() -> String {
        let config = Self {
            servers: vec![ServerSpec::stdio(
                "utils",
                "switchboard",
                vec!["serve".into(), "utils".into()],
            )],
            ..Self::default()
        };
        toml::to_string_pretty(&config).unwrap_or_default()
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use switchboard_core::TransportKind;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.router.invocation_timeout_ms, 30_000);
        assert_eq!(config.router.max_transport_failures, 3);
        assert_eq!(config.agent.max_cycles, 5);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn default_toml_roundtrips() {
        let toml_str = AppConfig::default_toml();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.servers.len(), 1);
        assert_eq!(parsed.servers[0].name, "utils");
        assert_eq!(parsed.servers[0].args, vec!["serve", "utils"]);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.planner.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cycles_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_cycles = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_server_names_rejected() {
        let config = AppConfig {
            servers: vec![
                ServerSpec::stdio("weather", "weather-server", vec![]),
                ServerSpec::stdio("weather", "other", vec![]),
            ],
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate server name"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.planner.model, "gpt-4o-mini");
    }

    #[test]
    fn parses_servers_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[planner]
model = "gpt-4o"
mode = "react"

[agent]
max_cycles = 8
turn_deadline_ms = 120000

[[servers]]
name = "weather"
command = "python"
args = ["weather_server.py"]
env = { OPENWEATHER_API_KEY = "abc" }

[[servers]]
name = "utils"
transport = "in_process"
serialize_requests = true
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.planner.model, "gpt-4o");
        assert_eq!(config.planner.mode, PlannerMode::React);
        assert_eq!(config.agent.max_cycles, 8);
        assert_eq!(config.agent.turn_deadline_ms, Some(120_000));
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].env["OPENWEATHER_API_KEY"], "abc");
        assert_eq!(config.servers[1].transport, TransportKind::InProcess);
        assert!(config.servers[1].serialize_requests);
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[planner\nmodel = ").unwrap();
        match AppConfig::load_from(&path) {
            Err(ConfigError::ParseError { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected ParseError, got {other:?}"),
        }
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let env: HashMap<&str, &str> = [
            ("SWITCHBOARD_API_KEY", "sb-key"),
            ("OPENAI_API_KEY", "oa-key"),
            ("SWITCHBOARD_MODEL", "local-model"),
            ("SWITCHBOARD_BASE_URL", "http://localhost:11434/v1"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.planner.api_key.as_deref(), Some("sb-key"));
        assert_eq!(config.planner.model, "local-model");
        assert_eq!(config.planner.base_url, "http://localhost:11434/v1");

        let mut config = AppConfig::default();
        config.apply_env(|k| (k == "OPENAI_API_KEY").then(|| "oa-key".to_string()));
        assert_eq!(config.planner.api_key.as_deref(), Some("oa-key"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.planner.api_key = Some("sk-very-secret".into());
        let dbg = format!("{config:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("sk-very-secret"));
    }
}
