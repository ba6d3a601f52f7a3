//! Configuration management for Mimicast
//!
//! Configuration is read once at startup into an immutable [`Config`] value
//! that callers pass into each component. Secrets may come from the TOML file
//! or from `MIMICAST_PASSWORD` / `MIMICAST_API_KEY` (which take precedence).

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::llm::openai::ProviderService;
use crate::scheduling::{Schedule, SchedulePolicy};

pub const PASSWORD_ENV: &str = "MIMICAST_PASSWORD";
pub const API_KEY_ENV: &str = "MIMICAST_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub account: AccountConfig,
    pub targets: TargetsConfig,
    pub provider: ProviderConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub session_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub style: Vec<String>,
    #[serde(default)]
    pub content: Vec<String>,
    #[serde(default = "default_own_post_count")]
    pub own_post_count: usize,
    #[serde(default = "default_reference_post_count")]
    pub reference_post_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub service: ProviderService,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub persona: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_delay_minutes")]
    pub delay_minutes: u32,
    #[serde(default)]
    pub policy: SchedulePolicy,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            delay_minutes: default_delay_minutes(),
            policy: SchedulePolicy::default(),
        }
    }
}

fn default_own_post_count() -> usize {
    5
}

fn default_reference_post_count() -> usize {
    15
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_delay_minutes() -> u32 {
    30
}

/// Login credentials for the agent's own account
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
    pub email: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("email", &self.email)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every required value is present and well-typed
    pub fn validate(&self) -> Result<()> {
        require_non_empty("account.username", &self.account.username)?;
        require_non_empty("agent.persona", &self.agent.persona)?;

        if self.targets.style.is_empty() && self.targets.content.is_empty() {
            return Err(ConfigError::MissingField(
                "targets.style or targets.content".to_string(),
            )
            .into());
        }
        for handle in self.targets.style.iter().chain(&self.targets.content) {
            if handle.trim().trim_start_matches('@').is_empty() {
                return Err(invalid("targets", "handles cannot be empty"));
            }
        }

        require_positive("targets.own_post_count", self.targets.own_post_count as u64)?;
        require_positive(
            "targets.reference_post_count",
            self.targets.reference_post_count as u64,
        )?;
        require_positive("provider.max_tokens", self.provider.max_tokens as u64)?;
        require_positive("schedule.delay_minutes", self.schedule.delay_minutes as u64)?;

        // Secrets may come from the environment; only their absence is fatal.
        self.password()?;
        self.api_key()?;

        Ok(())
    }

    /// Resolve the account password, preferring the environment
    pub fn password(&self) -> Result<SecretString> {
        resolve_secret(PASSWORD_ENV, self.account.password.as_deref(), "account.password")
    }

    /// Resolve the completion provider API key, preferring the environment
    pub fn api_key(&self) -> Result<SecretString> {
        resolve_secret(API_KEY_ENV, self.provider.api_key.as_deref(), "provider.api_key")
    }

    /// Build the login credentials for the agent's own account
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            username: self.account.username.clone(),
            password: self.password()?,
            email: self.account.email.clone().filter(|e| !e.trim().is_empty()),
        })
    }

    /// Path of the persisted session file
    pub fn session_path(&self) -> Result<PathBuf> {
        match &self.account.session_file {
            Some(path) => Ok(PathBuf::from(shellexpand::tilde(path).to_string())),
            None => Ok(resolve_data_path()?.join("session.json")),
        }
    }

    /// Base URL of the completion provider
    pub fn provider_base_url(&self) -> String {
        self.provider
            .base_url
            .clone()
            .unwrap_or_else(|| self.provider.service.default_base_url().to_string())
    }

    /// Model identifier sent with every completion request
    pub fn provider_model(&self) -> String {
        self.provider
            .model
            .clone()
            .unwrap_or_else(|| self.provider.service.default_model().to_string())
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.schedule.policy, self.schedule.delay_minutes)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field.to_string()).into());
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(invalid(field, "must be a positive integer"));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> crate::error::MimicastError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn resolve_secret(env_var: &str, from_file: Option<&str>, field: &str) -> Result<SecretString> {
    let value = std::env::var(env_var)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| from_file.map(str::to_string))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingField(format!("{} (or {})", field, env_var)))?;

    Ok(SecretString::from(value))
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MIMICAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("mimicast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("mimicast"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MimicastError;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    const FULL_CONFIG: &str = r#"
[account]
username = "parrot_bot"
password = "hunter2"
email = "bot@example.com"
session_file = "/tmp/mimicast-test/session.json"

[targets]
style = ["@voice"]
content = ["topics"]

[provider]
service = "deepseek"
api_key = "sk-test"

[agent]
persona = "A dry, understated commentator."

[schedule]
delay_minutes = 15
policy = "aligned"
"#;

    fn clear_env() {
        std::env::remove_var(PASSWORD_ENV);
        std::env::remove_var(API_KEY_ENV);
    }

    #[test]
    #[serial]
    fn test_parse_full_config() {
        clear_env();
        let config = Config::from_toml(FULL_CONFIG).unwrap();

        assert_eq!(config.account.username, "parrot_bot");
        assert_eq!(config.targets.style, vec!["@voice"]);
        assert_eq!(config.targets.own_post_count, 5);
        assert_eq!(config.targets.reference_post_count, 15);
        assert_eq!(config.provider.max_tokens, 4096);
        assert_eq!(config.schedule.delay_minutes, 15);
        assert_eq!(config.schedule.policy, SchedulePolicy::Aligned);
        assert_eq!(
            config.session_path().unwrap(),
            PathBuf::from("/tmp/mimicast-test/session.json")
        );
        assert_eq!(config.provider_model(), "deepseek-chat");
    }

    #[test]
    #[serial]
    fn test_schedule_defaults_when_section_missing() {
        clear_env();
        let content = FULL_CONFIG.split("[schedule]").next().unwrap();
        let config = Config::from_toml(content).unwrap();

        assert_eq!(config.schedule.delay_minutes, 30);
        assert_eq!(config.schedule.policy, SchedulePolicy::Interval);
    }

    #[test]
    #[serial]
    fn test_zero_delay_rejected() {
        clear_env();
        let content = FULL_CONFIG.replace("delay_minutes = 15", "delay_minutes = 0");
        let result = Config::from_toml(&content);

        match result {
            Err(MimicastError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "schedule.delay_minutes");
            }
            other => panic!("Expected InvalidValue, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    #[serial]
    fn test_negative_delay_is_parse_error() {
        clear_env();
        let content = FULL_CONFIG.replace("delay_minutes = 15", "delay_minutes = -5");
        let result = Config::from_toml(&content);
        assert!(matches!(
            result,
            Err(MimicastError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_missing_persona_rejected() {
        clear_env();
        let content = FULL_CONFIG.replace(
            "persona = \"A dry, understated commentator.\"",
            "persona = \"  \"",
        );
        let result = Config::from_toml(&content);
        assert!(matches!(
            result,
            Err(MimicastError::Config(ConfigError::MissingField(ref f))) if f == "agent.persona"
        ));
    }

    #[test]
    #[serial]
    fn test_no_targets_rejected() {
        clear_env();
        let content = FULL_CONFIG
            .replace("style = [\"@voice\"]", "")
            .replace("content = [\"topics\"]", "");
        assert!(Config::from_toml(&content).is_err());
    }

    #[test]
    #[serial]
    fn test_missing_password_rejected() {
        clear_env();
        let content = FULL_CONFIG.replace("password = \"hunter2\"", "");
        let result = Config::from_toml(&content);
        assert!(matches!(
            result,
            Err(MimicastError::Config(ConfigError::MissingField(ref f))) if f.contains("account.password")
        ));
    }

    #[test]
    #[serial]
    fn test_env_secrets_take_precedence() {
        clear_env();
        std::env::set_var(PASSWORD_ENV, "from-env");
        std::env::set_var(API_KEY_ENV, "sk-env");

        let content = FULL_CONFIG
            .replace("password = \"hunter2\"", "")
            .replace("api_key = \"sk-test\"", "");
        let config = Config::from_toml(&content).unwrap();

        assert_eq!(config.password().unwrap().expose_secret(), "from-env");
        assert_eq!(config.api_key().unwrap().expose_secret(), "sk-env");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_credentials_redacted_in_debug() {
        clear_env();
        let config = Config::from_toml(FULL_CONFIG).unwrap();
        let credentials = config.credentials().unwrap();

        let debug = format!("{:?}", credentials);
        assert!(debug.contains("parrot_bot"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    #[serial]
    fn test_load_from_missing_path() {
        let result = Config::load_from_path(Path::new("/nonexistent/mimicast/config.toml"));
        assert!(matches!(
            result,
            Err(MimicastError::Config(ConfigError::ReadError(_)))
        ));
    }
}
