//! Configuration management for Warden.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

use warden_common::constants::{
    CHALLENGE_TTL_SECS, DEFAULT_CAPTCHA_LENGTH, DEFAULT_GET_ACTION, DEFAULT_IMAGE_HEIGHT,
    DEFAULT_IMAGE_WIDTH, DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL, DEFAULT_SHOW_ACTION,
    FAILURE_TTL_SECS, MAX_FORM_BYTES, SWEEP_INTERVAL_SECS,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL (only used by the redis challenge store)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// CAPTCHA gate configuration
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Out-of-process admit/report hooks
    #[serde(default)]
    pub sidecar: SidecarConfig,
}

/// Sidecar hook configuration. The hooks are not served without a token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SidecarConfig {
    /// Shared secret expected in the `X-Warden-Token` header
    #[serde(default)]
    pub token: Option<String>,
}

impl SidecarConfig {
    /// Configured token, ignoring blank values
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Where issued challenges live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local map
    #[default]
    Memory,
    /// Shared Redis instance
    Redis,
}

/// CAPTCHA gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Turn the whole gate into a pass-through
    #[serde(default)]
    pub disabled: bool,

    /// Action that issues a challenge id
    #[serde(default = "default_get_action")]
    pub get_action: String,

    /// Action that renders a challenge image
    #[serde(default = "default_show_action")]
    pub show_action: String,

    /// Digits per challenge answer
    #[serde(default = "default_captcha_length")]
    pub captcha_length: usize,

    /// Default image width
    #[serde(default = "default_image_width")]
    pub image_width: u32,

    /// Default image height
    #[serde(default = "default_image_height")]
    pub image_height: u32,

    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    /// Failure counter validity in seconds
    #[serde(default = "default_failure_ttl")]
    pub failure_ttl_secs: u64,

    /// Sweep period for expired counters and challenges
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Largest urlencoded body buffered to read form fields
    #[serde(default = "default_max_form_bytes")]
    pub max_form_bytes: usize,

    /// Challenge store backend
    #[serde(default)]
    pub store: StoreKind,

    /// Gated actions
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// One `[[captcha.actions]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    /// Exact action name, or a prefix pattern ending in `*`
    pub name: String,

    /// Request field identifying the caller
    #[serde(default)]
    pub identifier: Option<String>,

    /// Consecutive failures tolerated; 0 means always verify
    #[serde(default)]
    pub max_fail_count: u32,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            get_action: default_get_action(),
            show_action: default_show_action(),
            captcha_length: default_captcha_length(),
            image_width: default_image_width(),
            image_height: default_image_height(),
            challenge_ttl_secs: default_challenge_ttl(),
            failure_ttl_secs: default_failure_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            max_form_bytes: default_max_form_bytes(),
            store: StoreKind::default(),
            actions: Vec::new(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_get_action() -> String { DEFAULT_GET_ACTION.to_string() }
fn default_show_action() -> String { DEFAULT_SHOW_ACTION.to_string() }
fn default_captcha_length() -> usize { DEFAULT_CAPTCHA_LENGTH }
fn default_image_width() -> u32 { DEFAULT_IMAGE_WIDTH }
fn default_image_height() -> u32 { DEFAULT_IMAGE_HEIGHT }
fn default_challenge_ttl() -> u64 { CHALLENGE_TTL_SECS }
fn default_failure_ttl() -> u64 { FAILURE_TTL_SECS }
fn default_sweep_interval() -> u64 { SWEEP_INTERVAL_SECS }
fn default_max_form_bytes() -> usize { MAX_FORM_BYTES }

/// Command-line overrides applied on top of the loaded file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub redis_url: Option<String>,
    pub listen_addr: Option<String>,
}

impl AppConfig {
    /// Load configuration from file and `WARDEN__*` environment variables,
    /// with CLI overrides
    pub fn load(config_path: &str, overrides: &Overrides) -> Result<Self> {
        // The action table lives in the file; starting without it would leave
        // every action ungated
        if !Path::new(config_path).exists() {
            bail!("Config file not found: {config_path}");
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .add_source(config::Environment::with_prefix("WARDEN").separator("__"))
            .build()
            .context("Failed to load config")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        // Apply CLI overrides
        if let Some(ref redis_url) = overrides.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = overrides.listen_addr {
            config.listen_addr = listen.clone();
        }

        Ok(config)
    }

    /// Parse configuration from an in-memory TOML document
    pub fn from_toml(source: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .context("Failed to load config")?
            .try_deserialize()
            .context("Failed to parse config")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            captcha: CaptchaConfig::default(),
            sidecar: SidecarConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_section_missing() {
        let config = AppConfig::from_toml("listen_addr = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.captcha.get_action, "GetCaptcha");
        assert_eq!(config.captcha.show_action, "ShowCaptcha");
        assert_eq!(config.captcha.captcha_length, 4);
        assert_eq!(config.captcha.image_width, 180);
        assert_eq!(config.captcha.image_height, 60);
        assert_eq!(config.captcha.failure_ttl_secs, 3600);
        assert_eq!(config.captcha.store, StoreKind::Memory);
        assert!(config.captcha.actions.is_empty());
    }

    #[test]
    fn test_action_table_keeps_dotted_names() {
        let config = AppConfig::from_toml(
            r#"
            [captcha]
            store = "redis"

            [[captcha.actions]]
            name = "User.Login"
            identifier = "Username"
            max_fail_count = 3

            [[captcha.actions]]
            name = "User.Register"
            "#,
        )
        .unwrap();

        assert_eq!(config.captcha.store, StoreKind::Redis);
        assert_eq!(config.captcha.actions.len(), 2);
        assert_eq!(config.captcha.actions[0].name, "User.Login");
        assert_eq!(config.captcha.actions[0].identifier.as_deref(), Some("Username"));
        assert_eq!(config.captcha.actions[0].max_fail_count, 3);
        assert_eq!(config.captcha.actions[1].identifier, None);
        assert_eq!(config.captcha.actions[1].max_fail_count, 0);
    }

    #[test]
    fn test_missing_config_file_is_fatal() {
        let err = AppConfig::load("/nonexistent/warden.toml", &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_sidecar_token_ignores_blank_values() {
        let config = AppConfig::from_toml("[sidecar]\ntoken = \"  \"").unwrap();
        assert_eq!(config.sidecar.token(), None);

        let config = AppConfig::from_toml("[sidecar]\ntoken = \"s3cret\"").unwrap();
        assert_eq!(config.sidecar.token(), Some("s3cret"));
        assert_eq!(AppConfig::default().sidecar.token(), None);
    }

    #[test]
    fn test_sample_config_builds_a_gate() {
        let config = AppConfig::from_toml(include_str!("../../../config/warden.toml")).unwrap();
        let policies = crate::gate::GatePolicies::build(&config.captcha.actions).unwrap();
        assert_eq!(policies.len(), 3);
        assert!(policies.matcher().matches("Admin.Reboot"));
        assert!(!policies.matcher().matches("User.Logout"));
    }
}
