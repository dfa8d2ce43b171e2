//! Configuration loading

use anyhow::{Context, Result};
use fengshui_core::ImageSize;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::poller::{BackoffConfig, PollerConfig};

/// Environment variable overriding `api.base_url`
pub const API_URL_ENV: &str = "FENGSHUI_API_URL";

/// Shortest accepted status check interval
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the analysis API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (none by default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Status check interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Back off after failed checks (disabled when absent)
    #[serde(default)]
    pub backoff: Option<BackoffSection>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            backoff: None,
        }
    }
}

fn default_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSection {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

fn default_backoff_initial_ms() -> u64 {
    2000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Width assumed before the image's natural size is known
    #[serde(default = "default_fallback_width")]
    pub fallback_width: u32,
    /// Height assumed before the image's natural size is known
    #[serde(default = "default_fallback_height")]
    pub fallback_height: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            fallback_width: default_fallback_width(),
            fallback_height: default_fallback_height(),
        }
    }
}

fn default_fallback_width() -> u32 {
    1920
}

fn default_fallback_height() -> u32 {
    1080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Paywall setting used when the state file is first created
    #[serde(default)]
    pub paywall_enabled: bool,
    /// Price of one paid analysis
    #[serde(default = "default_analysis_cost")]
    pub analysis_cost: f64,
    /// Top-up page for the local wallet
    #[serde(default = "default_payment_url")]
    pub payment_url: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            paywall_enabled: false,
            analysis_cost: default_analysis_cost(),
            payment_url: default_payment_url(),
        }
    }
}

fn default_analysis_cost() -> f64 {
    0.25
}

fn default_payment_url() -> String {
    "http://localhost:8000/pay".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Path to the persisted client state
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> String {
    "./fengshui-state.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Where downloaded models are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    "./models".to_string()
}

impl Config {
    /// Apply `FENGSHUI_API_URL` then an explicit override, in that order
    pub fn apply_api_overrides(&mut self, env_url: Option<String>, cli_url: Option<String>) {
        if let Some(url) = env_url.filter(|u| !u.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(url) = cli_url {
            self.api.base_url = url;
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.api.timeout_secs.map(Duration::from_secs)
    }

    /// Convert to the poller's settings
    ///
    /// Intervals below [`MIN_POLL_INTERVAL_MS`] are raised to it.
    pub fn to_poller_config(&self) -> PollerConfig {
        let interval_ms = self.poll.interval_ms.max(MIN_POLL_INTERVAL_MS);
        if interval_ms != self.poll.interval_ms {
            warn!(
                configured = self.poll.interval_ms,
                used = interval_ms,
                "Poll interval too short"
            );
        }
        PollerConfig {
            interval: Duration::from_millis(interval_ms),
            backoff: self.poll.backoff.as_ref().map(|b| BackoffConfig {
                initial_delay: Duration::from_millis(b.initial_ms.max(MIN_POLL_INTERVAL_MS)),
                max_delay: Duration::from_millis(b.max_ms),
                multiplier: b.multiplier,
            }),
        }
    }

    pub fn fallback_image_size(&self) -> ImageSize {
        ImageSize::new(
            self.image.fallback_width as f32,
            self.image.fallback_height as f32,
        )
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.poll.interval_ms, 2000);
        assert!(config.poll.backoff.is_none());
        assert_eq!(config.gate.analysis_cost, 0.25);
        assert_eq!(config.fallback_image_size(), ImageSize::new(1920.0, 1080.0));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fengshui.toml");
        std::fs::write(
            &path,
            r#"
[api]
base_url = "https://api.example.com"
timeout_secs = 10

[poll]
interval_ms = 500

[poll.backoff]
max_ms = 8000
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(10)));

        let poller = config.to_poller_config();
        assert_eq!(poller.interval, Duration::from_millis(500));
        let backoff = poller.backoff.unwrap();
        assert_eq!(backoff.initial_delay, Duration::from_millis(2000));
        assert_eq!(backoff.max_delay, Duration::from_millis(8000));
        assert_eq!(config.state.path, "./fengshui-state.json");
    }

    #[test]
    fn test_zero_interval_is_raised_to_minimum() {
        let mut config = Config::default();
        config.poll.interval_ms = 0;
        config.poll.backoff = Some(BackoffSection {
            initial_ms: 0,
            max_ms: 1000,
            multiplier: 2.0,
        });

        let poller = config.to_poller_config();
        let min = Duration::from_millis(MIN_POLL_INTERVAL_MS);
        assert_eq!(poller.interval, min);
        assert_eq!(poller.backoff.unwrap().initial_delay, min);
    }

    #[test]
    fn test_api_override_order() {
        let mut config = Config::default();
        config.apply_api_overrides(Some("http://env:1".into()), None);
        assert_eq!(config.api.base_url, "http://env:1");
        config.apply_api_overrides(Some("http://env:1".into()), Some("http://cli:2".into()));
        assert_eq!(config.api.base_url, "http://cli:2");
        config.apply_api_overrides(Some(String::new()), None);
        assert_eq!(config.api.base_url, "http://cli:2");
    }
}
