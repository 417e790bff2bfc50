// Keypool — Gateway configuration
//
// One explicit struct, deserialized from TOML with every field defaulted.
// Defaults are applied here, once, and the resulting config is handed to
// the gateway constructor. Secrets never live in the file: credential values
// come from the environment variables named in `credential_slots`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::FailurePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Fallback provider credential {0} is not set")]
    MissingFallbackCredential(String),
}

/// Per-sequence-tag overrides of the generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallProfile {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Secondary provider tried once after the primary pool gives up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the secondary provider's credential.
    pub credential_env: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Chat-completions endpoint of the primary provider.
    pub endpoint: String,
    /// Ordered environment variable names, one credential each.
    pub credential_slots: Vec<String>,
    /// Response header carrying the rate-limit reset hint.
    pub reset_header: String,

    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub rate_limit_cooldown_seconds: u64,
    pub error_cooldown_seconds: u64,
    /// Consecutive errors before a credential enters cooldown.
    pub error_threshold: u32,
    pub timeout_seconds: u64,
    pub last_error_max_len: usize,

    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,

    /// Route tagged requests to `tag % pool_size` before normal selection.
    pub sticky_assignment: bool,

    /// Keyed by sequence tag, e.g. `[profiles.2]`.
    pub profiles: BTreeMap<String, CallProfile>,

    pub fallback: Option<FallbackConfig>,
}

/// Longest accepted cooldown: one year.
pub const MAX_COOLDOWN_SECONDS: u64 = 365 * 24 * 60 * 60;

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            credential_slots: ["GROQ_API_KEY", "GROQ_API_KEY2", "GROQ_API_KEY3", "GROQ_API_KEY4"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reset_header: "x-ratelimit-reset-requests".to_string(),
            max_retries: 3,
            base_retry_delay_ms: 1000,
            rate_limit_cooldown_seconds: 60,
            error_cooldown_seconds: 30,
            error_threshold: 3,
            timeout_seconds: default_timeout_seconds(),
            last_error_max_len: 200,
            default_model: "llama-3.3-70b-versatile".to_string(),
            default_temperature: 0.7,
            default_max_tokens: 2000,
            sticky_assignment: false,
            profiles: BTreeMap::new(),
            fallback: None,
        }
    }
}

impl GatewayConfig {
    /// Default config location: `<config dir>/keypool/config.toml`.
    pub fn default_path() -> PathBuf {
        let base = dirs_next::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("keypool").join("config.toml")
    }

    /// Load from `path` if given (it must exist), else from the default
    /// location if present, else built-in defaults. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!(path = %path.display(), "Loaded gateway config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".to_string()));
        }
        if self.credential_slots.is_empty() {
            return Err(ConfigError::Invalid(
                "credential_slots must name at least one variable".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".to_string()));
        }
        if self.error_threshold == 0 {
            return Err(ConfigError::Invalid("error_threshold must be at least 1".to_string()));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("timeout_seconds must be at least 1".to_string()));
        }
        for (name, secs) in [
            ("rate_limit_cooldown_seconds", self.rate_limit_cooldown_seconds),
            ("error_cooldown_seconds", self.error_cooldown_seconds),
        ] {
            if secs > MAX_COOLDOWN_SECONDS {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {} (one year), got {}",
                    name, MAX_COOLDOWN_SECONDS, secs
                )));
            }
        }
        for tag in self.profiles.keys() {
            if tag.parse::<u64>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "profile key {:?} is not a sequence number",
                    tag
                )));
            }
        }
        if let Some(fb) = &self.fallback {
            if fb.endpoint.trim().is_empty() || fb.model.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "fallback endpoint and model must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn profile(&self, tag: u64) -> Option<&CallProfile> {
        self.profiles.get(&tag.to_string())
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy {
            rate_limit_cooldown: cooldown(self.rate_limit_cooldown_seconds),
            error_cooldown: cooldown(self.error_cooldown_seconds),
            error_threshold: self.error_threshold,
            last_error_max_len: self.last_error_max_len,
        }
    }
}

/// Seconds to a delta, clamped to the accepted ceiling so configs that
/// skipped `validate()` still cannot overflow.
fn cooldown(secs: u64) -> chrono::Duration {
    let secs = secs.min(MAX_COOLDOWN_SECONDS) as i64;
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
