use serde::{Deserialize, Serialize};

use crate::error::{IpdbError, IpdbResult};

/// Upper bound for the limiter's idle threshold and sweep interval (one week).
pub const MAX_LIMITER_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Deployment environment reported by the healthcheck
    /// (development, staging or production).
    #[serde(default = "default_env")]
    pub env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            env: default_env(),
        }
    }
}

/// Per-client admission control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sustained requests per second per client (token refill rate).
    #[serde(default = "default_rps")]
    pub rps: f64,
    /// Bucket capacity per client.
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Idle age after which a client's state is reclaimed.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Take the client identity from the first `X-Forwarded-For` hop instead
    /// of the socket peer. Only safe behind a trusted reverse proxy.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: default_rps(),
            burst: default_burst(),
            idle_threshold_secs: default_idle_threshold(),
            sweep_interval_secs: default_sweep_interval(),
            trust_forwarded_for: false,
        }
    }
}

// Default value helpers
fn default_listen() -> String {
    "0.0.0.0:4000".to_string()
}
fn default_env() -> String {
    "development".to_string()
}
fn default_true() -> bool {
    true
}
fn default_rps() -> f64 {
    2.0
}
fn default_burst() -> u32 {
    4
}
fn default_idle_threshold() -> u64 {
    3 * 60
}
fn default_sweep_interval() -> u64 {
    60
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> IpdbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> IpdbResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> IpdbResult<()> {
        if self.server.listen.trim().is_empty() {
            return Err(IpdbError::Config(
                "server.listen must not be empty".to_string(),
            ));
        }

        let limiter = &self.limiter;
        if !limiter.rps.is_finite() || limiter.rps <= 0.0 {
            return Err(IpdbError::Config(format!(
                "limiter.rps must be a positive number (got {})",
                limiter.rps
            )));
        }
        if limiter.burst == 0 {
            return Err(IpdbError::Config(
                "limiter.burst must be at least 1".to_string(),
            ));
        }
        if limiter.idle_threshold_secs == 0 {
            return Err(IpdbError::Config(
                "limiter.idle_threshold_secs must be greater than zero".to_string(),
            ));
        }
        if limiter.sweep_interval_secs == 0 {
            return Err(IpdbError::Config(
                "limiter.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        for (name, secs) in [
            ("idle_threshold_secs", limiter.idle_threshold_secs),
            ("sweep_interval_secs", limiter.sweep_interval_secs),
        ] {
            if secs > MAX_LIMITER_DURATION_SECS {
                return Err(IpdbError::Config(format!(
                    "limiter.{} must not exceed {} (got {})",
                    name, MAX_LIMITER_DURATION_SECS, secs
                )));
            }
        }

        if !limiter.enabled {
            tracing::warn!("admission control is disabled; clients are not rate limited");
        }

        Ok(())
    }
}
