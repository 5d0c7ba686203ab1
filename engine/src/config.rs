//! Engine configuration
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`LINKWATCH_*`)
//! 2. Values from the TOML file
//! 3. Built-in defaults
//!
//! | Key | Default |
//! |-----|---------|
//! | `detector.intermittent_latency_ms` | unset (latency never degrades status) |
//! | `lifecycle.intermittent_policy` | `annotate` |
//! | `escalation.backoff` | fixed, 900 s |
//! | `escalation.max_level` | unset (escalate until resolved) |
//! | `dispatch.max_concurrent_sends` | 8 |
//! | `dispatch.send_timeout_secs` | 30 |

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::escalation::backoff::BackoffPolicy;

const DEFAULT_MAX_CONCURRENT_SENDS: usize = 8;
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

const ENV_BACKOFF_SECS: &str = "LINKWATCH_BACKOFF_SECS";
const ENV_MAX_LEVEL: &str = "LINKWATCH_MAX_LEVEL";
const ENV_SEND_TIMEOUT_SECS: &str = "LINKWATCH_SEND_TIMEOUT_SECS";
const ENV_MAX_CONCURRENT_SENDS: &str = "LINKWATCH_MAX_CONCURRENT_SENDS";

/// Status detection tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// An `Up` sample slower than this is treated as `Intermittent`.
    pub intermittent_latency_ms: Option<u32>,
}

/// What an Intermittent transition does when no downtime is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntermittentPolicy {
    /// Record the transition only; no downtime is opened.
    #[default]
    Annotate,
    /// Open a downtime and start escalating, as for Down.
    OpenCampaign,
}

/// Downtime lifecycle policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub intermittent_policy: IntermittentPolicy,
}

/// Escalation cadence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub backoff: BackoffPolicy,
    /// Stop firing after this level; the campaign still waits for
    /// resolution or acknowledgement.
    pub max_level: Option<u32>,
}

/// Channel dispatch limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Width of the send worker pool for one round.
    pub max_concurrent_sends: usize,
    /// A send that takes longer is recorded as Failed.
    pub send_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
        }
    }
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detector: DetectorConfig,
    pub lifecycle: LifecycleConfig,
    pub escalation: EscalationConfig,
    pub dispatch: DispatchConfig,
}

impl EngineConfig {
    /// Parse from TOML; missing tables fall back to defaults.
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `LINKWATCH_*` environment variables.
    ///
    /// `LINKWATCH_BACKOFF_SECS` replaces the curve with a fixed interval.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(secs) = u64_from_env(ENV_BACKOFF_SECS) {
            self.escalation.backoff = BackoffPolicy::Fixed {
                interval_secs: secs,
            };
        }
        if let Some(level) = u64_from_env(ENV_MAX_LEVEL) {
            self.escalation.max_level = u32::try_from(level).ok();
        }
        if let Some(secs) = u64_from_env(ENV_SEND_TIMEOUT_SECS) {
            self.dispatch.send_timeout_secs = secs;
        }
        if let Some(n) = u64_from_env(ENV_MAX_CONCURRENT_SENDS) {
            self.dispatch.max_concurrent_sends = usize::try_from(n).unwrap_or(usize::MAX);
        }
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.escalation.backoff.validate().map_err(EngineError::Config)?;
        if self.escalation.max_level == Some(0) {
            return Err(EngineError::Config("max_level must be > 0".to_string()));
        }
        if self.dispatch.max_concurrent_sends == 0 {
            return Err(EngineError::Config(
                "max_concurrent_sends must be > 0".to_string(),
            ));
        }
        if self.dispatch.send_timeout_secs == 0 {
            return Err(EngineError::Config(
                "send_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn u64_from_env(var: &str) -> Option<u64> {
    env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lifecycle.intermittent_policy, IntermittentPolicy::Annotate);
        assert_eq!(config.dispatch.send_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
[lifecycle]
intermittent_policy = "open_campaign"

[escalation]
max_level = 5

[escalation.backoff]
kind = "fixed"
interval_secs = 120
"#,
        )
        .unwrap();

        assert_eq!(
            config.lifecycle.intermittent_policy,
            IntermittentPolicy::OpenCampaign
        );
        assert_eq!(config.escalation.max_level, Some(5));
        assert_eq!(
            config.escalation.backoff,
            BackoffPolicy::Fixed { interval_secs: 120 }
        );
        assert_eq!(config.dispatch.max_concurrent_sends, 8);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = EngineConfig::from_toml_str("[dispatch]\nmax_concurrent_sends = 0").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = EngineConfig::from_toml_str("[escalation]\nmax_level = \"many\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        env::set_var(ENV_BACKOFF_SECS, "45");
        env::set_var(ENV_MAX_LEVEL, "3");
        let config = EngineConfig::default().apply_env_overrides();
        env::remove_var(ENV_BACKOFF_SECS);
        env::remove_var(ENV_MAX_LEVEL);

        assert_eq!(
            config.escalation.backoff,
            BackoffPolicy::Fixed { interval_secs: 45 }
        );
        assert_eq!(config.escalation.max_level, Some(3));
    }
}
