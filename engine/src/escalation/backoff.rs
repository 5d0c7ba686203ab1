//! Backoff curves between escalation levels
//!
//! `delay(level)` is the wait after level `level` fired and before level
//! `level + 1` fires. Every curve is non-decreasing in `level`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default fixed interval between escalation levels (15 minutes).
pub const DEFAULT_INTERVAL_SECS: u64 = 15 * 60;

/// Curve used to space escalation levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same wait between every level
    Fixed { interval_secs: u64 },
    /// `base + step * (level - 1)`, capped at `max_secs`
    Linear {
        base_secs: u64,
        step_secs: u64,
        max_secs: u64,
    },
    /// `base * factor^(level - 1)`, capped at `max_secs`
    Exponential {
        base_secs: u64,
        factor: f64,
        max_secs: u64,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Fixed {
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl BackoffPolicy {
    /// Wait after `level` fired. Levels start at 1; 0 is treated as 1.
    pub fn delay(&self, level: u32) -> Duration {
        let step = u64::from(level.max(1) - 1);
        let secs = match *self {
            Self::Fixed { interval_secs } => interval_secs,
            Self::Linear {
                base_secs,
                step_secs,
                max_secs,
            } => base_secs
                .saturating_add(step_secs.saturating_mul(step))
                .min(max_secs.max(base_secs)),
            Self::Exponential {
                base_secs,
                factor,
                max_secs,
            } => {
                let cap = max_secs.max(base_secs);
                let exp = i32::try_from(step).unwrap_or(i32::MAX);
                let raw = base_secs as f64 * factor.powi(exp);
                if raw.is_finite() && raw < cap as f64 {
                    raw as u64
                } else {
                    cap
                }
            }
        };
        Duration::from_secs(secs)
    }

    /// Validate the curve; return an error string if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Fixed { interval_secs } if interval_secs == 0 => {
                Err("fixed backoff interval_secs must be > 0".to_string())
            }
            Self::Linear { base_secs, .. } if base_secs == 0 => {
                Err("linear backoff base_secs must be > 0".to_string())
            }
            Self::Exponential {
                base_secs, factor, ..
            } => {
                if base_secs == 0 {
                    Err("exponential backoff base_secs must be > 0".to_string())
                } else if !(factor >= 1.0 && factor.is_finite()) {
                    Err(format!(
                        "exponential backoff factor must be >= 1, got {}",
                        factor
                    ))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_is_constant() {
        let policy = BackoffPolicy::Fixed { interval_secs: 60 };
        assert_eq!(policy.delay(1), Duration::from_secs(60));
        assert_eq!(policy.delay(40), Duration::from_secs(60));
    }

    #[test]
    fn test_linear_grows_then_caps() {
        let policy = BackoffPolicy::Linear {
            base_secs: 60,
            step_secs: 30,
            max_secs: 150,
        };
        assert_eq!(policy.delay(1), Duration::from_secs(60));
        assert_eq!(policy.delay(2), Duration::from_secs(90));
        assert_eq!(policy.delay(4), Duration::from_secs(150));
        assert_eq!(policy.delay(100), Duration::from_secs(150));
    }

    #[test]
    fn test_exponential_caps_without_overflow() {
        let policy = BackoffPolicy::Exponential {
            base_secs: 10,
            factor: 2.0,
            max_secs: 600,
        };
        assert_eq!(policy.delay(1), Duration::from_secs(10));
        assert_eq!(policy.delay(3), Duration::from_secs(40));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(600));
    }

    #[test]
    fn test_curves_are_non_decreasing() {
        let policies = [
            BackoffPolicy::default(),
            BackoffPolicy::Linear {
                base_secs: 5,
                step_secs: 7,
                max_secs: 100,
            },
            BackoffPolicy::Exponential {
                base_secs: 3,
                factor: 1.5,
                max_secs: 1_000,
            },
        ];
        for policy in &policies {
            let mut prev = Duration::ZERO;
            for level in 1..64 {
                let d = policy.delay(level);
                assert!(d >= prev, "{:?} decreased at level {}", policy, level);
                prev = d;
            }
        }
    }

    #[test]
    fn test_validate() {
        assert!(BackoffPolicy::default().validate().is_ok());
        assert!(BackoffPolicy::Fixed { interval_secs: 0 }.validate().is_err());
        assert!(BackoffPolicy::Exponential {
            base_secs: 10,
            factor: 0.5,
            max_secs: 100
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_toml_shape() {
        let policy: BackoffPolicy =
            toml::from_str("kind = \"linear\"\nbase_secs = 60\nstep_secs = 60\nmax_secs = 600")
                .unwrap();
        assert!(matches!(policy, BackoffPolicy::Linear { step_secs: 60, .. }));
    }
}
