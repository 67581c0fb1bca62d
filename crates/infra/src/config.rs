//! Process configuration from environment variables.
//!
//! | variable | default |
//! |---|---|
//! | `STOCKHOLD_LOG` | `info` |
//! | `STOCKHOLD_LOG_JSON` | `true` |
//! | `STOCKHOLD_RESERVATION_TTL_SECS` | `900` |
//! | `STOCKHOLD_MAX_RESERVATION_TTL_SECS` | `86400` (`0` = unbounded) |
//!
//! Both lifetimes are capped at one year.
//! | `STOCKHOLD_SEED_FILE` | unset |

use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;
use tracing::debug;

use stockhold_inventory::ReservationPolicy;
use stockhold_observability::LogSettings;

pub const LOG_VAR: &str = "STOCKHOLD_LOG";
pub const LOG_JSON_VAR: &str = "STOCKHOLD_LOG_JSON";
pub const TTL_VAR: &str = "STOCKHOLD_RESERVATION_TTL_SECS";
pub const MAX_TTL_VAR: &str = "STOCKHOLD_MAX_RESERVATION_TTL_SECS";
pub const SEED_FILE_VAR: &str = "STOCKHOLD_SEED_FILE";

const DEFAULT_TTL_SECS: i64 = 15 * 60;
const DEFAULT_MAX_TTL_SECS: i64 = 24 * 60 * 60;
/// Upper bound for either lifetime setting: one year.
pub const LIMIT_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected} (got `{value}`)")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("default reservation lifetime ({default_secs}s) exceeds the maximum ({max_secs}s)")]
    TtlAboveMax { default_secs: i64, max_secs: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockholdConfig {
    pub log: LogSettings,
    pub reservation_ttl_secs: i64,
    /// `None` = no upper bound on reservation deadlines.
    pub max_reservation_ttl_secs: Option<i64>,
    pub seed_file: Option<PathBuf>,
}

impl Default for StockholdConfig {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            reservation_ttl_secs: DEFAULT_TTL_SECS,
            max_reservation_ttl_secs: Some(DEFAULT_MAX_TTL_SECS),
            seed_file: None,
        }
    }
}

impl StockholdConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let filter = lookup(LOG_VAR).unwrap_or_else(|| {
            debug!(var = LOG_VAR, default = %defaults.log.filter, "not set; using default");
            defaults.log.filter.clone()
        });

        let json = match lookup(LOG_JSON_VAR) {
            Some(raw) => parse_bool(LOG_JSON_VAR, &raw)?,
            None => defaults.log.json,
        };

        let reservation_ttl_secs = match lookup(TTL_VAR) {
            Some(raw) => parse_secs(TTL_VAR, &raw, false)?,
            None => {
                debug!(var = TTL_VAR, default = DEFAULT_TTL_SECS, "not set; using default");
                DEFAULT_TTL_SECS
            }
        };

        let max_reservation_ttl_secs = match lookup(MAX_TTL_VAR) {
            Some(raw) => match parse_secs(MAX_TTL_VAR, &raw, true)? {
                0 => None,
                secs => Some(secs),
            },
            None => defaults.max_reservation_ttl_secs,
        };

        if let Some(max_secs) = max_reservation_ttl_secs {
            if reservation_ttl_secs > max_secs {
                return Err(ConfigError::TtlAboveMax {
                    default_secs: reservation_ttl_secs,
                    max_secs,
                });
            }
        }

        let seed_file = lookup(SEED_FILE_VAR)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            log: LogSettings { filter, json },
            reservation_ttl_secs,
            max_reservation_ttl_secs,
            seed_file,
        })
    }

    pub fn reservation_policy(&self) -> ReservationPolicy {
        ReservationPolicy {
            default_ttl: Duration::seconds(self.reservation_ttl_secs),
            max_ttl: self.max_reservation_ttl_secs.map(Duration::seconds),
        }
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            expected: "a boolean",
        }),
    }
}

fn parse_secs(var: &'static str, raw: &str, allow_zero: bool) -> Result<i64, ConfigError> {
    let invalid = || ConfigError::Invalid {
        var,
        value: raw.to_string(),
        expected: if allow_zero {
            "a number of seconds between 0 and 31536000"
        } else {
            "a number of seconds between 1 and 31536000"
        },
    };
    let secs: i64 = raw.trim().parse().map_err(|_| invalid())?;
    if secs < 0 || (secs == 0 && !allow_zero) || secs > LIMIT_TTL_SECS {
        return Err(invalid());
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<StockholdConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StockholdConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, StockholdConfig::default());

        let policy = cfg.reservation_policy();
        assert_eq!(policy.default_ttl, Duration::minutes(15));
        assert_eq!(policy.max_ttl, Some(Duration::hours(24)));
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            (LOG_VAR, "debug"),
            (LOG_JSON_VAR, "off"),
            (TTL_VAR, "60"),
            (MAX_TTL_VAR, "0"),
            (SEED_FILE_VAR, "/etc/stockhold/seed.json"),
        ])
        .unwrap();

        assert_eq!(cfg.log.filter, "debug");
        assert!(!cfg.log.json);
        assert_eq!(cfg.reservation_ttl_secs, 60);
        assert_eq!(cfg.max_reservation_ttl_secs, None);
        assert_eq!(cfg.seed_file, Some(PathBuf::from("/etc/stockhold/seed.json")));
    }

    #[test]
    fn one_year_lifetime_is_accepted_and_usable() {
        let year = LIMIT_TTL_SECS.to_string();
        let cfg = config(&[(TTL_VAR, &year), (MAX_TTL_VAR, "0")]).unwrap();
        let policy = cfg.reservation_policy();
        assert_eq!(policy.default_ttl, Duration::days(365));
        assert!(policy.default_expiry(chrono::Utc::now()).is_ok());

        let over = (LIMIT_TTL_SECS + 1).to_string();
        assert!(config(&[(TTL_VAR, &over), (MAX_TTL_VAR, "0")]).is_err());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[(TTL_VAR, "soon")]),
            Err(ConfigError::Invalid { var: TTL_VAR, .. })
        ));
        assert!(matches!(
            config(&[(TTL_VAR, "0")]),
            Err(ConfigError::Invalid { var: TTL_VAR, .. })
        ));
        assert!(matches!(
            config(&[(TTL_VAR, "9223372036854775807"), (MAX_TTL_VAR, "0")]),
            Err(ConfigError::Invalid { var: TTL_VAR, .. })
        ));
        assert!(matches!(
            config(&[(MAX_TTL_VAR, "9223372036854775807")]),
            Err(ConfigError::Invalid { var: MAX_TTL_VAR, .. })
        ));
        assert!(matches!(
            config(&[(LOG_JSON_VAR, "maybe")]),
            Err(ConfigError::Invalid { var: LOG_JSON_VAR, .. })
        ));
        assert_eq!(
            config(&[(TTL_VAR, "7200"), (MAX_TTL_VAR, "3600")]),
            Err(ConfigError::TtlAboveMax {
                default_secs: 7200,
                max_secs: 3600
            })
        );
    }
}
