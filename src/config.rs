//! Reduction configuration.
//!
//! The default configuration blocks on every receive without a deadline.
//! Hardened deployments bound each receive and choose what happens when the
//! deadline passes.
//!
//! # Environment Variables
//!
//! | Variable | Example | Meaning |
//! |----------|---------|---------|
//! | `TREEDUCE_RECV_TIMEOUT_SECS` | `600` | Deadline for each round's receive |
//! | `TREEDUCE_ON_TIMEOUT` | `abort` / `no-data` | Policy when the deadline passes |

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the receive deadline in seconds.
pub const RECV_TIMEOUT_ENV: &str = "TREEDUCE_RECV_TIMEOUT_SECS";
/// Environment variable holding the timeout policy.
pub const ON_TIMEOUT_ENV: &str = "TREEDUCE_ON_TIMEOUT";

/// What a receiver does when its partner misses the deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Fail the rank and tear down the whole group
    #[default]
    Abort,
    /// Log, treat the missing message as "no data", and carry on
    TreatAsNoData,
}

impl FromStr for TimeoutPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(TimeoutPolicy::Abort),
            "no-data" | "no_data" | "nodata" => Ok(TimeoutPolicy::TreatAsNoData),
            other => Err(Error::Config(format!(
                "unknown timeout policy '{other}' (expected 'abort' or 'no-data')"
            ))),
        }
    }
}

impl fmt::Display for TimeoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPolicy::Abort => f.write_str("abort"),
            TimeoutPolicy::TreatAsNoData => f.write_str("no-data"),
        }
    }
}

/// Settings for one tree reduction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceConfig {
    /// Deadline for each blocking receive; `None` waits forever
    pub recv_timeout: Option<Duration>,
    /// Applied when `recv_timeout` elapses
    pub on_timeout: TimeoutPolicy,
}

impl ReduceConfig {
    /// Configuration with a receive deadline.
    pub fn with_timeout(timeout: Duration, on_timeout: TimeoutPolicy) -> Self {
        ReduceConfig {
            recv_timeout: Some(timeout),
            on_timeout,
        }
    }

    /// Defaults overridden by `TREEDUCE_*` environment variables, if set.
    pub fn from_env() -> Result<Self> {
        let mut config = ReduceConfig::default();
        if let Ok(raw) = env::var(RECV_TIMEOUT_ENV) {
            config.recv_timeout = Some(parse_timeout_secs(&raw)?);
        }
        if let Ok(raw) = env::var(ON_TIMEOUT_ENV) {
            config.on_timeout = raw.parse()?;
        }
        Ok(config)
    }
}

/// Parse a positive number of seconds (fractions allowed).
pub fn parse_timeout_secs(raw: &str) -> Result<Duration> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("receive timeout '{raw}' is not a number")))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::Config(format!(
            "receive timeout must be positive, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("receive timeout {secs}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blocks_forever() {
        let c = ReduceConfig::default();
        assert_eq!(c.recv_timeout, None);
        assert_eq!(c.on_timeout, TimeoutPolicy::Abort);
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("abort".parse::<TimeoutPolicy>().unwrap(), TimeoutPolicy::Abort);
        assert_eq!(
            "No-Data".parse::<TimeoutPolicy>().unwrap(),
            TimeoutPolicy::TreatAsNoData
        );
        assert!("retry".parse::<TimeoutPolicy>().is_err());
        assert_eq!(TimeoutPolicy::TreatAsNoData.to_string(), "no-data");
    }

    #[test]
    fn timeout_parsing() {
        assert_eq!(parse_timeout_secs("2.5").unwrap(), Duration::from_millis(2500));
        assert!(parse_timeout_secs("0").is_err());
        assert!(parse_timeout_secs("-1").is_err());
        assert!(parse_timeout_secs("soon").is_err());
        assert!(parse_timeout_secs("inf").is_err());
    }

    /// All environment mutations live in one test so parallel tests never race on them.
    #[test]
    fn environment_overrides() {
        env::remove_var(RECV_TIMEOUT_ENV);
        env::remove_var(ON_TIMEOUT_ENV);
        assert_eq!(ReduceConfig::from_env().unwrap(), ReduceConfig::default());

        env::set_var(RECV_TIMEOUT_ENV, "30");
        env::set_var(ON_TIMEOUT_ENV, "no-data");
        let c = ReduceConfig::from_env().unwrap();
        assert_eq!(c.recv_timeout, Some(Duration::from_secs(30)));
        assert_eq!(c.on_timeout, TimeoutPolicy::TreatAsNoData);

        env::set_var(ON_TIMEOUT_ENV, "explode");
        assert!(ReduceConfig::from_env().is_err());

        env::remove_var(RECV_TIMEOUT_ENV);
        env::remove_var(ON_TIMEOUT_ENV);
    }
}
