//! Plover application settings
use std::time::Duration;

use crate::config_error;
use crate::error::Result;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_INITIAL_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_INITIAL_BACKOFF_MS: &str = "1000";
pub const STANDARD_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_BACKOFF_MULTIPLIER: &str = "2.0";
pub const STANDARD_MAX_ATTEMPTS: u32 = 6;
pub const DEFAULT_MAX_ATTEMPTS: &str = "6";
pub const STANDARD_MAX_IN_FLIGHT_SENDS: usize = 64;
pub const DEFAULT_MAX_IN_FLIGHT_SENDS: &str = "64";
pub const STANDARD_COMMAND_BUFFER: usize = 1024;
pub const DEFAULT_COMMAND_BUFFER: &str = "1024";
pub const STANDARD_STATS_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_STATS_INTERVAL_MS: &str = "10000";

/// Backoff policy for delivering one envelope to one neighbor
#[derive(Clone, Debug, PartialEq)]
pub struct RetrySettings {
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(STANDARD_INITIAL_BACKOFF_MS),
            backoff_multiplier: STANDARD_BACKOFF_MULTIPLIER,
            max_attempts: STANDARD_MAX_ATTEMPTS,
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(config_error!("max_attempts must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(config_error!(
                "backoff multiplier {} must be a finite number >= 1.0",
                self.backoff_multiplier
            ));
        }
        Ok(())
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.initial_backoff.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        if nanos >= u64::MAX as f64 {
            Duration::from_nanos(u64::MAX)
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Delivery retry policy for gossip fan-out
    pub retry: RetrySettings,

    // Upper bound on deliveries running at once on this node
    pub max_in_flight_sends: usize,

    // Inbound command channel capacity
    pub command_buffer: usize,

    // How often the dispatch loop logs node stats
    pub stats_interval: Duration,

    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            max_in_flight_sends: STANDARD_MAX_IN_FLIGHT_SENDS,
            command_buffer: STANDARD_COMMAND_BUFFER,
            stats_interval: Duration::from_millis(STANDARD_STATS_INTERVAL_MS),
            log_format: LogFormat::Text,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.max_in_flight_sends == 0 {
            return Err(config_error!("max_in_flight_sends must be at least 1"));
        }
        if self.command_buffer == 0 {
            return Err(config_error!("command_buffer must be at least 1"));
        }
        if self.stats_interval.is_zero() {
            return Err(config_error!("stats interval must be positive"));
        }
        Ok(())
    }
}
