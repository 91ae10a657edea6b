//! CLI for this application
//!
use std::time::Duration;

use crate::settings;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = APP_NAME, version = APP_VERSION)]
pub struct Cli {
    // Delay before the first retry of a failed delivery
    #[clap(
        long,
        default_value = settings::DEFAULT_INITIAL_BACKOFF_MS,
        env("PLOVER_INITIAL_BACKOFF_MS"),
        help = "Milliseconds to wait before retrying a failed delivery"
    )]
    pub initial_backoff_ms: u64,

    // Growth factor applied to the delay after every failure
    #[clap(
        long,
        default_value = settings::DEFAULT_BACKOFF_MULTIPLIER,
        env("PLOVER_BACKOFF_MULTIPLIER"),
        help = "Factor the retry delay grows by after each failure"
    )]
    pub backoff_multiplier: f64,

    // Attempt budget per (neighbor, value) delivery
    #[clap(
        long,
        default_value = settings::DEFAULT_MAX_ATTEMPTS,
        env("PLOVER_MAX_ATTEMPTS"),
        help = "Delivery attempts before a gossip send is dropped"
    )]
    pub max_attempts: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_MAX_IN_FLIGHT_SENDS,
        env("PLOVER_MAX_IN_FLIGHT_SENDS"),
        help = "Maximum concurrent gossip deliveries per node"
    )]
    pub max_in_flight_sends: usize,

    #[clap(
        long,
        default_value = settings::DEFAULT_COMMAND_BUFFER,
        env("PLOVER_COMMAND_BUFFER"),
        help = "Capacity of the inbound message queue"
    )]
    pub command_buffer: usize,

    #[clap(
        long,
        default_value = settings::DEFAULT_STATS_INTERVAL_MS,
        env("PLOVER_STATS_INTERVAL_MS"),
        help = "Milliseconds between node stats log lines"
    )]
    pub stats_interval_ms: u64,

    #[clap(
        long,
        default_value = "text",
        env("PLOVER_LOG_FORMAT"),
        help = "log-format: 'text' or 'json' (logs are written to stderr)"
    )]
    pub log_format: settings::LogFormat,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            retry: settings::RetrySettings {
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                backoff_multiplier: self.backoff_multiplier,
                max_attempts: self.max_attempts,
            },
            max_in_flight_sends: self.max_in_flight_sends,
            command_buffer: self.command_buffer,
            stats_interval: Duration::from_millis(self.stats_interval_ms),
            log_format: self.log_format,
        }
    }
}
