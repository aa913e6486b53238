//! Process-wide configuration for hosts embedding the placement engine
//! and the TS cache.

use serde::{Deserialize, Serialize};

/// Logging configuration, consumed by [`init_tracing`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string, e.g. `"info"`
    /// or `"objectio_placement=debug,objectio_tscache=warn"`.
    pub filter: String,
    /// Emit newline-delimited JSON instead of the compact human format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Root configuration for a process embedding the placement engine and
/// the TS cache.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// This process's own rank, used to disable leader filtering during
    /// rebuild scans (`None` means "no local rank", matching the
    /// `self_rank == -1` convention used to turn the filter off).
    pub self_rank: Option<u32>,
    pub logging: LoggingConfig,
}

/// Install a global `tracing` subscriber built from `config`.
///
/// Safe to call more than once; later calls are no-ops once a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(err) = result {
        tracing::debug!(%err, "tracing subscriber already installed");
    }
}
