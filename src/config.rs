use serde::Deserialize;
use std::time::Duration;
use config::builder::DefaultState;
use config::{Config as ConfigLoader, ConfigBuilder, Environment, File};

use crate::error::{AppError, Result};
use crate::gate::GateOptions;

/// Settings for the demo binary.
///
/// Read from an optional `ticker-gate.toml` next to the binary, then from
/// `GATE_*` environment variables (a `.env` file is honoured).
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // General
    pub log_level: String,

    // Gate
    pub interval_ms: u64,
    pub burst_capacity: usize,

    // Workload
    pub request_count: usize,
    pub producer_delays_ms: Vec<u64>,
    pub fan_in_timeout_ms: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let loader = Self::defaults()?
            .add_source(File::with_name("ticker-gate").required(false))
            .add_source(
                Environment::with_prefix("GATE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("producer_delays_ms"),
            )
            .build()?;

        let config: Self = loader.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Builder pre-seeded with the values of the rate-limiting and select
    /// walkthroughs: 200ms ticks, bursts of 3, 5 requests, producers at 1s and 2s.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = ConfigLoader::builder()
            .set_default("log_level", "info")?
            .set_default("interval_ms", 200i64)?
            .set_default("burst_capacity", 3i64)?
            .set_default("request_count", 5i64)?
            .set_default("producer_delays_ms", vec![1000i64, 2000i64])?;

        Ok(builder)
    }

    pub fn validate(&self) -> Result<()> {
        self.uniform_gate()?;
        self.bursty_gate()?;

        if self.producer_delays_ms.is_empty() {
            return Err(AppError::InvalidConfiguration(
                "at least one producer delay is required".into(),
            ));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// One request per interval, no head start.
    pub fn uniform_gate(&self) -> Result<GateOptions> {
        let options = GateOptions::uniform(self.interval());
        options.validate()?;
        Ok(options)
    }

    /// Same interval, starting with a full burst buffer.
    pub fn bursty_gate(&self) -> Result<GateOptions> {
        let options = GateOptions::bursty(self.interval(), self.burst_capacity);
        options.validate()?;
        Ok(options)
    }

    pub fn producer_delays(&self) -> Vec<Duration> {
        self.producer_delays_ms
            .iter()
            .map(|&ms| Duration::from_millis(ms))
            .collect()
    }

    pub fn fan_in_timeout(&self) -> Option<Duration> {
        self.fan_in_timeout_ms.map(Duration::from_millis)
    }
}
