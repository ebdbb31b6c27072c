//! Timer-driven admission control.
//!
//! An [`AdmissionGate`] hands out one permit per interval. Unconsumed permits
//! accumulate up to the burst capacity; ticks that find the buffer full are
//! dropped, so an idle gate never builds up more than `burst_capacity` of
//! head room.

pub mod admission;
pub(crate) mod permit_source;

pub use admission::AdmissionGate;

use std::time::{Duration, Instant};

use crate::error::{AppError, Result};

/// Tokio's timer wheel has millisecond granularity. Anything finer is treated
/// as "no throttling at all".
pub const MIN_TIMER_RESOLUTION: Duration = Duration::from_millis(1);

/// Interval used by the rate-limiting walkthrough.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

/// Longest accepted interval. The ticker schedules deadlines as
/// `now + interval`, which must stay representable as an `Instant`.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOptions {
    /// Time between two permit deposits.
    pub interval: Duration,
    /// Maximum number of permits buffered while nobody is acquiring.
    pub burst_capacity: usize,
    /// Permits deposited up front, before the first tick.
    pub prefill: usize,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            burst_capacity: 1,
            prefill: 0,
        }
    }
}

impl GateOptions {
    /// Strict one-per-interval throttling.
    pub fn uniform(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Bursty throttling, starting with a full buffer.
    pub fn bursty(interval: Duration, burst_capacity: usize) -> Self {
        Self {
            interval,
            burst_capacity,
            prefill: burst_capacity,
        }
    }

    pub fn with_prefill(mut self, prefill: usize) -> Self {
        self.prefill = prefill;
        self
    }

    pub fn is_unthrottled(&self) -> bool {
        self.interval < MIN_TIMER_RESOLUTION
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(AppError::InvalidConfiguration(
                "interval must be greater than zero".into(),
            ));
        }

        if self.interval > MAX_INTERVAL || Instant::now().checked_add(self.interval).is_none() {
            return Err(AppError::InvalidConfiguration(format!(
                "interval {:?} exceeds the maximum of {:?}",
                self.interval, MAX_INTERVAL
            )));
        }

        if self.burst_capacity == 0 {
            return Err(AppError::InvalidConfiguration(
                "burst capacity must be at least 1".into(),
            ));
        }

        if self.prefill > self.burst_capacity {
            return Err(AppError::InvalidConfiguration(format!(
                "prefill {} exceeds burst capacity {}",
                self.prefill, self.burst_capacity
            )));
        }

        Ok(())
    }
}
