use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analytics::stats::{GateStats, GateStatsSnapshot};
use crate::error::{AppError, Result};
use crate::gate::permit_source::PermitSource;
use crate::gate::GateOptions;
use crate::utils::time::{elapsed_ms, now_instant};

struct GateInner {
    options: GateOptions,
    permits: Arc<Semaphore>,
    // None when the interval is below timer resolution
    source: Option<PermitSource>,
    stats: Arc<GateStats>,
}

/// Admits at most one operation per interval, with optional bursting.
///
/// Cloning is cheap and every clone draws from the same permit buffer. The
/// ticker stops when [`AdmissionGate::stop`] is called or the last clone is
/// dropped.
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("options", &self.inner.options)
            .field("available", &self.available())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl AdmissionGate {
    /// Build a gate and start its ticker. Must be called from inside a Tokio
    /// runtime unless the interval is below timer resolution.
    pub fn new(options: GateOptions) -> Result<Self> {
        options.validate()?;

        let stats = Arc::new(GateStats::new());
        let permits = Arc::new(Semaphore::new(0));

        if options.is_unthrottled() {
            debug!("Gate interval {:?} is below timer resolution, running unthrottled", options.interval);
            return Ok(Self {
                inner: Arc::new(GateInner {
                    options,
                    permits,
                    source: None,
                    stats,
                }),
            });
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(AppError::Init("admission gate requires a Tokio runtime".into()));
        }

        if options.prefill > 0 {
            permits.add_permits(options.prefill);
            for _ in 0..options.prefill {
                stats.inc_issued();
            }
        }

        let source = PermitSource::start(
            options.interval,
            options.burst_capacity,
            permits.clone(),
            stats.clone(),
        );

        Ok(Self {
            inner: Arc::new(GateInner {
                options,
                permits,
                source: Some(source),
                stats,
            }),
        })
    }

    pub fn options(&self) -> &GateOptions {
        &self.inner.options
    }

    /// Wait for a permit and consume it.
    ///
    /// Waiters are served in arrival order. Returns [`AppError::Cancelled`]
    /// once the gate has been stopped.
    pub async fn acquire(&self) -> Result<()> {
        if self.inner.source.is_none() {
            return if self.inner.permits.is_closed() {
                self.inner.stats.inc_cancellations();
                Err(AppError::Cancelled)
            } else {
                self.inner.stats.inc_acquired();
                Ok(())
            };
        }

        let started = now_instant();
        match self.inner.permits.acquire().await {
            Ok(permit) => {
                // Permits are consumed, never handed back
                permit.forget();
                self.inner.stats.inc_acquired();
                self.inner.stats.update_wait(elapsed_ms(started));
                Ok(())
            }
            Err(_) => {
                self.inner.stats.inc_cancellations();
                debug!("Acquire released by gate shutdown");
                Err(AppError::Cancelled)
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `deadline`.
    pub async fn acquire_timeout(&self, deadline: Duration) -> Result<()> {
        match tokio::time::timeout(deadline, self.acquire()).await {
            Ok(result) => result,
            Err(_) => {
                self.inner.stats.inc_timeouts();
                warn!("No permit within {:?}", deadline);
                Err(AppError::Timeout(deadline))
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but returns [`AppError::Cancelled`]
    /// as soon as `cancel` fires. A cancelled wait does not consume a permit.
    pub async fn acquire_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.inner.stats.inc_cancellations();
                debug!("Acquire cancelled by caller");
                Err(AppError::Cancelled)
            }
            result = self.acquire() => result,
        }
    }

    /// Take a permit only if one is buffered right now.
    pub fn try_acquire(&self) -> bool {
        if self.inner.source.is_none() {
            let open = !self.inner.permits.is_closed();
            if open {
                self.inner.stats.inc_acquired();
            }
            return open;
        }

        match self.inner.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.inner.stats.inc_acquired();
                true
            }
            Err(_) => false,
        }
    }

    /// Number of buffered permits at this instant. Never above the burst
    /// capacity.
    pub fn available(&self) -> usize {
        if self.inner.permits.is_closed() {
            return 0;
        }

        match self.inner.source {
            Some(_) => self.inner.permits.available_permits(),
            None => self.inner.options.burst_capacity,
        }
    }

    /// Stop the ticker. Pending and future acquires return
    /// [`AppError::Cancelled`]. Calling it again has no effect.
    pub fn stop(&self) {
        match &self.inner.source {
            Some(source) => source.stop(),
            None => self.inner.permits.close(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        match &self.inner.source {
            Some(source) => !source.is_running(),
            None => self.inner.permits.is_closed(),
        }
    }

    pub fn stats(&self) -> GateStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn log_stats(&self) {
        self.inner.stats.log_stats();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const TICK: Duration = Duration::from_millis(50);
    // Slack for scheduler wake-up jitter
    const JITTER: Duration = Duration::from_millis(10);

    async fn completion_times(gate: &AdmissionGate, n: usize) -> Vec<Instant> {
        let mut times = Vec::with_capacity(n);
        for _ in 0..n {
            gate.acquire().await.unwrap();
            times.push(Instant::now());
        }
        times
    }

    #[tokio::test]
    async fn test_uniform_gate_spaces_acquires() {
        let gate = AdmissionGate::new(GateOptions::uniform(TICK)).unwrap();
        let start = Instant::now();

        let times = completion_times(&gate, 5).await;

        // No prefill: even the first permit waits one interval
        assert!(times[0] - start >= TICK - JITTER);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= TICK - JITTER, "gap {:?}", pair[1] - pair[0]);
        }
        assert_eq!(gate.stats().permits_acquired, 5);
    }

    #[tokio::test]
    async fn test_bursty_gate_admits_burst_then_throttles() {
        let gate = AdmissionGate::new(GateOptions::bursty(TICK, 3)).unwrap();
        let start = Instant::now();

        let times = completion_times(&gate, 5).await;

        // The burst drains immediately
        assert!(times[2] - start < TICK / 2);
        // Then back to one per interval
        assert!(times[3] - times[2] >= TICK - JITTER);
        assert!(times[4] - times[3] >= TICK - JITTER);
    }

    #[tokio::test]
    async fn test_idle_gate_never_exceeds_capacity() {
        let gate = AdmissionGate::new(GateOptions::bursty(Duration::from_millis(20), 2).with_prefill(0)).unwrap();

        tokio::time::sleep(Duration::from_millis(20 * 3 + 40)).await;

        assert_eq!(gate.available(), 2);
        let stats = gate.stats();
        assert_eq!(stats.permits_issued, 2);
        assert!(stats.permits_dropped >= 1);

        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[tokio::test]
    async fn test_stop_releases_pending_acquire() {
        let gate = AdmissionGate::new(GateOptions::uniform(Duration::from_secs(10))).unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.stop();
        gate.stop();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(matches!(gate.acquire().await, Err(AppError::Cancelled)));
        assert!(gate.is_stopped());
        assert_eq!(gate.available(), 0);
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let gate = AdmissionGate::new(GateOptions::uniform(Duration::from_secs(10))).unwrap();

        let result = gate.acquire_timeout(Duration::from_millis(50)).await;

        assert!(matches!(result, Err(AppError::Timeout(d)) if d == Duration::from_millis(50)));
        assert_eq!(gate.stats().acquire_timeouts, 1);
    }

    #[tokio::test]
    async fn test_acquire_timeout_succeeds_with_buffered_permit() {
        let gate = AdmissionGate::new(GateOptions::bursty(Duration::from_secs(10), 1)).unwrap();

        assert!(gate.acquire_timeout(Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_with_cancel() {
        let gate = AdmissionGate::new(GateOptions::uniform(Duration::from_secs(10))).unwrap();
        let token = CancellationToken::new();

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let result = gate.acquire_with_cancel(&token).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(gate.stats().acquire_cancellations, 1);
        // The gate itself keeps running
        assert!(!gate.is_stopped());
    }

    #[tokio::test]
    async fn test_clones_share_permits() {
        let gate = AdmissionGate::new(GateOptions::bursty(Duration::from_secs(10), 2)).unwrap();
        let other = gate.clone();

        assert!(gate.try_acquire());
        assert!(other.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[tokio::test]
    async fn test_unthrottled_gate_never_waits() {
        let gate = AdmissionGate::new(GateOptions::uniform(Duration::from_micros(100))).unwrap();
        let start = Instant::now();

        for _ in 0..100 {
            gate.acquire().await.unwrap();
        }

        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(gate.available(), 1);

        gate.stop();
        assert!(matches!(gate.acquire().await, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_stats_follow_gate_activity() {
        let gate = AdmissionGate::new(GateOptions::bursty(Duration::from_secs(10), 2)).unwrap();
        assert_eq!(gate.stats().permits_issued, 2);

        assert!(gate.try_acquire());
        gate.acquire().await.unwrap();
        assert!(!gate.try_acquire());

        let timed_out = gate.acquire_timeout(Duration::from_millis(20)).await;
        assert!(matches!(timed_out, Err(AppError::Timeout(_))));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let cancelled = gate.acquire_with_cancel(&cancel).await;
        assert!(matches!(cancelled, Err(AppError::Cancelled)));

        let stats = gate.stats();
        assert_eq!(stats.permits_issued, 2);
        assert_eq!(stats.permits_dropped, 0);
        assert_eq!(stats.permits_acquired, 2);
        assert_eq!(stats.acquire_timeouts, 1);
        assert_eq!(stats.acquire_cancellations, 1);
    }

    #[tokio::test]
    async fn test_dropping_last_clone_stops_ticker() {
        let gate = AdmissionGate::new(GateOptions::uniform(Duration::from_millis(5))).unwrap();
        let other = gate.clone();
        let permits = Arc::downgrade(&gate.inner.permits);

        drop(gate);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // A surviving clone keeps the ticker alive and depositing
        assert!(!other.is_stopped());
        assert!(other.available() >= 1);

        drop(other);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The ticker task held the last strong reference to the buffer
        assert!(permits.upgrade().is_none());
    }

    #[test]
    fn test_rejects_invalid_options() {
        let result = AdmissionGate::new(GateOptions::uniform(Duration::ZERO));
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));

        let result = AdmissionGate::new(GateOptions::uniform(Duration::from_secs(u64::MAX)));
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_requires_runtime() {
        let result = AdmissionGate::new(GateOptions::uniform(TICK));
        assert!(matches!(result, Err(AppError::Init(_))));
    }
}
