use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::analytics::stats::GateStats;

/// Background ticker that feeds permits into a shared semaphore.
///
/// The ticker is the only task that ever adds permits, so checking the
/// buffered count and then depositing cannot overshoot `capacity`.
pub(crate) struct PermitSource {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PermitSource {
    /// Spawn the ticker on the current Tokio runtime. The first deposit
    /// happens one full `interval` after start.
    pub fn start(
        interval: Duration,
        capacity: usize,
        permits: Arc<Semaphore>,
        stats: Arc<GateStats>,
    ) -> Self {
        let cancel = CancellationToken::new();

        let task_permits = permits.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            // A late tick pushes the schedule back instead of firing a catch-up burst
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!("Permit source started: interval {:?}, capacity {}", interval, capacity);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        deposit(&task_permits, capacity, &stats);
                    }
                }
            }

            task_permits.close();
            info!("Permit source stopped.");
        });

        Self {
            permits,
            cancel,
            handle,
        }
    }

    /// Stop ticking and close the semaphore so parked acquirers wake up.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.permits.close();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for PermitSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Deposit one permit unless the buffer is already full. Returns whether the
/// permit was kept.
pub(crate) fn deposit(permits: &Semaphore, capacity: usize, stats: &GateStats) -> bool {
    if permits.is_closed() {
        return false;
    }

    if permits.available_permits() < capacity {
        permits.add_permits(1);
        stats.inc_issued();
        trace!("Permit deposited ({} buffered)", permits.available_permits());
        true
    } else {
        stats.inc_dropped();
        trace!("Permit dropped, buffer full at {}", capacity);
        false
    }
}
