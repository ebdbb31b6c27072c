use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::gate::AdmissionGate;
use crate::processor::queue::{WorkItem, WorkQueue};

#[async_trait]
pub trait WorkHandler<T: Send + 'static>: Send + Sync {
    /// Process one admitted item.
    async fn handle(&self, item: WorkItem<T>) -> Result<()>;
}

/// Adapter so a plain async closure can serve as a [`WorkHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<T, F, Fut> WorkHandler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: Fn(WorkItem<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, item: WorkItem<T>) -> Result<()> {
        (self.0)(item).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: usize,
    pub failed: usize,
}

/// Drains a [`WorkQueue`] in order, taking one gate permit per item.
pub struct ThrottledWorker<T, H> {
    gate: AdmissionGate,
    handler: H,
    _marker: PhantomData<fn(T)>,
}

impl<T, H> ThrottledWorker<T, H>
where
    T: Send + 'static,
    H: WorkHandler<T>,
{
    pub fn new(gate: AdmissionGate, handler: H) -> Self {
        Self {
            gate,
            handler,
            _marker: PhantomData,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Process every item until the queue is closed and empty.
    ///
    /// Handler errors are logged and counted; they do not stop the loop. The
    /// run ends early with [`AppError::Cancelled`] when `cancel` fires or the
    /// gate is stopped. An item pulled but not yet admitted goes back to the
    /// front of the queue, and a later run picks up from there. A queue that
    /// was already drained yields an empty report.
    pub async fn run(&self, queue: &WorkQueue<T>, cancel: &CancellationToken) -> Result<WorkerReport> {
        let mut report = WorkerReport::default();

        let Some(mut rx) = queue.take_receiver() else {
            debug!("Work queue already drained, nothing to do");
            return Ok(report);
        };

        info!("Worker started. Waiting for work items...");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = rx.recv() => Some(next),
            };

            let Some(next) = next else {
                warn!("Worker cancelled after {} items", report.processed + report.failed);
                queue.restore_receiver(rx);
                return Err(AppError::Cancelled);
            };

            let Some(item) = next else { break };

            if let Err(e) = self.gate.acquire_with_cancel(cancel).await {
                warn!("Work item {} not admitted: {}", item.id(), e);
                rx.push_front(item);
                queue.restore_receiver(rx);
                return Err(e);
            }

            let id = item.id();
            match self.handler.handle(item).await {
                Ok(()) => {
                    report.processed += 1;
                    debug!("Work item {} processed", id);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Error processing work item {}: {}", id, e);
                }
            }
        }

        info!("Worker stopped. {} processed, {} failed.", report.processed, report.failed);
        Ok(report)
    }
}
