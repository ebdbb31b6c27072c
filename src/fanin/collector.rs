use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::fanin::producer::Producer;

/// Collects one result from each of a fixed set of tasks, yielding them in
/// the order they complete.
///
/// All tasks are polled concurrently, so draining the stream takes as long as
/// the slowest task, not the sum of all of them. Results that become ready at
/// the same time come out in whatever order the underlying set reports them.
pub struct FanIn<F: Future> {
    pending: FuturesUnordered<F>,
    total: usize,
    yielded: usize,
}

/// Fan in over `tasks`. Nothing runs until the returned stream is polled.
pub fn wait_all<I>(tasks: I) -> FanIn<I::Item>
where
    I: IntoIterator,
    I::Item: Future,
{
    let pending: FuturesUnordered<_> = tasks.into_iter().collect();
    let total = pending.len();

    FanIn {
        pending,
        total,
        yielded: 0,
    }
}

/// Spawn every future as a [`Producer`] and fan in over the results. The
/// tasks start running immediately, whether or not the stream is polled.
pub fn spawn_all<I, F, T>(tasks: I) -> FanIn<Producer<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    wait_all(tasks.into_iter().map(Producer::spawn))
}

impl<F: Future> FanIn<F> {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.total - self.yielded
    }

    pub fn is_done(&self) -> bool {
        self.yielded == self.total
    }

    /// Next result, or [`AppError::Cancelled`] if `cancel` fires first.
    /// Tasks still outstanding keep their place in the set.
    pub async fn next_with_cancel(&mut self, cancel: &CancellationToken) -> Result<Option<F::Output>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Fan-in wait cancelled with {} of {} outstanding", self.remaining(), self.total);
                Err(AppError::Cancelled)
            }
            next = self.next() => Ok(next),
        }
    }

    /// Drain every result, or stop with [`AppError::Cancelled`].
    pub async fn collect_with_cancel(mut self, cancel: &CancellationToken) -> Result<Vec<F::Output>> {
        let mut results = Vec::with_capacity(self.remaining());
        while let Some(result) = self.next_with_cancel(cancel).await? {
            results.push(result);
        }
        Ok(results)
    }

    /// Drain every result, or stop with [`AppError::Timeout`] once `deadline`
    /// has passed.
    pub async fn collect_timeout(mut self, deadline: Duration) -> Result<Vec<F::Output>> {
        let mut results = Vec::with_capacity(self.remaining());
        let drain = async {
            while let Some(result) = self.next().await {
                results.push(result);
            }
        };

        let outcome = tokio::time::timeout(deadline, drain).await;
        match outcome {
            Ok(()) => Ok(results),
            Err(_) => {
                warn!(
                    "Fan-in timed out after {:?} with {} of {} results",
                    deadline,
                    results.len(),
                    self.total
                );
                Err(AppError::Timeout(deadline))
            }
        }
    }
}

impl<F: Future> Stream for FanIn<F> {
    type Item = F::Output;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.pending.poll_next_unpin(cx) {
            Poll::Ready(Some(output)) => {
                this.yielded += 1;
                Poll::Ready(Some(output))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}
