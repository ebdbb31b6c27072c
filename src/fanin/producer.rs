use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{AppError, Result};

/// A spawned task that reports exactly one value on its own channel.
///
/// Awaiting the producer yields that value. If the task panics or is aborted
/// before sending, the producer resolves to [`AppError::TaskFailed`] instead
/// of pending forever. Dropping the producer aborts the task.
pub struct Producer<T> {
    rx: oneshot::Receiver<T>,
    handle: JoinHandle<()>,
}

impl<T: Send + 'static> Producer<T> {
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let value = fut.await;
            if tx.send(value).is_err() {
                trace!("Producer result discarded, receiver gone");
            }
        });

        Self { rx, handle }
    }

    /// Producer that sleeps for `delay` and then reports `value`, standing in
    /// for a blocking call of known latency.
    pub fn after(delay: Duration, value: T) -> Self {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            value
        })
    }
}

impl<T> Producer<T> {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for Producer<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| AppError::TaskFailed("producer exited without a result".into())))
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_producer_reports_value() {
        let producer = Producer::after(Duration::from_millis(10), "one");
        assert!(!producer.is_finished());
        assert_eq!(producer.await.unwrap(), "one");
    }

    #[tokio::test]
    async fn test_aborted_producer_fails_instead_of_hanging() {
        let producer = Producer::after(Duration::from_secs(10), 1u32);
        producer.abort();

        let result = tokio::time::timeout(Duration::from_secs(1), producer).await.unwrap();
        assert!(matches!(result, Err(AppError::TaskFailed(_))));
    }

    #[tokio::test]
    async fn test_panicking_producer_fails() {
        let producer: Producer<u32> = Producer::spawn(async { panic!("boom") });

        let result = producer.await;
        assert!(matches!(result, Err(AppError::TaskFailed(_))));
    }
}
