use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// One unit of work, numbered in arrival order starting at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<T> {
    id: u64,
    payload: T,
}

impl<T> WorkItem<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// Consumer side of a [`WorkQueue`].
///
/// An item that was pulled but could not be processed goes back to the
/// front with [`push_front`](Self::push_front) and is the next one returned.
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<WorkItem<T>>,
    held: VecDeque<WorkItem<T>>,
}

impl<T> QueueReceiver<T> {
    /// Next item in order, or `None` once the queue is closed and empty.
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<WorkItem<T>> {
        if let Some(item) = self.held.pop_front() {
            return Some(item);
        }
        self.rx.recv().await
    }

    pub fn push_front(&mut self, item: WorkItem<T>) {
        self.held.push_front(item);
    }
}

/// Ordered, finite queue of work items with a single consumer.
///
/// Producers call [`enqueue`](Self::enqueue) until [`close`](Self::close);
/// the consumer side is handed out to one holder at a time through
/// [`take_receiver`](Self::take_receiver). A consumer that stops early gives
/// it back with [`restore_receiver`](Self::restore_receiver) so the rest of
/// the queue stays available.
pub struct WorkQueue<T> {
    // Dropped on close so the consumer sees the end of the queue
    tx: Mutex<Option<mpsc::UnboundedSender<WorkItem<T>>>>,
    rx: Mutex<Option<QueueReceiver<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(QueueReceiver {
                rx,
                held: VecDeque::new(),
            })),
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue holding `payloads` in order, already closed.
    pub fn closed_from<I>(payloads: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let queue = Self::new();
        {
            let guard = queue.tx.lock();
            if let Some(tx) = guard.as_ref() {
                for payload in payloads {
                    let id = queue.next_id.fetch_add(1, Ordering::Relaxed);
                    // The receiver is still owned by the queue, so this cannot fail
                    let _ = tx.send(WorkItem { id, payload });
                }
            }
        }
        queue.close();
        queue
    }

    /// Append a payload and return its id.
    pub fn enqueue(&self, payload: T) -> Result<u64> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(AppError::QueueClosed)?;

        // Id assignment and send happen under the same lock so ids follow channel order
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tx.send(WorkItem { id, payload })
            .map_err(|_| AppError::QueueClosed)?;

        Ok(id)
    }

    /// Mark the end of the queue. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let closed = self.tx.lock().take().is_some();
        if closed {
            debug!("Work queue closed after {} items", self.enqueued());
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Number of items ever enqueued.
    pub fn enqueued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }

    /// Hand out the consumer side. Returns `None` while another consumer
    /// holds it, and for good once a consumer has drained the queue.
    pub fn take_receiver(&self) -> Option<QueueReceiver<T>> {
        self.rx.lock().take()
    }

    /// Return an unfinished consumer side so a later drain resumes where
    /// this one stopped.
    pub fn restore_receiver(&self, rx: QueueReceiver<T>) {
        let mut slot = self.rx.lock();
        if slot.is_some() {
            warn!("Work queue already has a receiver, discarding the restored one");
            return;
        }
        *slot = Some(rx);
    }
}
