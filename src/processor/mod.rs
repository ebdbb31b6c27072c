pub mod queue;
pub mod worker;

pub use queue::{QueueReceiver, WorkItem, WorkQueue};
pub use worker::{FnHandler, ThrottledWorker, WorkHandler, WorkerReport};
