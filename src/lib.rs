pub mod config;
pub mod error;
pub mod gate;
pub mod fanin;
pub mod processor;
pub mod analytics;
pub mod utils;

pub use error::{AppError, Result};
pub use tokio_util::sync::CancellationToken;
