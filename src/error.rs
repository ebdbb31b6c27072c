use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Work queue is closed")]
    QueueClosed,

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Initialization error: {0}")]
    Init(String),
}

impl AppError {
    /// True for the errors that end a wait rather than report a fault.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, AppError::Timeout(_) | AppError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupts_are_distinguished_from_faults() {
        assert!(AppError::Timeout(Duration::from_millis(5)).is_interrupt());
        assert!(AppError::Cancelled.is_interrupt());
        assert!(!AppError::QueueClosed.is_interrupt());
        assert!(!AppError::InvalidConfiguration("interval".into()).is_interrupt());
    }

    #[test]
    fn test_timeout_message_names_deadline() {
        let msg = AppError::Timeout(Duration::from_millis(250)).to_string();
        assert_eq!(msg, "Operation timed out after 250ms");
    }
}
