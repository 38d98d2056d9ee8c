// Central Error Type for the Application

use crate::domain::Operation;
use crate::port::StepError;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Interrupted: shutdown requested")]
    Interrupted,

    #[error("Queue {queue} has no handler registered for {operation}")]
    UnregisteredOperation { queue: String, operation: Operation },

    #[error("Queue closed: {0}")]
    QueueClosed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
