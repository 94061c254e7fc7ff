use thiserror::Error;

/// Common error types used across the notification engine.
///
/// Only `Manager::enqueue`, `Manager::start_notifiers` and `Manager::stop`
/// surface these to external callers; dispatch failures are translated into
/// message-state transitions by the notifier and never escape it.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Recipient must not be empty")]
    InvalidRecipient,

    #[error("No dispatcher registered for method {0:?}")]
    UnknownMethod(String),

    #[error("A dispatcher for method {0:?} is already registered")]
    DuplicateMethod(String),

    #[error("Notifiers already started")]
    AlreadyStarted,

    #[error("Timed out waiting for notifiers to drain")]
    ShutdownTimeout,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the engine crates.
pub type Result<T, E = HeraldError> = std::result::Result<T, E>;
