//! Pluggable delivery dispatchers.
//!
//! A dispatcher implements delivery for exactly one notification method.
//! Dispatchers declare their own retry semantics: the engine never infers
//! whether a failure is worth retrying.

pub mod registry;
pub mod smtp;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use herald_common::types::{Labels, NotificationMethod};

pub use registry::DispatcherRegistry;
pub use smtp::{SmtpConfig, SmtpDispatcher};
pub use webhook::{WEBHOOK_PAYLOAD_VERSION, WebhookConfig, WebhookDispatcher, WebhookPayload};

/// A failed delivery attempt, as classified by the dispatcher itself.
#[derive(Debug, Error)]
pub enum SendError {
    /// The send may succeed if attempted again (network failure, remote 5xx).
    #[error("retryable send failure: {0}")]
    Retryable(String),

    /// Retrying cannot help (malformed configuration, unparseable address).
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl SendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Retryable(_))
    }
}

/// Delivery capability for one notification method.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// The method this dispatcher serves.
    fn method(&self) -> NotificationMethod;

    /// Check that `input` carries every label this dispatcher requires.
    ///
    /// Pure, no I/O. `Err` carries the missing keys; the notifier records
    /// them and permanently fails the message.
    fn validate(&self, input: &Labels) -> Result<(), Vec<String>>;

    /// Perform the delivery. May block on network I/O; callers bound the
    /// call with a timeout derived from the lease duration, and dropping
    /// the future cancels the attempt.
    async fn send(&self, msg_id: Uuid, input: &Labels) -> Result<(), SendError>;
}
