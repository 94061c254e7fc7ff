//! Durable message store for the notification dispatch engine.
//!
//! The store is the only shared mutable resource in the system: multiple
//! notifier workers in multiple process instances contend for the same
//! table, and mutual exclusion rests entirely on the store's atomic lease
//! acquisition, never on in-process locks.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use herald_common::error::Result;
use herald_common::types::{Message, NewMessage};

pub use memory::MemStore;
pub use postgres::PgStore;

/// Outcome of one delivery attempt, reported back through
/// [`Store::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Delivery succeeded.
    Sent,
    /// Dispatcher-declared retryable failure. The message returns to the
    /// lease pool while attempts remain, and is permanently failed once
    /// the configured maximum is reached.
    Retry { error: String },
    /// Permanent failure (validation error, unknown method, fatal send
    /// error). Never retried.
    Failed { error: String },
}

/// Result of a finalize call.
///
/// `Conflict` is benign: it means the caller's lease had already expired
/// and the message was reassigned (or finalized) by someone else. Callers
/// log it and move on; the winning lease's outcome stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeResult {
    Applied,
    Conflict,
}

/// Persistence contract for notification messages.
///
/// Implementations must guarantee that `lease_batch` never hands the same
/// message to two concurrent callers, across workers and across processes,
/// and that `finalize` only applies while the caller still holds the lease.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new message in `Pending` state and return its ID.
    ///
    /// Performs structural validation only (non-empty recipient); dispatcher
    /// validation is deferred to dispatch time so enqueue latency never
    /// depends on dispatcher logic.
    async fn insert(&self, msg: NewMessage) -> Result<Uuid>;

    /// Atomically claim up to `max` lease-eligible messages for `owner`.
    ///
    /// Eligible are `Pending` messages, `TempFailed` messages awaiting a
    /// retry, and `Leased` messages whose lease has expired; the latter is
    /// the sole recovery path for crashed workers. Returned oldest first.
    async fn lease_batch(&self, owner: &str, max: usize, lease: Duration) -> Result<Vec<Message>>;

    /// Record the outcome of a delivery attempt.
    ///
    /// Applies only while the message is still leased by `owner`; any other
    /// state yields [`FinalizeResult::Conflict`]. Every applied outcome
    /// increments the attempt counter.
    async fn finalize(
        &self,
        msg_id: Uuid,
        owner: &str,
        outcome: FinalizeOutcome,
    ) -> Result<FinalizeResult>;

    /// Fetch a message by ID.
    async fn get(&self, msg_id: Uuid) -> Result<Option<Message>>;
}
