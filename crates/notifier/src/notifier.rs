//! Notifier worker: leases a batch, resolves each message's dispatcher,
//! validates, sends, and records the outcome.
//!
//! Safety across workers and processes rests entirely on the store's
//! atomic lease acquisition; workers hold no shared locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use herald_common::error::Result;
use herald_common::types::Message;
use herald_dispatch::DispatcherRegistry;
use herald_store::{FinalizeOutcome, FinalizeResult, Store};

use crate::wake::WakeListener;

/// Minimum slack between the send timeout and lease expiry, so an attempt
/// is abandoned before a reclaiming worker can race its finalize.
const LEASE_GRACE: Duration = Duration::from_secs(2);

pub(crate) struct Notifier {
    /// Lease owner token, unique per worker per manager instance.
    pub owner: String,
    pub store: Arc<dyn Store>,
    pub registry: Arc<DispatcherRegistry>,
    pub batch_size: usize,
    pub lease_duration: Duration,
    pub fetch_interval: Duration,
}

impl Notifier {
    /// Worker loop: drain the backlog, then sleep until a wake signal or
    /// the fallback poll interval. Exits on cancellation without acquiring
    /// new leases.
    pub(crate) async fn run(self, mut listener: WakeListener, cancel: CancellationToken) {
        tracing::debug!(owner = %self.owner, "Notifier started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.process_batch().await {
                // Keep draining while the store hands us work.
                Ok(n) if n > 0 => continue,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(owner = %self.owner, error = %e, "Failed to process batch");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = listener.wait(self.fetch_interval) => {}
            }
        }

        tracing::debug!(owner = %self.owner, "Notifier stopped");
    }

    /// Lease one batch and dispatch its messages concurrently.
    async fn process_batch(&self) -> Result<usize> {
        let batch = self
            .store
            .lease_batch(&self.owner, self.batch_size, self.lease_duration)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        tracing::debug!(owner = %self.owner, count, "Leased batch");

        let mut tasks = JoinSet::new();
        for msg in batch {
            let store = self.store.clone();
            let registry = self.registry.clone();
            let owner = self.owner.clone();
            let send_timeout = self.send_timeout();
            tasks.spawn(async move {
                deliver(store, registry, owner, msg, send_timeout).await;
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(owner = %self.owner, error = %e, "Dispatch task panicked");
            }
        }

        Ok(count)
    }

    /// Send deadline: lease duration minus a grace period, never below
    /// a workable floor.
    fn send_timeout(&self) -> Duration {
        self.lease_duration
            .checked_sub(LEASE_GRACE)
            .unwrap_or(self.lease_duration / 2)
            .max(Duration::from_millis(100))
    }
}

/// Dispatch one leased message and finalize its outcome.
async fn deliver(
    store: Arc<dyn Store>,
    registry: Arc<DispatcherRegistry>,
    owner: String,
    msg: Message,
    send_timeout: Duration,
) {
    let msg_id = msg.id;
    let outcome = attempt(&registry, &msg, send_timeout).await;

    match &outcome {
        FinalizeOutcome::Sent => {
            tracing::info!(msg_id = %msg_id, method = %msg.method, "Message delivered");
        }
        FinalizeOutcome::Retry { error } => {
            tracing::warn!(
                msg_id = %msg_id,
                method = %msg.method,
                attempt = msg.attempt_count + 1,
                error = %error,
                "Delivery failed, will retry"
            );
        }
        FinalizeOutcome::Failed { error } => {
            tracing::warn!(
                msg_id = %msg_id,
                method = %msg.method,
                error = %error,
                "Delivery failed permanently"
            );
        }
    }

    match store.finalize(msg_id, &owner, outcome).await {
        Ok(FinalizeResult::Applied) => {}
        Ok(FinalizeResult::Conflict) => {
            // Our lease expired and someone else took over; their outcome
            // stands.
            tracing::debug!(msg_id = %msg_id, owner = %owner, "Lease lost before finalize");
        }
        Err(e) => {
            tracing::error!(msg_id = %msg_id, error = %e, "Failed to finalize message");
        }
    }
}

/// Run one delivery attempt through the state machine:
/// resolve → validate → bounded send.
async fn attempt(
    registry: &DispatcherRegistry,
    msg: &Message,
    send_timeout: Duration,
) -> FinalizeOutcome {
    let dispatcher = match registry.resolve(msg.method) {
        Ok(d) => d,
        Err(e) => {
            return FinalizeOutcome::Failed {
                error: e.to_string(),
            };
        }
    };

    let input = msg.dispatch_input();
    if let Err(missing) = dispatcher.validate(&input) {
        return FinalizeOutcome::Failed {
            error: format!("missing labels: {}", missing.join(", ")),
        };
    }

    match tokio::time::timeout(send_timeout, dispatcher.send(msg.id, &input)).await {
        Ok(Ok(())) => FinalizeOutcome::Sent,
        Ok(Err(e)) if e.is_retryable() => FinalizeOutcome::Retry {
            error: e.to_string(),
        },
        Ok(Err(e)) => FinalizeOutcome::Failed {
            error: e.to_string(),
        },
        Err(_) => FinalizeOutcome::Retry {
            error: format!("send timed out after {send_timeout:?}"),
        },
    }
}

pub(crate) fn owner_token(instance_id: Uuid, worker_index: usize) -> String {
    format!("{instance_id}:{worker_index}")
}
