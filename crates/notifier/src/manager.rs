//! Manager: owns the dispatcher registry and wake channel, starts and
//! stops notifier workers, and exposes the enqueue API.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use herald_common::config::AppConfig;
use herald_common::error::{HeraldError, Result};
use herald_common::types::NewMessage;
use herald_dispatch::DispatcherRegistry;
use herald_store::Store;

use crate::notifier::{Notifier, owner_token};
use crate::wake::WakeChannel;

/// Tunables for the notifier workers.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Messages leased per batch.
    pub batch_size: usize,
    /// How long a lease shields a message from other workers.
    pub lease_duration: Duration,
    /// Fallback poll interval when no wake signal arrives.
    pub fetch_interval: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            lease_duration: Duration::from_secs(30),
            fetch_interval: Duration::from_secs(15),
        }
    }
}

impl From<&AppConfig> for NotifierConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.notifier_batch_size,
            lease_duration: config.lease_duration(),
            fetch_interval: config.fetch_interval(),
        }
    }
}

/// Orchestrates enqueueing and dispatching of notification messages.
pub struct Manager {
    config: NotifierConfig,
    store: Arc<dyn Store>,
    wake: Arc<dyn WakeChannel>,
    registry: Arc<DispatcherRegistry>,
    /// Distinguishes this process instance in lease owner tokens.
    instance_id: Uuid,
    cancel: CancellationToken,
    workers: Mutex<Option<JoinSet<()>>>,
}

impl Manager {
    pub fn new(
        config: NotifierConfig,
        store: Arc<dyn Store>,
        wake: Arc<dyn WakeChannel>,
        registry: Arc<DispatcherRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            wake,
            registry,
            instance_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            workers: Mutex::new(None),
        }
    }

    /// Persist a message for delivery and return its ID.
    ///
    /// Fast path: a store insert plus a wake publish. Dispatcher-specific
    /// validation is deliberately deferred to dispatch time, so a message
    /// with bad labels enqueues fine and fails asynchronously.
    pub async fn enqueue(&self, msg: NewMessage) -> Result<Uuid> {
        if msg.recipient.trim().is_empty() {
            return Err(HeraldError::InvalidRecipient);
        }

        let method = msg.method;
        let id = self.store.insert(msg).await?;

        if let Err(e) = self.wake.wake().await {
            // Workers poll on the fallback interval, so a lost signal only
            // delays pickup.
            tracing::warn!(msg_id = %id, error = %e, "Failed to publish wake signal");
        }

        tracing::debug!(msg_id = %id, method = %method, "Message enqueued");
        Ok(id)
    }

    /// Spawn `count` concurrent notifier workers.
    ///
    /// Calling this twice on one manager is a caller error.
    pub async fn start_notifiers(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(HeraldError::Config(
                "notifier worker count must be positive".to_string(),
            ));
        }

        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            return Err(HeraldError::AlreadyStarted);
        }

        let mut set = JoinSet::new();
        for index in 0..count {
            let notifier = Notifier {
                owner: owner_token(self.instance_id, index),
                store: self.store.clone(),
                registry: self.registry.clone(),
                batch_size: self.config.batch_size,
                lease_duration: self.config.lease_duration,
                fetch_interval: self.config.fetch_interval,
            };
            let listener = self.wake.subscribe();
            let cancel = self.cancel.clone();
            set.spawn(notifier.run(listener, cancel));
        }
        *workers = Some(set);

        tracing::info!(count, instance_id = %self.instance_id, "Notifiers started");
        Ok(())
    }

    /// Signal all workers to finish their current batch and exit, waiting
    /// up to `timeout` for them to drain.
    ///
    /// No new leases are acquired once stop begins. On timeout the
    /// remaining workers are aborted and an error is returned; their
    /// unfinished leases simply expire and are reclaimed later, so state
    /// stays consistent.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.cancel.cancel();

        let mut workers = self.workers.lock().await;
        let Some(mut set) = workers.take() else {
            return Ok(());
        };

        let drained = tokio::time::timeout(timeout, async {
            while set.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => {
                tracing::info!(instance_id = %self.instance_id, "Notifiers drained");
                Ok(())
            }
            Err(_) => {
                set.abort_all();
                tracing::error!(
                    instance_id = %self.instance_id,
                    ?timeout,
                    "Notifiers failed to drain in time"
                );
                Err(HeraldError::ShutdownTimeout)
            }
        }
    }
}
