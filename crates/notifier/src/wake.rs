//! Wake channel: a lightweight publish/subscribe signal telling idle
//! workers "new work may exist", so pickup latency is bounded by the
//! signal path instead of the fallback poll interval.
//!
//! Signals carry no payload and may be lost; a lost signal only delays
//! pickup until the next poll tick.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::broadcast;

use herald_common::error::Result;
use herald_common::redis_pool::create_redis_pool;

/// Redis channel the cross-process wake signal is published on.
const WAKE_CHANNEL: &str = "herald:wake";

/// Publish/subscribe wake signal.
#[async_trait]
pub trait WakeChannel: Send + Sync {
    /// Publish a wake signal to all subscribed workers.
    async fn wake(&self) -> Result<()>;

    /// Subscribe; each listener sees signals published after this call.
    fn subscribe(&self) -> WakeListener;
}

/// Receiving half held by one notifier worker.
pub struct WakeListener {
    rx: broadcast::Receiver<()>,
}

impl WakeListener {
    /// Block until a wake signal arrives or `fallback` elapses.
    ///
    /// The bounded wait is what makes a missed signal harmless: the worker
    /// polls the store at least once per fallback interval regardless.
    pub async fn wait(&mut self, fallback: Duration) {
        // A lagged receiver means signals did arrive; treat it as a wake.
        let _ = tokio::time::timeout(fallback, self.rx.recv()).await;
    }
}

/// In-process wake channel over a tokio broadcast.
///
/// Suitable for tests and single-process deployments; signals do not
/// cross process boundaries.
pub struct LocalWake {
    tx: broadcast::Sender<()>,
}

impl LocalWake {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }
}

impl Default for LocalWake {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WakeChannel for LocalWake {
    async fn wake(&self) -> Result<()> {
        // Err means no live subscribers, which is fine.
        let _ = self.tx.send(());
        Ok(())
    }

    fn subscribe(&self) -> WakeListener {
        WakeListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cross-process wake channel over Redis pub/sub.
///
/// A background task forwards Redis messages into a local broadcast so
/// that subscribing is cheap and synchronous for workers.
pub struct RedisWake {
    conn: ConnectionManager,
    tx: broadcast::Sender<()>,
}

impl RedisWake {
    /// Connect both the publishing connection and the subscriber task.
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let conn = create_redis_pool(redis_url).await?;
        let client = redis::Client::open(redis_url)?;

        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(WAKE_CHANNEL).await?;

        let (tx, _) = broadcast::channel(16);
        let forward = tx.clone();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while stream.next().await.is_some() {
                let _ = forward.send(());
            }
            tracing::warn!("Redis wake subscription closed; relying on fallback polling");
        });

        Ok(Self { conn, tx })
    }
}

#[async_trait]
impl WakeChannel for RedisWake {
    async fn wake(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(WAKE_CHANNEL, 1u8).await?;
        Ok(())
    }

    fn subscribe(&self) -> WakeListener {
        WakeListener {
            rx: self.tx.subscribe(),
        }
    }
}
