use redis::Client;
use redis::aio::ConnectionManager;

/// Open the Redis connection used to publish wake signals.
///
/// The `ConnectionManager` reconnects on its own, so a Redis restart costs
/// some lost wake signals at worst; delivery then falls back to polling.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
