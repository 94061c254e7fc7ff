use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Bound on waiting for a free connection; every notifier worker in the
/// process shares this pool, so a saturated pool should fail fast rather
/// than stall lease acquisition.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the shared PostgreSQL pool backing the message store.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}
