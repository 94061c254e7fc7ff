use std::sync::Arc;
use std::time::Duration;

use herald_common::config::AppConfig;
use herald_common::db;
use herald_dispatch::{
    Dispatcher, DispatcherRegistry, SmtpConfig, SmtpDispatcher, WebhookConfig, WebhookDispatcher,
};
use herald_notifier::{Manager, NotifierConfig, RedisWake};
use herald_store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_notifier=info,herald_store=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald notifier starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgStore::new(pool, config.notifier_max_attempts));
    let wake = Arc::new(RedisWake::connect(&config.redis_url).await?);
    let registry = Arc::new(build_registry(&config)?);

    tracing::info!(
        methods = ?registry.methods().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "Dispatchers registered"
    );

    let manager = Manager::new(NotifierConfig::from(&config), store, wake, registry);
    manager.start_notifiers(config.notifier_worker_count).await?;

    // Run until Ctrl+C, then drain workers with a bounded grace period.
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    manager.stop(Duration::from_secs(30)).await?;

    tracing::info!("Herald notifier stopped.");
    Ok(())
}

/// Build the dispatcher registry from whatever delivery methods are
/// configured. At least one method must be.
fn build_registry(config: &AppConfig) -> anyhow::Result<DispatcherRegistry> {
    let mut dispatchers: Vec<Arc<dyn Dispatcher>> = Vec::new();

    if let (Some(host), Some(from)) = (&config.smtp_host, &config.smtp_from) {
        dispatchers.push(Arc::new(SmtpDispatcher::new(SmtpConfig {
            host: host.clone(),
            port: config.smtp_port,
            from: from.clone(),
            hello: config.smtp_hello.clone(),
            username: config.smtp_username.clone(),
            password: config.smtp_password.clone(),
        })));
    }

    if let Some(endpoint) = &config.webhook_endpoint {
        dispatchers.push(Arc::new(WebhookDispatcher::new(WebhookConfig::new(
            endpoint.clone(),
        ))?));
    }

    if dispatchers.is_empty() {
        anyhow::bail!(
            "no delivery methods configured; set SMTP_HOST/SMTP_FROM and/or WEBHOOK_ENDPOINT"
        );
    }

    Ok(DispatcherRegistry::from_dispatchers(dispatchers)?)
}
