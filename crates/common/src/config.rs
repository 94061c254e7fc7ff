use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (wake channel)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Number of concurrent notifier workers (default: 2)
    pub notifier_worker_count: usize,

    /// Number of messages leased per batch (default: 10)
    pub notifier_batch_size: usize,

    /// Lease duration in seconds (default: 30)
    pub notifier_lease_seconds: u64,

    /// Maximum delivery attempts before a message is permanently failed (default: 5)
    pub notifier_max_attempts: i32,

    /// Fallback poll interval in seconds when no wake signal arrives (default: 15)
    pub notifier_fetch_interval_seconds: u64,

    /// Sender address for outbound email
    pub smtp_from: Option<String>,

    /// SMTP smarthost
    pub smtp_host: Option<String>,

    /// SMTP port (default: 587)
    pub smtp_port: u16,

    /// Hostname sent in the SMTP HELO/EHLO (default: localhost)
    pub smtp_hello: String,

    /// SMTP username (optional)
    pub smtp_username: Option<String>,

    /// SMTP password (optional)
    pub smtp_password: Option<String>,

    /// Webhook endpoint URL; the webhook dispatcher is only registered when set
    pub webhook_endpoint: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            notifier_worker_count: std::env::var("NOTIFIER_WORKER_COUNT")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFIER_WORKER_COUNT must be a valid usize"))?,
            notifier_batch_size: std::env::var("NOTIFIER_BATCH_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFIER_BATCH_SIZE must be a valid usize"))?,
            notifier_lease_seconds: std::env::var("NOTIFIER_LEASE_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFIER_LEASE_SECONDS must be a valid u64"))?,
            notifier_max_attempts: std::env::var("NOTIFIER_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFIER_MAX_ATTEMPTS must be a valid i32"))?,
            notifier_fetch_interval_seconds: std::env::var("NOTIFIER_FETCH_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("NOTIFIER_FETCH_INTERVAL_SECONDS must be a valid u64")
                })?,
            smtp_from: std::env::var("SMTP_FROM").ok(),
            smtp_host: std::env::var("SMTP_HOST").ok(),
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SMTP_PORT must be a valid u16"))?,
            smtp_hello: std::env::var("SMTP_HELLO").unwrap_or_else(|_| "localhost".to_string()),
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            webhook_endpoint: std::env::var("WEBHOOK_ENDPOINT").ok(),
        })
    }

    /// Lease duration as a [`Duration`].
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.notifier_lease_seconds)
    }

    /// Fallback poll interval as a [`Duration`].
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.notifier_fetch_interval_seconds)
    }
}
