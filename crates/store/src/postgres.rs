//! PostgreSQL-backed store.
//!
//! Lease acquisition uses a `FOR UPDATE SKIP LOCKED` sub-select feeding a
//! conditional `UPDATE`, so concurrent workers in this process or any
//! other can never claim the same row. Finalization is a conditional
//! update scoped to the caller's lease; zero rows affected means the lease
//! was lost and the call reports a benign conflict.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use herald_common::error::{HeraldError, Result};
use herald_common::types::{Labels, Message, MessageStatus, NewMessage, NotificationMethod};

use crate::{FinalizeOutcome, FinalizeResult, Store};

/// Durable store on top of a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    max_attempts: i32,
}

impl PgStore {
    pub fn new(pool: PgPool, max_attempts: i32) -> Self {
        Self { pool, max_attempts }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    recipient: String,
    template: String,
    method: String,
    labels: Json<Labels>,
    title: String,
    status: String,
    attempt_count: i32,
    leased_by: Option<String>,
    leased_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = HeraldError;

    fn try_from(row: MessageRow) -> Result<Self> {
        let method: NotificationMethod = row
            .method
            .parse()
            .map_err(|e: String| HeraldError::Internal(e))?;
        let status: MessageStatus = row
            .status
            .parse()
            .map_err(|e: String| HeraldError::Internal(e))?;

        Ok(Message {
            id: row.id,
            recipient: row.recipient,
            template: row.template,
            method,
            labels: row.labels.0,
            title: row.title,
            status,
            attempt_count: row.attempt_count,
            leased_by: row.leased_by,
            leased_until: row.leased_until,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, recipient, template, method, labels, title, status, \
     attempt_count, leased_by, leased_until, last_error, created_at, updated_at";

#[async_trait]
impl Store for PgStore {
    async fn insert(&self, msg: NewMessage) -> Result<Uuid> {
        if msg.recipient.trim().is_empty() {
            return Err(HeraldError::InvalidRecipient);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO notification_messages (id, recipient, template, method, labels, title, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            "#,
        )
        .bind(id)
        .bind(&msg.recipient)
        .bind(&msg.template)
        .bind(msg.method.to_string())
        .bind(Json(&msg.labels))
        .bind(&msg.title)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn lease_batch(&self, owner: &str, max: usize, lease: Duration) -> Result<Vec<Message>> {
        let leased_until = Utc::now()
            + chrono::Duration::from_std(lease)
                .map_err(|e| HeraldError::Internal(format!("lease duration out of range: {e}")))?;

        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            r#"
            UPDATE notification_messages
            SET status = 'leased', leased_by = $1, leased_until = $2, updated_at = now()
            WHERE id IN (
                SELECT id FROM notification_messages
                WHERE status = 'pending'
                   OR status = 'temp_failed'
                   OR (status = 'leased' AND leased_until < now())
                ORDER BY created_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(leased_until)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>>>()?;
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn finalize(
        &self,
        msg_id: Uuid,
        owner: &str,
        outcome: FinalizeOutcome,
    ) -> Result<FinalizeResult> {
        let result = match outcome {
            FinalizeOutcome::Sent => {
                sqlx::query(
                    r#"
                    UPDATE notification_messages
                    SET status = 'sent', attempt_count = attempt_count + 1,
                        leased_by = NULL, leased_until = NULL, last_error = NULL,
                        updated_at = now()
                    WHERE id = $1 AND status = 'leased' AND leased_by = $2
                    "#,
                )
                .bind(msg_id)
                .bind(owner)
                .execute(&self.pool)
                .await?
            }
            FinalizeOutcome::Retry { error } => {
                sqlx::query(
                    r#"
                    UPDATE notification_messages
                    SET attempt_count = attempt_count + 1,
                        status = CASE WHEN attempt_count + 1 >= $3
                                      THEN 'perm_failed' ELSE 'temp_failed' END,
                        leased_by = NULL, leased_until = NULL, last_error = $4,
                        updated_at = now()
                    WHERE id = $1 AND status = 'leased' AND leased_by = $2
                    "#,
                )
                .bind(msg_id)
                .bind(owner)
                .bind(self.max_attempts)
                .bind(&error)
                .execute(&self.pool)
                .await?
            }
            FinalizeOutcome::Failed { error } => {
                sqlx::query(
                    r#"
                    UPDATE notification_messages
                    SET status = 'perm_failed', attempt_count = attempt_count + 1,
                        leased_by = NULL, leased_until = NULL, last_error = $3,
                        updated_at = now()
                    WHERE id = $1 AND status = 'leased' AND leased_by = $2
                    "#,
                )
                .bind(msg_id)
                .bind(owner)
                .bind(&error)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Ok(FinalizeResult::Conflict);
        }
        Ok(FinalizeResult::Applied)
    }

    async fn get(&self, msg_id: Uuid) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM notification_messages WHERE id = $1"
        ))
        .bind(msg_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }
}
