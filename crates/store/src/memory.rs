//! In-process store.
//!
//! Implements the identical lease/finalize contract as the PostgreSQL
//! store behind a single async mutex. Used by tests and by single-node
//! deployments that embed the engine without an external database.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use herald_common::error::{HeraldError, Result};
use herald_common::types::{Message, MessageStatus, NewMessage};

use crate::{FinalizeOutcome, FinalizeResult, Store};

/// Durable-store contract over an in-memory map.
pub struct MemStore {
    max_attempts: i32,
    messages: Mutex<HashMap<Uuid, Message>>,
}

impl MemStore {
    pub fn new(max_attempts: i32) -> Self {
        Self {
            max_attempts,
            messages: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of all messages in a given status, for inspection.
    pub async fn in_status(&self, status: MessageStatus) -> Vec<Message> {
        let messages = self.messages.lock().await;
        messages
            .values()
            .filter(|m| m.status == status)
            .cloned()
            .collect()
    }
}

fn lease_eligible(msg: &Message) -> bool {
    match msg.status {
        MessageStatus::Pending | MessageStatus::TempFailed => true,
        MessageStatus::Leased => msg.leased_until.is_some_and(|until| until < Utc::now()),
        MessageStatus::Sent | MessageStatus::PermFailed => false,
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert(&self, msg: NewMessage) -> Result<Uuid> {
        if msg.recipient.trim().is_empty() {
            return Err(HeraldError::InvalidRecipient);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let message = Message {
            id,
            recipient: msg.recipient,
            template: msg.template,
            method: msg.method,
            labels: msg.labels,
            title: msg.title,
            status: MessageStatus::Pending,
            attempt_count: 0,
            leased_by: None,
            leased_until: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        let mut messages = self.messages.lock().await;
        messages.insert(id, message);
        Ok(id)
    }

    async fn lease_batch(&self, owner: &str, max: usize, lease: Duration) -> Result<Vec<Message>> {
        let leased_until = Utc::now()
            + chrono::Duration::from_std(lease)
                .map_err(|e| HeraldError::Internal(format!("lease duration out of range: {e}")))?;

        let mut messages = self.messages.lock().await;

        // Oldest first; ID as a deterministic tiebreak for equal timestamps.
        let mut eligible: Vec<Uuid> = messages
            .values()
            .filter(|m| lease_eligible(m))
            .map(|m| m.id)
            .collect();
        eligible.sort_by_key(|id| {
            let m = &messages[id];
            (m.created_at, m.id)
        });
        eligible.truncate(max);

        let mut leased = Vec::with_capacity(eligible.len());
        for id in eligible {
            let msg = messages
                .get_mut(&id)
                .ok_or_else(|| HeraldError::Internal("leased row vanished".to_string()))?;
            msg.status = MessageStatus::Leased;
            msg.leased_by = Some(owner.to_string());
            msg.leased_until = Some(leased_until);
            msg.updated_at = Utc::now();
            leased.push(msg.clone());
        }

        Ok(leased)
    }

    async fn finalize(
        &self,
        msg_id: Uuid,
        owner: &str,
        outcome: FinalizeOutcome,
    ) -> Result<FinalizeResult> {
        let mut messages = self.messages.lock().await;
        let Some(msg) = messages.get_mut(&msg_id) else {
            return Ok(FinalizeResult::Conflict);
        };

        // The caller's lease must still be active; anything else means the
        // message was reassigned or already finalized.
        if msg.status != MessageStatus::Leased || msg.leased_by.as_deref() != Some(owner) {
            return Ok(FinalizeResult::Conflict);
        }

        msg.attempt_count += 1;
        msg.leased_by = None;
        msg.leased_until = None;
        msg.updated_at = Utc::now();

        match outcome {
            FinalizeOutcome::Sent => {
                msg.status = MessageStatus::Sent;
                msg.last_error = None;
            }
            FinalizeOutcome::Retry { error } => {
                msg.status = if msg.attempt_count >= self.max_attempts {
                    MessageStatus::PermFailed
                } else {
                    MessageStatus::TempFailed
                };
                msg.last_error = Some(error);
            }
            FinalizeOutcome::Failed { error } => {
                msg.status = MessageStatus::PermFailed;
                msg.last_error = Some(error);
            }
        }

        Ok(FinalizeResult::Applied)
    }

    async fn get(&self, msg_id: Uuid) -> Result<Option<Message>> {
        let messages = self.messages.lock().await;
        Ok(messages.get(&msg_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use herald_common::types::{Labels, NotificationMethod};

    use super::*;

    fn new_message(recipient: &str) -> NewMessage {
        NewMessage {
            recipient: recipient.to_string(),
            template: "workspace_deleted".to_string(),
            method: NotificationMethod::Smtp,
            labels: Labels::new(),
            title: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemStore::new(5);
        let id = store.insert(new_message("bob@example.com")).await.unwrap();

        let msg = store.get(id).await.unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.attempt_count, 0);
        assert_eq!(msg.recipient, "bob@example.com");
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_recipient() {
        let store = MemStore::new(5);
        let err = store.insert(new_message("  ")).await.unwrap_err();
        assert!(matches!(err, HeraldError::InvalidRecipient));
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let store = MemStore::new(5);
        let id = store.insert(new_message("bob@example.com")).await.unwrap();

        let first = store
            .lease_batch("owner-a", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, id);

        let second = store
            .lease_batch("owner-b", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_lease_no_double_claim() {
        let store = Arc::new(MemStore::new(5));
        for i in 0..50 {
            store
                .insert(new_message(&format!("user{i}@example.com")))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for w in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .lease_batch(&format!("owner-{w}"), 10, Duration::from_secs(30))
                    .await
                    .unwrap()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for msg in handle.await.unwrap() {
                assert!(seen.insert(msg.id), "message leased twice: {}", msg.id);
            }
        }
        assert_eq!(seen.len(), 50);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let store = MemStore::new(5);
        let id = store.insert(new_message("bob@example.com")).await.unwrap();

        let leased = store
            .lease_batch("owner-a", 1, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(leased.len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let reclaimed = store
            .lease_batch("owner-b", 1, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, id);
        assert_eq!(reclaimed[0].leased_by.as_deref(), Some("owner-b"));
    }

    #[tokio::test]
    async fn test_finalize_sent_increments_attempt() {
        let store = MemStore::new(5);
        let id = store.insert(new_message("bob@example.com")).await.unwrap();
        store
            .lease_batch("owner-a", 1, Duration::from_secs(30))
            .await
            .unwrap();

        let result = store
            .finalize(id, "owner-a", FinalizeOutcome::Sent)
            .await
            .unwrap();
        assert_eq!(result, FinalizeResult::Applied);

        let msg = store.get(id).await.unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(msg.attempt_count, 1);
        assert!(msg.leased_by.is_none());
    }

    #[tokio::test]
    async fn test_finalize_wrong_owner_is_conflict() {
        let store = MemStore::new(5);
        let id = store.insert(new_message("bob@example.com")).await.unwrap();
        store
            .lease_batch("owner-a", 1, Duration::from_secs(30))
            .await
            .unwrap();

        let result = store
            .finalize(id, "owner-b", FinalizeOutcome::Sent)
            .await
            .unwrap();
        assert_eq!(result, FinalizeResult::Conflict);

        // The legitimate owner's outcome still applies.
        let msg = store.get(id).await.unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::Leased);
    }

    #[tokio::test]
    async fn test_finalize_after_terminal_is_conflict() {
        let store = MemStore::new(5);
        let id = store.insert(new_message("bob@example.com")).await.unwrap();
        store
            .lease_batch("owner-a", 1, Duration::from_secs(30))
            .await
            .unwrap();
        store
            .finalize(id, "owner-a", FinalizeOutcome::Sent)
            .await
            .unwrap();

        let result = store
            .finalize(id, "owner-a", FinalizeOutcome::Sent)
            .await
            .unwrap();
        assert_eq!(result, FinalizeResult::Conflict);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_becomes_permanent() {
        let store = MemStore::new(2);
        let id = store.insert(new_message("bob@example.com")).await.unwrap();

        store
            .lease_batch("owner-a", 1, Duration::from_secs(30))
            .await
            .unwrap();
        store
            .finalize(
                id,
                "owner-a",
                FinalizeOutcome::Retry {
                    error: "503".to_string(),
                },
            )
            .await
            .unwrap();

        let msg = store.get(id).await.unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::TempFailed);
        assert_eq!(msg.attempt_count, 1);

        // Second retryable failure hits max_attempts.
        store
            .lease_batch("owner-a", 1, Duration::from_secs(30))
            .await
            .unwrap();
        store
            .finalize(
                id,
                "owner-a",
                FinalizeOutcome::Retry {
                    error: "503".to_string(),
                },
            )
            .await
            .unwrap();

        let msg = store.get(id).await.unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::PermFailed);
        assert_eq!(msg.attempt_count, 2);
        assert_eq!(msg.last_error.as_deref(), Some("503"));
    }

    #[tokio::test]
    async fn test_failed_is_terminal_and_never_releases() {
        let store = MemStore::new(5);
        let id = store.insert(new_message("bob@example.com")).await.unwrap();
        store
            .lease_batch("owner-a", 1, Duration::from_secs(30))
            .await
            .unwrap();
        store
            .finalize(
                id,
                "owner-a",
                FinalizeOutcome::Failed {
                    error: "missing labels: type".to_string(),
                },
            )
            .await
            .unwrap();

        let msg = store.get(id).await.unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::PermFailed);

        let leased = store
            .lease_batch("owner-b", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(leased.is_empty());
    }
}
