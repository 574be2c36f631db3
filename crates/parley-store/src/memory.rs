//! In-memory `ConversationStore` used by tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use parley_core::message::{MessageId, NewMessage, StoredMessage};
use parley_core::session::SessionRecord;
use parley_core::usage::{NewUsageRecord, UsageRecord};

use crate::store::{ConversationStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    messages: Vec<StoredMessage>,
    usage: Vec<UsageRecord>,
    next_message_id: MessageId,
    next_usage_id: u64,
}

/// In-process store: parking_lot-guarded vectors with monotonic id
/// assignment at insert, mirroring the database contract.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session (test/dev fixture path — the claim flow lives
    /// outside this subsystem).
    pub fn insert_session(&self, session: SessionRecord) {
        let mut inner = self.inner.lock();
        let _ = inner.sessions.insert(session.id.clone(), session);
    }

    /// All persisted messages, ascending by id. Test inspection helper.
    #[must_use]
    pub fn all_messages(&self) -> Vec<StoredMessage> {
        self.inner.lock().messages.clone()
    }

    /// All persisted usage rows. Test inspection helper.
    #[must_use]
    pub fn all_usage(&self) -> Vec<UsageRecord> {
        self.inner.lock().usage.clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load_session(&self, session_id: &str) -> StoreResult<SessionRecord> {
        let inner = self.inner.lock();
        let mut session = inner
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::SessionNotFound {
                session_id: session_id.to_owned(),
            })?;
        // History reflects everything persisted so far, not just the seed
        session.messages = inner
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        Ok(session)
    }

    async fn create_message(&self, message: NewMessage) -> StoreResult<StoredMessage> {
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(&message.session_id) {
            return Err(StoreError::SessionNotFound {
                session_id: message.session_id,
            });
        }
        inner.next_message_id += 1;
        let stored = StoredMessage {
            id: inner.next_message_id,
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            thread: message.thread,
            thread_id: message.thread_id,
            metadata: message.metadata,
            created_at: Utc::now(),
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn messages_after(
        &self,
        session_id: &str,
        after: Option<MessageId>,
    ) -> StoreResult<Vec<StoredMessage>> {
        let inner = self.inner.lock();
        let cutoff = after.unwrap_or(0);
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.session_id == session_id && m.id > cutoff)
            .cloned()
            .collect())
    }

    async fn log_usage(&self, record: NewUsageRecord) -> StoreResult<UsageRecord> {
        let mut inner = self.inner.lock();
        inner.next_usage_id += 1;
        let stored = UsageRecord {
            id: inner.next_usage_id,
            session_id: record.session_id,
            user_id: record.user_id,
            invitation_id: record.invitation_id,
            stream: record.stream,
            usage: record.usage,
            created_at: Utc::now(),
        };
        inner.usage.push(stored.clone());
        Ok(stored)
    }

    async fn usage_total(&self, invitation_id: &str) -> StoreResult<u64> {
        let inner = self.inner.lock();
        Ok(inner
            .usage
            .iter()
            .filter(|u| u.invitation_id.as_deref() == Some(invitation_id))
            .map(|u| u.usage.total())
            .sum())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parley_core::message::{MessageRole, Thread};
    use parley_core::quota::QuotaDefinition;
    use parley_core::session::{PromptConfig, RolePrompt};
    use parley_core::usage::{StreamKind, TokenUsage};

    fn session(id: &str) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            user_id: "user_1".into(),
            prompts: PromptConfig::Custom {
                partner: RolePrompt {
                    model: "m".into(),
                    system_prompt: "p".into(),
                },
                coach: RolePrompt {
                    model: "m".into(),
                    system_prompt: "c".into(),
                },
            },
            invitation: None,
            messages: Vec::new(),
        }
    }

    fn store_with_session(id: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_session(session(id));
        store
    }

    fn usage_row(invitation: Option<&str>, output: u64) -> NewUsageRecord {
        NewUsageRecord {
            session_id: "s1".into(),
            user_id: "user_1".into(),
            invitation_id: invitation.map(Into::into),
            stream: StreamKind::Partner,
            usage: TokenUsage {
                input_tokens: 0,
                output_tokens: output,
            },
        }
    }

    #[tokio::test]
    async fn load_missing_session() {
        let store = MemoryStore::new();
        let result = store.load_session("nope").await;
        assert_matches!(result, Err(StoreError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn message_ids_are_monotonic() {
        let store = store_with_session("s1");
        let first = store
            .create_message(NewMessage::main("s1", MessageRole::User, "a"))
            .await
            .unwrap();
        let second = store
            .create_message(NewMessage::main("s1", MessageRole::Partner, "b"))
            .await
            .unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn create_message_requires_session() {
        let store = MemoryStore::new();
        let result = store
            .create_message(NewMessage::main("ghost", MessageRole::User, "x"))
            .await;
        assert_matches!(result, Err(StoreError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn messages_after_filters_and_orders() {
        let store = store_with_session("s1");
        store.insert_session(session("s2"));
        for (sess, text) in [("s1", "one"), ("s1", "two"), ("s2", "other"), ("s1", "three")] {
            let _ = store
                .create_message(NewMessage::main(sess, MessageRole::User, text))
                .await
                .unwrap();
        }

        let all = store.messages_after("s1", None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        let after_first = store.messages_after("s1", Some(all[0].id)).await.unwrap();
        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first[0].content, "two");
        assert_eq!(after_first[1].content, "three");
    }

    #[tokio::test]
    async fn loaded_session_includes_persisted_history() {
        let store = store_with_session("s1");
        let _ = store
            .create_message(NewMessage::aside("s1", MessageRole::User, "q", "t1"))
            .await
            .unwrap();
        let loaded = store.load_session("s1").await.unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].thread, Thread::Aside);
        assert_eq!(loaded.messages[0].thread_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn usage_total_sums_per_invitation() {
        let store = store_with_session("s1");
        let _ = store.log_usage(usage_row(Some("inv_1"), 100)).await.unwrap();
        let _ = store.log_usage(usage_row(Some("inv_1"), 250)).await.unwrap();
        let _ = store.log_usage(usage_row(Some("inv_2"), 999)).await.unwrap();
        let _ = store.log_usage(usage_row(None, 50)).await.unwrap();

        assert_eq!(store.usage_total("inv_1").await.unwrap(), 350);
        assert_eq!(store.usage_total("inv_2").await.unwrap(), 999);
        assert_eq!(store.usage_total("inv_3").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn quota_status_derived_from_usage() {
        let store = store_with_session("s1");
        let _ = store.log_usage(usage_row(Some("inv_1"), 1000)).await.unwrap();
        let status = store
            .quota_status("inv_1", QuotaDefinition { total_tokens: 1000 })
            .await
            .unwrap();
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
    }
}
