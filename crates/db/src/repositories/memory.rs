use std::collections::HashMap;

use tokio::sync::RwLock;

use deskbot_core::domain::chat::ChatRecord;

use super::{ChatHistoryRepository, RepositoryError};

/// Process-local history store for tests and single-node deployments
/// without a database file.
#[derive(Default)]
pub struct InMemoryChatHistoryRepository {
    sessions: RwLock<HashMap<String, Vec<ChatRecord>>>,
}

#[async_trait::async_trait]
impl ChatHistoryRepository for InMemoryChatHistoryRepository {
    async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ChatRecord>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut records = sessions.get(session_id).cloned().unwrap_or_default();
        records.sort_by_key(|record| record.timestamp);
        Ok(records)
    }

    async fn append(&self, record: ChatRecord) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(record.session_id.clone()).or_default().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use deskbot_core::domain::chat::ChatRecord;

    use super::InMemoryChatHistoryRepository;
    use crate::repositories::ChatHistoryRepository;

    fn record(session_id: &str, user_message: &str) -> ChatRecord {
        ChatRecord::new(session_id, user_message, "an answer").expect("valid record")
    }

    #[tokio::test]
    async fn append_and_list_round_trip() {
        let repo = InMemoryChatHistoryRepository::default();
        repo.append(record("s-1", "hello")).await.expect("append");

        let loaded = repo.list_by_session("s-1").await.expect("list");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].user_message, "hello");
    }

    #[tokio::test]
    async fn list_sorts_by_timestamp() {
        let repo = InMemoryChatHistoryRepository::default();

        let mut late = record("s-1", "second");
        late.timestamp = Utc::now();
        let mut early = record("s-1", "first");
        early.timestamp = late.timestamp - Duration::minutes(1);

        repo.append(late).await.expect("append late");
        repo.append(early).await.expect("append early");

        let loaded = repo.list_by_session("s-1").await.expect("list");
        assert_eq!(loaded[0].user_message, "first");
        assert_eq!(loaded[1].user_message, "second");
    }

    #[tokio::test]
    async fn sessions_do_not_leak_into_each_other() {
        let repo = InMemoryChatHistoryRepository::default();
        repo.append(record("s-1", "q1")).await.expect("append");
        repo.append(record("s-2", "q2")).await.expect("append");

        assert_eq!(repo.list_by_session("s-1").await.expect("list").len(), 1);
        assert_eq!(repo.list_by_session("s-2").await.expect("list").len(), 1);
        assert!(repo.list_by_session("s-3").await.expect("list").is_empty());
    }
}
