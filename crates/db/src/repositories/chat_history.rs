use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use deskbot_core::domain::chat::ChatRecord;

use super::{ChatHistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqliteChatHistoryRepository {
    pool: DbPool,
}

impl SqliteChatHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// Fixed-width UTC timestamps so lexicographic ORDER BY matches chronology.
fn timestamp_to_column(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn entities_to_column(entities: &[String]) -> Option<String> {
    if entities.is_empty() {
        None
    } else {
        Some(entities.join(","))
    }
}

fn entities_from_column(column: Option<String>) -> Vec<String> {
    column
        .map(|joined| {
            joined
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ChatRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let session_id: String =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_message: String =
        row.try_get("user_message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let bot_response: String =
        row.try_get("bot_response").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let timestamp_str: String =
        row.try_get("timestamp").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let intent: Option<String> =
        row.try_get("intent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entities_str: Option<String> =
        row.try_get("entities").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let confidence: Option<f64> =
        row.try_get("confidence").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("timestamp `{timestamp_str}`: {e}")))?;

    Ok(ChatRecord {
        id,
        session_id,
        user_message,
        bot_response,
        timestamp,
        intent,
        entities: entities_from_column(entities_str),
        confidence,
    })
}

#[async_trait::async_trait]
impl ChatHistoryRepository for SqliteChatHistoryRepository {
    async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ChatRecord>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, session_id, user_message, bot_response, timestamp,
                    intent, entities, confidence
             FROM chat_history
             WHERE session_id = ?
             ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()
    }

    async fn append(&self, record: ChatRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_history (id, session_id, user_message, bot_response,
                                       timestamp, intent, entities, confidence)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.session_id)
        .bind(&record.user_message)
        .bind(&record.bot_response)
        .bind(timestamp_to_column(record.timestamp))
        .bind(&record.intent)
        .bind(entities_to_column(&record.entities))
        .bind(record.confidence)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use deskbot_core::domain::chat::ChatRecord;

    use super::SqliteChatHistoryRepository;
    use crate::repositories::ChatHistoryRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_record(session_id: &str, user_message: &str, bot_response: &str) -> ChatRecord {
        ChatRecord::new(session_id, user_message, bot_response).expect("valid record")
    }

    #[tokio::test]
    async fn append_and_list_round_trips_all_fields() {
        let pool = setup().await;
        let repo = SqliteChatHistoryRepository::new(pool);

        let record = sample_record("s-1", "what is the leave policy", "Two weeks notice.")
            .with_metadata(
                Some("hr_policy".to_string()),
                vec!["leave".to_string(), "policy".to_string()],
                Some(0.87),
            );
        repo.append(record.clone()).await.expect("append");

        let loaded = repo.list_by_session("s-1").await.expect("list");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, record.id);
        assert_eq!(loaded[0].user_message, "what is the leave policy");
        assert_eq!(loaded[0].bot_response, "Two weeks notice.");
        assert_eq!(loaded[0].intent.as_deref(), Some("hr_policy"));
        assert_eq!(loaded[0].entities, vec!["leave".to_string(), "policy".to_string()]);
        assert_eq!(loaded[0].confidence, Some(0.87));
    }

    #[tokio::test]
    async fn empty_metadata_round_trips_as_absent() {
        let pool = setup().await;
        let repo = SqliteChatHistoryRepository::new(pool);

        repo.append(sample_record("s-1", "hi", "hello")).await.expect("append");

        let loaded = repo.list_by_session("s-1").await.expect("list");
        assert_eq!(loaded[0].intent, None);
        assert!(loaded[0].entities.is_empty());
        assert_eq!(loaded[0].confidence, None);
    }

    #[tokio::test]
    async fn list_returns_records_in_timestamp_order() {
        let pool = setup().await;
        let repo = SqliteChatHistoryRepository::new(pool);

        let now = Utc::now();
        let mut second = sample_record("s-1", "second question", "second answer");
        second.timestamp = now;
        let mut first = sample_record("s-1", "first question", "first answer");
        first.timestamp = now - Duration::minutes(5);

        // Inserted newest first; the read must still come back chronological.
        repo.append(second).await.expect("append second");
        repo.append(first).await.expect("append first");

        let loaded = repo.list_by_session("s-1").await.expect("list");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].user_message, "first question");
        assert_eq!(loaded[1].user_message, "second question");
        assert!(loaded[0].timestamp <= loaded[1].timestamp);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let pool = setup().await;
        let repo = SqliteChatHistoryRepository::new(pool);

        repo.append(sample_record("s-1", "q1", "a1")).await.expect("append s-1");
        repo.append(sample_record("s-2", "q2", "a2")).await.expect("append s-2");

        let loaded = repo.list_by_session("s-1").await.expect("list");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].session_id, "s-1");
    }

    #[tokio::test]
    async fn unknown_session_lists_empty() {
        let pool = setup().await;
        let repo = SqliteChatHistoryRepository::new(pool);

        let loaded = repo.list_by_session("missing").await.expect("list");
        assert!(loaded.is_empty());
    }
}
