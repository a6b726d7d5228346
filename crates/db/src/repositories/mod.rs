use async_trait::async_trait;
use thiserror::Error;

use deskbot_core::domain::chat::ChatRecord;

pub mod chat_history;
pub mod memory;

pub use chat_history::SqliteChatHistoryRepository;
pub use memory::InMemoryChatHistoryRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ChatHistoryRepository: Send + Sync {
    /// All records for a session, ordered by timestamp (creation order).
    async fn list_by_session(&self, session_id: &str)
        -> Result<Vec<ChatRecord>, RepositoryError>;

    /// Appends one completed exchange. Records are never updated or deleted.
    async fn append(&self, record: ChatRecord) -> Result<(), RepositoryError>;
}
