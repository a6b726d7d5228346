use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Generates the opaque identifier used for new sessions and new records.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Bot,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

/// One message attributed to either side of a conversation. Immutable once
/// created; offered to the semantic memory service as it happens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: String,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(session_id: impl Into<String>, speaker: Speaker, text: impl Into<String>) -> Self {
        Self { session_id: session_id.into(), speaker, text: text.into(), timestamp: Utc::now() }
    }
}

/// One persisted question/answer exchange plus derived metadata. Append-only:
/// records are never updated or deleted once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub session_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
    pub intent: Option<String>,
    pub entities: Vec<String>,
    pub confidence: Option<f64>,
}

impl ChatRecord {
    /// Builds a record with a fresh id and the current timestamp. Both texts
    /// must be non-blank; callers finalize the response before persisting.
    pub fn new(
        session_id: impl Into<String>,
        user_message: impl Into<String>,
        bot_response: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let user_message = user_message.into();
        if user_message.trim().is_empty() {
            return Err(DomainError::EmptyUserMessage);
        }

        let bot_response = bot_response.into();
        if bot_response.trim().is_empty() {
            return Err(DomainError::EmptyBotResponse);
        }

        Ok(Self {
            id: new_session_id(),
            session_id: session_id.into(),
            user_message,
            bot_response,
            timestamp: Utc::now(),
            intent: None,
            entities: Vec::new(),
            confidence: None,
        })
    }

    pub fn with_metadata(
        mut self,
        intent: Option<String>,
        entities: Vec<String>,
        confidence: Option<f64>,
    ) -> Self {
        self.intent = intent;
        self.entities = entities;
        self.confidence = confidence;
        self
    }
}

/// One retrieved exchange used as prompt context. The semantic memory service
/// returns single messages, so either side may be absent; the local fallback
/// returns full records with both sides present.
#[derive(Clone, Debug, PartialEq)]
pub struct RelevantTurn {
    pub session_id: Option<String>,
    pub user_text: Option<String>,
    pub bot_text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RelevantTurn {
    pub fn from_user_message(
        session_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Some(session_id.into()),
            user_text: Some(text.into()),
            bot_text: None,
            timestamp,
        }
    }

    pub fn from_bot_message(
        session_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Some(session_id.into()),
            user_text: None,
            bot_text: Some(text.into()),
            timestamp,
        }
    }
}

impl From<&ChatRecord> for RelevantTurn {
    fn from(record: &ChatRecord) -> Self {
        Self {
            session_id: Some(record.session_id.clone()),
            user_text: Some(record.user_message.clone()),
            bot_text: Some(record.bot_response.clone()),
            timestamp: record.timestamp,
        }
    }
}
