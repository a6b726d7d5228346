//! Semantic memory access with a local degradation path.
//!
//! The NLP sidecar owns the vector store; this module wraps it behind
//! [`MemoryGateway`], which grades every failure: stores are advisory
//! (logged, never propagated) and retrieval degrades to the in-process
//! word-overlap ranker over the history the orchestrator already loaded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use deskbot_core::config::NlpConfig;
use deskbot_core::domain::chat::{ChatRecord, RelevantTurn, Turn};
use deskbot_core::relevance::{self, MAX_RELEVANT_TURNS};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryServiceError {
    #[error("memory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("memory endpoint returned status {status}")]
    Status { status: u16 },
}

/// One stored message coming back from the semantic retrieval endpoint.
/// Timestamps arrive as ISO-8601 strings, with or without an offset.
#[derive(Clone, Debug, Deserialize)]
pub struct MemoryEntry {
    pub message: String,
    pub role: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct RelevantHistoryResponse {
    #[serde(default)]
    relevant_history: Vec<MemoryEntry>,
}

/// Raw wire operations against the semantic memory endpoints.
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn store_message(
        &self,
        session_id: &str,
        message: &str,
        role: &str,
    ) -> Result<(), MemoryServiceError>;

    async fn relevant_history(
        &self,
        query: &str,
        session_id: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryServiceError>;
}

/// HTTP implementation speaking to the NLP sidecar.
pub struct HttpMemoryService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpMemoryService {
    pub fn new(http: reqwest::Client, config: &NlpConfig) -> Self {
        Self { http, base_url: config.base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl MemoryService for HttpMemoryService {
    async fn store_message(
        &self,
        session_id: &str,
        message: &str,
        role: &str,
    ) -> Result<(), MemoryServiceError> {
        let url = format!("{}/store_message", self.base_url);
        let body = json!({ "session_id": session_id, "message": message, "role": role });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MemoryServiceError::Status { status: status.as_u16() });
        }
        Ok(())
    }

    async fn relevant_history(
        &self,
        query: &str,
        session_id: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryServiceError> {
        let url = format!("{}/get_relevant_history", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("query", query), ("session_id", session_id)])
            .query(&[("top_k", top_k)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MemoryServiceError::Status { status: status.as_u16() });
        }

        let payload: RelevantHistoryResponse = response.json().await?;
        Ok(payload.relevant_history)
    }
}

/// Where a retrieved context came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextSource {
    /// The semantic service answered; its ranking was used as-is.
    Semantic,
    /// The service failed; the local word-overlap ranker supplied the turns.
    Fallback,
}

#[derive(Clone, Debug)]
pub struct RetrievedContext {
    pub turns: Vec<RelevantTurn>,
    pub source: ContextSource,
}

/// Failure-policy wrapper around a [`MemoryService`].
pub struct MemoryGateway {
    service: Arc<dyn MemoryService>,
}

impl MemoryGateway {
    pub fn new(service: Arc<dyn MemoryService>) -> Self {
        Self { service }
    }

    /// Offers one turn to semantic memory. Failure is logged and swallowed;
    /// the pipeline never depends on the outcome.
    pub async fn store_turn(&self, turn: &Turn) {
        if let Err(error) = self
            .service
            .store_message(&turn.session_id, &turn.text, turn.speaker.as_str())
            .await
        {
            tracing::warn!(
                event_name = "chat.memory.store_failed",
                session_id = %turn.session_id,
                role = turn.speaker.as_str(),
                error = %error,
                "semantic store failed; continuing without it"
            );
        }
    }

    /// Retrieves up to five turns of conversational context. Never fails:
    /// an empty session yields no context, and any service failure or
    /// undecodable payload falls back to ranking `full_history` locally.
    pub async fn retrieve_relevant(
        &self,
        query: &str,
        session_id: &str,
        full_history: &[ChatRecord],
    ) -> RetrievedContext {
        if full_history.is_empty() {
            return RetrievedContext { turns: Vec::new(), source: ContextSource::Semantic };
        }

        match self.service.relevant_history(query, session_id, MAX_RELEVANT_TURNS).await {
            Ok(entries) => match map_entries(session_id, entries) {
                Some(turns) => RetrievedContext { turns, source: ContextSource::Semantic },
                None => self.local_fallback(query, full_history),
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "chat.memory.retrieve_failed",
                    session_id = %session_id,
                    error = %error,
                    "semantic retrieval failed; ranking history locally"
                );
                self.local_fallback(query, full_history)
            }
        }
    }

    fn local_fallback(&self, query: &str, full_history: &[ChatRecord]) -> RetrievedContext {
        let turns =
            relevance::rank_history(query, full_history).iter().map(RelevantTurn::from).collect();
        RetrievedContext { turns, source: ContextSource::Fallback }
    }
}

/// Maps wire entries to turns. Returns `None` when the payload is malformed
/// (an unparseable timestamp), which the gateway treats like a failed call.
fn map_entries(session_id: &str, entries: Vec<MemoryEntry>) -> Option<Vec<RelevantTurn>> {
    let mut turns = Vec::new();
    for entry in entries {
        if turns.len() == MAX_RELEVANT_TURNS {
            break;
        }
        let Some(timestamp) = parse_timestamp(&entry.timestamp) else {
            tracing::warn!(
                event_name = "chat.memory.malformed_entry",
                timestamp = %entry.timestamp,
                "semantic entry carries an unparseable timestamp"
            );
            return None;
        };
        match entry.role.as_str() {
            "user" => turns.push(RelevantTurn::from_user_message(
                session_id,
                entry.message,
                timestamp,
            )),
            "bot" => {
                turns.push(RelevantTurn::from_bot_message(session_id, entry.message, timestamp))
            }
            other => {
                tracing::debug!(
                    event_name = "chat.memory.unknown_role",
                    role = other,
                    "skipping semantic entry with unrecognized role"
                );
            }
        }
    }
    Some(turns)
}

/// The sidecar emits `datetime.utcnow().isoformat()`, which has no offset;
/// accept both that and full RFC 3339.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
