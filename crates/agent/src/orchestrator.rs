//! The conversation pipeline.
//!
//! One call to [`ChatOrchestrator::handle_message`] is one unit of work:
//! validate, load history, offer the user turn to memory, try the factual
//! short-circuit, otherwise generate against retrieved context, then store
//! the bot turn and persist the exchange. Requests are independent; two
//! concurrent requests on the same session may interleave history reads,
//! which is accepted rather than locked against.

use std::sync::Arc;

use deskbot_core::domain::chat::{new_session_id, ChatRecord, Speaker, Turn};
use deskbot_core::errors::{ApplicationError, DomainError};
use deskbot_core::prompt::{self, PromptMessage};
use deskbot_db::repositories::{ChatHistoryRepository, RepositoryError};
use thiserror::Error;

use crate::intent::IntentGateway;
use crate::llm::{LlmClient, LlmError};
use crate::memory::MemoryGateway;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("user message must not be empty")]
    EmptyMessage,
    #[error("response generation failed: {0}")]
    Completion(#[from] LlmError),
    #[error("failed to persist the exchange: {0}")]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Record(#[from] DomainError),
}

impl From<ChatError> for ApplicationError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::EmptyMessage => ApplicationError::Domain(DomainError::EmptyUserMessage),
            ChatError::Completion(inner) => ApplicationError::Completion(inner.to_string()),
            ChatError::Persistence(inner) => ApplicationError::Persistence(inner.to_string()),
            ChatError::Record(inner) => ApplicationError::Domain(inner),
        }
    }
}

/// What the caller gets back: the response text and the session it belongs
/// to, which is freshly generated on first contact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub session_id: String,
}

pub struct ChatOrchestrator {
    llm: Arc<dyn LlmClient>,
    memory: MemoryGateway,
    intent: IntentGateway,
    history: Arc<dyn ChatHistoryRepository>,
}

impl ChatOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: MemoryGateway,
        intent: IntentGateway,
        history: Arc<dyn ChatHistoryRepository>,
    ) -> Self {
        Self { llm, memory, intent, history }
    }

    pub async fn handle_message(
        &self,
        user_message: &str,
        session_id: Option<&str>,
    ) -> Result<ChatReply, ChatError> {
        if user_message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let session_id = match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let fresh = new_session_id();
                tracing::info!(
                    event_name = "chat.session.created",
                    session_id = %fresh,
                    "starting a new session"
                );
                fresh
            }
        };

        let history = self.history.list_by_session(&session_id).await?;

        self.memory.store_turn(&Turn::new(session_id.as_str(), Speaker::User, user_message)).await;

        if let Some(hint) = self.intent.classify(user_message).await {
            tracing::info!(
                event_name = "chat.intent.hint",
                session_id = %session_id,
                intent = %hint,
                "classified inbound message"
            );
        }

        let prior_user_messages: Vec<String> =
            history.iter().map(|record| record.user_message.clone()).collect();
        let prev_bot_response =
            history.last().map(|record| record.bot_response.clone()).unwrap_or_default();

        if let Some(factual) =
            self.intent.factual_answer(user_message, prior_user_messages, prev_bot_response).await
        {
            tracing::info!(
                event_name = "chat.factual.matched",
                session_id = %session_id,
                similarity = factual.similarity,
                "rephrasing a factual answer"
            );
            let text = self.generate(&prompt::rephrase_prompt(user_message, &factual.answer)).await?;
            return self
                .finalize(
                    session_id,
                    user_message,
                    text,
                    Some("csv_match".to_string()),
                    Vec::new(),
                    Some(1.0),
                )
                .await;
        }

        let context = self.memory.retrieve_relevant(user_message, &session_id, &history).await;
        tracing::debug!(
            event_name = "chat.context.assembled",
            session_id = %session_id,
            turn_count = context.turns.len(),
            source = ?context.source,
            "assembled conversational context"
        );

        let text = self.generate(&prompt::contextual_prompt(&context.turns, user_message)).await?;

        let analysis = self.intent.analyze(user_message, &context.turns).await;
        tracing::info!(
            event_name = "chat.intent.analyzed",
            session_id = %session_id,
            intent = %analysis.intent,
            confidence = analysis.confidence,
            source = ?analysis.source,
            "attached intent metadata"
        );

        self.finalize(
            session_id,
            user_message,
            text,
            Some(analysis.intent),
            analysis.entities,
            Some(analysis.confidence),
        )
        .await
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<String, ChatError> {
        let text = self.llm.complete(messages).await?;
        if text.trim().is_empty() {
            return Err(ChatError::Completion(LlmError::EmptyCompletion));
        }
        Ok(text)
    }

    /// Stores the bot turn (advisory) and persists the exchange (required).
    /// Ordering matters: memory is offered the turn before the write so that
    /// a persistence failure never leaves memory behind the durable record.
    async fn finalize(
        &self,
        session_id: String,
        user_message: &str,
        text: String,
        intent: Option<String>,
        entities: Vec<String>,
        confidence: Option<f64>,
    ) -> Result<ChatReply, ChatError> {
        self.memory.store_turn(&Turn::new(session_id.as_str(), Speaker::Bot, text.as_str())).await;

        let record = ChatRecord::new(session_id.as_str(), user_message, text.as_str())?
            .with_metadata(intent, entities, confidence);
        self.history.append(record).await?;

        tracing::info!(
            event_name = "chat.exchange.persisted",
            session_id = %session_id,
            "exchange persisted"
        );
        Ok(ChatReply { text, session_id })
    }
}
