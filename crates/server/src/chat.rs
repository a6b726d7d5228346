//! Caller-facing chat surface.
//!
//! One route: `POST /api/chat/send`. The envelope mirrors what desktop
//! clients already consume: `success`/`message` always, `data` on success,
//! `errors` on failure, and `sessionId` so the client can thread the
//! conversation.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use deskbot_agent::ChatOrchestrator;
use deskbot_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    pub orchestrator: Arc<ChatOrchestrator>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub user_message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<String>,
    pub errors: Vec<String>,
    pub session_id: Option<String>,
}

pub fn router(state: ChatState) -> Router {
    Router::new().route("/api/chat/send", post(send_message)).with_state(state)
}

pub async fn send_message(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<ChatResponse>) {
    let correlation_id = Uuid::new_v4().to_string();
    info!(
        event_name = "api.chat.received",
        correlation_id = %correlation_id,
        has_session = request.session_id.is_some(),
        "chat message received"
    );

    match state
        .orchestrator
        .handle_message(&request.user_message, request.session_id.as_deref())
        .await
    {
        Ok(reply) => {
            info!(
                event_name = "api.chat.replied",
                correlation_id = %correlation_id,
                session_id = %reply.session_id,
                "chat message processed"
            );
            (
                StatusCode::OK,
                Json(ChatResponse {
                    success: true,
                    message: "Message processed successfully".to_string(),
                    data: Some(reply.text),
                    errors: Vec::new(),
                    session_id: Some(reply.session_id),
                }),
            )
        }
        Err(chat_error) => {
            let interface =
                ApplicationError::from(chat_error).into_interface(correlation_id.as_str());
            error!(
                event_name = "api.chat.failed",
                correlation_id = %correlation_id,
                detail = %interface.detail(),
                "chat request failed"
            );

            let (status, errors) = match &interface {
                InterfaceError::BadRequest { .. } => {
                    (StatusCode::BAD_REQUEST, vec!["Message is required".to_string()])
                }
                InterfaceError::UpstreamFailure { .. } | InterfaceError::Internal { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, vec![interface.detail().to_string()])
                }
            };
            (
                status,
                Json(ChatResponse {
                    success: false,
                    message: interface.user_message().to_string(),
                    data: None,
                    errors,
                    session_id: request.session_id,
                }),
            )
        }
    }
}
