use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use deskbot_core::config::NlpConfig;
use deskbot_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: Option<DbPool>,
    http: reqwest::Client,
    nlp_base_url: String,
}

impl HealthState {
    pub fn new(db_pool: Option<DbPool>, http: reqwest::Client, nlp: &NlpConfig) -> Self {
        Self { db_pool, http, nlp_base_url: nlp.base_url.trim_end_matches('/').to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub nlp: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(state.db_pool.as_ref()).await;
    let nlp = nlp_check(&state.http, &state.nlp_base_url).await;
    let ready = database.status == "ready" && nlp.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        nlp,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: Option<&DbPool>) -> HealthCheck {
    let Some(pool) = pool else {
        return HealthCheck { status: "ready", detail: "history backend is in-memory".to_string() };
    };
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn nlp_check(http: &reqwest::Client, base_url: &str) -> HealthCheck {
    let url = format!("{base_url}/health");
    match http.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            HealthCheck { status: "ready", detail: "nlp service responded".to_string() }
        }
        Ok(response) => HealthCheck {
            status: "degraded",
            detail: format!("nlp service returned status {}", response.status().as_u16()),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("nlp service unreachable: {error}"),
        },
    }
}
