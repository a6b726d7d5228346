use std::sync::Arc;
use std::time::Duration;

use deskbot_agent::{
    ChatOrchestrator, HttpIntentService, HttpMemoryService, IntentGateway, MemoryGateway,
    OpenRouterClient,
};
use deskbot_core::config::{AppConfig, ConfigError, HistoryBackend, LoadOptions};
use deskbot_db::repositories::{
    ChatHistoryRepository, InMemoryChatHistoryRepository, SqliteChatHistoryRepository,
};
use deskbot_db::{connect, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    /// Present only for the sqlite history backend.
    pub db_pool: Option<DbPool>,
    pub nlp_http: reqwest::Client,
    pub orchestrator: Arc<ChatOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let (db_pool, history) = connect_history(&config).await?;

    let llm_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.llm.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;
    let nlp_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.nlp.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let llm = Arc::new(OpenRouterClient::new(llm_http, config.llm.clone()));
    let memory =
        MemoryGateway::new(Arc::new(HttpMemoryService::new(nlp_http.clone(), &config.nlp)));
    let intent =
        IntentGateway::new(Arc::new(HttpIntentService::new(nlp_http.clone(), &config.nlp)));
    let orchestrator = Arc::new(ChatOrchestrator::new(llm, memory, intent, history));

    info!(
        event_name = "system.bootstrap.ready",
        history_backend = ?config.history.backend,
        "application collaborators wired"
    );

    Ok(Application { config, db_pool, nlp_http, orchestrator })
}

async fn connect_history(
    config: &AppConfig,
) -> Result<(Option<DbPool>, Arc<dyn ChatHistoryRepository>), BootstrapError> {
    match config.history.backend {
        HistoryBackend::Sqlite => {
            let pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
            info!(
                event_name = "system.bootstrap.database_connected",
                "database connection established"
            );

            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.migrations_applied",
                "database migrations applied"
            );

            Ok((Some(pool.clone()), Arc::new(SqliteChatHistoryRepository::new(pool))))
        }
        HistoryBackend::Memory => {
            info!(
                event_name = "system.bootstrap.memory_history",
                "using the in-memory history backend; exchanges will not survive restarts"
            );
            Ok((None, Arc::new(InMemoryChatHistoryRepository::default())))
        }
    }
}

#[cfg(test)]
mod tests {
    use deskbot_core::config::{ConfigOverrides, HistoryBackend, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str, backend: HistoryBackend) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_api_key: Some("sk-test".to_string()),
                history_backend: Some(backend),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_prepares_the_sqlite_schema() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared", HistoryBackend::Sqlite))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let pool = app.db_pool.clone().expect("sqlite backend keeps a pool");
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'chat_history'",
        )
        .fetch_one(&pool)
        .await
        .expect("schema query should succeed");
        assert_eq!(count, 1, "bootstrap should create the chat_history table");

        pool.close().await;
    }

    #[tokio::test]
    async fn memory_backend_skips_the_database() {
        let app = bootstrap(valid_overrides("sqlite::memory:", HistoryBackend::Memory))
            .await
            .expect("bootstrap should succeed for the memory backend");

        assert!(app.db_pool.is_none());
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_an_api_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_key"));
    }
}
