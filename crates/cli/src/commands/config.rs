use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use deskbot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["DESKBOT_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["DESKBOT_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["DESKBOT_DATABASE_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "llm.base_url",
        &config.llm.base_url,
        source("llm.base_url", &["DESKBOT_LLM_BASE_URL"]),
    ));
    lines.push(render_line(
        "llm.api_key",
        &redact_token(config.llm.api_key.expose_secret()),
        source("llm.api_key", &["DESKBOT_LLM_API_KEY"]),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", &["DESKBOT_LLM_MODEL"]),
    ));
    lines.push(render_line(
        "llm.temperature",
        &config.llm.temperature.to_string(),
        source("llm.temperature", &["DESKBOT_LLM_TEMPERATURE"]),
    ));
    lines.push(render_line(
        "llm.max_tokens",
        &config.llm.max_tokens.to_string(),
        source("llm.max_tokens", &["DESKBOT_LLM_MAX_TOKENS"]),
    ));
    lines.push(render_line(
        "llm.top_p",
        &config.llm.top_p.to_string(),
        source("llm.top_p", &["DESKBOT_LLM_TOP_P"]),
    ));
    lines.push(render_line(
        "llm.presence_penalty",
        &config.llm.presence_penalty.to_string(),
        source("llm.presence_penalty", &["DESKBOT_LLM_PRESENCE_PENALTY"]),
    ));
    lines.push(render_line(
        "llm.frequency_penalty",
        &config.llm.frequency_penalty.to_string(),
        source("llm.frequency_penalty", &["DESKBOT_LLM_FREQUENCY_PENALTY"]),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", &["DESKBOT_LLM_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "nlp.base_url",
        &config.nlp.base_url,
        source("nlp.base_url", &["DESKBOT_NLP_BASE_URL"]),
    ));
    lines.push(render_line(
        "nlp.timeout_secs",
        &config.nlp.timeout_secs.to_string(),
        source("nlp.timeout_secs", &["DESKBOT_NLP_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["DESKBOT_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["DESKBOT_SERVER_PORT"]),
    ));

    lines.push(render_line(
        "history.backend",
        &format!("{:?}", config.history.backend),
        source("history.backend", &["DESKBOT_HISTORY_BACKEND"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["DESKBOT_LOGGING_LEVEL", "DESKBOT_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["DESKBOT_LOGGING_FORMAT", "DESKBOT_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("deskbot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/deskbot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
