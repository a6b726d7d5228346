//! Intent classification, analysis, and factual lookup.
//!
//! All three calls land on the NLP sidecar and all three are advisory:
//! classification is a log-only hint, analysis produces record-keeping
//! metadata with a fixed fallback, and the factual lookup treats every
//! failure as "no match" so the contextual path can take over.

use std::sync::Arc;

use async_trait::async_trait;
use deskbot_core::config::NlpConfig;
use deskbot_core::domain::chat::{new_session_id, RelevantTurn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const FALLBACK_INTENT: &str = "general_query";
pub const FALLBACK_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Error)]
pub enum IntentServiceError {
    #[error("intent request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("intent endpoint returned status {status}")]
    Status { status: u16 },
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalyzeRequest {
    pub text: String,
    pub session_id: String,
    pub prev_bot_response: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AnalyzeResponse {
    pub intent: Option<String>,
    #[serde(default)]
    pub entities: serde_json::Map<String, Value>,
    pub confidence: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FactualLookupRequest {
    pub text: String,
    pub history: Vec<String>,
    pub prev_bot_response: String,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    intent: Option<String>,
}

/// Raw wire operations against the NLP intent endpoints.
#[async_trait]
pub trait IntentService: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Option<String>, IntentServiceError>;

    async fn analyze(&self, request: &AnalyzeRequest)
        -> Result<AnalyzeResponse, IntentServiceError>;

    /// Free-form analyze call used for the CSV factual lookup. The response
    /// shape is open; the gateway decides whether it constitutes a match.
    async fn factual_lookup(
        &self,
        request: &FactualLookupRequest,
    ) -> Result<Value, IntentServiceError>;
}

/// HTTP implementation speaking to the NLP sidecar. Both analysis flavors
/// share the `/analyze` route and differ only in payload.
pub struct HttpIntentService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpIntentService {
    pub fn new(http: reqwest::Client, config: &NlpConfig) -> Self {
        Self { http, base_url: config.base_url.trim_end_matches('/').to_string() }
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<reqwest::Response, IntentServiceError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http.post(&url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IntentServiceError::Status { status: status.as_u16() });
        }
        Ok(response)
    }
}

#[async_trait]
impl IntentService for HttpIntentService {
    async fn classify(&self, text: &str) -> Result<Option<String>, IntentServiceError> {
        let response =
            self.post_json("classify_intent", &serde_json::json!({ "text": text })).await?;
        let payload: ClassifyResponse = response.json().await?;
        Ok(payload.intent)
    }

    async fn analyze(
        &self,
        request: &AnalyzeRequest,
    ) -> Result<AnalyzeResponse, IntentServiceError> {
        let response = self.post_json("analyze", request).await?;
        Ok(response.json().await?)
    }

    async fn factual_lookup(
        &self,
        request: &FactualLookupRequest,
    ) -> Result<Value, IntentServiceError> {
        let response = self.post_json("analyze", request).await?;
        Ok(response.json().await?)
    }
}

/// Where an analysis result came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisSource {
    /// The service answered; missing fields were defaulted individually.
    Service,
    /// The call failed; the whole tuple is the fixed fallback.
    Fallback,
}

/// Metadata attached to a persisted exchange. Never response-determining.
#[derive(Clone, Debug, PartialEq)]
pub struct IntentAnalysis {
    pub intent: String,
    pub entities: Vec<String>,
    pub confidence: f64,
    pub source: AnalysisSource,
}

impl IntentAnalysis {
    fn fallback() -> Self {
        Self {
            intent: FALLBACK_INTENT.to_string(),
            entities: Vec::new(),
            confidence: FALLBACK_CONFIDENCE,
            source: AnalysisSource::Fallback,
        }
    }
}

/// A CSV-grounded answer the pipeline rephrases instead of free-generating.
/// Similarity and the matched question are diagnostics; only `answer`
/// shapes the response.
#[derive(Clone, Debug, PartialEq)]
pub struct FactualAnswer {
    pub answer: String,
    pub similarity: Option<f64>,
    pub matched_question: Option<String>,
}

/// Failure-policy wrapper around an [`IntentService`].
pub struct IntentGateway {
    service: Arc<dyn IntentService>,
}

impl IntentGateway {
    pub fn new(service: Arc<dyn IntentService>) -> Self {
        Self { service }
    }

    /// Advisory classification hint. Absent on any failure; never branches
    /// the pipeline.
    pub async fn classify(&self, text: &str) -> Option<String> {
        match self.service.classify(text).await {
            Ok(intent) => intent,
            Err(error) => {
                tracing::warn!(
                    event_name = "chat.intent.classify_failed",
                    error = %error,
                    "intent classification failed; continuing without a hint"
                );
                None
            }
        }
    }

    /// Analyzes the message for record-keeping metadata. The session id is
    /// taken from the first history turn that carries one (fresh otherwise)
    /// and the most recent bot response rides along as context.
    pub async fn analyze(&self, text: &str, relevant_history: &[RelevantTurn]) -> IntentAnalysis {
        let session_id = relevant_history
            .iter()
            .find_map(|turn| turn.session_id.clone())
            .unwrap_or_else(new_session_id);
        let request = AnalyzeRequest {
            text: text.to_string(),
            session_id,
            prev_bot_response: latest_bot_response(relevant_history),
        };

        match self.service.analyze(&request).await {
            Ok(response) => IntentAnalysis {
                intent: response
                    .intent
                    .filter(|intent| !intent.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_INTENT.to_string()),
                entities: flatten_entities(&response.entities),
                confidence: response.confidence.unwrap_or(FALLBACK_CONFIDENCE),
                source: AnalysisSource::Service,
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "chat.intent.analyze_failed",
                    error = %error,
                    "intent analysis failed; recording the generic fallback"
                );
                IntentAnalysis::fallback()
            }
        }
    }

    /// Asks the sidecar for a direct CSV-grounded answer. Any transport
    /// failure or off-contract response shape means "no match".
    pub async fn factual_answer(
        &self,
        text: &str,
        prior_user_messages: Vec<String>,
        prev_bot_response: String,
    ) -> Option<FactualAnswer> {
        let request = FactualLookupRequest {
            text: text.to_string(),
            history: prior_user_messages,
            prev_bot_response,
        };
        match self.service.factual_lookup(&request).await {
            Ok(value) => parse_factual_answer(&value),
            Err(error) => {
                tracing::warn!(
                    event_name = "chat.intent.factual_lookup_failed",
                    error = %error,
                    "factual lookup failed; treating as no match"
                );
                None
            }
        }
    }
}

fn latest_bot_response(turns: &[RelevantTurn]) -> String {
    turns
        .iter()
        .filter(|turn| turn.bot_text.is_some())
        .max_by_key(|turn| turn.timestamp)
        .and_then(|turn| turn.bot_text.clone())
        .unwrap_or_default()
}

fn flatten_entities(entities: &serde_json::Map<String, Value>) -> Vec<String> {
    entities
        .values()
        .map(|value| match value.as_str() {
            Some(text) => text.to_string(),
            None => value.to_string(),
        })
        .collect()
}

fn parse_factual_answer(value: &Value) -> Option<FactualAnswer> {
    if value.get("source").and_then(Value::as_str) != Some("csv") {
        return None;
    }
    let answer = value.get("answer").and_then(Value::as_str)?.trim();
    if answer.is_empty() {
        return None;
    }
    Some(FactualAnswer {
        answer: answer.to_string(),
        similarity: value.get("similarity").and_then(Value::as_f64),
        matched_question: value.get("matched_question").and_then(Value::as_str).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::{Duration, Utc};
    use serde_json::json;

    #[derive(Default)]
    struct StubIntent {
        classify: Option<String>,
        classify_fails: bool,
        analysis: AnalyzeResponse,
        analyze_fails: bool,
        factual: Option<Value>,
        factual_fails: bool,
        analyze_requests: Mutex<Vec<AnalyzeRequest>>,
    }

    #[async_trait]
    impl IntentService for StubIntent {
        async fn classify(&self, _text: &str) -> Result<Option<String>, IntentServiceError> {
            if self.classify_fails {
                return Err(IntentServiceError::Status { status: 500 });
            }
            Ok(self.classify.clone())
        }

        async fn analyze(
            &self,
            request: &AnalyzeRequest,
        ) -> Result<AnalyzeResponse, IntentServiceError> {
            self.analyze_requests.lock().unwrap().push(request.clone());
            if self.analyze_fails {
                return Err(IntentServiceError::Status { status: 500 });
            }
            Ok(self.analysis.clone())
        }

        async fn factual_lookup(
            &self,
            _request: &FactualLookupRequest,
        ) -> Result<Value, IntentServiceError> {
            if self.factual_fails {
                return Err(IntentServiceError::Status { status: 502 });
            }
            Ok(self.factual.clone().unwrap_or_else(|| json!({ "source": "llm" })))
        }
    }

    fn gateway(stub: StubIntent) -> (IntentGateway, Arc<StubIntent>) {
        let stub = Arc::new(stub);
        (IntentGateway::new(Arc::clone(&stub) as Arc<dyn IntentService>), stub)
    }

    #[tokio::test]
    async fn classify_passes_the_service_intent_through() {
        let (gateway, _) =
            gateway(StubIntent { classify: Some("hr_query".into()), ..StubIntent::default() });

        assert_eq!(gateway.classify("leave").await.as_deref(), Some("hr_query"));
    }

    #[tokio::test]
    async fn classify_failure_yields_no_hint() {
        let (gateway, _) = gateway(StubIntent { classify_fails: true, ..StubIntent::default() });

        assert_eq!(gateway.classify("leave").await, None);
    }

    #[tokio::test]
    async fn analyze_maps_service_fields() {
        let entities = json!({ "department": "HR", "days": 14 });
        let (gateway, _) = gateway(StubIntent {
            analysis: AnalyzeResponse {
                intent: Some("leave_query".into()),
                entities: entities.as_object().unwrap().clone(),
                confidence: Some(0.42),
            },
            ..StubIntent::default()
        });

        let analysis = gateway.analyze("how many leave days", &[]).await;

        assert_eq!(analysis.intent, "leave_query");
        assert_eq!(analysis.entities, vec!["14".to_string(), "HR".to_string()]);
        assert_eq!(analysis.confidence, 0.42);
        assert_eq!(analysis.source, AnalysisSource::Service);
    }

    #[tokio::test]
    async fn analyze_defaults_missing_fields_individually() {
        let (gateway, _) = gateway(StubIntent::default());

        let analysis = gateway.analyze("hello", &[]).await;

        assert_eq!(analysis.intent, FALLBACK_INTENT);
        assert!(analysis.entities.is_empty());
        assert_eq!(analysis.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(analysis.source, AnalysisSource::Service);
    }

    #[tokio::test]
    async fn analyze_failure_returns_the_fixed_fallback() {
        let (gateway, _) = gateway(StubIntent { analyze_fails: true, ..StubIntent::default() });

        let analysis = gateway.analyze("hello", &[]).await;

        assert_eq!(
            analysis,
            IntentAnalysis {
                intent: "general_query".into(),
                entities: vec![],
                confidence: 0.9,
                source: AnalysisSource::Fallback,
            }
        );
    }

    #[tokio::test]
    async fn analyze_derives_session_and_latest_bot_response() {
        let (gateway, stub) = gateway(StubIntent::default());
        let base = Utc::now();
        let turns = vec![
            RelevantTurn::from_user_message("s-9", "first question", base),
            RelevantTurn::from_bot_message("s-9", "earlier answer", base + Duration::seconds(1)),
            RelevantTurn::from_user_message("s-9", "second question", base + Duration::seconds(2)),
        ];

        gateway.analyze("third question", &turns).await;

        let requests = stub.analyze_requests.lock().unwrap();
        assert_eq!(requests[0].session_id, "s-9");
        assert_eq!(requests[0].prev_bot_response, "earlier answer");
        assert_eq!(requests[0].text, "third question");
    }

    #[tokio::test]
    async fn analyze_generates_a_fresh_session_for_bare_history() {
        let (gateway, stub) = gateway(StubIntent::default());

        gateway.analyze("hello", &[]).await;

        let requests = stub.analyze_requests.lock().unwrap();
        assert!(!requests[0].session_id.is_empty());
        assert_eq!(requests[0].prev_bot_response, "");
    }

    #[tokio::test]
    async fn factual_answer_requires_csv_source_and_a_real_answer() {
        let cases = [
            (json!({ "source": "csv", "answer": "Two weeks notice." }), true),
            (json!({ "source": "llm", "answer": "Two weeks notice." }), false),
            (json!({ "source": "csv", "answer": "   " }), false),
            (json!({ "source": "csv" }), false),
            (json!({ "answer": "Two weeks notice." }), false),
        ];

        for (value, expected) in cases {
            let (gateway, _) =
                gateway(StubIntent { factual: Some(value.clone()), ..StubIntent::default() });
            let result = gateway.factual_answer("q", vec![], String::new()).await;
            assert_eq!(result.is_some(), expected, "value: {value}");
        }
    }

    #[tokio::test]
    async fn factual_transport_failure_means_no_match() {
        let (gateway, _) = gateway(StubIntent { factual_fails: true, ..StubIntent::default() });

        assert_eq!(gateway.factual_answer("q", vec![], String::new()).await, None);
    }

    #[test]
    fn trimmed_factual_answers_keep_their_inner_text() {
        let value = json!({ "source": "csv", "answer": "  Two weeks.  " });

        let parsed = parse_factual_answer(&value).unwrap();
        assert_eq!(parsed.answer, "Two weeks.");
        assert_eq!(parsed.similarity, None);
        assert_eq!(parsed.matched_question, None);
    }

    #[test]
    fn factual_answers_carry_match_diagnostics_when_present() {
        let value = json!({
            "source": "csv",
            "answer": "Two weeks.",
            "similarity": 0.93,
            "matched_question": "how much notice for leave?"
        });

        let parsed = parse_factual_answer(&value).unwrap();
        assert_eq!(parsed.similarity, Some(0.93));
        assert_eq!(parsed.matched_question.as_deref(), Some("how much notice for leave?"));
    }
}
