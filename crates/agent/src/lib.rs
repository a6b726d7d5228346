//! Agent runtime - conversation orchestration over pluggable collaborators
//!
//! This crate is the "brain" of the deskbot system - the pipeline that turns
//! one incoming user message into one persisted exchange:
//! - Loads the session's history and offers both turns to semantic memory
//! - Short-circuits through a factual (CSV-backed) answer when the NLP
//!   service reports a match, rephrasing it instead of free-generating
//! - Otherwise builds a context-grounded prompt and calls the language model
//! - Records intent/entity metadata alongside the persisted exchange
//!
//! # Architecture
//!
//! The orchestrator is a fixed state machine (see `orchestrator` module):
//! 1. **Validation** - reject empty messages before any network call
//! 2. **Factual lookup** (`intent`) - CSV match → rephrase branch
//! 3. **Context retrieval** (`memory`) - semantic query with a local
//!    word-overlap fallback when the service is unreachable
//! 4. **Completion** (`llm`) - the only response-critical external call
//!
//! # Key Types
//!
//! - `ChatOrchestrator` - main pipeline (see `orchestrator` module)
//! - `LlmClient` - pluggable completion trait (OpenRouter-shaped HTTP impl)
//! - `MemoryGateway` / `IntentGateway` - failure-policy wrappers around the
//!   NLP sidecar; advisory calls never fail the request
//!
//! # Failure Principle
//!
//! External calls are graded: telemetry-grade calls (store, classify,
//! analyze) are swallowed with a warning, context retrieval degrades to a
//! local ranker, and only the completion call and history persistence can
//! fail the request.

pub mod intent;
pub mod llm;
pub mod memory;
pub mod orchestrator;

pub use intent::{
    AnalysisSource, FactualAnswer, HttpIntentService, IntentAnalysis, IntentGateway, IntentService,
};
pub use llm::{LlmClient, LlmError, OpenRouterClient};
pub use memory::{ContextSource, HttpMemoryService, MemoryGateway, MemoryService, RetrievedContext};
pub use orchestrator::{ChatError, ChatOrchestrator, ChatReply};
