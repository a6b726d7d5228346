pub mod config;
pub mod domain;
pub mod errors;
pub mod prompt;
pub mod relevance;

pub use domain::chat::{new_session_id, ChatRecord, RelevantTurn, Speaker, Turn};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use prompt::{contextual_prompt, rephrase_prompt, PromptMessage, PromptRole};
pub use relevance::{rank_history, score, MAX_RELEVANT_TURNS, RELEVANCE_THRESHOLD};
