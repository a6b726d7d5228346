//! Prompt assembly for the completion call. Pure construction: the builders
//! take already-retrieved context and never perform I/O.

use serde::{Deserialize, Serialize};

use crate::domain::chat::RelevantTurn;
use crate::relevance::MAX_RELEVANT_TURNS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Assistant, content: content.into() }
    }
}

/// Fixed instruction opening every contextual prompt: topic scope, refusal
/// wording, response-style guidance, and the history-awareness reminder.
pub const SYSTEM_PROMPT: &str = concat!(
    "You are an intelligent ERP assistant. You must ONLY answer questions related to ",
    "company ERP, HR, business processes, organizational tasks, sales, project management, ",
    "or related company workflows. If a user asks a follow-up question, use the previous ",
    "conversation context to clarify and answer if it is ERP-related. Only refuse if the ",
    "question is clearly not related to ERP, HR, or business processes. If a user asks a ",
    "question that is not related to these topics, politely refuse to answer and say: ",
    "'I'm sorry, I can only assist with company ERP-related questions and processes.' ",
    "Do NOT answer questions about general knowledge, unrelated topics, or personal ",
    "matters. Be strict in this policy.\n",
    "\n",
    "You have access to information regarding:\n",
    "- HR policies including attendance, leave, conduct, and performance evaluation\n",
    "- Business processes and workflows\n",
    "- Organizational data and procedures\n",
    "- Sales and marketing information\n",
    "- Project management details\n",
    "- Customer service guidelines\n",
    "- Compliance requirements\n",
    "- Training materials\n",
    "Guidelines for responses:\n",
    "1. For general greetings or casual questions:\n",
    "   - Respond naturally and briefly\n",
    "   - Be friendly but professional\n",
    "   - Offer to help with specific tasks\n",
    "   - Mention key areas you can assist with (HR, Sales, Finance, etc.)\n",
    "2. For specific questions:\n",
    "   - Provide helpful and accurate information\n",
    "   - Be clear and concise\n",
    "   - If you're not sure about something, say so\n",
    "   - Suggest relevant areas or departments that might help\n",
    "   - If you cannot find a direct answer within your knowledge, state that and offer ",
    "to help with other ERP-related questions.\n",
    "\n",
    "**Important:** Consider the current conversation history to maintain context and ",
    "respond coherently. Do not repeat information already provided in previous turns ",
    "unless explicitly asked.",
);

/// System instruction, then the retrieved turns re-expanded into alternating
/// user/assistant messages in the order given, then the current message.
/// Context is capped at [`MAX_RELEVANT_TURNS`] regardless of input length.
pub fn contextual_prompt(relevant_turns: &[RelevantTurn], user_message: &str) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(2 + relevant_turns.len().min(MAX_RELEVANT_TURNS) * 2);
    messages.push(PromptMessage::system(SYSTEM_PROMPT));

    for turn in relevant_turns.iter().take(MAX_RELEVANT_TURNS) {
        if let Some(text) = &turn.user_text {
            messages.push(PromptMessage::user(text.clone()));
        }
        if let Some(text) = &turn.bot_text {
            messages.push(PromptMessage::assistant(text.clone()));
        }
    }

    messages.push(PromptMessage::user(user_message));
    messages
}

/// Prompt for the factual short-circuit: restate a pre-known answer
/// conversationally without adding information.
pub fn rephrase_prompt(user_message: &str, factual_answer: &str) -> Vec<PromptMessage> {
    let instruction = format!(
        "You are an intelligent ERP assistant.\n\
         Rephrase the following answer in a friendly, conversational way for the user, \
         but do not add any information not present in the answer.\n\
         If the answer is unclear, clarify only using the information provided.\n\
         User question: {user_message}\n\
         ERP answer: {factual_answer}"
    );

    vec![PromptMessage::system(instruction), PromptMessage::user(user_message)]
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{contextual_prompt, rephrase_prompt, PromptRole, SYSTEM_PROMPT};
    use crate::domain::chat::RelevantTurn;

    fn full_turn(user_text: &str, bot_text: &str) -> RelevantTurn {
        RelevantTurn {
            session_id: Some("s-1".to_string()),
            user_text: Some(user_text.to_string()),
            bot_text: Some(bot_text.to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn contextual_prompt_interleaves_history_between_system_and_current_message() {
        let turns = vec![
            full_turn("q1", "a1"),
            full_turn("q2", "a2"),
            full_turn("q3", "a3"),
        ];

        let messages = contextual_prompt(&turns, "current question");

        assert_eq!(messages.len(), 8);
        let roles: Vec<PromptRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                PromptRole::System,
                PromptRole::User,
                PromptRole::Assistant,
                PromptRole::User,
                PromptRole::Assistant,
                PromptRole::User,
                PromptRole::Assistant,
                PromptRole::User,
            ]
        );
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1].content, "q1");
        assert_eq!(messages[2].content, "a1");
        assert_eq!(messages[7].content, "current question");
    }

    #[test]
    fn contextual_prompt_without_history_is_system_plus_user() {
        let messages = contextual_prompt(&[], "hello");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, PromptRole::System);
        assert_eq!(messages[1].role, PromptRole::User);
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn contextual_prompt_caps_history_at_five_turns() {
        let turns: Vec<RelevantTurn> =
            (0..7).map(|n| full_turn(&format!("q{n}"), &format!("a{n}"))).collect();

        let messages = contextual_prompt(&turns, "current");

        // 1 system + 5 capped turns * 2 + 1 current.
        assert_eq!(messages.len(), 12);
    }

    #[test]
    fn half_populated_turns_contribute_single_messages() {
        let turns = vec![
            RelevantTurn::from_bot_message("s-1", "a1", Utc::now()),
            RelevantTurn::from_user_message("s-1", "q2", Utc::now()),
        ];

        let messages = contextual_prompt(&turns, "current");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].role, PromptRole::Assistant);
        assert_eq!(messages[2].role, PromptRole::User);
    }

    #[test]
    fn rephrase_prompt_carries_question_and_answer_in_the_instruction() {
        let messages = rephrase_prompt("How much notice for leave?", "Two weeks notice.");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, PromptRole::System);
        assert!(messages[0].content.contains("User question: How much notice for leave?"));
        assert!(messages[0].content.contains("ERP answer: Two weeks notice."));
        assert_eq!(messages[1].role, PromptRole::User);
        assert_eq!(messages[1].content, "How much notice for leave?");
    }

    #[test]
    fn system_instruction_keeps_refusal_and_history_wording() {
        assert!(SYSTEM_PROMPT.contains(
            "I'm sorry, I can only assist with company ERP-related questions and processes."
        ));
        assert!(SYSTEM_PROMPT.contains("Do not repeat information already provided"));
    }

    #[test]
    fn prompt_roles_serialize_lowercase_for_the_completion_wire() {
        let encoded = serde_json::to_string(&super::PromptMessage::assistant("hi"))
            .expect("serializable message");
        assert_eq!(encoded, r#"{"role":"assistant","content":"hi"}"#);
    }
}
