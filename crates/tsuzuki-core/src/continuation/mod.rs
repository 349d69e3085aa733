//! Continuation cycle state and request building.

pub mod context;
pub mod prompt;

pub use context::ContinuationContext;
pub use prompt::continuation_request;

use crate::api::request::PromptInputs;
use serde::Serialize;

/// Progress of one truncation/continuation cycle.
///
/// Owned by a single engine. Created when the first truncation is detected,
/// updated once per continuation, and reset when the cycle resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContinuationState {
    pub is_active: bool,
    /// Continuation calls issued so far. Never exceeds `max_retries`.
    pub retry_count: usize,
    pub max_retries: usize,
    /// Sanitized output of the initial call.
    pub original_content: String,
    /// Everything merged so far.
    pub accumulated_content: String,
    pub original_prompt: String,
    pub character_name: Option<String>,
    pub user_name: Option<String>,
}

impl ContinuationState {
    /// Start a cycle seeded with the first truncated output.
    pub fn begin(content: String, inputs: &PromptInputs, max_retries: usize) -> Self {
        Self {
            is_active: true,
            retry_count: 0,
            max_retries,
            original_content: content.clone(),
            accumulated_content: content,
            original_prompt: inputs.user_prompt.clone(),
            character_name: inputs.character_name.clone(),
            user_name: inputs.user_name.clone(),
        }
    }

    /// Whether another continuation call fits in the budget.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn context(&self) -> ContinuationContext {
        context::build(&self.accumulated_content, &self.original_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> PromptInputs {
        PromptInputs {
            user_prompt: "Describe the harbour at dawn".to_string(),
            model: "m".to_string(),
            character_name: Some("Mira".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_begin_seeds_both_contents() {
        let state = ContinuationState::begin("<div>Gulls".to_string(), &inputs(), 2);
        assert!(state.is_active);
        assert_eq!(state.original_content, "<div>Gulls");
        assert_eq!(state.accumulated_content, "<div>Gulls");
        assert_eq!(state.original_prompt, "Describe the harbour at dawn");
        assert_eq!(state.character_name.as_deref(), Some("Mira"));
        assert_eq!(state.retry_count, 0);
    }

    #[test]
    fn test_retry_budget() {
        let mut state = ContinuationState::begin("x".to_string(), &inputs(), 2);
        assert!(state.can_retry());
        state.retry_count = 2;
        assert!(!state.can_retry());
    }

    #[test]
    fn test_default_is_inactive() {
        assert!(!ContinuationState::default().is_active);
    }

    #[test]
    fn test_context_reflects_accumulated_content() {
        let state = ContinuationState::begin("<div>Hello wor".to_string(), &inputs(), 3);
        let ctx = state.context();
        assert_eq!(ctx.incomplete_text, "wor");
        assert_eq!(ctx.original_prompt, "Describe the harbour at dawn");
    }
}
