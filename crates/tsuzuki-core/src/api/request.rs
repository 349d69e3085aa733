//! Request types and body building.
//!
//! This module handles constructing the chat-completions request body for a
//! generation call, applying the per-call sampling parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// What a caller supplies to start a generation.
///
/// Prompt assembly (persona, history, world info) happens upstream; these are
/// the final strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromptInputs {
    #[serde(default)]
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Name of the character the content is written for, if any.
    #[serde(default)]
    pub character_name: Option<String>,
    /// Name the user goes by, if any.
    #[serde(default)]
    pub user_name: Option<String>,
}

/// One call to the completion provider. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub streaming: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn from_inputs(inputs: &PromptInputs, streaming: bool) -> Self {
        Self {
            system_prompt: inputs.system_prompt.clone(),
            user_prompt: inputs.user_prompt.clone(),
            model: inputs.model.clone(),
            streaming,
            max_tokens: inputs.max_tokens,
            temperature: inputs.temperature,
        }
    }

    /// Same sampling parameters, different prompt text.
    pub fn with_prompts(&self, system_prompt: String, user_prompt: String) -> Self {
        Self {
            system_prompt,
            user_prompt,
            ..self.clone()
        }
    }
}

/// Build an OpenAI-compatible chat-completions body for `request`.
pub fn build_request_body(request: &GenerationRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.is_empty() {
        messages.push(json!({
            "role": "system",
            "content": request.system_prompt,
        }));
    }
    messages.push(json!({
        "role": "user",
        "content": request.user_prompt,
    }));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": request.streaming,
    });

    // Max tokens
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    // Temperature
    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inputs() -> PromptInputs {
        PromptInputs {
            system_prompt: "Write HTML.".to_string(),
            user_prompt: "Describe the tavern.".to_string(),
            model: "test-model".to_string(),
            max_tokens: Some(2048),
            temperature: Some(0.5),
            ..Default::default()
        }
    }

    #[test]
    fn test_body_contains_messages_and_params() {
        let request = GenerationRequest::from_inputs(&sample_inputs(), true);
        let body = build_request_body(&request);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Describe the tavern.");
    }

    #[test]
    fn test_body_omits_unset_params_and_empty_system() {
        let inputs = PromptInputs {
            system_prompt: String::new(),
            max_tokens: None,
            temperature: None,
            ..sample_inputs()
        };
        let body = build_request_body(&GenerationRequest::from_inputs(&inputs, false));
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_with_prompts_keeps_sampling() {
        let request = GenerationRequest::from_inputs(&sample_inputs(), true);
        let next = request.with_prompts("sys".to_string(), "user".to_string());
        assert_eq!(next.model, "test-model");
        assert_eq!(next.max_tokens, Some(2048));
        assert!(next.streaming);
        assert_eq!(next.user_prompt, "user");
    }
}
