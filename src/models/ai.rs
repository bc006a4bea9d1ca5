use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One turn in an OpenAI-chat-style conversation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ValidateRequest {
    #[validate(length(min = 1, max = 20000))]
    pub code: String,
    #[validate(length(min = 1))]
    pub exercise: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub is_correct: bool,
    pub feedback: String,
}

impl ValidateResponse {
    /// The degraded answer for an AI reply we cannot parse. A flaky model
    /// response becomes "try again", never a 500.
    pub fn fallback() -> Self {
        Self {
            is_correct: false,
            feedback: "We could not evaluate your code this time. Please try again.".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ChatRequest {
    #[validate(length(min = 1))]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct HintRequest {
    #[validate(length(max = 20000))]
    pub code: String,
    #[validate(length(min = 1))]
    pub exercise: String,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct HintResponse {
    pub hint: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ExecuteRequest {
    #[validate(length(min = 1, max = 50000))]
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "javascript".to_string()
}

/// Passthrough of the sandbox's result.
#[derive(Serialize, Deserialize, Debug, JsonSchema)]
pub struct ExecuteResponse {
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct GenerateRequest {
    #[validate(length(min = 1, max = 200))]
    pub topic: String,
    #[validate(length(min = 1, max = 50))]
    pub difficulty: String,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct GenerateResponse {
    pub exercise: serde_json::Value,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct DailyChallengeResponse {
    pub date: String,
    pub challenge: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_response_uses_camel_case_on_the_wire() {
        let json = serde_json::to_string(&ValidateResponse {
            is_correct: true,
            feedback: "nice".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"isCorrect":true,"feedback":"nice"}"#);
    }

    #[test]
    fn execute_request_defaults_language() {
        let parsed: ExecuteRequest = serde_json::from_str(r#"{"code":"print(1)"}"#).unwrap();
        assert_eq!(parsed.language, "javascript");
    }

    #[test]
    fn execute_response_tolerates_missing_error_field() {
        let parsed: ExecuteResponse = serde_json::from_str(r#"{"output":"42\n"}"#).unwrap();
        assert_eq!(parsed.output, "42\n");
        assert!(parsed.error.is_none());
    }
}
