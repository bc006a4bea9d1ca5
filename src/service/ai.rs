use crate::config::AiConfig;
use crate::error::app_error::AppError;
use crate::models::ai::{ChatMessage, ExecuteResponse, ValidateResponse};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// How much conversation tail the chat endpoint forwards upstream.
const CHAT_HISTORY_LIMIT: usize = 10;

#[derive(Serialize, Debug)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct CompletionReply {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: String,
}

/// Client for the external text-completion service and the code-execution
/// sandbox. The completion service is an opaque text-in/text-out function
/// speaking the OpenAI chat shape; its replies are never trusted to be
/// well-formed.
pub struct CompletionClient {
    http: reqwest::Client,
    config: AiConfig,
}

impl CompletionClient {
    pub fn new(config: AiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "completion request failed");
                AppError::upstream(format!("completion request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "completion service returned an error status");
            return Err(AppError::upstream(format!("completion service returned {status}")));
        }

        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("completion reply was not valid JSON: {e}")))?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::upstream("completion reply had no choices"))
    }

    /// Forward code to the execution sandbox with a hard timeout. A timeout
    /// becomes 504 rather than a hung request.
    pub async fn execute(&self, code: &str, language: &str) -> Result<ExecuteResponse, AppError> {
        let body = serde_json::json!({ "code": code, "language": language });

        let response = self
            .http
            .post(&self.config.execute_url)
            .timeout(Duration::from_secs(self.config.execute_timeout_seconds))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout
                } else {
                    warn!(error = %e, "execution sandbox request failed");
                    AppError::upstream(format!("execution sandbox request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream(format!("execution sandbox returned {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("execution sandbox reply was not valid JSON: {e}")))
    }
}

// ── Prompt construction ───────────────────────────────────────────────────────

pub fn validation_messages(code: &str, exercise: &str, instructions: Option<&str>) -> Vec<ChatMessage> {
    let mut task = format!(
        "Exercise:\n{exercise}\n\nStudent code:\n```\n{code}\n```\n\n\
         Reply with JSON only: {{\"isCorrect\": boolean, \"feedback\": string}}."
    );
    if let Some(extra) = instructions {
        task.push_str("\n\nAdditional grading instructions:\n");
        task.push_str(extra);
    }

    vec![
        ChatMessage::system(
            "You are a strict but encouraging programming instructor grading a student's solution. \
             Judge correctness against the exercise, not style.",
        ),
        ChatMessage::user(task),
    ]
}

pub fn hint_messages(code: &str, exercise: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are a programming tutor. Give one short hint that nudges the student forward. \
             Never reveal the full solution.",
        ),
        ChatMessage::user(format!("Exercise:\n{exercise}\n\nMy code so far:\n```\n{code}\n```")),
    ]
}

/// Prepend the tutoring system prompt and forward a bounded tail of the
/// conversation so a long chat cannot blow the upstream token budget.
pub fn chat_messages(history: &[ChatMessage], context: Option<&str>) -> Vec<ChatMessage> {
    let mut system = "You are a friendly programming tutor inside an interactive coding course. \
                      Keep answers short and concrete."
        .to_string();
    if let Some(context) = context {
        system.push_str("\n\nThe student is currently working on:\n");
        system.push_str(context);
    }

    let tail = history.len().saturating_sub(CHAT_HISTORY_LIMIT);
    let mut messages = vec![ChatMessage::system(system)];
    messages.extend(history[tail..].iter().cloned());
    messages
}

pub fn generate_messages(topic: &str, difficulty: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You generate coding exercises. Reply with JSON only: \
             {\"title\": string, \"description\": string, \"starterCode\": string, \
             \"solution\": string, \"tests\": [string]}.",
        ),
        ChatMessage::user(format!("Generate a {difficulty} exercise about: {topic}")),
    ]
}

pub fn daily_challenge_messages(date: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You generate a daily coding challenge. Reply with JSON only: \
             {\"title\": string, \"description\": string, \"starterCode\": string, \
             \"difficulty\": string}.",
        ),
        ChatMessage::user(format!("Generate the daily challenge for {date}.")),
    ]
}

// ── Reply parsing ─────────────────────────────────────────────────────────────

/// Pull a JSON object out of a model reply that may wrap it in markdown fences
/// or surrounding prose.
pub fn extract_json_block(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```") {
        // Drop the info string ("json") up to the first newline, then the
        // closing fence.
        let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
        rest.rsplit_once("```").map(|(body, _)| body).unwrap_or(rest)
    } else {
        trimmed
    };

    let start = inner.find('{')?;
    let end = inner.rfind('}')?;
    (start < end).then(|| &inner[start..=end])
}

/// Parse a grading reply, degrading to the typed fallback on anything
/// malformed. This endpoint must never surface a parse error to the student.
pub fn parse_validation_reply(content: &str) -> ValidateResponse {
    extract_json_block(content)
        .and_then(|block| serde_json::from_str(block).ok())
        .unwrap_or_else(|| {
            warn!("could not parse validation reply, returning fallback");
            ValidateResponse::fallback()
        })
}

/// Parse a generated exercise or challenge. Unlike validation there is no
/// fallback value; the caller maps a miss to an upstream error.
pub fn parse_generated_json(content: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(extract_json_block(content)?).ok()?;
    value.is_object().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_reply() {
        let reply = r#"{"isCorrect": true, "feedback": "Well done"}"#;
        let parsed = parse_validation_reply(reply);
        assert!(parsed.is_correct);
        assert_eq!(parsed.feedback, "Well done");
    }

    #[test]
    fn parses_fenced_json_reply() {
        let reply = "```json\n{\"isCorrect\": false, \"feedback\": \"Off by one\"}\n```";
        let parsed = parse_validation_reply(reply);
        assert!(!parsed.is_correct);
        assert_eq!(parsed.feedback, "Off by one");
    }

    #[test]
    fn parses_json_surrounded_by_prose() {
        let reply = "Sure! Here is my verdict: {\"isCorrect\": true, \"feedback\": \"ok\"} Hope that helps.";
        assert!(parse_validation_reply(reply).is_correct);
    }

    #[test]
    fn garbage_reply_degrades_to_fallback() {
        let parsed = parse_validation_reply("I think your code looks pretty good!");
        assert_eq!(parsed, ValidateResponse::fallback());
        assert!(!parsed.is_correct);

        assert_eq!(parse_validation_reply(""), ValidateResponse::fallback());
        assert_eq!(parse_validation_reply("{broken"), ValidateResponse::fallback());
    }

    #[test]
    fn extract_json_block_handles_fences_and_prose() {
        assert_eq!(extract_json_block("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json_block("{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(extract_json_block("text {\"a\":1} text"), Some("{\"a\":1}"));
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn chat_messages_caps_history() {
        let history: Vec<ChatMessage> = (0..25).map(|i| ChatMessage::user(format!("msg {i}"))).collect();
        let messages = chat_messages(&history, None);
        // System prompt plus the bounded tail.
        assert_eq!(messages.len(), CHAT_HISTORY_LIMIT + 1);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages.last().unwrap().content, "msg 24");
    }

    #[test]
    fn chat_messages_includes_context_in_system_prompt() {
        let history = vec![ChatMessage::user("help")];
        let messages = chat_messages(&history, Some("Lesson 3: closures"));
        assert!(messages[0].content.contains("Lesson 3: closures"));
    }

    #[test]
    fn completion_request_serializes_openai_shape() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let body = CompletionRequest {
            model: "deepseek-chat",
            messages: &messages,
            max_tokens: 1024,
            temperature: 0.7,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn parse_generated_json_requires_an_object() {
        assert!(parse_generated_json("```json\n{\"title\":\"t\"}\n```").is_some());
        assert!(parse_generated_json("[1,2,3]").is_none());
        assert!(parse_generated_json("nope").is_none());
    }
}
