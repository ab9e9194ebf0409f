//! Chat-completions client for move explanations.

use std::future::Future;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompt::Prompt;
use crate::config::ExplainConfig;
use crate::error::AnalysisError;

/// One round trip to the language model: prompt in, free text out.
pub trait ExplanationService: Send + Sync + 'static {
    fn explain(&self, prompt: &Prompt) -> impl Future<Output = Result<String, AnalysisError>> + Send;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct ChatClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(config: &ExplainConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AnalysisError::Config("EXPLAIN_API_KEY is not set".into()))?;
        let client = Client::builder()
            .user_agent("MoveAdvisor/1.0")
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }
}

/// First non-empty completion in a chat-completions response body.
fn completion_text(status: StatusCode, body: &str) -> Result<String, AnalysisError> {
    if !status.is_success() {
        return Err(AnalysisError::ExplanationService(format!(
            "HTTP {status}: {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    let parsed: ChatResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| AnalysisError::ExplanationService("empty completion".into()))
}

impl ExplanationService for ChatClient {
    async fn explain(&self, prompt: &Prompt) -> Result<String, AnalysisError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.3,
        };

        debug!(model = %self.model, moves = prompt.moves.len(), "Requesting explanations");
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        completion_text(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "usr",
                },
            ],
            temperature: 0.3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "usr");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"e4: opens lines"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("e4: opens lines")
        );
    }

    #[test]
    fn test_completion_text() {
        let ok = r#"{"choices":[{"message":{"content":"d4: solid"}}]}"#;
        assert_eq!(completion_text(StatusCode::OK, ok).unwrap(), "d4: solid");
    }

    #[test]
    fn test_error_status_is_service_error() {
        let err = completion_text(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"rate limited"}}"#,
        )
        .unwrap_err();
        match err {
            AnalysisError::ExplanationService(msg) => {
                assert!(msg.starts_with("HTTP 429"), "{msg}");
                assert!(msg.contains("rate limited"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_empty_completions_are_service_errors() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"  "}}]}"#,
        ] {
            assert!(
                matches!(
                    completion_text(StatusCode::OK, body),
                    Err(AnalysisError::ExplanationService(_))
                ),
                "{body}"
            );
        }
        assert!(matches!(
            completion_text(StatusCode::OK, "not json"),
            Err(AnalysisError::Json(_))
        ));
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = ExplainConfig {
            api_key: None,
            ..ExplainConfig::default()
        };
        assert!(matches!(
            ChatClient::new(&config),
            Err(AnalysisError::Config(_))
        ));
    }
}
