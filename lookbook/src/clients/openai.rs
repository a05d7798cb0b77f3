//! OpenAI chat completions client used for prompt enhancement.

use std::time::Duration;

use async_openai::types::chat::CreateChatCompletionResponse;
use serde_json::json;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use super::{build_http_client, endpoint};
use crate::config::OpenAiConfig;

#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    #[error("OpenAI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("OpenAI returned no message content")]
    EmptyResponse,

    #[error("invalid OpenAI URL: {0}")]
    Url(#[from] url::ParseError),
}

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig, timeout: Duration) -> Result<Self, OpenAiError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Single-turn completion: `system` instructions plus one user message
    #[instrument(skip_all, fields(model = %self.model), err)]
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, OpenAiError> {
        let api_key = self.api_key.as_deref().ok_or(OpenAiError::MissingApiKey)?;
        let url = endpoint(&self.base_url, "v1/chat/completions")?;
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": 0.7,
            "max_tokens": 512
        });

        let response = self.client.post(url).bearer_auth(api_key).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CreateChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .find(|content| !content.is_empty())
            .ok_or(OpenAiError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    #[tokio::test]
    async fn test_complete_returns_first_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(" Studio shot of a silver necklace. ")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(
            &OpenAiConfig {
                base_url: Url::parse(&server.uri()).unwrap(),
                api_key: Some("sk-test".to_string()),
                model: "gpt-4o-mini".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        let text = client.complete("system", "user").await.unwrap();
        assert_eq!(text, "Studio shot of a silver necklace.");
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(
            &OpenAiConfig {
                base_url: Url::parse(&server.uri()).unwrap(),
                api_key: Some("sk-test".to_string()),
                model: "gpt-4o-mini".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.complete("system", "user").await.unwrap_err();
        assert!(matches!(err, OpenAiError::Api { status: 429, .. }));
    }
}
