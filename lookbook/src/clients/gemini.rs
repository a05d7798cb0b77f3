//! Gemini `generateContent` client used for prompt enhancement.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use super::{build_http_client, endpoint};
use crate::config::GeminiConfig;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Gemini API key is not configured")]
    MissingApiKey,

    #[error("Gemini request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Gemini blocked the prompt: {0}")]
    Blocked(String),

    #[error("Gemini returned no text")]
    EmptyResponse,

    #[error("invalid Gemini URL: {0}")]
    Url(#[from] url::ParseError),
}

/// An image sent alongside the instruction as an inline part
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate that has any
    fn text(self) -> Result<String, GeminiError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GeminiError::Blocked(reason));
        }
        self.candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.content?.parts)
            .map(|parts| parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .map(|text| text.trim().to_string())
            .find(|text| !text.is_empty())
            .ok_or(GeminiError::EmptyResponse)
    }
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> Result<Self, GeminiError> {
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

    #[instrument(skip_all, fields(model = %self.model, images = images.len()), err)]
    pub async fn generate_text(&self, instruction: &str, images: &[InlineImage]) -> Result<String, GeminiError> {
        let api_key = self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)?;
        let url = endpoint(&self.base_url, &format!("v1beta/models/{}:generateContent", self.model))?;

        let mut parts = vec![RequestPart::Text {
            text: instruction.to_string(),
        }];
        parts.extend(images.iter().map(|image| RequestPart::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: BASE64.encode(&image.data),
            },
        }));
        let body = GenerateContentRequest {
            contents: vec![RequestContent { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 512,
            },
        };

        let response = self.client.post(url).header("x-goog-api-key", api_key).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response.json::<GenerateContentResponse>().await?.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, api_key: Option<&str>) -> GeminiClient {
        GeminiClient::new(
            &GeminiConfig {
                base_url: Url::parse(&server.uri()).unwrap(),
                api_key: api_key.map(str::to_string),
                model: "gemini-2.0-flash".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_text_sends_inline_images() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "describe"},
                        {"inline_data": {"mime_type": "image/jpeg", "data": "AQID"}}
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "  A model wearing "}, {"text": "a gold ring."}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server, Some("g-key"))
            .generate_text(
                "describe",
                &[InlineImage {
                    mime_type: "image/jpeg".to_string(),
                    data: vec![1, 2, 3],
                }],
            )
            .await
            .unwrap();
        assert_eq!(text, "A model wearing a gold ring.");
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"promptFeedback": {"blockReason": "SAFETY"}})))
            .mount(&server)
            .await;

        let err = client(&server, Some("g-key")).generate_text("x", &[]).await.unwrap_err();
        assert!(matches!(err, GeminiError::Blocked(ref r) if r == "SAFETY"));
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = client(&server, Some("g-key")).generate_text("x", &[]).await.unwrap_err();
        assert!(matches!(err, GeminiError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start().await;
        let err = client(&server, None).generate_text("x", &[]).await.unwrap_err();
        assert!(matches!(err, GeminiError::MissingApiKey));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
