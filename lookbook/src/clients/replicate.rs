//! Replicate predictions API.
//!
//! ```text
//! create_prediction ──► wait_for_prediction ──► PredictionOutcome
//!                          │    ▲
//!                          ▼    │ delay_for(n) = min(initial * multiplier^n, max)
//!                       get_prediction
//! ```
//!
//! Upstream failure text is interpreted in exactly one place, [`classify_failure`].

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{build_http_client, endpoint};
use crate::config::{PollingConfig, ReplicateConfig};

#[derive(Debug, Error)]
pub enum ReplicateError {
    #[error("Replicate API token is not configured")]
    MissingToken,

    #[error("invalid model identifier {0:?}, expected owner/name or owner/name:version")]
    InvalidModel(String),

    #[error("Replicate request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Replicate returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid Replicate URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ReplicateError {
    /// Network failures, rate limiting and upstream 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            ReplicateError::Http(_) => true,
            ReplicateError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Starting => "starting",
            PredictionStatus::Processing => "processing",
            PredictionStatus::Succeeded => "succeeded",
            PredictionStatus::Failed => "failed",
            PredictionStatus::Canceled => "canceled",
            PredictionStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }
}

/// The subset of a Replicate prediction object we read
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    /// Replicate reports errors as a string or, occasionally, an object
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn output_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(output) = &self.output {
            extract_output_urls(output, &mut urls);
        }
        urls
    }
}

/// How a failed prediction should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rejected by the model's safety checker; surfaced to the user as a 400
    SensitiveContent,
    /// Capacity or availability problem; worth one attempt on the fallback model
    Transient,
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    Succeeded { output_urls: Vec<String> },
    Failed { kind: FailureKind, message: String },
    Canceled,
    TimedOut,
}

const SENSITIVE_MARKERS: &[&str] = &["e005", "flagged as sensitive", "nsfw"];
const TRANSIENT_MARKERS: &[&str] = &[
    "capacity",
    "unavailable",
    "timed out",
    "timeout",
    "overloaded",
    "try again",
    "rate limit",
];

/// Classify upstream failure text
pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();
    if SENSITIVE_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureKind::SensitiveContent
    } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureKind::Transient
    } else {
        FailureKind::Fatal
    }
}

/// Collect http(s) URLs from a prediction output of any shape, without duplicates
pub fn extract_output_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if trimmed.starts_with("http") && !out.iter().any(|existing| existing == trimmed) {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                extract_output_urls(row, out);
            }
        }
        Value::Object(obj) => {
            for key in ["url", "urls", "output"] {
                if let Some(nested) = obj.get(key) {
                    extract_output_urls(nested, out);
                }
            }
        }
        _ => {}
    }
}

/// Exponential backoff bounded by attempts and a wall-clock deadline
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl PollPolicy {
    /// Delay before poll number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_interval.as_secs_f64()))
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            initial_interval: config.initial_interval,
            max_interval: config.max_interval,
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
            timeout: config.timeout,
        }
    }
}

/// `owner/name` runs the model's latest version; `owner/name:version` pins one
#[derive(Debug, Clone, PartialEq, Eq)]
enum ModelRef<'a> {
    Official { owner: &'a str, name: &'a str },
    Version { version: &'a str },
}

impl<'a> ModelRef<'a> {
    fn parse(model: &'a str) -> Result<Self, ReplicateError> {
        let invalid = || ReplicateError::InvalidModel(model.to_string());
        let (path, version) = match model.split_once(':') {
            Some((path, version)) => (path, Some(version)),
            None => (model, None),
        };
        let (owner, name) = path.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        match version {
            Some(v) if v.is_empty() => Err(invalid()),
            Some(version) => Ok(ModelRef::Version { version }),
            None => Ok(ModelRef::Official { owner, name }),
        }
    }
}

pub struct ReplicateClient {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
    poll: PollPolicy,
}

impl ReplicateClient {
    pub fn new(config: &ReplicateConfig) -> Result<Self, ReplicateError> {
        Ok(Self {
            client: build_http_client(config.request_timeout)?,
            base_url: config.base_url.clone(),
            api_token: config.api_token.clone(),
            poll: PollPolicy::from(&config.polling),
        })
    }

    fn token(&self) -> Result<&str, ReplicateError> {
        self.api_token.as_deref().ok_or(ReplicateError::MissingToken)
    }

    async fn parse(response: reqwest::Response) -> Result<Prediction, ReplicateError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReplicateError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Prediction>().await?)
    }

    #[instrument(skip(self, input), err)]
    pub async fn create_prediction(&self, model: &str, input: &Value) -> Result<Prediction, ReplicateError> {
        let (url, body) = match ModelRef::parse(model)? {
            ModelRef::Official { owner, name } => (
                endpoint(&self.base_url, &format!("v1/models/{owner}/{name}/predictions"))?,
                json!({ "input": input }),
            ),
            ModelRef::Version { version } => (
                endpoint(&self.base_url, "v1/predictions")?,
                json!({ "version": version, "input": input }),
            ),
        };

        let response = self.client.post(url).bearer_auth(self.token()?).json(&body).send().await?;
        let prediction = Self::parse(response).await?;
        debug!(prediction_id = %prediction.id, status = prediction.status.as_str(), "Created prediction");
        Ok(prediction)
    }

    #[instrument(skip(self), err)]
    pub async fn get_prediction(&self, id: &str) -> Result<Prediction, ReplicateError> {
        let url = endpoint(&self.base_url, &format!("v1/predictions/{id}"))?;
        let response = self.client.get(url).bearer_auth(self.token()?).send().await?;
        Self::parse(response).await
    }

    #[instrument(skip(self), err)]
    pub async fn cancel_prediction(&self, id: &str) -> Result<Prediction, ReplicateError> {
        let url = endpoint(&self.base_url, &format!("v1/predictions/{id}/cancel"))?;
        let response = self.client.post(url).bearer_auth(self.token()?).send().await?;
        Self::parse(response).await
    }

    /// Poll until the prediction is terminal or the policy gives up.
    /// Returns the last observed prediction with its outcome.
    #[instrument(skip(self, prediction), fields(prediction_id = %prediction.id), err)]
    pub async fn wait_for_prediction(&self, prediction: Prediction) -> Result<(Prediction, PredictionOutcome), ReplicateError> {
        let started = Instant::now();
        let mut current = prediction;
        let mut attempt = 0;

        loop {
            if current.status.is_terminal() {
                let outcome = outcome_of(&current);
                return Ok((current, outcome));
            }

            let elapsed = started.elapsed();
            if attempt >= self.poll.max_attempts || elapsed >= self.poll.timeout {
                warn!(attempts = attempt, elapsed_ms = elapsed.as_millis() as u64, "Prediction did not finish in time");
                return Ok((current, PredictionOutcome::TimedOut));
            }

            let delay = self.poll.delay_for(attempt).min(self.poll.timeout - elapsed);
            tokio::time::sleep(delay).await;
            attempt += 1;
            match self.get_prediction(&current.id).await {
                Ok(polled) => {
                    current = polled;
                    debug!(attempt, status = current.status.as_str(), "Polled prediction");
                }
                Err(e) if e.is_transient() => warn!(attempt, error = %e, "Poll failed, retrying"),
                Err(e) => return Err(e),
            }
        }
    }
}

fn outcome_of(prediction: &Prediction) -> PredictionOutcome {
    match prediction.status {
        PredictionStatus::Succeeded => {
            let output_urls = prediction.output_urls();
            if output_urls.is_empty() {
                PredictionOutcome::Failed {
                    kind: FailureKind::Fatal,
                    message: "prediction succeeded without an output image".to_string(),
                }
            } else {
                PredictionOutcome::Succeeded { output_urls }
            }
        }
        PredictionStatus::Canceled => PredictionOutcome::Canceled,
        _ => {
            let message = prediction.error_message().unwrap_or_else(|| "prediction failed".to_string());
            PredictionOutcome::Failed {
                kind: classify_failure(&message),
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ReplicateConfig {
        ReplicateConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            api_token: Some("r8_test".to_string()),
            polling: PollingConfig {
                initial_interval: Duration::from_millis(5),
                max_interval: Duration::from_millis(20),
                multiplier: 2.0,
                max_attempts: 5,
                timeout: Duration::from_secs(5),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(classify_failure("E005: input flagged"), FailureKind::SensitiveContent);
        assert_eq!(
            classify_failure("Your input was flagged as sensitive. Please try again"),
            FailureKind::SensitiveContent
        );
        assert_eq!(classify_failure("NSFW content detected"), FailureKind::SensitiveContent);
        assert_eq!(classify_failure("Model is at capacity"), FailureKind::Transient);
        assert_eq!(classify_failure("Service Unavailable"), FailureKind::Transient);
        assert_eq!(classify_failure("CUDA out of memory"), FailureKind::Fatal);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = PollPolicy {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(10),
            multiplier: 1.5,
            max_attempts: 60,
            timeout: Duration::from_secs(120),
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for(2), Duration::from_secs_f64(4.5));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_extract_output_urls_handles_any_shape() {
        let mut urls = Vec::new();
        extract_output_urls(
            &json!([
                "https://replicate.delivery/a.jpg",
                {"url": "https://replicate.delivery/b.jpg"},
                {"urls": ["https://replicate.delivery/a.jpg", "not-a-url"]},
                42
            ]),
            &mut urls,
        );
        assert_eq!(urls, vec!["https://replicate.delivery/a.jpg", "https://replicate.delivery/b.jpg"]);
    }

    #[test]
    fn test_model_ref_parsing() {
        assert_eq!(
            ModelRef::parse("black-forest-labs/flux-kontext-pro").unwrap(),
            ModelRef::Official {
                owner: "black-forest-labs",
                name: "flux-kontext-pro"
            }
        );
        assert_eq!(
            ModelRef::parse("owner/model:abc123").unwrap(),
            ModelRef::Version { version: "abc123" }
        );
        for bad in ["", "model", "/model", "owner/", "owner/model:", "a/b/c"] {
            assert!(ModelRef::parse(bad).is_err(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_create_uses_model_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/black-forest-labs/flux-kontext-pro/predictions"))
            .and(header("authorization", "Bearer r8_test"))
            .and(body_partial_json(json!({"input": {"prompt": "ring"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p1", "status": "starting"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReplicateClient::new(&config(&server)).unwrap();
        let prediction = client
            .create_prediction("black-forest-labs/flux-kontext-pro", &json!({"prompt": "ring"}))
            .await
            .unwrap();
        assert_eq!(prediction.id, "p1");
        assert_eq!(prediction.status, PredictionStatus::Starting);
    }

    #[tokio::test]
    async fn test_create_with_version_uses_predictions_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .and(body_partial_json(json!({"version": "abc123"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p2", "status": "starting"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReplicateClient::new(&config(&server)).unwrap();
        client.create_prediction("owner/model:abc123", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid input"))
            .mount(&server)
            .await;

        let client = ReplicateClient::new(&config(&server)).unwrap();
        let err = client.create_prediction("owner/model", &json!({})).await.unwrap_err();
        assert!(matches!(err, ReplicateError::Api { status: 422, ref body } if body == "invalid input"));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let server = MockServer::start().await;
        let client = ReplicateClient::new(&ReplicateConfig {
            api_token: None,
            ..config(&server)
        })
        .unwrap();
        let err = client.get_prediction("p1").await.unwrap_err();
        assert!(matches!(err, ReplicateError::MissingToken));
    }

    #[test_log::test(tokio::test)]
    async fn test_wait_polls_until_succeeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1", "status": "processing"})))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p1",
                "status": "succeeded",
                "output": "https://replicate.delivery/out.jpg"
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = ReplicateClient::new(&config(&server)).unwrap();
        let started = Prediction {
            id: "p1".to_string(),
            status: PredictionStatus::Starting,
            output: None,
            error: None,
        };
        let (last, outcome) = client.wait_for_prediction(started).await.unwrap();
        assert_eq!(last.status, PredictionStatus::Succeeded);
        assert_eq!(
            outcome,
            PredictionOutcome::Succeeded {
                output_urls: vec!["https://replicate.delivery/out.jpg".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_wait_classifies_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p1",
                "status": "failed",
                "error": "E005: The input or output was flagged as sensitive"
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::new(&config(&server)).unwrap();
        let started = Prediction {
            id: "p1".to_string(),
            status: PredictionStatus::Processing,
            output: None,
            error: None,
        };
        let (_, outcome) = client.wait_for_prediction(started).await.unwrap();
        assert!(matches!(
            outcome,
            PredictionOutcome::Failed {
                kind: FailureKind::SensitiveContent,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1", "status": "processing"})))
            .expect(5)
            .mount(&server)
            .await;

        let client = ReplicateClient::new(&config(&server)).unwrap();
        let started = Prediction {
            id: "p1".to_string(),
            status: PredictionStatus::Starting,
            output: None,
            error: None,
        };
        let (_, outcome) = client.wait_for_prediction(started).await.unwrap();
        assert_eq!(outcome, PredictionOutcome::TimedOut);
    }

    #[test_log::test(tokio::test)]
    async fn test_wait_survives_a_failed_poll() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p1",
                "status": "succeeded",
                "output": ["https://replicate.delivery/out.jpg"]
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = ReplicateClient::new(&config(&server)).unwrap();
        let started = Prediction {
            id: "p1".to_string(),
            status: PredictionStatus::Processing,
            output: None,
            error: None,
        };
        let (last, outcome) = client.wait_for_prediction(started).await.unwrap();
        assert_eq!(last.status, PredictionStatus::Succeeded);
        assert!(matches!(outcome, PredictionOutcome::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_wait_stops_on_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthenticated"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReplicateClient::new(&config(&server)).unwrap();
        let started = Prediction {
            id: "p1".to_string(),
            status: PredictionStatus::Processing,
            output: None,
            error: None,
        };
        let err = client.wait_for_prediction(started).await.unwrap_err();
        assert!(matches!(err, ReplicateError::Api { status: 401, .. }));
    }

    #[test]
    fn test_transient_errors() {
        let api = |status| ReplicateError::Api {
            status,
            body: String::new(),
        };
        assert!(api(429).is_transient());
        assert!(api(503).is_transient());
        assert!(!api(404).is_transient());
        assert!(!ReplicateError::MissingToken.is_transient());
    }
}
