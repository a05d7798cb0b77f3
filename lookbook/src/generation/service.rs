//! The generation pipeline: references in, image out, credits settled.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::lifecycle;
use super::settlement;
use super::status::{FailureReason, GenerationStatus};
use crate::aspect_ratio::{AspectRatio, format_aspect_ratio};
use crate::clients::{FailureKind, InlineImage, PredictionOutcome, ReplicateClient, StorageClient, StorageError};
use crate::config::{BucketConfig, ChargePolicy, Config, CreditsConfig, GenerationsConfig};
use crate::db::models::credits::LedgerOutcome;
use crate::db::models::generations::{GenerationCreateDBRequest, GenerationDBResponse, GenerationUpdateDBRequest, PredictionCreateDBRequest};
use crate::errors::{Error, Result};
use crate::images::{self, PreparedReferences};
use crate::metrics;
use crate::prompts::{GenerationSettings, PromptEnhancer};
use crate::store::Store;
use crate::types::{UserId, abbrev_uuid};

/// Longest accepted prompt, in characters
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Where the reference photos come from
#[derive(Debug, Clone)]
pub enum ReferenceSource {
    /// Raw files from a multipart upload
    Uploaded(Vec<Bytes>),
    /// Publicly reachable image URLs
    Urls(Vec<String>),
}

impl ReferenceSource {
    fn len(&self) -> usize {
        match self {
            ReferenceSource::Uploaded(files) => files.len(),
            ReferenceSource::Urls(urls) => urls.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub user_id: UserId,
    pub prompt: String,
    pub settings: GenerationSettings,
    /// `"W:H"`; derived from the reference photos when absent
    pub aspect_ratio: Option<String>,
    pub references: ReferenceSource,
}

pub struct GenerationService {
    store: Arc<dyn Store>,
    replicate: ReplicateClient,
    storage: StorageClient,
    enhancer: Arc<PromptEnhancer>,
    credits: CreditsConfig,
    limits: GenerationsConfig,
    buckets: BucketConfig,
    model: String,
    fallback_model: Option<String>,
}

impl GenerationService {
    pub fn new(config: &Config, store: Arc<dyn Store>, enhancer: Arc<PromptEnhancer>) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            replicate: ReplicateClient::new(&config.replicate)?,
            storage: StorageClient::new(&config.supabase, config.replicate.request_timeout)?,
            enhancer,
            credits: config.credits.clone(),
            limits: config.generations.clone(),
            buckets: config.supabase.buckets.clone(),
            model: config.replicate.model.clone(),
            fallback_model: config.replicate.fallback_model.clone(),
        })
    }

    fn validate(&self, request: &GenerationRequest) -> Result<()> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(Error::BadRequest {
                message: "prompt is required".to_string(),
            });
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(Error::BadRequest {
                message: format!("prompt must be at most {MAX_PROMPT_CHARS} characters"),
            });
        }

        let count = request.references.len();
        if count == 0 || count > self.limits.max_reference_images {
            return Err(Error::BadRequest {
                message: format!("between 1 and {} reference images are required", self.limits.max_reference_images),
            });
        }

        if let ReferenceSource::Urls(urls) = &request.references {
            for raw in urls {
                let valid = Url::parse(raw).is_ok_and(|url| matches!(url.scheme(), "http" | "https"));
                if !valid {
                    return Err(Error::BadRequest {
                        message: format!("invalid reference image URL: {raw}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run a generation to a terminal status.
    ///
    /// Returns the completed row. On failure after the pending row exists, the row is
    /// moved to `failed` (refunding any charge) before the error is returned.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&request.user_id), generation_id = tracing::field::Empty), err)]
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationDBResponse> {
        self.validate(&request)?;

        let cost = self.credits.generation_cost;
        let user = self.store.get_user(request.user_id).await?.ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: request.user_id.to_string(),
        })?;
        if user.credit_balance < cost {
            return Err(Error::InsufficientCredits {
                required: cost,
                available: user.credit_balance,
            });
        }

        let generation_id = Uuid::new_v4();
        tracing::Span::current().record("generation_id", abbrev_uuid(&generation_id).as_str());

        let raw = self.fetch_references(request.references).await?;
        let (max_bytes, max_dimension, quality) = (
            self.limits.max_upload_bytes,
            self.limits.max_image_dimension,
            self.limits.result_jpeg_quality,
        );
        let prepared = tokio::task::spawn_blocking(move || {
            let inputs: Vec<&[u8]> = raw.iter().map(|b| b.as_ref()).collect();
            images::prepare_references(&inputs, max_bytes, max_dimension, quality)
        })
        .await
        .map_err(|e| Error::Internal {
            operation: format!("prepare reference images: {e}"),
        })??;

        let model_input = prepared.model_input().ok_or_else(|| Error::Internal {
            operation: "select model input image".to_string(),
        })?;
        let aspect_ratio = match request.aspect_ratio.as_deref().map(str::trim) {
            Some(ratio) if !ratio.is_empty() => format_aspect_ratio(ratio),
            _ => AspectRatio::nearest_to(model_input.width, model_input.height).as_str(),
        };

        let (reference_urls, model_input_url) = self.upload_references(request.user_id, generation_id, &prepared).await?;

        let generation = lifecycle::create_pending_generation(
            self.store.as_ref(),
            &GenerationCreateDBRequest {
                generation_id,
                user_id: request.user_id,
                original_prompt: request.prompt.trim().to_string(),
                reference_images: reference_urls,
                settings: request.settings.to_value(),
                aspect_ratio: aspect_ratio.to_string(),
            },
        )
        .await?;

        match self.run(&generation, &request.settings, &prepared, &model_input_url).await {
            Ok(completed) => Ok(completed),
            Err(err) => {
                self.fail(&generation, &err).await;
                Err(err)
            }
        }
    }

    async fn fetch_references(&self, source: ReferenceSource) -> Result<Vec<Bytes>> {
        match source {
            ReferenceSource::Uploaded(files) => Ok(files),
            ReferenceSource::Urls(urls) => futures::future::try_join_all(urls.iter().map(|url| self.storage.download(url)))
                .await
                .map_err(|e| Error::BadRequest {
                    message: format!("could not download reference image: {e}"),
                }),
        }
    }

    /// Upload prepared references; returns their URLs and the URL of the model input
    async fn upload_references(
        &self,
        user_id: UserId,
        generation_id: Uuid,
        prepared: &PreparedReferences,
    ) -> Result<(Vec<String>, String)> {
        let prefix = format!("{user_id}/{generation_id}");
        let bucket = &self.buckets.reference;

        let mut urls = Vec::with_capacity(prepared.references.len());
        for (index, image) in prepared.references.iter().enumerate() {
            let path = format!("{prefix}/reference-{index}.{}", image.format.extension());
            let url = self.storage.upload(bucket, &path, image.bytes.clone(), image.content_type()).await?;
            urls.push(url.to_string());
        }

        let model_input_url = match &prepared.combined {
            Some(combined) => {
                let path = format!("{prefix}/combined.{}", combined.format.extension());
                self.storage
                    .upload(bucket, &path, combined.bytes.clone(), combined.content_type())
                    .await?
                    .to_string()
            }
            None => urls.first().cloned().ok_or_else(|| Error::Internal {
                operation: "upload reference images".to_string(),
            })?,
        };
        Ok((urls, model_input_url))
    }

    async fn run(
        &self,
        generation: &GenerationDBResponse,
        settings: &GenerationSettings,
        prepared: &PreparedReferences,
        model_input_url: &str,
    ) -> Result<GenerationDBResponse> {
        let store = self.store.as_ref();
        let cost = self.credits.generation_cost;
        let (generation_id, user_id) = (generation.generation_id, generation.user_id);

        if matches!(self.credits.charge_policy, ChargePolicy::Upfront) {
            if let LedgerOutcome::InsufficientFunds { balance } = settlement::charge_generation(store, user_id, generation_id, cost).await? {
                return Err(Error::InsufficientCredits {
                    required: cost,
                    available: balance,
                });
            }
        }

        let images: Vec<InlineImage> = prepared
            .model_input()
            .map(|image| InlineImage {
                mime_type: image.content_type().to_string(),
                data: image.bytes.clone(),
            })
            .into_iter()
            .collect();
        let enhanced = self
            .enhancer
            .enhance(&generation.original_prompt, settings, &images, prepared.combined.is_some())
            .await;

        lifecycle::update_generation_status(
            store,
            cost,
            generation_id,
            user_id,
            GenerationStatus::Processing,
            &GenerationUpdateDBRequest {
                enhanced_prompt: Some(enhanced.text.clone()),
                model: Some(self.model.clone()),
                ..Default::default()
            },
        )
        .await?;

        let input = json!({
            "prompt": enhanced.text,
            "input_image": model_input_url,
            "aspect_ratio": generation.aspect_ratio,
            "output_format": "jpg",
        });
        let output_url = self.predict(generation, &input).await?;
        let result_url = self.store_result(generation, &output_url).await;

        let change = lifecycle::update_generation_status(
            store,
            cost,
            generation_id,
            user_id,
            GenerationStatus::Completed,
            &GenerationUpdateDBRequest::completed(result_url),
        )
        .await?;
        info!("Generation completed");
        Ok(change.generation)
    }

    /// Run the primary model, retrying once on the fallback after a transient failure
    async fn predict(&self, generation: &GenerationDBResponse, input: &Value) -> Result<String> {
        let mut model = self.model.as_str();
        let mut fallback = self.fallback_model.as_deref().filter(|f| *f != model);

        loop {
            let outcome = self.attempt(generation, model, input).await?;
            if let PredictionOutcome::Failed {
                kind: FailureKind::Transient,
                message,
            } = &outcome
            {
                if let Some(next) = fallback.take() {
                    warn!(model, fallback = next, error = %message, "Prediction failed transiently, retrying on fallback model");
                    model = next;
                    continue;
                }
            }

            return match outcome {
                PredictionOutcome::Succeeded { output_urls } => output_urls.into_iter().next().ok_or_else(|| Error::Upstream {
                    service: "replicate".to_string(),
                    message: "prediction returned no output".to_string(),
                }),
                PredictionOutcome::Failed {
                    kind: FailureKind::SensitiveContent,
                    message,
                } => Err(Error::SensitiveContent { message }),
                PredictionOutcome::Failed { message, .. } => Err(Error::Upstream {
                    service: "replicate".to_string(),
                    message,
                }),
                PredictionOutcome::Canceled => Err(Error::Upstream {
                    service: "replicate".to_string(),
                    message: "prediction was canceled".to_string(),
                }),
                PredictionOutcome::TimedOut => Err(Error::Timeout {
                    message: "prediction did not finish in time".to_string(),
                }),
            };
        }
    }

    /// One prediction: create, record, wait, record the result
    #[instrument(skip(self, generation, input), fields(generation_id = %abbrev_uuid(&generation.generation_id)), err)]
    async fn attempt(&self, generation: &GenerationDBResponse, model: &str, input: &Value) -> Result<PredictionOutcome> {
        let started = Instant::now();
        let prediction = self.replicate.create_prediction(model, input).await?;
        self.store
            .record_prediction(&PredictionCreateDBRequest {
                id: prediction.id.clone(),
                generation_id: generation.generation_id,
                user_id: generation.user_id,
                model: model.to_string(),
                status: prediction.status.as_str().to_string(),
            })
            .await?;
        self.store
            .attach_prediction(generation.generation_id, &prediction.id, model)
            .await?;

        let (last, outcome) = self.replicate.wait_for_prediction(prediction).await?;
        metrics::record_prediction_duration(started.elapsed().as_secs_f64());

        if outcome == PredictionOutcome::TimedOut {
            if let Err(e) = self.replicate.cancel_prediction(&last.id).await {
                warn!(prediction_id = %last.id, error = %e, "Failed to cancel timed out prediction");
            }
        }

        let (status, output_url, error) = match &outcome {
            PredictionOutcome::Succeeded { output_urls } => (last.status.as_str(), output_urls.first().map(String::as_str), None),
            PredictionOutcome::Failed { message, .. } => (last.status.as_str(), None, Some(message.as_str())),
            PredictionOutcome::Canceled => (last.status.as_str(), None, None),
            PredictionOutcome::TimedOut => ("timed_out", None, None),
        };
        self.store.update_prediction(&last.id, status, output_url, error).await?;
        Ok(outcome)
    }

    async fn copy_result(&self, generation: &GenerationDBResponse, output_url: &str) -> std::result::Result<Url, StorageError> {
        let bytes = self.storage.download(output_url).await?;
        let path = format!("{}/{}.jpg", generation.user_id, generation.generation_id);
        self.storage
            .upload(&self.buckets.results, &path, bytes.to_vec(), "image/jpeg")
            .await
    }

    /// Re-host the model output in the results bucket, keeping the upstream URL if that fails
    async fn store_result(&self, generation: &GenerationDBResponse, output_url: &str) -> String {
        if !self.limits.store_results {
            return output_url.to_string();
        }
        match self.copy_result(generation, output_url).await {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!(error = %e, "Failed to store result image, keeping upstream URL");
                output_url.to_string()
            }
        }
    }

    async fn fail(&self, generation: &GenerationDBResponse, err: &Error) {
        let reason = failure_reason(err);
        warn!(reason = reason.as_str(), error = %err, "Generation failed");
        if let Err(e) = lifecycle::fail_generation(
            self.store.as_ref(),
            self.credits.generation_cost,
            generation,
            reason,
            err.user_message(),
        )
        .await
        {
            error!(error = %e, "Failed to record generation failure");
        }
    }
}

fn failure_reason(err: &Error) -> FailureReason {
    match err {
        Error::SensitiveContent { .. } => FailureReason::SensitiveContent,
        Error::Upstream { .. } => FailureReason::UpstreamError,
        Error::Timeout { .. } => FailureReason::Timeout,
        Error::InsufficientCredits { .. } => FailureReason::InsufficientCredits,
        _ => FailureReason::Internal,
    }
}
