//! HTTP handler for standalone prompt enhancement.

use crate::{
    AppState,
    api::models::prompts::{PromptEnhanceRequest, PromptEnhanceResponse},
    errors::{Error, Result},
    generation::service::MAX_PROMPT_CHARS,
};
use axum::{extract::State, response::Json};

#[utoipa::path(
    post,
    path = "/prompts/enhance",
    tag = "prompts",
    summary = "Enhance a prompt",
    description = "Runs the configured language model over the prompt and settings. Falls back to a built-in template when the model is unavailable.",
    request_body = PromptEnhanceRequest,
    responses(
        (status = 200, description = "Enhanced prompt", body = PromptEnhanceResponse),
        (status = 400, description = "Empty or overlong prompt"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn enhance_prompt(
    State(state): State<AppState>,
    Json(data): Json<PromptEnhanceRequest>,
) -> Result<Json<PromptEnhanceResponse>> {
    let prompt = data.prompt.trim();
    if prompt.is_empty() || prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(Error::BadRequest {
            message: format!("prompt must be between 1 and {MAX_PROMPT_CHARS} characters"),
        });
    }

    let enhanced = state
        .enhancer
        .enhance(prompt, &data.settings, &[], data.has_combined_input)
        .await;

    Ok(Json(PromptEnhanceResponse {
        success: true,
        enhanced_prompt: enhanced.text,
        source: enhanced.source,
    }))
}
