use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use base64::Engine;
use bikeforge_core::specification::BikeSpecification;
use bikeforge_dialogue::{ErrorCause, QuestionOption, TurnResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

pub const USER_ID_HEADER: &str = "x-user-id";

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    #[serde(default)]
    pub user_message: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Flattened view of a [`TurnResult`] for clients that render one question
/// at a time.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub ai_message: String,
    pub is_complete: bool,
    pub question_type: Option<String>,
    pub question_text: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    pub current_step: Option<u32>,
    pub total_steps: Option<u32>,
    pub parent_question: Option<String>,
    pub specification: Option<BikeSpecification>,
    pub error_cause: Option<ErrorCause>,
}

impl From<TurnResult> for ChatResponse {
    fn from(turn: TurnResult) -> Self {
        let mut response = ChatResponse {
            ai_message: turn.message().to_string(),
            is_complete: turn.is_complete(),
            question_type: None,
            question_text: None,
            options: Vec::new(),
            current_step: None,
            total_steps: None,
            parent_question: None,
            specification: None,
            error_cause: None,
        };
        match turn {
            TurnResult::Question { question, .. } => {
                response.question_type = Some(String::from(question.question_type));
                response.question_text = Some(question.question_text);
                response.options = question.options;
                response.current_step = question.current_step;
                response.total_steps = Some(question.total_steps);
                response.parent_question = question.parent_question;
            }
            TurnResult::Completion { specification, .. } => {
                response.specification = Some(specification);
            }
            TurnResult::Error { cause, .. } => response.error_cause = Some(cause),
        }
        response
    }
}

#[instrument(skip(state, request), fields(session_id = %request.session_id))]
pub async fn chat_complete(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let session_id = required_session(&request.session_id)?;
    let turn = state
        .dialogue
        .submit_turn_for_project(
            session_id,
            &request.user_message,
            request.project_id.as_deref(),
        )
        .await?;
    Ok(Json(turn.into()))
}

pub async fn get_specification(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let specification = state.dialogue.get_specification(&session_id).await?;
    Ok(Json(json!({
        "session_id": session_id,
        "specification": specification,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub session_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub session_id: String,
    pub image_base64: String,
    pub prompt_used: String,
    pub revised_prompt: Option<String>,
}

#[instrument(skip(state, headers, request), fields(session_id = %request.session_id))]
pub async fn generate_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ImageRequest>,
) -> ApiResult<Json<ImageResponse>> {
    let session_id = required_session(&request.session_id)?;
    let user = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let rendered = state
        .render
        .render(session_id, user, request.project_id.as_deref())
        .await?;
    info!(prompt_chars = rendered.prompt.chars().count(), "Image generated");

    Ok(Json(ImageResponse {
        session_id: rendered.session_id,
        image_base64: rendered.image_base64,
        prompt_used: rendered.prompt,
        revised_prompt: rendered.revised_prompt,
    }))
}

pub async fn download_image(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let rendered = state.render.latest_image(&session_id)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(rendered.image_base64.as_bytes())
        .map_err(|e| ApiError::Internal(format!("stored image is not valid base64: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"bike_{}.png\"",
                    filename_safe(&session_id)
                ),
            ),
        ],
        bytes,
    ))
}

/// Keep `[A-Za-z0-9_-]`; everything else becomes `_`.
fn filename_safe(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn required_session(session_id: &str) -> ApiResult<&str> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("session_id must not be empty".to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_safe_replaces_header_breaking_chars() {
        assert_eq!(filename_safe("abc-123_XY"), "abc-123_XY");
        assert_eq!(filename_safe("a\"; x=\"../b"), "a___x_____b");
        assert_eq!(filename_safe("caf\u{e9} 1"), "caf__1");
    }
}
