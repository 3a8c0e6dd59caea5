use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bikeforge_core::error::ForgeError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Forge(#[from] ForgeError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Forge(err) => match err {
                ForgeError::OracleUnavailable(_) | ForgeError::OracleTimeout(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ForgeError::ContentPolicyViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ForgeError::InsufficientCredits(_) => StatusCode::PAYMENT_REQUIRED,
                ForgeError::SpecificationNotFound(_) | ForgeError::ImageNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                ForgeError::ValidationRejected(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        }

        let body = match self {
            ApiError::Forge(ForgeError::ContentPolicyViolation {
                explanation,
                suggestions,
            }) => json!({
                "error": "Content policy violation",
                "explanation": explanation,
                "suggestions": suggestions,
                "status": status.as_u16()
            }),
            other => json!({
                "error": other.to_string(),
                "status": status.as_u16()
            }),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(ForgeError::OracleTimeout(Duration::from_secs(1))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::from(ForgeError::InsufficientCredits("u".into())),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                ApiError::from(ForgeError::SpecificationNotFound("s".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(ForgeError::Persistence("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::BadRequest("empty".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err);
        }
    }

    #[test]
    fn test_content_policy_is_unprocessable() {
        let err = ApiError::from(ForgeError::ContentPolicyViolation {
            explanation: "no".into(),
            suggestions: vec!["vintage".into()],
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
