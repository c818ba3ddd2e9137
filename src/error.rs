use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;
use crate::validation::FieldErrors;

/// Every error leaves the service in this shape so AJAX callers can branch on
/// `success` alone.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("authentication required")] Unauthorized,
    #[error("{0}")] Forbidden(String),
    #[error("not found")] NotFound,
    #[error("conflict: {0}")] Conflict(String),
    #[error("validation failed")] Validation(FieldErrors),
    #[error("payload too large")] PayloadTooLarge,
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn forbidden(message: &str) -> Self {
        ApiError::Forbidden(message.to_string())
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict(what) => ApiError::Conflict(what),
            RepoError::Internal(msg) => {
                tracing::error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(e: FieldErrors) -> Self {
        ApiError::Validation(e)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let fields = match self {
            ApiError::Validation(f) => Some(f.clone()),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(ApiErrorBody { success: false, error: self.to_string(), fields })
    }
}
