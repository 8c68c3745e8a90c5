use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::errors::AttemptError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UnprocessableEntity(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::NotFound(message) => ApiError::NotFound(message.to_string()),
            AttemptError::Forbidden(message) => ApiError::Forbidden(message),
            AttemptError::Validation(message) => ApiError::BadRequest(message),
            err @ AttemptError::Consistency { .. } => {
                ApiError::UnprocessableEntity(err.to_string())
            }
            AttemptError::Conflict(message) => ApiError::Conflict(message),
            AttemptError::Database { context, source } => ApiError::internal(source, context),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) | ApiError::Forbidden(message) => message.to_string(),
            // Already logged with its cause by `ApiError::internal`.
            ApiError::Internal(message)
            | ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::UnprocessableEntity(message) => message,
        };

        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
