//! Mapping from domain errors to HTTP responses.
//!
//! Every failure body is JSON. Field validation errors are returned as
//! `{field: [messages]}`; everything else as `{"error": message}`, except
//! token failures which use `{"detail": message}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use polibrief_core::{AuthError, Error, StoreError};
use serde_json::json;
use tracing::error;

/// An error returned from a handler.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(Error::Store(err))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(Error::Auth(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Auth(AuthError::Hashing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.0 {
            Error::Validation { fields, .. } if !fields.is_empty() => json!(fields),
            Error::Validation { message, .. } => json!({ "error": message }),
            Error::Auth(AuthError::InvalidToken) => {
                json!({ "detail": AuthError::InvalidToken.to_string() })
            }
            Error::Auth(AuthError::Required(message))
            | Error::Forbidden(message)
            | Error::NotFound(message) => json!({ "error": message }),
            Error::Auth(AuthError::InvalidCredentials) => {
                json!({ "error": AuthError::InvalidCredentials.to_string() })
            }
            other => {
                if status.is_server_error() {
                    error!(error = %other, "Request failed");
                }
                json!({ "error": other.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}
