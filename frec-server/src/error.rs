//! HTTP error responses
//!
//! Every failure maps to exactly one response with body
//! `{"error": {"code": .., "message": ..}}`.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Domain error; status follows its kind
    #[error(transparent)]
    Common(#[from] frec_common::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Common(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Common(err) => err.code(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            ApiError::Common(err) => err.to_string(),
        }
    }

    /// `{"code": .., "message": ..}` for embedding in larger bodies
    pub fn body(&self) -> serde_json::Value {
        json!({
            "code": self.code(),
            "message": self.message(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.body() }));
        (self.status(), body).into_response()
    }
}

/// Extractor rejections become 400s with the usual body
macro_rules! bad_request_from_rejection {
    ($($rejection:ty),+) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    ApiError::BadRequest(rejection.body_text())
                }
            }
        )+
    };
}

bad_request_from_rejection!(JsonRejection, QueryRejection, PathRejection, MultipartRejection);

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
