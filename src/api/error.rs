//! API error handling

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::Alert;
use crate::core::error::{ErrorKey, ResourceError};
use crate::core::identity::EntityKind;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    /// A failure reported by the resource service
    Resource(ResourceError),
    /// Malformed path, query or body
    BadRequest(String),
    /// Internal server error
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Resource(err) => write!(f, "{}", err),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Problem-style error body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub title: String,
    pub status: u16,
    pub entity_name: Option<String>,
    pub error_key: String,
    pub message: String,
    pub params: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Resource(err) => match err {
                ResourceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                ResourceError::NotFound {
                    key: ErrorKey::IdNotFound,
                    ..
                } => StatusCode::BAD_REQUEST,
                ResourceError::NotFound { .. } => StatusCode::NOT_FOUND,
                ResourceError::Conflict { .. } => StatusCode::CONFLICT,
                ResourceError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_key(&self) -> &'static str {
        match self {
            ApiError::Resource(err) => err.key().as_str(),
            ApiError::BadRequest(_) => "badrequest",
            ApiError::Internal(_) => "internal",
        }
    }

    fn entity(&self) -> Option<EntityKind> {
        match self {
            ApiError::Resource(err) => Some(err.entity()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let entity = self.entity();
        let error_key = self.error_key();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }

        let title = match &self {
            ApiError::Resource(
                ResourceError::InvalidRequest { message, .. }
                | ResourceError::NotFound { message, .. }
                | ResourceError::Conflict { message, .. },
            ) => message.clone(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            title,
            status: status.as_u16(),
            entity_name: entity.map(|e| e.as_str().to_string()),
            error_key: error_key.to_string(),
            message: format!("error.{}", error_key),
            params: entity.map(|e| e.as_str().to_string()),
        };

        let alert = Alert::Failure {
            entity,
            key: error_key,
        };
        (status, axum::Extension(alert), Json(body)).into_response()
    }
}

impl From<ResourceError> for ApiError {
    fn from(err: ResourceError) -> Self {
        ApiError::Resource(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
