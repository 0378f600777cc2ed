//! Mapping of request failures to HTTP responses.
//!
//! [`ApiError`] is the only place where failures become status codes:
//!
//! | failure | status | body |
//! |---|---|---|
//! | invalid path or body | 422 | `{"detail": [FieldError…], "message": "METHOD: URL"}` |
//! | no matching row | 404 | `{"detail": "Operation does not exist"}` |
//! | name already taken | 409 | `{"detail": "An operation with this name already exists"}` |
//! | any other storage failure | 500 | `{"detail": "Internal Server Error"}` |

use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use operations_core::FieldError;
use serde_json::json;

use crate::service::OperationError;

/// Field-level validation failures of one request.
#[derive(Debug)]
pub struct ValidationFailure {
    pub errors: Vec<FieldError>,
    pub method: Method,
    /// Absolute URL when the `Host` header is known, otherwise path and query.
    pub url: String,
}

impl ValidationFailure {
    #[must_use]
    pub fn new(errors: Vec<FieldError>, method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        Self {
            errors,
            method: method.clone(),
            url: request_url(uri, headers),
        }
    }
}

/// Reconstructs the URL the client requested.
fn request_url(uri: &Uri, headers: &HeaderMap) -> String {
    if uri.scheme().is_some() {
        return uri.to_string();
    }
    match headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
    {
        Some(host) => format!("http://{host}{uri}"),
        None => uri.to_string(),
    }
}

/// Error returned by every operations handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request validation failed")]
    Validation(ValidationFailure),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("request body could not be read")]
    Body(#[from] BytesRejection),
    #[error("path parameters could not be extracted")]
    Path(#[from] PathRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(failure) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "detail": failure.errors,
                    "message": format!("{}: {}", failure.method, failure.url),
                })),
            )
                .into_response(),
            ApiError::Operation(err) => {
                let status = match &err {
                    OperationError::NotFound { .. } => StatusCode::NOT_FOUND,
                    OperationError::Conflict { .. } => StatusCode::CONFLICT,
                    OperationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let detail = match err {
                    OperationError::Storage(_) => "Internal Server Error".to_string(),
                    other => other.to_string(),
                };
                (status, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::Body(rejection) => rejection.into_response(),
            ApiError::Path(rejection) => rejection.into_response(),
        }
    }
}
