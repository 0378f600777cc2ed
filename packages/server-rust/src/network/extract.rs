//! Request extractors that report failures as 422 validation errors.

use std::num::IntErrorKind;

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use operations_core::{parse_body, FieldError, OperationId, Payload};

use super::error::{ApiError, ValidationFailure};
use crate::service::OperationError;

/// A JSON body validated field by field into a [`Payload`].
///
/// Unlike `axum::Json`, every problem in the body is collected and returned
/// as a [`FieldError`] with a `["body", ...]` location.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: Payload + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut failure = ValidationFailure::new(Vec::new(), req.method(), req.uri(), req.headers());

        let raw = Bytes::from_request(req, state).await?;
        parse_body::<T>(&raw).map(ValidatedJson).map_err(|errors| {
            failure.errors = errors;
            ApiError::Validation(failure)
        })
    }
}

/// The `{id}` path segment parsed as an integer.
///
/// Any integer is accepted here, including ones no row can have; integers
/// beyond `i64` saturate. Only non-integers are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathId(pub i64);

impl PathId {
    /// Narrows to an [`OperationId`].
    ///
    /// # Errors
    ///
    /// [`OperationError::NotFound`] when the value is outside the id range.
    pub fn operation_id(self) -> Result<OperationId, OperationError> {
        OperationId::try_from(self.0).map_err(|_| OperationError::NotFound { id: self.0 })
    }
}

fn parse_path_integer(raw: &str) -> Option<i64> {
    match raw.parse::<i64>() {
        Ok(value) => Some(value),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// Joins two extraction results. When both failed validation, their field
/// errors are reported together, first ones first.
///
/// # Errors
///
/// The merged validation failure, or the first non-validation error.
pub fn combine<A, B>(
    first: Result<A, ApiError>,
    second: Result<B, ApiError>,
) -> Result<(A, B), ApiError> {
    match (first, second) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(ApiError::Validation(mut merged)), Err(ApiError::Validation(rest))) => {
            merged.errors.extend(rest.errors);
            Err(ApiError::Validation(merged))
        }
        (Err(err), _) | (_, Err(err)) => Err(err),
    }
}

impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state).await?;
        parse_path_integer(&raw).map(PathId).ok_or_else(|| {
            let errors = vec![FieldError::int_parsing(vec!["path".into(), "id".into()], &raw)];
            ApiError::Validation(ValidationFailure::new(
                errors,
                &parts.method,
                &parts.uri,
                &parts.headers,
            ))
        })
    }
}
