//! Handlers for the `/operations` resource.
//!
//! Each handler turns its extracted input into one [`OperationCommand`],
//! sends it through the pipeline and renders the reply.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use operations_core::{NewOperation, OperationPatch};
use serde_json::json;
use tower::ServiceExt;

use super::AppState;
use crate::network::error::ApiError;
use crate::network::extract::{combine, PathId, ValidatedJson};
use crate::service::{OperationCommand, OperationReply};

const CREATED_MESSAGE: &str = "The service has been successfully added";
const UPDATED_MESSAGE: &str = "The service has been successfully updated";
const DELETED_MESSAGE: &str = "The service has been successfully deleted";

async fn dispatch(state: &AppState, command: OperationCommand) -> Result<OperationReply, ApiError> {
    let reply = state.pipeline.clone().oneshot(command).await?;
    Ok(reply)
}

/// `GET /operations`: every row, or 204 when the table is empty.
pub async fn list_operations(State(state): State<AppState>) -> Result<OperationReply, ApiError> {
    dispatch(&state, OperationCommand::List).await
}

/// `GET /operations/{id}`
pub async fn get_operation(
    State(state): State<AppState>,
    path: PathId,
) -> Result<OperationReply, ApiError> {
    let id = path.operation_id()?;
    dispatch(&state, OperationCommand::Get { id }).await
}

/// `POST /operations`
pub async fn create_operation(
    State(state): State<AppState>,
    ValidatedJson(new): ValidatedJson<NewOperation>,
) -> Result<OperationReply, ApiError> {
    dispatch(&state, OperationCommand::Create(new)).await
}

/// `PUT /operations/{id}`: applies only the fields present in the body.
///
/// Path and body are validated together so a request with both wrong gets
/// one 422 listing every error.
pub async fn update_operation(
    State(state): State<AppState>,
    path: Result<PathId, ApiError>,
    body: Result<ValidatedJson<OperationPatch>, ApiError>,
) -> Result<OperationReply, ApiError> {
    let (path, ValidatedJson(patch)) = combine(path, body)?;
    let id = path.operation_id()?;
    dispatch(&state, OperationCommand::Update { id, patch }).await
}

/// `DELETE /operations/{id}`
pub async fn delete_operation(
    State(state): State<AppState>,
    path: PathId,
) -> Result<OperationReply, ApiError> {
    let id = path.operation_id()?;
    dispatch(&state, OperationCommand::Delete { id }).await
}

impl IntoResponse for OperationReply {
    fn into_response(self) -> Response {
        match self {
            OperationReply::Listed(rows) => {
                Json(json!({ "status": StatusCode::OK.as_u16(), "data": rows })).into_response()
            }
            OperationReply::Empty => StatusCode::NO_CONTENT.into_response(),
            OperationReply::Found(row) => {
                Json(json!({ "status": StatusCode::OK.as_u16(), "data": row })).into_response()
            }
            OperationReply::Created(row) => (
                StatusCode::CREATED,
                Json(json!({
                    "status": StatusCode::CREATED.as_u16(),
                    "message": CREATED_MESSAGE,
                    "id": row.id,
                })),
            )
                .into_response(),
            OperationReply::Updated(row) => Json(json!({
                "status": StatusCode::OK.as_u16(),
                "message": UPDATED_MESSAGE,
                "data": row,
            }))
            .into_response(),
            OperationReply::Deleted { .. } => Json(json!({
                "status": StatusCode::OK.as_u16(),
                "message": DELETED_MESSAGE,
            }))
            .into_response(),
        }
    }
}
