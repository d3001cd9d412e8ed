use crate::error::{ApiError, ErrorResponse};
use crate::models::DeleteResponse;
use crate::routes;
use crate::state::AppState;
use axum::{extract::State, extract::Path, http::StatusCode, Json};

/// DELETE /todos/{id} handler - Delete a todo
///
/// Deleting an unknown id is not an error: it reports `{"deleted": false}`.
#[utoipa::path(
    delete,
    path = routes::TODO_ITEM,
    params(
        ("id" = String, Path, description = "Server-generated todo id")
    ),
    responses(
        (status = 200, description = "Whether a todo was deleted", body = DeleteResponse),
        (status = 500, description = "Store or index update error", body = ErrorResponse)
    ),
    tag = "todos"
)]
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<DeleteResponse>), ApiError> {
    let deleted = state.service.delete(&id).await?;

    Ok((StatusCode::OK, Json(DeleteResponse { deleted })))
}
