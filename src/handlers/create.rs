use crate::error::{ApiError, ErrorResponse};
use crate::models::{CreateTodo, Todo};
use crate::routes;
use crate::state::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};

/// POST /todos handler - Create a todo
///
/// The id is always generated by the server. Unknown body fields, a missing
/// title or a title that is blank after trimming are rejected with 400.
#[utoipa::path(
    post,
    path = routes::TODOS,
    request_body = CreateTodo,
    responses(
        (status = 201, description = "Todo created", body = Todo),
        (status = 400, description = "Malformed body or empty title", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse),
        (status = 500, description = "Store or index error", body = ErrorResponse)
    ),
    tag = "todos"
)]
pub async fn create_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateTodo>, JsonRejection>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let Json(input) = payload?;

    let todo = state.service.create(input).await?;

    Ok((StatusCode::CREATED, Json(todo)))
}
