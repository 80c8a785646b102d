//! Todo API Endpoints
//! Mission: CRUD over todo items, gated by role

use crate::auth::middleware::{RequireAdmin, RequireAnyRole, RequireManagerOrAdmin};
use crate::db::StoreError;
use crate::todos::{
    models::{Todo, TodoCreate, TodoUpdate},
    store::TodoRepository,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub type TodoState = Arc<dyn TodoRepository>;

/// List todos - GET /todo
pub async fn list_todos(
    RequireAnyRole(_user): RequireAnyRole,
    State(todos): State<TodoState>,
) -> Result<Json<Vec<Todo>>, TodoApiError> {
    Ok(Json(todos.list().await?))
}

/// Get one todo - GET /todo/:id
pub async fn get_todo(
    RequireAnyRole(_user): RequireAnyRole,
    State(todos): State<TodoState>,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, TodoApiError> {
    todos
        .get(id)
        .await?
        .map(Json)
        .ok_or(TodoApiError::NotFound(id))
}

/// Create todo - POST /todo (Admin only)
pub async fn create_todo(
    RequireAdmin(admin): RequireAdmin,
    State(todos): State<TodoState>,
    Json(payload): Json<TodoCreate>,
) -> Result<(StatusCode, Json<Todo>), TodoApiError> {
    payload.validate().map_err(TodoApiError::Validation)?;
    let requested_id = payload.id;

    let todo = todos.create(payload).await.map_err(|e| match e {
        StoreError::Conflict(_) => TodoApiError::Conflict(requested_id.unwrap_or_default()),
        other => other.into(),
    })?;

    info!(id = todo.id, by = %admin.username, "📝 Todo created");
    Ok((StatusCode::CREATED, Json(todo)))
}

/// Update todo - PUT /todo/:id (Manager or Admin)
pub async fn update_todo(
    RequireManagerOrAdmin(user): RequireManagerOrAdmin,
    State(todos): State<TodoState>,
    Path(id): Path<i64>,
    Json(payload): Json<TodoUpdate>,
) -> Result<Json<Todo>, TodoApiError> {
    payload.validate().map_err(TodoApiError::Validation)?;

    let todo = todos
        .update(id, payload)
        .await?
        .ok_or(TodoApiError::NotFound(id))?;

    info!(id, by = %user.username, "Todo updated");
    Ok(Json(todo))
}

/// Delete todo - DELETE /todo/:id (Admin only)
pub async fn delete_todo(
    RequireAdmin(admin): RequireAdmin,
    State(todos): State<TodoState>,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, TodoApiError> {
    let todo = todos.delete(id).await?.ok_or(TodoApiError::NotFound(id))?;

    info!(id, by = %admin.username, "🗑️  Todo deleted");
    Ok(Json(todo))
}

/// Todo API errors
#[derive(Debug, thiserror::Error)]
pub enum TodoApiError {
    #[error("todo {0} not found")]
    NotFound(i64),
    #[error("todo {0} already exists")]
    Conflict(i64),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for TodoApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            TodoApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            TodoApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            TodoApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            TodoApiError::Store(e) => {
                error!(error = %e, "Todo storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let message = match &self {
            TodoApiError::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}
