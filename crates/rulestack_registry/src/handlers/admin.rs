//! Admin-only account management. Role enforcement happens in the
//! authentication middleware, driven by the route metadata table.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::json;

use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::handlers::user_json;
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

/// `GET /v1/admin/users`
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let users = users::list(&state.db).await?;
    Ok(Json(serde_json::Value::Array(
        users.iter().map(user_json).collect(),
    )))
}

/// `DELETE /v1/admin/users/{id}`: admins cannot delete themselves.
pub async fn delete_user(
    State(state): State<AppState>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if id == current.user.id {
        return Err(ApiError::Forbidden(
            "you cannot delete your own account here".to_string(),
        ));
    }
    if !users::delete(&state.db, id).await? {
        return Err(ApiError::NotFound(format!("user {id} not found")));
    }
    Ok(Json(json!({ "message": "user deleted" })))
}
