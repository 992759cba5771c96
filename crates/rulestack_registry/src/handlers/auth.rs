//! Account and session lifecycle.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use serde_json::json;

use crate::auth::{hash_password, token_hash, verify_password};
use crate::db::{sessions, users};
use crate::error::{ApiError, ApiResult};
use crate::handlers::user_json;
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, serde::Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

/// `POST /v1/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Response> {
    if request.username.is_empty() || request.username.starts_with('@') {
        return Err(ApiError::BadRequest("invalid username".to_string()));
    }
    if !request.email.contains('@') {
        return Err(ApiError::BadRequest("invalid email address".to_string()));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = hash_password(&request.password)?;
    let user = users::create(
        &state.db,
        &request.username,
        &request.email,
        &password_hash,
        "user",
    )
    .await?
    .ok_or_else(|| ApiError::Conflict("username or email is already taken".to_string()))?;

    Ok((StatusCode::CREATED, Json(user_json(&user))).into_response())
}

#[derive(Debug, serde::Deserialize)]
pub struct LoginRequest {
    /// Username or email address.
    username: String,
    password: String,
}

/// `POST /v1/auth/login`: issue a JWT and persist its session.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = users::find_by_identifier(&state.db, &request.username)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or_else(|| ApiError::Unauthorized("invalid credentials".to_string()))?;

    let (token, expires_at) =
        state
            .jwt
            .issue(user.id, &user.username, &user.role, state.jwt_ttl_hours)?;
    let expires_at = expires_at.to_rfc3339_opts(SecondsFormat::Secs, true);

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let ip = client_ip_from_headers(&headers);
    sessions::create(
        &state.db,
        user.id,
        &token_hash(&token),
        &expires_at,
        user_agent,
        ip.as_deref(),
    )
    .await?;
    users::touch_last_login(&state.db, user.id).await?;

    Ok(Json(json!({
        "token": token,
        "expires_at": expires_at,
        "user": user_json(&user),
    })))
}

/// `POST /v1/auth/logout`: revoke the calling session.
pub async fn logout(
    State(state): State<AppState>,
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> ApiResult<Json<serde_json::Value>> {
    sessions::delete(&state.db, current.session.id).await?;
    Ok(Json(json!({ "message": "logged out" })))
}

/// `GET /v1/auth/profile`
pub async fn profile(
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Json<serde_json::Value> {
    Json(user_json(&current.user))
}

#[derive(Debug, serde::Deserialize)]
pub struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// `POST /v1/auth/change-password`: every other session is revoked.
pub async fn change_password(
    State(state): State<AppState>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !verify_password(&request.current_password, &current.user.password_hash) {
        return Err(ApiError::Unauthorized(
            "current password is incorrect".to_string(),
        ));
    }
    if request.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let password_hash = hash_password(&request.new_password)?;
    users::update_password(&state.db, current.user.id, &password_hash).await?;
    sessions::delete_all_except(&state.db, current.user.id, current.session.id).await?;
    Ok(Json(json!({ "message": "password changed" })))
}

#[derive(Debug, serde::Deserialize)]
pub struct DeleteAccountRequest {
    password: String,
}

/// `DELETE /v1/auth/delete-account`: admins may not delete themselves.
pub async fn delete_account(
    State(state): State<AppState>,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(request): Json<DeleteAccountRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !verify_password(&request.password, &current.user.password_hash) {
        return Err(ApiError::Unauthorized("password is incorrect".to_string()));
    }
    if current.user.role == "admin" {
        return Err(ApiError::Forbidden(
            "admin accounts cannot delete themselves".to_string(),
        ));
    }
    users::delete(&state.db, current.user.id).await?;
    Ok(Json(json!({ "message": "account deleted" })))
}

/// `X-Forwarded-For` first hop, else `X-Real-IP`. The socket address is
/// unavailable here; the middleware variant in [`crate::middleware`]
/// falls back to it.
fn client_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
}
