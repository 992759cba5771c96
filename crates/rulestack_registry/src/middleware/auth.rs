//! Session-backed JWT authentication and role enforcement.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::error;

use crate::auth::token_hash;
use crate::db::{sessions, users};
use crate::error::error_response;
use crate::routes::{DEFAULT_META, route_meta};
use crate::state::AppState;

/// Authenticated identity attached to the request for handlers.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: users::User,
    pub session: sessions::Session,
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let meta = route_meta(req.method().as_str(), req.uri().path())
        .copied()
        .unwrap_or(DEFAULT_META);
    if !meta.requires_auth {
        return next.run(req).await;
    }

    let Some(token) = bearer_token(req.headers()) else {
        return error_response(StatusCode::UNAUTHORIZED, "missing bearer token");
    };
    if state.jwt.verify(&token).is_err() {
        return error_response(StatusCode::UNAUTHORIZED, "invalid or expired token");
    }

    // The signature only proves who minted the token; the session row is
    // what makes it live. Deleting the row revokes the token.
    let session = match sessions::find_live(&state.db, &token_hash(&token)).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return error_response(StatusCode::UNAUTHORIZED, "session expired or revoked");
        }
        Err(e) => {
            error!("session lookup failed: {e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };
    if let Err(e) = sessions::touch(&state.db, session.id).await {
        // Not worth failing the request over.
        error!("cannot touch session {}: {e}", session.id);
    }

    let user = match users::find_by_id(&state.db, session.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::UNAUTHORIZED, "unknown user"),
        Err(e) => {
            error!("user lookup failed: {e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };
    if !meta.required_role.allows(&user.role) {
        return error_response(StatusCode::FORBIDDEN, "insufficient role");
    }

    req.extensions_mut().insert(CurrentUser { user, session });
    next.run(req).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}
