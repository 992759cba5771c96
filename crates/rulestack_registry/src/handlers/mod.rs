pub mod admin;
pub mod auth;
pub mod health;
pub mod packages;

use serde_json::json;

use crate::db::users::User;

/// The public shape of a user record; never includes the password hash.
pub(crate) fn user_json(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "role": user.role,
        "created_at": user.created_at,
        "last_login": user.last_login,
    })
}
