use sqlx::SqlitePool;

use crate::db;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: String,
    pub last_used: String,
}

pub async fn create(
    pool: &SqlitePool,
    user_id: i64,
    token_hash: &str,
    expires_at: &str,
    user_agent: Option<&str>,
    ip: Option<&str>,
) -> sqlx::Result<Session> {
    sqlx::query_as::<_, Session>(
        "INSERT INTO user_sessions (user_id, token_hash, expires_at, last_used, user_agent, ip)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING id, user_id, token_hash, expires_at, last_used",
    )
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(db::now())
    .bind(user_agent)
    .bind(ip)
    .fetch_one(pool)
    .await
}

/// Find a session by token hash, filtering out expired rows at query time.
pub async fn find_live(pool: &SqlitePool, token_hash: &str) -> sqlx::Result<Option<Session>> {
    sqlx::query_as::<_, Session>(
        "SELECT id, user_id, token_hash, expires_at, last_used
         FROM user_sessions WHERE token_hash = ?1 AND expires_at > ?2",
    )
    .bind(token_hash)
    .bind(db::now())
    .fetch_optional(pool)
    .await
}

pub async fn touch(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE user_sessions SET last_used = ?2 WHERE id = ?1")
        .bind(id)
        .bind(db::now())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM user_sessions WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Revoke every session of a user except `keep`, e.g. after a password
/// change.
pub async fn delete_all_except(pool: &SqlitePool, user_id: i64, keep: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM user_sessions WHERE user_id = ?1 AND id != ?2")
        .bind(user_id)
        .bind(keep)
        .execute(pool)
        .await?;
    Ok(())
}
