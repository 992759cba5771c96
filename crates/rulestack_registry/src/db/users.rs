use sqlx::SqlitePool;

use crate::db;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

/// Insert a new user. `Ok(None)` when the username or email is taken.
pub async fn create(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password_hash: &str,
    role: &str,
) -> sqlx::Result<Option<User>> {
    let result = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, password_hash, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING *",
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .bind(db::now())
    .fetch_one(pool)
    .await;

    match result {
        Ok(user) => Ok(Some(user)),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Look a user up by username or email, for login.
pub async fn find_by_identifier(pool: &SqlitePool, identifier: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?1 OR email = ?1")
        .bind(identifier)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &SqlitePool) -> sqlx::Result<Vec<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
        .fetch_all(pool)
        .await
}

/// Delete a user; sessions go with it. `false` when the id is unknown.
pub async fn delete(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    sqlx::query("DELETE FROM user_sessions WHERE user_id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    let result = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_password(pool: &SqlitePool, id: i64, password_hash: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?2 WHERE id = ?1")
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_last_login(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET last_login = ?2 WHERE id = ?1")
        .bind(id)
        .bind(db::now())
        .execute(pool)
        .await?;
    Ok(())
}
