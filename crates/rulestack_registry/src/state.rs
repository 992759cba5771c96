use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::JwtKeys;
use crate::middleware::rate_limit::RateLimiter;

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub storage_dir: PathBuf,
    pub jwt: Arc<JwtKeys>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Lifetime of issued tokens, in hours.
    pub jwt_ttl_hours: i64,
}

impl AppState {
    pub fn new(db: SqlitePool, storage_dir: PathBuf, jwt_secret: &str, jwt_ttl_hours: i64) -> Self {
        Self {
            db,
            storage_dir,
            jwt: Arc::new(JwtKeys::new(jwt_secret)),
            rate_limiter: Arc::new(RateLimiter::default()),
            jwt_ttl_hours,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("storage_dir", &self.storage_dir)
            .finish_non_exhaustive()
    }
}
