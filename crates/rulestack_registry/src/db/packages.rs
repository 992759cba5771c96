use sqlx::SqlitePool;

use crate::db;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PackageVersion {
    pub id: i64,
    pub package_id: i64,
    pub version: String,
    pub description: String,
    /// JSON array of target assistants.
    pub targets: String,
    /// JSON array of tags.
    pub tags: String,
    pub sha256: String,
    pub size_bytes: i64,
    pub blob_path: String,
    pub created_at: String,
}

impl PackageVersion {
    pub fn targets_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.targets).unwrap_or_default()
    }

    pub fn tags_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

pub async fn find(pool: &SqlitePool, name: &str) -> sqlx::Result<Option<Package>> {
    sqlx::query_as::<_, Package>("SELECT * FROM packages WHERE name = ?1")
        .bind(name)
        .fetch_optional(pool)
        .await
}

pub async fn find_or_create(pool: &SqlitePool, name: &str) -> sqlx::Result<Package> {
    if let Some(package) = find(pool, name).await? {
        return Ok(package);
    }
    sqlx::query_as::<_, Package>(
        "INSERT INTO packages (name, created_at) VALUES (?1, ?2) RETURNING *",
    )
    .bind(name)
    .bind(db::now())
    .fetch_one(pool)
    .await
}

pub async fn versions_of(pool: &SqlitePool, package_id: i64) -> sqlx::Result<Vec<PackageVersion>> {
    sqlx::query_as::<_, PackageVersion>(
        "SELECT * FROM package_versions WHERE package_id = ?1 ORDER BY created_at",
    )
    .bind(package_id)
    .fetch_all(pool)
    .await
}

pub async fn find_version(
    pool: &SqlitePool,
    package_id: i64,
    version: &str,
) -> sqlx::Result<Option<PackageVersion>> {
    sqlx::query_as::<_, PackageVersion>(
        "SELECT * FROM package_versions WHERE package_id = ?1 AND version = ?2",
    )
    .bind(package_id)
    .bind(version)
    .fetch_optional(pool)
    .await
}

/// Insert a version row. `Ok(None)` when the `(package, version)` pair or
/// the archive hash already exists.
#[allow(clippy::too_many_arguments)]
pub async fn insert_version(
    pool: &SqlitePool,
    package_id: i64,
    version: &str,
    description: &str,
    targets: &[String],
    tags: &[String],
    sha256: &str,
    size_bytes: i64,
    blob_path: &str,
) -> sqlx::Result<Option<PackageVersion>> {
    let result = sqlx::query_as::<_, PackageVersion>(
        "INSERT INTO package_versions
             (package_id, version, description, targets, tags, sha256, size_bytes, blob_path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         RETURNING *",
    )
    .bind(package_id)
    .bind(version)
    .bind(description)
    .bind(serde_json::to_string(targets).unwrap_or_else(|_| "[]".to_string()))
    .bind(serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string()))
    .bind(sha256)
    .bind(size_bytes)
    .bind(blob_path)
    .bind(db::now())
    .fetch_one(pool)
    .await;

    match result {
        Ok(version) => Ok(Some(version)),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn find_blob(pool: &SqlitePool, sha256: &str) -> sqlx::Result<Option<PackageVersion>> {
    sqlx::query_as::<_, PackageVersion>("SELECT * FROM package_versions WHERE sha256 = ?1")
        .bind(sha256)
        .fetch_optional(pool)
        .await
}

/// Packages whose name or any version description matches `query`.
pub async fn search(pool: &SqlitePool, query: &str) -> sqlx::Result<Vec<Package>> {
    let pattern = format!("%{query}%");
    sqlx::query_as::<_, Package>(
        "SELECT DISTINCT p.* FROM packages p
         LEFT JOIN package_versions v ON v.package_id = p.id
         WHERE p.name LIKE ?1 OR v.description LIKE ?1
         ORDER BY p.name",
    )
    .bind(pattern)
    .fetch_all(pool)
    .await
}
