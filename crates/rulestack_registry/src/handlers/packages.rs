//! Package CRUD: search, summaries, version records, multipart publish,
//! and blob download.

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use rulestack_core::PackageManifest;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::db::packages;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::storage::{IncomingBlob, safe_name};

const DEFAULT_SEARCH_LIMIT: usize = 50;
const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, serde::Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
    tag: Option<String>,
    target: Option<String>,
    limit: Option<usize>,
}

/// `GET /v1/packages?q=&tag=&target=&limit=`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(MAX_SEARCH_LIMIT);

    let mut results = vec![];
    for package in packages::search(&state.db, &params.q).await? {
        let versions = packages::versions_of(&state.db, package.id).await?;
        let Some(latest) = latest_version(&versions) else {
            continue;
        };
        if let Some(tag) = &params.tag {
            if !latest.tags_vec().iter().any(|have| have == tag) {
                continue;
            }
        }
        if let Some(target) = &params.target {
            if !latest.targets_vec().iter().any(|have| have == target) {
                continue;
            }
        }
        results.push(json!({
            "name": package.name,
            "description": latest.description,
            "latest": latest.version,
            "tags": latest.tags_vec(),
            "targets": latest.targets_vec(),
        }));
        if results.len() == limit {
            break;
        }
    }
    Ok(Json(serde_json::Value::Array(results)))
}

/// `GET /v1/packages/{name}`
pub async fn get_package(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let package = packages::find(&state.db, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("package {name} not found")))?;
    let versions = packages::versions_of(&state.db, package.id).await?;
    let latest = latest_version(&versions);
    Ok(Json(json!({
        "name": package.name,
        "created_at": package.created_at,
        "description": latest.map(|v| v.description.clone()).unwrap_or_default(),
        "latest": latest.map(|v| v.version.clone()),
        "versions": versions.iter().map(|v| v.version.clone()).collect::<Vec<_>>(),
    })))
}

/// `GET /v1/packages/{name}/versions/{version}`
pub async fn get_version(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let package = packages::find(&state.db, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("package {name} not found")))?;
    let record = packages::find_version(&state.db, package.id, &version)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("version {name}@{version} not found")))?;
    Ok(Json(json!({
        "id": record.id,
        "name": package.name,
        "version": record.version,
        "description": record.description,
        "targets": record.targets_vec(),
        "tags": record.tags_vec(),
        "sha256": record.sha256,
        "size_bytes": record.size_bytes,
        "created_at": record.created_at,
    })))
}

/// `POST /v1/packages`: multipart `manifest` + `archive`.
///
/// The archive streams to storage through a SHA-256 tee; the version row
/// is inserted only after the file is fully on disk.
pub async fn publish(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut manifest_json: Option<String> = None;
    let mut received = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("manifest") => {
                manifest_json = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("cannot read manifest part: {e}"))
                })?);
            }
            Some("archive") => {
                let mut incoming = IncomingBlob::create(&state.storage_dir).await?;
                while let Some(chunk) = field.chunk().await.map_err(|e| {
                    ApiError::BadRequest(format!("cannot read archive part: {e}"))
                })? {
                    incoming.write_chunk(&chunk).await?;
                }
                received = Some(incoming.complete().await?);
            }
            _ => {}
        }
    }

    let Some(manifest_json) = manifest_json else {
        discard(received).await;
        return Err(ApiError::BadRequest("missing manifest part".to_string()));
    };
    let Some(received) = received else {
        return Err(ApiError::BadRequest("missing archive part".to_string()));
    };

    let manifest: PackageManifest = match serde_json::from_str(&manifest_json) {
        Ok(manifest) => manifest,
        Err(e) => {
            received.discard().await;
            return Err(ApiError::BadRequest(format!("invalid manifest: {e}")));
        }
    };
    if manifest.name.is_empty() || manifest.name.starts_with('@') {
        received.discard().await;
        return Err(ApiError::BadRequest(format!(
            "invalid package name `{}`",
            manifest.name
        )));
    }
    let version = match exact_version::parse(&manifest.version) {
        Ok(version) => version,
        Err(e) => {
            received.discard().await;
            return Err(ApiError::BadRequest(e.to_string()));
        }
    };

    let package = packages::find_or_create(&state.db, &manifest.name).await?;
    if packages::find_version(&state.db, package.id, &version.to_string())
        .await?
        .is_some()
    {
        received.discard().await;
        return Err(ApiError::Conflict(format!(
            "{}@{version} is already published",
            manifest.name
        )));
    }

    let blob_path = state
        .storage_dir
        .join(format!("{}-{version}.tgz", safe_name(&manifest.name)));
    let sha256 = received.sha256.clone();
    let size = received.size;
    received.persist(&blob_path).await?;

    let inserted = packages::insert_version(
        &state.db,
        package.id,
        &version.to_string(),
        &manifest.description,
        &manifest.targets,
        &manifest.tags,
        &sha256,
        size as i64,
        &blob_path.to_string_lossy(),
    )
    .await?;
    let Some(record) = inserted else {
        let _ = tokio::fs::remove_file(&blob_path).await;
        return Err(ApiError::Conflict(format!(
            "an archive with hash {sha256} is already published"
        )));
    };

    info!("published {}@{version} ({sha256}, {size} bytes)", manifest.name);
    let body = Json(json!({
        "id": record.id,
        "name": manifest.name,
        "version": version.to_string(),
        "sha256": sha256,
        "size": size,
    }));
    Ok((StatusCode::CREATED, body).into_response())
}

async fn discard(received: Option<crate::storage::ReceivedBlob>) {
    if let Some(received) = received {
        received.discard().await;
    }
}

/// `GET /v1/blobs/{sha256}`: stream the archive bytes.
pub async fn download_blob(
    State(state): State<AppState>,
    Path(sha256): Path<String>,
) -> ApiResult<Response> {
    let record = packages::find_blob(&state.db, &sha256)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("blob {sha256} not found")))?;

    let file = tokio::fs::File::open(&record.blob_path)
        .await
        .map_err(|e| {
            ApiError::Internal(anyhow::anyhow!(
                "blob file {} unreadable: {e}",
                record.blob_path
            ))
        })?;
    let stream = ReaderStream::new(file);
    let short = &sha256[..sha256.len().min(8)];
    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/gzip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{short}.tgz\""),
        )
        .header(header::CONTENT_LENGTH, record.size_bytes)
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(response)
}

/// Highest version by exact-version order.
fn latest_version(versions: &[packages::PackageVersion]) -> Option<&packages::PackageVersion> {
    versions
        .iter()
        .max_by_key(|v| exact_version::parse(&v.version).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn latest_version_orders_by_semver_not_text() {
        let pool = db::connect_in_memory().await.unwrap();
        let package = packages::find_or_create(&pool, "sec").await.unwrap();
        for (version, sha) in [("1.9.0", "a"), ("1.10.0", "b"), ("1.2.0", "c")] {
            packages::insert_version(&pool, package.id, version, "", &[], &[], sha, 1, "p")
                .await
                .unwrap();
        }
        let versions = packages::versions_of(&pool, package.id).await.unwrap();
        assert_eq!(latest_version(&versions).unwrap().version, "1.10.0");
    }
}
