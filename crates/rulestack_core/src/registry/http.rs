//! The HTTP registry backend, speaking the `/v1/` JSON API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use exact_version::Version;
use reqwest::{RequestBuilder, StatusCode, multipart};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{
    PackageInfo, PackageSummary, PublishResult, RegistryClient, RegistryError, RegistryKind,
    RegistryResult, VersionInfo,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base_url: String,
    token: Option<SecretString>,
    client: reqwest::Client,
}

/// Profile data returned by the auth endpoints.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub user: UserInfo,
}

impl HttpRegistry {
    pub fn new(base_url: &str, token: Option<SecretString>) -> anyhow::Result<Self> {
        let user_agent = format!("rulestack/{}", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Attach the bearer token, when one is configured.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RegistryResult<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))
    }

    /// Create a new user account.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &SecretString,
    ) -> RegistryResult<UserInfo> {
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": password.expose_secret(),
        });
        let response = self
            .send(self.client.post(self.url("/v1/auth/register")).json(&body))
            .await?;
        let response = check_status(response, "registration").await?;
        decode(response).await
    }

    /// Log in and obtain a bearer token.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> RegistryResult<LoginResponse> {
        let body = serde_json::json!({
            "username": username,
            "password": password.expose_secret(),
        });
        let response = self
            .send(self.client.post(self.url("/v1/auth/login")).json(&body))
            .await?;
        let response = check_status(response, "login").await?;
        decode(response).await
    }

    /// Invalidate the current session.
    pub async fn logout(&self) -> RegistryResult<()> {
        let response = self
            .send(self.authorized(self.client.post(self.url("/v1/auth/logout"))))
            .await?;
        check_status(response, "logout").await?;
        Ok(())
    }

    /// Who the configured token belongs to.
    pub async fn profile(&self) -> RegistryResult<UserInfo> {
        let response = self
            .send(self.authorized(self.client.get(self.url("/v1/auth/profile"))))
            .await?;
        let response = check_status(response, "profile").await?;
        decode(response).await
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn search(
        &self,
        query: &str,
        tag: Option<&str>,
        target: Option<&str>,
        limit: Option<u32>,
    ) -> RegistryResult<Vec<PackageSummary>> {
        let mut params: Vec<(&str, String)> = vec![("q", query.to_string())];
        if let Some(tag) = tag {
            params.push(("tag", tag.to_string()));
        }
        if let Some(target) = target {
            params.push(("target", target.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let request = self
            .authorized(self.client.get(self.url("/v1/packages")))
            .query(&params);
        let response = check_status(self.send(request).await?, "search").await?;
        decode(response).await
    }

    async fn get_package(&self, name: &str) -> RegistryResult<PackageInfo> {
        let request = self
            .authorized(self.client.get(self.url(&format!("/v1/packages/{name}"))));
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::PackageNotFound(name.to_string()));
        }
        let response = check_status(response, "get package").await?;
        decode(response).await
    }

    async fn get_version(&self, name: &str, version: &Version) -> RegistryResult<VersionInfo> {
        let url = self.url(&format!("/v1/packages/{name}/versions/{version}"));
        let response = self.send(self.authorized(self.client.get(url))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::VersionNotFound(format!("{name}@{version}")));
        }
        let response = check_status(response, "get version").await?;
        decode(response).await
    }

    async fn publish(
        &self,
        manifest_path: &Path,
        archive_path: &Path,
    ) -> RegistryResult<PublishResult> {
        // Fail before any network round-trip when no token is configured.
        if self.token.is_none() {
            return Err(RegistryError::Unauthorized(
                "no token configured for this registry. Run `rulestack auth login` first."
                    .to_string(),
            ));
        }

        let manifest = fs_err::read(manifest_path)
            .map_err(|e| RegistryError::InvalidManifest(e.to_string()))?;
        let archive = fs_err::read(archive_path)
            .map_err(|e| RegistryError::PublishFailed(e.to_string()))?;
        let archive_name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.tgz".to_string());

        let form = multipart::Form::new()
            .part(
                "manifest",
                multipart::Part::bytes(manifest)
                    .file_name("rulestack.json")
                    .mime_str("application/json")
                    .map_err(|e| RegistryError::PublishFailed(e.to_string()))?,
            )
            .part(
                "archive",
                multipart::Part::bytes(archive)
                    .file_name(archive_name)
                    .mime_str("application/gzip")
                    .map_err(|e| RegistryError::PublishFailed(e.to_string()))?,
            );

        let request = self
            .authorized(self.client.post(self.url("/v1/packages")))
            .multipart(form);
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = body_detail(response).await;
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    RegistryError::Unauthorized(detail)
                }
                StatusCode::TOO_MANY_REQUESTS => RegistryError::RateLimited(detail),
                StatusCode::BAD_REQUEST => RegistryError::InvalidManifest(detail),
                _ => RegistryError::PublishFailed(format!("{status}: {detail}")),
            });
        }
        decode(response).await
    }

    async fn download_blob(&self, sha256: &str, dest: &Path) -> RegistryResult<()> {
        let url = self.url(&format!("/v1/blobs/{sha256}"));
        let mut response = self.send(self.authorized(self.client.get(url))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::PackageNotFound(format!("blob {sha256}")));
        }
        let response_status = response.status();
        if !response_status.is_success() {
            let detail = body_detail(response).await;
            return Err(RegistryError::Network(format!(
                "blob download failed with {response_status}: {detail}"
            )));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| RegistryError::Network(e.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        debug!("downloaded blob {sha256} to {}", dest.display());
        Ok(())
    }

    async fn health(&self) -> RegistryResult<()> {
        let response = self.send(self.client.get(self.url("/v1/health"))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RegistryError::Network(format!(
                "registry is unhealthy: {}",
                response.status()
            )))
        }
    }

    fn kind(&self) -> RegistryKind {
        RegistryKind::RemoteHttp
    }
}

/// Map non-success statuses into the error taxonomy.
async fn check_status(
    response: reqwest::Response,
    operation: &str,
) -> RegistryResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = body_detail(response).await;
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RegistryError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => RegistryError::RateLimited(detail),
        StatusCode::NOT_FOUND => RegistryError::PackageNotFound(detail),
        _ => RegistryError::Network(format!("{operation} failed with {status}: {detail}")),
    })
}

async fn body_detail(response: reqwest::Response) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }
    match response.text().await {
        Ok(text) => match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.error,
            Err(_) if !text.is_empty() => text,
            Err(_) => "no detail".to_string(),
        },
        Err(_) => "no detail".to_string(),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> RegistryResult<T> {
    response
        .json()
        .await
        .map_err(|e| RegistryError::Network(format!("invalid response body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn trailing_slashes_are_trimmed() {
        let registry = HttpRegistry::new("http://example.com///", None).unwrap();
        assert_eq!(registry.url("/v1/health"), "http://example.com/v1/health");
    }

    #[tokio::test]
    async fn search_decodes_summaries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/packages"))
            .and(query_param("q", "sec"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "sec", "description": "security rules", "latest": "1.0.0"}
            ])))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None).unwrap();
        let results = registry.search("sec", None, None, Some(10)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "sec");
        assert_eq!(results[0].latest.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn missing_version_maps_to_version_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/packages/sec/versions/9.9.9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None).unwrap();
        let err = registry
            .get_version("sec", &Version::new(9, 9, 9))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn publish_without_token_fails_locally() {
        // No mock server: the call must not hit the network at all.
        let registry = HttpRegistry::new("http://127.0.0.1:9", None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("rulestack.json");
        let archive = dir.path().join("a.tgz");
        fs_err::write(&manifest, "{}").unwrap();
        fs_err::write(&archive, "gz").unwrap();

        let err = registry.publish(&manifest, &archive).await.unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn publish_401_maps_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/packages"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "session expired"})),
            )
            .mount(&server)
            .await;

        let registry =
            HttpRegistry::new(&server.uri(), Some(SecretString::from("stale-token"))).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("rulestack.json");
        let archive = dir.path().join("a.tgz");
        fs_err::write(&manifest, "{}").unwrap();
        fs_err::write(&archive, "gz").unwrap();

        let err = registry.publish(&manifest, &archive).await.unwrap_err();
        match err {
            RegistryError::Unauthorized(detail) => assert_eq!(detail, "session expired"),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn download_blob_writes_exact_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/blobs/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive bytes".to_vec()))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("blob.tgz");
        registry.download_blob("abc123", &dest).await.unwrap();
        assert_eq!(fs_err::read(&dest).unwrap(), b"archive bytes");
    }

    #[tokio::test]
    async fn health_maps_failure_to_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let registry = HttpRegistry::new(&server.uri(), None).unwrap();
        assert!(matches!(
            registry.health().await,
            Err(RegistryError::Network(_))
        ));
    }
}
