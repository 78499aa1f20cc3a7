//! Package registry lookups.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, RegistryError, Result};
use crate::graph::PackageGraph;

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Read access to a package registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Every published version of `name`, or `None` if the registry has never
    /// seen the package.
    async fn published_versions(
        &self,
        name: &str,
    ) -> std::result::Result<Option<Vec<String>>, RegistryError>;

    async fn is_published(
        &self,
        name: &str,
        version: &str,
    ) -> std::result::Result<bool, RegistryError> {
        Ok(self
            .published_versions(name)
            .await?
            .is_some_and(|versions| versions.iter().any(|v| v == version)))
    }
}

/// Registry client speaking the npm packument API.
pub struct HttpRegistry {
    client: Client,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpRegistry {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: Option<&str>, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("tandem/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Http {
                url: base_url.unwrap_or(DEFAULT_REGISTRY).to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_REGISTRY)
                .trim_end_matches('/')
                .to_string(),
            token,
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
        })
    }

    /// Scoped names keep the `@` but escape the slash.
    fn package_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.replace('/', "%2f"))
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Option<Vec<String>>, RegistryError> {
        let mut builder = self
            .client
            .get(url)
            .header("Accept", "application/vnd.npm.install-v1+json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| RegistryError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(RegistryError::Unauthorized {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                return Err(RegistryError::NotImplemented {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
            s if !s.is_success() => {
                return Err(RegistryError::Http {
                    url: url.to_string(),
                    message: format!("status {}", s),
                })
            }
            _ => {}
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| RegistryError::InvalidResponse {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
        let versions = body
            .get("versions")
            .and_then(|v| v.as_object())
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        Ok(Some(versions))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn published_versions(
        &self,
        name: &str,
    ) -> std::result::Result<Option<Vec<String>>, RegistryError> {
        let url = self.package_url(name);
        let mut delay = self.retry_delay;

        for attempt in 0..=self.max_retries {
            match self.fetch(&url).await {
                Err(RegistryError::Http { message, .. }) if attempt < self.max_retries => {
                    debug!(%url, attempt, %message, "registry request failed, retrying");
                    sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }

        Err(RegistryError::Http {
            url,
            message: "All retry attempts failed".to_string(),
        })
    }
}

/// Public packages whose current version the registry does not list yet,
/// in graph order.
///
/// A registry that does not implement the lookup is treated as knowing
/// nothing, so every public package is returned.
///
/// # Errors
///
/// Returns an error on authentication failure or any other registry error.
pub async fn unpublished_packages(
    graph: &PackageGraph,
    client: &dyn RegistryClient,
) -> Result<Vec<String>> {
    let mut unpublished = Vec::new();
    for node in graph.nodes() {
        if node.package().private {
            continue;
        }
        let Some(version) = node.version() else {
            warn!(package = %node.name(), "no valid version, skipping");
            continue;
        };
        let version = version.to_string();
        match client.is_published(node.name(), &version).await {
            Ok(true) => debug!(package = %node.name(), %version, "already published"),
            Ok(false) => unpublished.push(node.name().to_string()),
            Err(RegistryError::NotImplemented { url, status }) => {
                warn!(
                    package = %node.name(),
                    %url,
                    status,
                    "registry does not support version lookup, assuming unpublished"
                );
                unpublished.push(node.name().to_string());
            }
            Err(e) => return Err(Error::Registry(e)),
        }
    }
    Ok(unpublished)
}
