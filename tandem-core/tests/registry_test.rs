use std::collections::HashMap;

use async_trait::async_trait;
use tandem_core::error::{Error, RegistryError};
use tandem_core::graph::PackageGraph;
use tandem_core::package::Package;
use tandem_core::registry::{unpublished_packages, RegistryClient};

/// Registry with a fixed set of published versions, or a canned failure.
struct FakeRegistry {
    published: HashMap<String, Vec<String>>,
    failure: Option<fn(&str) -> RegistryError>,
}

impl FakeRegistry {
    fn new(published: &[(&str, &[&str])]) -> Self {
        Self {
            published: published
                .iter()
                .map(|(name, versions)| {
                    (name.to_string(), versions.iter().map(|v| v.to_string()).collect())
                })
                .collect(),
            failure: None,
        }
    }

    fn failing(failure: fn(&str) -> RegistryError) -> Self {
        Self {
            published: HashMap::new(),
            failure: Some(failure),
        }
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn published_versions(
        &self,
        name: &str,
    ) -> std::result::Result<Option<Vec<String>>, RegistryError> {
        if let Some(failure) = self.failure {
            return Err(failure(name));
        }
        Ok(self.published.get(name).cloned())
    }
}

fn graph() -> PackageGraph {
    PackageGraph::new(vec![
        Package::new("core", Some("1.1.0"), "/repo/packages/core"),
        Package::new("ui", Some("2.0.0"), "/repo/packages/ui"),
        Package::new("fresh", Some("0.1.0"), "/repo/packages/fresh"),
        Package::new("site", Some("1.0.0"), "/repo/packages/site").private(true),
        Package::new("broken", Some("not-a-version"), "/repo/packages/broken"),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_unpublished_packages_skips_known_versions() {
    let registry = FakeRegistry::new(&[
        ("core", &["1.0.0"]),
        ("ui", &["1.0.0", "2.0.0"]),
        ("site", &[]),
    ]);

    let unpublished = unpublished_packages(&graph(), &registry).await.unwrap();
    assert_eq!(unpublished, vec!["core", "fresh"]);
}

#[tokio::test]
async fn test_not_implemented_assumes_unpublished() {
    let registry = FakeRegistry::failing(|name| RegistryError::NotImplemented {
        url: format!("https://registry.example/{}", name),
        status: 501,
    });

    let unpublished = unpublished_packages(&graph(), &registry).await.unwrap();
    assert_eq!(unpublished, vec!["core", "ui", "fresh"]);
}

#[tokio::test]
async fn test_unauthorized_aborts() {
    let registry = FakeRegistry::failing(|name| RegistryError::Unauthorized {
        url: format!("https://registry.example/{}", name),
        status: 401,
    });

    let err = unpublished_packages(&graph(), &registry).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::Unauthorized { status: 401, .. })
    ));
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_is_published_default_method() {
    let registry = FakeRegistry::new(&[("core", &["1.0.0"])]);
    assert!(registry.is_published("core", "1.0.0").await.unwrap());
    assert!(!registry.is_published("core", "1.1.0").await.unwrap());
    assert!(!registry.is_published("missing", "1.0.0").await.unwrap());
}
