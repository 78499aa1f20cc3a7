mod common;

use common::GitFixture;
use tandem_core::change::{ChangeDetector, ChangeOptions};
use tandem_core::error::Error;
use tandem_core::filter::{PackageFilter, Since};
use tandem_core::git::GitRepository;
use tandem_core::graph::PackageGraph;
use tandem_core::package::{DependencyKind, Package};

fn pkg(name: &str) -> Package {
    Package::new(name, Some("1.0.0"), format!("/repo/packages/{}", name))
}

fn graph() -> PackageGraph {
    PackageGraph::new(vec![
        pkg("@acme/core"),
        pkg("@acme/ui").with_dependency(DependencyKind::Dependencies, "@acme/core", "^1.0.0"),
        pkg("@acme/cli").with_dependency(DependencyKind::Dependencies, "@acme/ui", "^1.0.0"),
        pkg("docs").private(true),
    ])
    .unwrap()
}

fn apply(filter: &PackageFilter) -> Vec<String> {
    filter
        .apply(&graph(), None, None, &ChangeOptions::default())
        .unwrap()
}

#[test]
fn test_no_filters_returns_everything() {
    assert_eq!(
        apply(&PackageFilter::new()),
        vec!["@acme/core", "@acme/ui", "@acme/cli", "docs"]
    );
}

#[test]
fn test_scope_ignore_and_private() {
    let scoped = PackageFilter {
        scope: vec!["@acme/*".to_string()],
        ignore: vec!["*cli".to_string()],
        ..PackageFilter::new()
    };
    assert_eq!(apply(&scoped), vec!["@acme/core", "@acme/ui"]);

    let public = PackageFilter {
        include_private: false,
        ..PackageFilter::new()
    };
    assert!(!apply(&public).contains(&"docs".to_string()));
}

#[test]
fn test_expansion_flags() {
    let with_deps = PackageFilter {
        scope: vec!["@acme/cli".to_string()],
        include_dependencies: true,
        ..PackageFilter::new()
    };
    assert_eq!(apply(&with_deps), vec!["@acme/core", "@acme/ui", "@acme/cli"]);

    let with_dependents = PackageFilter {
        scope: vec!["@acme/ui".to_string()],
        include_dependents: true,
        ..PackageFilter::new()
    };
    assert_eq!(apply(&with_dependents), vec!["@acme/ui", "@acme/cli"]);
}

#[test]
fn test_invalid_glob() {
    let filter = PackageFilter {
        scope: vec!["[".to_string()],
        ..PackageFilter::new()
    };
    assert!(filter
        .apply(&graph(), None, None, &ChangeOptions::default())
        .is_err());
}

#[test]
fn test_since_requires_repository() {
    let filter = PackageFilter {
        since: Some(Since::LastTag),
        ..PackageFilter::new()
    };
    let result = filter.apply(&graph(), None, None, &ChangeOptions::default());
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn test_since_filters_to_changed() {
    let fixture = GitFixture::new();
    fixture.seed_packages(&["a", "b"]);
    fixture.tag("v1.0.0");
    fixture.write("packages/b/index.js", "changed\n");
    fixture.commit("fix: b");

    let graph = PackageGraph::new(vec![
        fixture.package("a", "1.0.0"),
        fixture.package("b", "1.0.0"),
    ])
    .unwrap();
    let repo = GitRepository::open(&fixture.root()).unwrap();
    let detector = ChangeDetector::new(&graph, &repo);

    let last_tag = PackageFilter {
        since: Some(Since::LastTag),
        ..PackageFilter::new()
    };
    let names = last_tag
        .apply(&graph, Some(&detector), Some("v1.0.0"), &ChangeOptions::default())
        .unwrap();
    assert_eq!(names, vec!["b"]);

    let explicit = PackageFilter {
        since: Some(Since::Ref("v1.0.0".to_string())),
        ..PackageFilter::new()
    };
    let names = explicit
        .apply(&graph, Some(&detector), None, &ChangeOptions::default())
        .unwrap();
    assert_eq!(names, vec!["b"]);
}
