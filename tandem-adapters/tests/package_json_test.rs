use std::fs;
use std::path::Path;

use tandem_adapters::{get_adapter, PackageJsonAdapter};
use tandem_core::adapter::ManifestAdapter;
use tandem_core::config::WorkspaceConfig;
use tandem_core::error::Error;
use tandem_core::graph::PackageGraph;
use tandem_core::scanner::Scanner;
use tempfile::TempDir;

fn write_manifest(dir: &Path, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("package.json"), content).unwrap();
}

#[test]
fn test_read_manifest() {
    let dir = TempDir::new().unwrap();
    write_manifest(
        dir.path(),
        r#"{
  "name": "@acme/ui",
  "version": "1.2.0",
  "private": true,
  "scripts": { "build": "tsc", "test": "jest" },
  "dependencies": { "@acme/core": "^1.0.0", "react": "^18.2.0" },
  "devDependencies": { "typescript": "^5.0.0" },
  "peerDependencies": { "react-dom": "^18.0.0" },
  "optionalDependencies": { "fsevents": "*" }
}"#,
    );

    let package = PackageJsonAdapter.read(dir.path()).unwrap();
    assert_eq!(package.name, "@acme/ui");
    assert_eq!(package.version.as_deref(), Some("1.2.0"));
    assert!(package.private);
    assert!(package.has_script("build"));
    assert_eq!(package.dependencies["@acme/core"], "^1.0.0");
    assert_eq!(package.dev_dependencies["typescript"], "^5.0.0");
    assert_eq!(package.peer_dependencies["react-dom"], "^18.0.0");
    assert_eq!(package.optional_dependencies["fsevents"], "*");
    assert_eq!(package.location, dir.path());
}

#[test]
fn test_missing_version_reads_as_none() {
    let dir = TempDir::new().unwrap();
    write_manifest(dir.path(), r#"{ "name": "tool" }"#);
    let package = PackageJsonAdapter.read(dir.path()).unwrap();
    assert!(package.version.is_none());
    assert_eq!(package.version_or_missing(), "MISSING");
}

#[test]
fn test_invalid_manifests() {
    let dir = TempDir::new().unwrap();
    write_manifest(dir.path(), r#"{ "version": "1.0.0" }"#);
    assert!(matches!(
        PackageJsonAdapter.read(dir.path()),
        Err(Error::Manifest { .. })
    ));

    write_manifest(dir.path(), "{ not json");
    match PackageJsonAdapter.read(dir.path()) {
        Err(Error::Json { context, .. }) => assert!(context.ends_with("package.json")),
        other => panic!("expected json error, got {:?}", other),
    }

    write_manifest(dir.path(), "[1, 2]");
    assert!(matches!(
        PackageJsonAdapter.read(dir.path()),
        Err(Error::Manifest { .. })
    ));
}

#[test]
fn test_write_preserves_layout_and_unknown_fields() {
    let dir = TempDir::new().unwrap();
    write_manifest(
        dir.path(),
        r#"{
  "name": "app",
  "version": "1.0.0",
  "description": "keeps me",
  "dependencies": {
    "lib": "^1.0.0",
    "left-pad": "1.3.0"
  },
  "files": ["dist"]
}
"#,
    );

    let adapter = get_adapter();
    let mut package = adapter.read(dir.path()).unwrap();
    package.set_version(&semver::Version::new(2, 0, 0));
    package.set_dependency_specifier("lib", "^2.0.0");
    let written = adapter.write(&package).unwrap();

    assert_eq!(written, dir.path().join("package.json"));
    let content = fs::read_to_string(written).unwrap();
    assert_eq!(
        content,
        r#"{
  "name": "app",
  "version": "2.0.0",
  "description": "keeps me",
  "dependencies": {
    "lib": "^2.0.0",
    "left-pad": "1.3.0"
  },
  "files": [
    "dist"
  ]
}
"#
    );
}

#[test]
fn test_scanner_reads_configured_globs() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_manifest(
        &root.join("packages/b"),
        r#"{ "name": "b", "version": "1.0.0", "dependencies": { "a": "^1.0.0" } }"#,
    );
    write_manifest(&root.join("packages/a"), r#"{ "name": "a", "version": "1.0.0" }"#);
    write_manifest(&root.join("tools/cli"), r#"{ "name": "cli", "version": "0.1.0" }"#);
    write_manifest(
        &root.join("packages/b/node_modules/a"),
        r#"{ "name": "a", "version": "0.0.1" }"#,
    );
    fs::create_dir_all(root.join("packages/empty")).unwrap();

    let config = WorkspaceConfig::parse(r#"packages = ["packages/*", "tools/*/"]"#).unwrap();
    let adapter = PackageJsonAdapter;
    let packages = Scanner::new(root, &config, &adapter).scan().unwrap();

    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "cli"]);

    let graph = PackageGraph::new(packages).unwrap();
    assert_eq!(graph.dependency_names("b").unwrap(), vec!["a"]);
}

#[test]
fn test_scanner_reports_duplicate_names() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir.path().join("packages/one"), r#"{ "name": "same", "version": "1.0.0" }"#);
    write_manifest(&dir.path().join("packages/two"), r#"{ "name": "same", "version": "1.0.0" }"#);

    let config = WorkspaceConfig::default();
    let packages = Scanner::new(dir.path(), &config, &PackageJsonAdapter)
        .scan()
        .unwrap();
    assert!(matches!(
        PackageGraph::new(packages),
        Err(Error::DuplicatePackage { .. })
    ));
}
