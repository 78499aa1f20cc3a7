use std::fs;

use semver::Version;
use tandem_core::config::{VersionMode, WorkspaceConfig, CONFIG_FILE};
use tandem_core::error::Error;
use tandem_core::graph::GraphType;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = WorkspaceConfig::parse("").unwrap();
    assert_eq!(config.packages, vec!["packages/*"]);
    assert_eq!(config.mode().unwrap(), VersionMode::Independent);
    assert_eq!(config.npm_client, "npm");
    assert!(!config.exact);
}

#[test]
fn test_fixed_mode_and_command_tables() {
    let config = WorkspaceConfig::parse(
        r#"
packages = ["packages/*", "tools/*"]
version = "1.4.0"
ignore-changes = ["**/*.md"]

[command.run]
concurrency = 2
stream = true
graph-type = "dependencies"

[command.version]
conventional-commits = true
tag-version-prefix = "release-"
ignore-changes = ["docs/**"]

[command.publish]
preid = "next"
"#,
    )
    .unwrap();

    assert_eq!(config.mode().unwrap(), VersionMode::Fixed(Version::new(1, 4, 0)));

    let run = config.command_options("run");
    assert_eq!(run.concurrency, Some(2));
    assert_eq!(run.stream, Some(true));
    assert_eq!(run.graph_type, Some(GraphType::Dependencies));
    assert_eq!(config.ignore_changes_for("run"), vec!["**/*.md"]);

    let publish = config.command_options("publish");
    assert_eq!(publish.preid.as_deref(), Some("next"));
    assert_eq!(publish.conventional_commits, Some(true));
    assert_eq!(publish.tag_version_prefix.as_deref(), Some("release-"));
    assert_eq!(config.ignore_changes_for("publish"), vec!["docs/**"]);
}

#[test]
fn test_invalid_version_is_rejected() {
    let result = WorkspaceConfig::parse(r#"version = "one point oh""#);
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn test_malformed_toml_is_rejected() {
    assert!(matches!(
        WorkspaceConfig::parse("packages = [\"a\""),
        Err(Error::Toml { .. })
    ));
}

#[test]
fn test_load_and_find_root() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), "version = \"independent\"\n").unwrap();
    let nested = dir.path().join("packages").join("a").join("src");
    fs::create_dir_all(&nested).unwrap();

    let root = WorkspaceConfig::find_root(&nested).unwrap();
    assert_eq!(root, dir.path());

    let config = WorkspaceConfig::load(&root).unwrap();
    assert_eq!(config.config_path, Some(dir.path().join(CONFIG_FILE)));
}

#[test]
fn test_find_root_stops_at_repository() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), "").unwrap();
    let repo = dir.path().join("inner");
    fs::create_dir_all(repo.join(".git")).unwrap();
    assert!(WorkspaceConfig::find_root(&repo).is_none());
}

#[test]
fn test_missing_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(WorkspaceConfig::load(dir.path()).is_err());
}

#[test]
fn test_write_fixed_version_keeps_other_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE);
    fs::write(
        &path,
        "# shared version\nversion = \"1.0.0\"\npackages = [\"packages/*\"]\n",
    )
    .unwrap();

    WorkspaceConfig::write_fixed_version(&path, &Version::new(1, 1, 0)).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(
        content,
        "# shared version\nversion = \"1.1.0\"\npackages = [\"packages/*\"]\n"
    );
}

#[test]
fn test_write_fixed_version_needs_entry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE);
    fs::write(&path, "packages = [\"packages/*\"]\n").unwrap();
    assert!(WorkspaceConfig::write_fixed_version(&path, &Version::new(2, 0, 0)).is_err());
}

#[test]
fn test_demo_config_parses() {
    let config = WorkspaceConfig::parse(include_str!("../../demos/basic/tandem.toml")).unwrap();
    assert_eq!(config.mode().unwrap(), VersionMode::Independent);
    assert_eq!(config.command_options("run").concurrency, Some(4));
    assert_eq!(
        config.command_options("changed").conventional_commits,
        Some(true)
    );
}
