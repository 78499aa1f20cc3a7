mod common;

use common::GitFixture;
use tandem_core::git::{DescribeOptions, GitRepository, VersionControl};

#[test]
fn test_commit_all_and_create_tag() {
    let fixture = GitFixture::new();
    fixture.seed_packages(&["core"]);
    fixture.write("packages/core/package.json", "{ \"name\": \"core\", \"version\": \"1.0.1\" }\n");
    fixture.write("tandem.toml", "version = \"1.0.1\"\n");

    let root = fixture.root();
    let repo = GitRepository::open(&root).unwrap();
    let written = vec![
        root.join("packages/core/package.json"),
        root.join("tandem.toml"),
    ];
    let sha = repo.commit_all("v1.0.1", &written).unwrap();

    let head = fixture.repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.id().to_string(), sha);
    assert_eq!(head.message(), Some("v1.0.1"));
    let tree = head.tree().unwrap();
    assert!(tree.get_path(std::path::Path::new("tandem.toml")).is_ok());

    assert!(!repo.tag_exists("v1.0.1").unwrap());
    repo.create_tag("v1.0.1", "v1.0.1").unwrap();
    assert!(repo.tag_exists("v1.0.1").unwrap());
    assert!(repo.create_tag("v1.0.1", "again").is_err());

    let reference = repo
        .describe(&DescribeOptions {
            pattern: Some("v*".to_string()),
            include_merged_tags: false,
        })
        .unwrap()
        .unwrap();
    assert_eq!(reference.tag, "v1.0.1");
    assert_eq!(reference.sha, sha);
    assert_eq!(reference.commits_since, 0);
}

#[test]
fn test_repository_is_usable_from_a_worker_thread() {
    let fixture = GitFixture::new();
    fixture.seed_packages(&["core"]);
    fixture.tag("core@1.0.0");

    let repo = GitRepository::open(&fixture.root()).unwrap();
    let handle = std::thread::spawn(move || {
        let vcs: &dyn VersionControl = &repo;
        vcs.describe(&DescribeOptions {
            pattern: Some("*@*".to_string()),
            include_merged_tags: false,
        })
        .unwrap()
        .map(|reference| reference.tag)
    });
    assert_eq!(handle.join().unwrap().as_deref(), Some("core@1.0.0"));
}

#[test]
fn test_commit_all_leaves_other_files_unstaged() {
    let fixture = GitFixture::new();
    fixture.seed_packages(&["core"]);
    fixture.write("packages/core/package.json", "{}\n");
    fixture.write("scratch.txt", "not part of the release\n");

    let root = fixture.root();
    let repo = GitRepository::open(&root).unwrap();
    repo.commit_all("release", &[root.join("packages/core/package.json")])
        .unwrap();

    let tree = fixture.repo.head().unwrap().peel_to_commit().unwrap().tree().unwrap();
    assert!(tree
        .get_path(std::path::Path::new("packages/core/package.json"))
        .is_ok());
    assert!(tree.get_path(std::path::Path::new("scratch.txt")).is_err());
}

#[test]
fn test_open_outside_repository_is_validation_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = GitRepository::open(dir.path()).err().unwrap();
    assert!(matches!(err, tandem_core::Error::Validation(_)));
}
