#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Oid, Repository, Signature};
use tandem_core::error::Result;
use tandem_core::git::{CommitInfo, DescribeOptions, TagReference, VersionControl};
use tandem_core::package::Package;
use tempfile::TempDir;

/// A throwaway git repository.
pub struct GitFixture {
    pub dir: TempDir,
    pub repo: Repository,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }
        Self { dir, repo }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.root().join(relative)).unwrap();
    }

    fn signature(&self) -> Signature<'static> {
        Signature::now("Test User", "test@example.com").unwrap()
    }

    /// Stages everything and commits on `HEAD`.
    pub fn commit(&self, message: &str) -> Oid {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index
            .update_all(["*"].iter(), None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();
        let sig = self.signature();

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    /// Commits the tree of `base` with `parents`, without moving any ref.
    pub fn detached_commit(&self, base: Oid, parents: &[Oid], message: &str) -> Oid {
        let tree = self.repo.find_commit(base).unwrap().tree().unwrap();
        let parents: Vec<git2::Commit<'_>> = parents
            .iter()
            .map(|oid| self.repo.find_commit(*oid).unwrap())
            .collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        let sig = self.signature();
        self.repo
            .commit(None, &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    /// Merge commit on `HEAD` with `other` as second parent.
    pub fn merge(&self, other: Oid, message: &str) -> Oid {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        let other = self.repo.find_commit(other).unwrap();
        let tree = head.tree().unwrap();
        let sig = self.signature();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&head, &other])
            .unwrap()
    }

    pub fn tag(&self, name: &str) {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.tag_commit(name, head.id());
    }

    pub fn tag_commit(&self, name: &str, oid: Oid) {
        let object = self.repo.find_object(oid, None).unwrap();
        let sig = self.signature();
        self.repo.tag(name, &object, &sig, name, false).unwrap();
    }

    pub fn package(&self, name: &str, version: &str) -> Package {
        Package::new(name, Some(version), self.root().join("packages").join(name))
    }

    /// Writes a file into each package and commits them.
    pub fn seed_packages(&self, names: &[&str]) {
        for name in names {
            self.write(&format!("packages/{}/index.js", name), "module.exports = {};\n");
        }
        self.commit("chore: initial commit");
    }
}

/// In-memory history keyed by package location.
pub struct FakeHistory {
    pub root: PathBuf,
    pub commits: Vec<(PathBuf, String)>,
    pub tags: HashSet<String>,
}

impl FakeHistory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            commits: Vec::new(),
            tags: HashSet::new(),
        }
    }

    pub fn commit(mut self, location: impl Into<PathBuf>, message: &str) -> Self {
        self.commits.push((location.into(), message.to_string()));
        self
    }
}

impl VersionControl for FakeHistory {
    fn root(&self) -> &Path {
        &self.root
    }

    fn describe(&self, _options: &DescribeOptions) -> Result<Option<TagReference>> {
        Ok(None)
    }

    fn changed_paths(&self, _since: &str, _location: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn commits_since(&self, _since: Option<&str>, location: &Path) -> Result<Vec<CommitInfo>> {
        Ok(self
            .commits
            .iter()
            .filter(|(loc, _)| loc == location)
            .enumerate()
            .map(|(i, (_, message))| CommitInfo {
                sha: format!("{:040x}", i),
                message: message.clone(),
            })
            .collect())
    }

    fn tag_exists(&self, name: &str) -> Result<bool> {
        Ok(self.tags.contains(name))
    }
}
