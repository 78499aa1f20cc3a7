//! Version-control boundary and its git2 implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{DiffOptions, Oid, Sort};
use tracing::debug;

use crate::error::{Error, Result};

/// Options for locating the most recent release tag.
#[derive(Debug, Clone, Default)]
pub struct DescribeOptions {
    /// Glob the tag name must match, e.g. `v*` or `*@*`.
    pub pattern: Option<String>,
    /// Consider tags reachable only through merged (non-first-parent) history.
    pub include_merged_tags: bool,
}

/// The nearest reachable tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReference {
    pub tag: String,
    pub sha: String,
    /// Commits between the tag and `HEAD`.
    pub commits_since: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
}

/// Read-only history queries the engine needs.
pub trait VersionControl: Send {
    /// Repository working directory; paths returned by this trait are
    /// relative to it.
    fn root(&self) -> &Path;

    fn describe(&self, options: &DescribeOptions) -> Result<Option<TagReference>>;

    /// Files that differ between `since` and the working state (index and
    /// working tree), restricted to `location`.
    fn changed_paths(&self, since: &str, location: &Path) -> Result<Vec<PathBuf>>;

    /// Commits reachable from `HEAD` but not from `since` that touch
    /// `location`, newest first. With no `since`, the whole history.
    fn commits_since(&self, since: Option<&str>, location: &Path) -> Result<Vec<CommitInfo>>;

    fn tag_exists(&self, name: &str) -> Result<bool>;
}

pub struct GitRepository {
    inner: git2::Repository,
    root: PathBuf,
}

impl GitRepository {
    /// Opens the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `path` is not inside a git work tree.
    pub fn open(path: &Path) -> Result<Self> {
        let inner = git2::Repository::discover(path).map_err(|e| {
            Error::Validation(format!("{} is not a git repository: {}", path.display(), e))
        })?;
        let root = inner
            .workdir()
            .ok_or_else(|| {
                Error::Validation(format!("{} is a bare repository", path.display()))
            })?
            .to_path_buf();
        let root = root.canonicalize().unwrap_or(root);
        Ok(Self { inner, root })
    }

    fn relative(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            canonical
                .strip_prefix(&self.root)
                .map(Path::to_path_buf)
                .unwrap_or(canonical)
        } else {
            path.to_path_buf()
        }
    }

    fn pathspec(&self, location: &Path) -> Option<String> {
        let relative = self.relative(location);
        let spec = relative.to_string_lossy().replace('\\', "/");
        if spec.is_empty() || spec == "." {
            None
        } else {
            Some(spec)
        }
    }

    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.inner.head().ok().and_then(|h| h.peel_to_commit().ok())
    }

    fn tags_by_commit(&self, pattern: Option<&glob::Pattern>) -> Result<HashMap<Oid, Vec<String>>> {
        let mut raw = Vec::new();
        self.inner.tag_foreach(|oid, name| {
            let name = String::from_utf8_lossy(name);
            raw.push((oid, name.trim_start_matches("refs/tags/").to_string()));
            true
        })?;

        let mut tags: HashMap<Oid, Vec<String>> = HashMap::new();
        for (oid, name) in raw {
            if pattern.is_some_and(|p| !p.matches(&name)) {
                continue;
            }
            let Ok(commit) = self
                .inner
                .find_object(oid, None)
                .and_then(|obj| obj.peel_to_commit())
            else {
                continue;
            };
            tags.entry(commit.id()).or_default().push(name);
        }
        Ok(tags)
    }

    fn touches(&self, commit: &git2::Commit<'_>, pathspec: Option<&str>) -> Result<bool> {
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        let mut opts = DiffOptions::new();
        if let Some(spec) = pathspec {
            opts.pathspec(spec);
        }
        let diff = self
            .inner
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;
        Ok(diff.deltas().len() > 0)
    }

    /// Stages `paths` and commits them on top of `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if staging or committing fails.
    pub fn commit_all(&self, message: &str, paths: &[PathBuf]) -> Result<String> {
        let mut index = self.inner.index()?;
        for path in paths {
            let relative = self.relative(path);
            if self.root.join(&relative).exists() {
                index.add_path(&relative)?;
            } else {
                index.remove_path(&relative)?;
            }
        }
        index.write()?;

        let sig = self.inner.signature()?;
        let tree_id = index.write_tree()?;
        let tree = self.inner.find_tree(tree_id)?;
        let parent = self.head_commit();
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = self
            .inner
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        Ok(oid.to_string())
    }

    /// Creates an annotated tag on `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag exists or `HEAD` has no commit.
    pub fn create_tag(&self, name: &str, message: &str) -> Result<()> {
        let head = self.inner.head()?.peel_to_commit()?;
        let sig = self.inner.signature()?;
        self.inner
            .tag(name, head.as_object(), &sig, message, false)?;
        Ok(())
    }
}

impl VersionControl for GitRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn describe(&self, options: &DescribeOptions) -> Result<Option<TagReference>> {
        let Some(head) = self.head_commit() else {
            return Ok(None);
        };
        let pattern = options
            .pattern
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()?;
        let tags = self.tags_by_commit(pattern.as_ref())?;
        if tags.is_empty() {
            return Ok(None);
        }

        let mut walk = self.inner.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(head.id())?;
        if !options.include_merged_tags {
            walk.simplify_first_parent()?;
        }

        for (distance, oid) in walk.enumerate() {
            let oid = oid?;
            if let Some(names) = tags.get(&oid) {
                let tag = names.iter().max().cloned().unwrap_or_default();
                debug!(%tag, distance, "resolved reference tag");
                return Ok(Some(TagReference {
                    tag,
                    sha: oid.to_string(),
                    commits_since: distance,
                }));
            }
        }

        Ok(None)
    }

    fn changed_paths(&self, since: &str, location: &Path) -> Result<Vec<PathBuf>> {
        let tree = self.inner.revparse_single(since)?.peel_to_tree()?;
        let mut opts = DiffOptions::new();
        if let Some(spec) = self.pathspec(location) {
            opts.pathspec(spec);
        }
        let diff = self
            .inner
            .diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?;

        let mut paths: Vec<PathBuf> = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(Path::to_path_buf)
            })
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn commits_since(&self, since: Option<&str>, location: &Path) -> Result<Vec<CommitInfo>> {
        let Some(head) = self.head_commit() else {
            return Ok(Vec::new());
        };
        let mut walk = self.inner.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(head.id())?;
        if let Some(since) = since {
            let base = self.inner.revparse_single(since)?.peel_to_commit()?;
            walk.hide(base.id())?;
        }

        let pathspec = self.pathspec(location);
        let mut commits = Vec::new();
        for oid in walk {
            let commit = self.inner.find_commit(oid?)?;
            if self.touches(&commit, pathspec.as_deref())? {
                commits.push(CommitInfo {
                    sha: commit.id().to_string(),
                    message: commit.message().unwrap_or_default().to_string(),
                });
            }
        }
        Ok(commits)
    }

    fn tag_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .inner
            .find_reference(&format!("refs/tags/{}", name))
            .is_ok())
    }
}
