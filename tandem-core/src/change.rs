//! Change detection against a version-control reference point.

use std::fmt;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::VersionMode;
use crate::error::Result;
use crate::git::{DescribeOptions, TagReference, VersionControl};
use crate::graph::PackageGraph;

/// A set of packages named on the command line: nothing, everything, or a
/// list of exact names and globs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PackageSelector {
    #[default]
    None,
    All,
    Patterns(Vec<String>),
}

impl PackageSelector {
    /// Builds a selector from a flag value. A flag given without names, or
    /// with `*`, selects everything.
    pub fn from_flag(values: Option<&[String]>) -> Self {
        match values {
            None => PackageSelector::None,
            Some(values) => {
                let names: Vec<String> = values
                    .iter()
                    .flat_map(|v| v.split(','))
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
                if names.is_empty() || names.iter().any(|n| n == "*") {
                    PackageSelector::All
                } else {
                    PackageSelector::Patterns(names)
                }
            }
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            PackageSelector::None => false,
            PackageSelector::All => true,
            PackageSelector::Patterns(patterns) => patterns.iter().any(|p| {
                p == name || Pattern::new(p).map(|g| g.matches(name)).unwrap_or(false)
            }),
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, PackageSelector::None)
    }
}

/// Why a package counts as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeReason {
    NoReferencePoint,
    FileDiff,
    Forced,
    Graduate,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::NoReferencePoint => "no-reference-point",
            ChangeReason::FileDiff => "file-diff",
            ChangeReason::Forced => "forced",
            ChangeReason::Graduate => "graduate",
        }
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub name: String,
    pub changed: bool,
    pub reason: Option<ChangeReason>,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeOptions {
    /// Path globs whose changes are ignored.
    pub ignore_changes: Vec<String>,
    pub force_publish: PackageSelector,
    /// Treat prerelease packages as changed so they can graduate.
    pub conventional_graduate: PackageSelector,
}

/// Tag glob used to find the last release: `<prefix>*` for a fixed
/// workspace, `*@*` for independent packages.
pub fn release_tag_pattern(mode: &VersionMode, tag_prefix: &str) -> String {
    match mode {
        VersionMode::Fixed(_) => format!("{}*", tag_prefix),
        VersionMode::Independent => "*@*".to_string(),
    }
}

/// Classifies workspace packages as changed or unchanged.
pub struct ChangeDetector<'a> {
    graph: &'a PackageGraph,
    vcs: &'a dyn VersionControl,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(graph: &'a PackageGraph, vcs: &'a dyn VersionControl) -> Self {
        Self { graph, vcs }
    }

    /// Most recent release tag reachable from `HEAD`.
    ///
    /// With `include_merged_tags` false only first-parent history is walked.
    pub fn resolve_reference(
        &self,
        mode: &VersionMode,
        tag_prefix: &str,
        include_merged_tags: bool,
    ) -> Result<Option<TagReference>> {
        let reference = self.vcs.describe(&DescribeOptions {
            pattern: Some(release_tag_pattern(mode, tag_prefix)),
            include_merged_tags,
        })?;
        match &reference {
            Some(tag) => info!(tag = %tag.tag, commits = tag.commits_since, "using reference point"),
            None => info!("no release tag found, assuming first release"),
        }
        Ok(reference)
    }

    /// Classifies each candidate, in candidate order.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown candidates, invalid globs, or a reference
    /// the repository cannot resolve.
    pub fn collect_changed<S: AsRef<str>>(
        &self,
        candidates: &[S],
        reference: Option<&str>,
        options: &ChangeOptions,
    ) -> Result<Vec<ChangeRecord>> {
        let ignore = IgnoreSet::new(&options.ignore_changes)?;
        let mut records = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let node = self.graph.node(candidate.as_ref())?;
            let name = node.name().to_string();

            let Some(reference) = reference else {
                records.push(ChangeRecord {
                    name,
                    changed: true,
                    reason: Some(ChangeReason::NoReferencePoint),
                });
                continue;
            };

            let reason = if options.force_publish.matches(&name) {
                Some(ChangeReason::Forced)
            } else if options.conventional_graduate.matches(&name) && node.package().is_prerelease() {
                Some(ChangeReason::Graduate)
            } else if self.has_diff(node.location(), reference, &ignore)? {
                Some(ChangeReason::FileDiff)
            } else {
                None
            };

            debug!(package = %name, reason = ?reason, "classified package");
            records.push(ChangeRecord {
                name,
                changed: reason.is_some(),
                reason,
            });
        }

        Ok(records)
    }

    /// Names of the changed candidates, in candidate order.
    ///
    /// # Errors
    ///
    /// Same as [`collect_changed`](Self::collect_changed).
    pub fn changed_names<S: AsRef<str>>(
        &self,
        candidates: &[S],
        reference: Option<&str>,
        options: &ChangeOptions,
    ) -> Result<Vec<String>> {
        Ok(self
            .collect_changed(candidates, reference, options)?
            .into_iter()
            .filter(|r| r.changed)
            .map(|r| r.name)
            .collect())
    }

    fn has_diff(&self, location: &Path, reference: &str, ignore: &IgnoreSet) -> Result<bool> {
        let package_dir = self.repo_relative(location);
        let paths = self.vcs.changed_paths(reference, &package_dir)?;
        Ok(paths.iter().any(|path| {
            let within = path.strip_prefix(&package_dir).unwrap_or(path);
            !ignore.matches(path, within)
        }))
    }

    fn repo_relative(&self, location: &Path) -> PathBuf {
        let root = self.vcs.root();
        if let Ok(relative) = location.strip_prefix(root) {
            return relative.to_path_buf();
        }
        location
            .canonicalize()
            .ok()
            .and_then(|canonical| canonical.strip_prefix(root).ok().map(Path::to_path_buf))
            .unwrap_or_else(|| location.to_path_buf())
    }
}

/// Ignore globs. A pattern without a `/` matches any file with that base
/// name; other patterns match the path relative to either the package or the
/// repository.
struct IgnoreSet {
    patterns: Vec<(Pattern, bool)>,
}

impl IgnoreSet {
    fn new(raw: &[String]) -> Result<Self> {
        let patterns = raw
            .iter()
            .map(|p| -> Result<(Pattern, bool)> { Ok((Pattern::new(p)?, !p.contains('/'))) })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    fn matches(&self, repo_path: &Path, package_path: &Path) -> bool {
        self.patterns.iter().any(|(pattern, base_only)| {
            if *base_only {
                repo_path
                    .file_name()
                    .is_some_and(|name| pattern.matches(&name.to_string_lossy()))
            } else {
                pattern.matches_path(package_path) || pattern.matches_path(repo_path)
            }
        })
    }
}
