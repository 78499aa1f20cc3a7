//! Workspace scanner for discovering packages.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;

use crate::adapter::ManifestAdapter;
use crate::config::WorkspaceConfig;
use crate::error::Result;
use crate::package::Package;

/// Expands the configured package globs and reads every manifest found.
pub struct Scanner<'a> {
    root: PathBuf,
    patterns: Vec<String>,
    adapter: &'a dyn ManifestAdapter,
}

impl<'a> Scanner<'a> {
    pub fn new(root: impl AsRef<Path>, config: &WorkspaceConfig, adapter: &'a dyn ManifestAdapter) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            patterns: config.packages.clone(),
            adapter,
        }
    }

    /// Package directories matched by the globs, deduplicated and sorted.
    pub fn package_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = BTreeSet::new();
        for pattern in &self.patterns {
            let pattern = pattern.trim_end_matches('/');
            let full = self.root.join(pattern);
            for entry in glob::glob(&full.to_string_lossy())? {
                let Ok(path) = entry else {
                    continue;
                };
                if path.components().any(|c| c.as_os_str() == "node_modules") {
                    continue;
                }
                if path.is_dir() && self.adapter.detect(&path) {
                    dirs.insert(path);
                }
            }
        }
        Ok(dirs.into_iter().collect())
    }

    /// Reads every package, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if a glob is invalid or a manifest cannot be read.
    pub fn scan(&self) -> Result<Vec<Package>> {
        let dirs = self.package_dirs()?;

        let packages: Result<Vec<Package>> = dirs
            .into_par_iter()
            .map(|dir| self.adapter.read(&dir))
            .collect();

        let mut packages = packages?;
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = packages.len(), root = %self.root.display(), "scanned workspace");
        Ok(packages)
    }
}
