//! Per-invocation workspace context.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{info_span, Span};

use crate::adapter::ManifestAdapter;
use crate::config::{VersionMode, WorkspaceConfig};
use crate::error::{Error, Result};
use crate::git::GitRepository;
use crate::graph::{GraphType, PackageGraph};
use crate::package::Package;
use crate::scanner::Scanner;

/// Everything a command needs about the workspace, passed explicitly to the
/// components instead of living in globals.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    root: PathBuf,
    config: WorkspaceConfig,
    mode: VersionMode,
    cancel: watch::Receiver<bool>,
    span: Span,
}

impl WorkspaceContext {
    /// # Errors
    ///
    /// Returns an error if the configured version is invalid.
    pub fn new(root: impl Into<PathBuf>, config: WorkspaceConfig, command: &str) -> Result<Self> {
        let root = root.into();
        let mode = config.mode()?;
        let (_, cancel) = watch::channel(false);
        let span = info_span!("command", name = command, root = %root.display());
        Ok(Self {
            root,
            config,
            mode,
            cancel,
            span,
        })
    }

    /// Finds the workspace containing `start` and loads its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if no `tandem.toml` is found.
    pub fn discover(start: &Path, command: &str) -> Result<Self> {
        let root = WorkspaceConfig::find_root(start).ok_or_else(|| {
            Error::Validation(format!(
                "no {} found in {} or its parents",
                crate::config::CONFIG_FILE,
                start.display()
            ))
        })?;
        let config = WorkspaceConfig::load(&root)?;
        Self::new(root, config, command)
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    #[inline]
    pub fn mode(&self) -> &VersionMode {
        &self.mode
    }

    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    #[inline]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Reads every workspace package.
    ///
    /// # Errors
    ///
    /// Returns an error if a glob is invalid or a manifest cannot be read.
    pub fn packages(&self, adapter: &dyn ManifestAdapter) -> Result<Vec<Package>> {
        let _guard = self.span.enter();
        Scanner::new(&self.root, &self.config, adapter).scan()
    }

    /// Reads every package and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning fails or two packages share a name.
    pub fn graph(&self, adapter: &dyn ManifestAdapter, graph_type: GraphType) -> Result<PackageGraph> {
        let packages = self.packages(adapter)?;
        let _guard = self.span.enter();
        PackageGraph::with_graph_type(packages, graph_type)
    }

    /// # Errors
    ///
    /// Returns an error if the workspace is not inside a git repository.
    pub fn repository(&self) -> Result<GitRepository> {
        GitRepository::open(&self.root)
    }
}
