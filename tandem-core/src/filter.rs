//! Package selection shared by every workspace-wide command.

use glob::Pattern;
use tracing::{debug, info};

use crate::change::{ChangeDetector, ChangeOptions};
use crate::error::{Error, Result};
use crate::graph::PackageGraph;

/// Reference point for `--since`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Since {
    /// The most recent release tag.
    LastTag,
    Ref(String),
}

#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    /// Name globs to include; empty means all.
    pub scope: Vec<String>,
    /// Name globs to exclude.
    pub ignore: Vec<String>,
    pub include_private: bool,
    pub since: Option<Since>,
    pub include_dependencies: bool,
    pub include_dependents: bool,
}

impl PackageFilter {
    pub fn new() -> Self {
        Self {
            include_private: true,
            ..Self::default()
        }
    }

    /// Selects packages in graph order.
    ///
    /// `since` needs a change detector; `last_tag` is the reference used for
    /// [`Since::LastTag`] (none means every package counts as changed).
    ///
    /// # Errors
    ///
    /// Returns an error for invalid globs, or when `since` is set without a
    /// change detector.
    pub fn apply(
        &self,
        graph: &PackageGraph,
        detector: Option<&ChangeDetector<'_>>,
        last_tag: Option<&str>,
        change_options: &ChangeOptions,
    ) -> Result<Vec<String>> {
        let scope = compile(&self.scope)?;
        let ignore = compile(&self.ignore)?;

        let mut selected: Vec<String> = graph
            .nodes()
            .filter(|node| scope.is_empty() || scope.iter().any(|p| p.matches(node.name())))
            .filter(|node| !ignore.iter().any(|p| p.matches(node.name())))
            .filter(|node| self.include_private || !node.package().private)
            .map(|node| node.name().to_string())
            .collect();
        debug!(count = selected.len(), "packages after name filters");

        if let Some(since) = &self.since {
            let detector = detector.ok_or_else(|| {
                Error::Validation("--since requires a git repository".to_string())
            })?;
            let reference = match since {
                Since::LastTag => last_tag,
                Since::Ref(reference) => Some(reference.as_str()),
            };
            let options = ChangeOptions {
                ignore_changes: change_options.ignore_changes.clone(),
                ..ChangeOptions::default()
            };
            selected = detector.changed_names(&selected, reference, &options)?;
            info!(
                since = reference.unwrap_or("<initial commit>"),
                count = selected.len(),
                "filtered to changed packages"
            );
        }

        if self.include_dependencies {
            selected = graph.expand_dependencies(&selected)?.into_iter().collect();
        }
        if self.include_dependents {
            selected = graph.expand_dependents(&selected)?.into_iter().collect();
        }

        let ordered: Vec<String> = graph
            .names()
            .filter(|name| selected.iter().any(|s| s == name))
            .map(str::to_string)
            .collect();
        Ok(ordered)
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(Error::from))
        .collect()
}
