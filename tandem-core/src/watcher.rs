//! File watching for re-running commands on change.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::Config as NotifyConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::PackageGraph;

const IGNORED_DIRS: [&str; 3] = ["node_modules", ".git", "dist"];

pub struct WatcherConfig {
    /// Quiet period that closes a batch of events.
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
        }
    }
}

/// Changed files grouped by package, paths relative to each package.
pub type ChangeBatch = BTreeMap<String, Vec<PathBuf>>;

pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    locations: Vec<(String, PathBuf)>,
    config: WatcherConfig,
}

impl FileWatcher {
    /// Watches the location of every package in `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Watch`] if the platform watcher cannot be created or a
    /// location cannot be watched.
    pub fn new(graph: &PackageGraph, config: WatcherConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Watch(format!("Failed to create watcher: {}", e)))?;

        let locations: Vec<(String, PathBuf)> = graph
            .nodes()
            .map(|node| (node.name().to_string(), node.location().to_path_buf()))
            .collect();

        for (name, location) in &locations {
            watcher
                .watch(location, RecursiveMode::Recursive)
                .map_err(|e| Error::Watch(format!("Failed to watch {}: {}", name, e)))?;
        }

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            locations,
            config,
        })
    }

    /// Waits for the next burst of changes and groups it by package.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Watch`] if the watcher reports an error or stops.
    pub async fn next_batch(&mut self) -> Result<ChangeBatch> {
        loop {
            let mut paths: BTreeSet<PathBuf> = BTreeSet::new();
            let first = self
                .receiver
                .recv()
                .await
                .ok_or_else(|| Error::Watch("Watcher channel disconnected".to_string()))?;
            collect_event(first, &mut paths)?;

            while let Ok(next) = tokio::time::timeout(self.config.debounce, self.receiver.recv()).await {
                match next {
                    Some(event) => collect_event(event, &mut paths)?,
                    None => break,
                }
            }

            let batch = group_by_package(&self.locations, paths);
            if !batch.is_empty() {
                debug!(packages = batch.len(), "file changes detected");
                return Ok(batch);
            }
        }
    }
}

fn collect_event(event: notify::Result<Event>, paths: &mut BTreeSet<PathBuf>) -> Result<()> {
    let event = event.map_err(|e| Error::Watch(format!("Watcher error: {}", e)))?;
    if matches!(event.kind, EventKind::Access(_)) {
        return Ok(());
    }
    paths.extend(event.paths);
    Ok(())
}

/// Assigns each path to the package with the deepest matching location.
/// Paths under ignored directories or outside every package are dropped.
pub fn group_by_package<I>(locations: &[(String, PathBuf)], paths: I) -> ChangeBatch
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut batch: ChangeBatch = BTreeMap::new();
    for path in paths {
        let owner = locations
            .iter()
            .filter_map(|(name, location)| {
                path.strip_prefix(location)
                    .ok()
                    .map(|relative| (name, location, relative))
            })
            .max_by_key(|(_, location, _)| location.components().count());

        let Some((name, _, relative)) = owner else {
            continue;
        };
        if is_ignored(relative) {
            continue;
        }
        let files = batch.entry(name.clone()).or_default();
        let relative = relative.to_path_buf();
        if !files.contains(&relative) {
            files.push(relative);
        }
    }
    batch
}

fn is_ignored(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| IGNORED_DIRS.iter().any(|dir| c.as_os_str() == *dir))
}
