//! Watch mode: re-runs a command in packages whose files change.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tandem_core::orchestrator::TaskOrchestrator;
use tandem_core::{ExecWork, FileWatcher, PackageGraph, WatcherConfig};
use tokio::sync::watch as signal;
use tracing::debug;

use crate::formatting::{
    print_error, print_key_value, print_section_header, print_success, print_warning,
    ConsoleReporter,
};

use super::execution::shell_join;
use super::{runtime, FilterArgs, OrchestrationArgs, Workspace};

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub orchestration: OrchestrationArgs,

    /// Quiet period in milliseconds before a batch of changes runs
    #[arg(long, value_name = "MS", default_value_t = 300)]
    pub debounce: u64,

    /// Command and arguments to run in each changed package
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

pub fn cmd_watch(args: WatchArgs, cancel: signal::Receiver<bool>) -> Result<i32> {
    let ws = Workspace::load("watch")?.with_cancel(cancel);
    let selected = ws.select(&args.filters, "watch")?;
    if selected.is_empty() {
        print_warning("No packages matched");
        return Ok(0);
    }

    let command = shell_join(&args.command);
    let config = args.orchestration.to_config(&ws.options);
    let root = ws.root();
    let mut cancel = ws.ctx.cancel_signal();
    let graph: Arc<PackageGraph> = Arc::new(ws.graph);

    print_section_header("Watch mode");
    print_key_value("Command:", &command);
    print_key_value("Packages:", &selected.len().to_string());
    println!("  Press Ctrl+C to stop");
    println!();

    let rt = runtime()?;
    rt.block_on(async {
        let watcher_config = WatcherConfig {
            debounce: std::time::Duration::from_millis(args.debounce),
        };
        let mut watcher = FileWatcher::new(&graph, watcher_config)?;

        loop {
            let batch = tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
                batch = watcher.next_batch() => batch?,
            };

            let file_changes: HashMap<_, _> = batch
                .into_iter()
                .filter(|(name, _)| selected.contains(name))
                .collect();
            if file_changes.is_empty() {
                continue;
            }

            let targets: Vec<String> = selected
                .iter()
                .filter(|name| file_changes.contains_key(*name))
                .cloned()
                .collect();
            debug!(packages = targets.len(), "re-running after changes");
            print_warning(&format!("change detected in {}", targets.join(", ")));

            let work = ExecWork::new(command.clone()).with_file_changes(file_changes);
            let orchestrator = TaskOrchestrator::new(Arc::clone(&graph), root.clone(), config.clone())
                .with_cancel(cancel.clone());
            let mut reporter = ConsoleReporter::new(targets.len(), true, true);
            let summary = orchestrator.run(&targets, Arc::new(work), &mut reporter).await?;

            if summary.cancelled {
                break;
            }
            if summary.is_success() {
                print_success("done, waiting for changes");
            } else {
                for failure in &summary.failures {
                    print_error(&format!(
                        "{} exited with code {}",
                        failure.package, failure.exit_code
                    ));
                }
            }
            println!();
        }
        Ok::<_, anyhow::Error>(())
    })?;

    println!();
    print_warning("Stopping watch mode");
    Ok(0)
}
