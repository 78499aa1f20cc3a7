//! Task execution commands: `run` and `exec`.

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tandem_core::graph::format_cycle;
use tandem_core::orchestrator::{OrchestratorConfig, RunSummary, TaskOrchestrator, UnitOfWork};
use tandem_core::{ExecWork, PackageGraph, ScriptWork};
use tokio::sync::watch as signal;
use tracing::info;

use crate::formatting::{
    format_duration, print_key_value, print_run_table, print_section_header,
    print_separator_with_spacing, print_summary_box, print_warning, ConsoleReporter,
};

use super::{runtime, FilterArgs, OrchestrationArgs, Workspace};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Script to run from each package.json
    pub script: String,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub orchestration: OrchestrationArgs,

    /// Client used to run the script (defaults to the configured npm client)
    #[arg(long, value_name = "CLIENT")]
    pub npm_client: Option<String>,

    /// Arguments passed through to the script
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub orchestration: OrchestrationArgs,

    /// Command and arguments to run in each package
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

pub fn cmd_run(args: RunArgs, cancel: signal::Receiver<bool>) -> Result<i32> {
    let ws = Workspace::load("run")?.with_cancel(cancel);
    let selected = ws.select(&args.filters, "run")?;

    let targets: Vec<String> = selected
        .into_iter()
        .filter(|name| {
            ws.graph
                .get(name)
                .is_some_and(|node| node.package().has_script(&args.script))
        })
        .collect();

    if targets.is_empty() {
        print_warning(&format!("No packages have a \"{}\" script", args.script));
        return Ok(0);
    }

    let npm_client = args
        .npm_client
        .clone()
        .unwrap_or_else(|| ws.ctx.config().npm_client.clone());
    let work = ScriptWork::new(&args.script, npm_client).with_args(args.args.clone());
    let config = args.orchestration.to_config(&ws.options);

    orchestrate(ws, &targets, Arc::new(work), config, &args.script)
}

pub fn cmd_exec(args: ExecArgs, cancel: signal::Receiver<bool>) -> Result<i32> {
    let ws = Workspace::load("exec")?.with_cancel(cancel);
    let targets = ws.select(&args.filters, "exec")?;

    if targets.is_empty() {
        print_warning("No packages matched");
        return Ok(0);
    }

    let command = shell_join(&args.command);
    let config = args.orchestration.to_config(&ws.options);
    orchestrate(ws, &targets, Arc::new(ExecWork::new(command.clone())), config, &command)
}

/// Runs `work` over `targets` and prints the run summary. Returns the
/// aggregate exit code.
pub(super) fn orchestrate(
    ws: Workspace,
    targets: &[String],
    work: Arc<dyn UnitOfWork>,
    config: OrchestratorConfig,
    label: &str,
) -> Result<i32> {
    let summary = run_summary(ws, targets, work, config, label)?;
    print_run_footer(&summary);
    Ok(summary.exit_code())
}

pub(super) fn run_summary(
    ws: Workspace,
    targets: &[String],
    work: Arc<dyn UnitOfWork>,
    config: OrchestratorConfig,
    label: &str,
) -> Result<RunSummary> {
    print_section_header(&format!("Running {}", label));
    print_key_value("Packages:", &targets.len().to_string());
    if config.concurrency != usize::MAX {
        print_key_value("Concurrency:", &config.concurrency.to_string());
    }
    println!();

    let root = ws.root();
    let cancel = ws.ctx.cancel_signal();
    let graph: Arc<PackageGraph> = Arc::new(ws.graph);
    let quiet = !std::io::stderr().is_terminal();
    let mut reporter = ConsoleReporter::new(targets.len(), config.streaming, quiet);
    info!(command = %work.describe(), packages = targets.len(), "starting run");

    let orchestrator = TaskOrchestrator::new(graph, root, config).with_cancel(cancel);
    let rt = runtime()?;
    let result = rt.block_on(orchestrator.run(targets, work, &mut reporter));
    reporter.finish();
    Ok(result?)
}

pub(super) fn print_run_footer(summary: &RunSummary) {
    for cycle in &summary.cycles {
        print_warning(&format!("dependency cycle: {}", format_cycle(cycle)));
    }

    print_separator_with_spacing();
    print_run_table(summary);

    let total: f64 = summary.runs.iter().map(|r| r.duration().as_secs_f64()).sum();
    let succeeded = summary.runs.iter().filter(|r| r.is_success()).count().to_string();
    let failed = summary.failures.len().to_string();
    let skipped = summary.skipped.len().to_string();
    let duration = format_duration(total);
    let mut items = vec![
        ("Succeeded", succeeded.as_str()),
        ("Failed", failed.as_str()),
        ("Task time", duration.as_str()),
    ];
    if !summary.skipped.is_empty() {
        items.push(("Skipped", skipped.as_str()));
    }
    if summary.cancelled {
        items.push(("Interrupted", "yes"));
    }
    print_summary_box("Summary", &items);
}

/// Joins argv into one shell command line, single-quoting words that need it.
pub(super) fn shell_join(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            let plain = !word.is_empty()
                && word
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
            if plain {
                word.clone()
            } else {
                format!("'{}'", word.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_join_quotes_when_needed() {
        let words = vec!["echo".to_string(), "hello world".to_string(), "it's".to_string()];
        assert_eq!(shell_join(&words), r"echo 'hello world' 'it'\''s'");
        assert_eq!(shell_join(&["ls".to_string(), "-la".to_string()]), "ls -la");
    }
}
