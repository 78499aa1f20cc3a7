//! Dependency-aware task scheduling.
//!
//! [`TaskOrchestrator::run`] dispatches one [`UnitOfWork`] per target package
//! onto a [`JoinSet`], never holding more than `concurrency` in flight. A
//! package becomes ready once every local dependency among the targets has
//! reached a terminal state. Output produced by the work flows back through an
//! unbounded channel and is either forwarded line by line (streaming) or held
//! until the package finishes (buffered).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use indexmap::IndexSet;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::graph::{format_cycle, walk_cycle, PackageGraph, PackageGraphNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of task output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub package: String,
    pub stream: OutputStream,
    pub line: String,
}

/// Handle given to a unit of work for one package.
#[derive(Debug, Clone)]
pub struct WorkContext {
    pub root: PathBuf,
    pub package: String,
    output: mpsc::UnboundedSender<OutputLine>,
    cancel: watch::Receiver<bool>,
}

impl WorkContext {
    pub fn new(
        root: impl Into<PathBuf>,
        package: impl Into<String>,
        output: mpsc::UnboundedSender<OutputLine>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            root: root.into(),
            package: package.into(),
            output,
            cancel,
        }
    }

    pub fn emit(&self, stream: OutputStream, line: impl Into<String>) {
        let _ = self.output.send(OutputLine {
            package: self.package.clone(),
            stream,
            line: line.into(),
        });
    }

    pub fn stdout(&self, line: impl Into<String>) {
        self.emit(OutputStream::Stdout, line);
    }

    pub fn stderr(&self, line: impl Into<String>) {
        self.emit(OutputStream::Stderr, line);
    }

    /// A receiver that flips to `true` when the run is interrupted.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkOutcome {
    pub exit_code: i32,
}

impl WorkOutcome {
    pub fn success() -> Self {
        Self { exit_code: 0 }
    }

    pub fn failed(exit_code: i32) -> Self {
        Self { exit_code }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The per-package step the orchestrator schedules.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Short label for logs and summaries, e.g. `npm run build`.
    fn describe(&self) -> String;

    /// Runs the work for `node`. An `Err` counts as a failure with exit
    /// code 1.
    async fn run(&self, node: &PackageGraphNode, ctx: WorkContext) -> Result<WorkOutcome>;
}

/// Receives progress and output while a run is in progress.
pub trait TaskReporter: Send {
    fn task_started(&mut self, _package: &str) {}

    /// `prefix` is the package name, or `None` when prefixing is off.
    fn output(&mut self, prefix: Option<&str>, line: &OutputLine);

    fn task_finished(&mut self, _run: &TaskRun) {}
}

/// Discards everything.
pub struct NullReporter;

impl TaskReporter for NullReporter {
    fn output(&mut self, _prefix: Option<&str>, _line: &OutputLine) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    /// When false, targets run in the given order with no edges considered.
    pub respect_graph_order: bool,
    pub bail: bool,
    pub streaming: bool,
    pub prefix: bool,
    pub reject_cycles: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            respect_graph_order: true,
            bail: true,
            streaming: false,
            prefix: true,
            reject_cycles: false,
        }
    }
}

impl OrchestratorConfig {
    /// Unbounded concurrency, graph order ignored, output streamed.
    pub fn parallel() -> Self {
        Self {
            concurrency: usize::MAX,
            respect_graph_order: false,
            streaming: true,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Validation`] when `concurrency` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Validation(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The record of one package's execution.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub package: String,
    pub exit_code: i32,
    /// Captured output in buffered mode; empty when streamed.
    pub output: Vec<OutputLine>,
    pub started_at: Instant,
    pub finished_at: Instant,
    /// Set when the work itself errored rather than exiting non-zero.
    pub error: Option<String>,
}

impl TaskRun {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub package: String,
    pub exit_code: i32,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Runs in completion order.
    pub runs: Vec<TaskRun>,
    /// Every non-zero exit, in completion order.
    pub failures: Vec<TaskFailure>,
    /// The failure that stopped dispatch, under bail.
    pub bailed: Option<TaskFailure>,
    pub cancelled: bool,
    /// Targets never dispatched.
    pub skipped: Vec<String>,
    /// Cycles broken while scheduling.
    pub cycles: Vec<Vec<String>>,
}

/// Exit code reported after an interrupt with no task failures.
pub const CANCELLED_EXIT_CODE: i32 = 130;

impl RunSummary {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// The bail failure's code, else the most recent non-zero code, else 130
    /// after an interrupt, else 0.
    pub fn exit_code(&self) -> i32 {
        if let Some(failure) = &self.bailed {
            return failure.exit_code;
        }
        if let Some(failure) = self.failures.last() {
            return failure.exit_code;
        }
        if self.cancelled {
            CANCELLED_EXIT_CODE
        } else {
            0
        }
    }

    /// Converts a failed run into [`Error::Execution`].
    ///
    /// # Errors
    ///
    /// Returns the failure that decides the exit code.
    pub fn into_result(self) -> Result<RunSummary> {
        let failure = self.bailed.clone().or_else(|| self.failures.last().cloned());
        match failure {
            Some(failure) => Err(Error::Execution {
                package: failure.package,
                code: failure.exit_code,
            }),
            None => Ok(self),
        }
    }
}

type Finished = (String, Instant, Result<WorkOutcome>);

/// Runs a unit of work across packages.
pub struct TaskOrchestrator {
    graph: Arc<PackageGraph>,
    root: PathBuf,
    config: OrchestratorConfig,
    cancel: watch::Receiver<bool>,
}

impl TaskOrchestrator {
    pub fn new(graph: Arc<PackageGraph>, root: impl Into<PathBuf>, config: OrchestratorConfig) -> Self {
        let (_, cancel) = watch::channel(false);
        Self {
            graph,
            root: root.into(),
            config,
            cancel,
        }
    }

    /// Observes `cancel`; once it reads `true` nothing new is dispatched and
    /// running work is asked to stop.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Schedules `work` for every target.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration, unknown targets, a cycle
    /// under `reject_cycles`, or a panicking task. Task failures are reported
    /// in the summary, not as errors.
    pub async fn run<S: AsRef<str>>(
        &self,
        targets: &[S],
        work: Arc<dyn UnitOfWork>,
        reporter: &mut dyn TaskReporter,
    ) -> Result<RunSummary> {
        self.config.validate()?;

        let mut members: IndexSet<String> = IndexSet::new();
        for target in targets {
            members.insert(self.graph.node(target.as_ref())?.name().to_string());
        }

        if self.config.respect_graph_order && self.config.reject_cycles {
            let names: Vec<&str> = members.iter().map(String::as_str).collect();
            self.graph.toposort(&names, true)?;
        }

        let mut pending: HashMap<&str, BTreeSet<&str>> = members
            .iter()
            .map(|name| {
                let deps = if self.config.respect_graph_order {
                    self.graph.dependencies_within(name, &members)
                } else {
                    BTreeSet::new()
                };
                (name.as_str(), deps)
            })
            .collect();

        let mut ready: VecDeque<&str> = VecDeque::new();
        let mut waiting: BTreeSet<&str> = BTreeSet::new();
        for name in &members {
            if pending[name.as_str()].is_empty() {
                ready.push_back(name);
            } else {
                waiting.insert(name);
            }
        }

        info!(
            work = %work.describe(),
            targets = members.len(),
            concurrency = self.config.concurrency,
            "starting run"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
        let mut cancel = self.cancel.clone();
        let mut cancel_open = true;
        let mut join_set: JoinSet<Finished> = JoinSet::new();
        let mut in_flight = 0usize;
        let mut done: HashSet<&str> = HashSet::new();
        let mut buffers: HashMap<String, Vec<OutputLine>> = HashMap::new();
        let mut summary = RunSummary::default();
        let mut halted = false;

        loop {
            while !halted && in_flight < self.config.concurrency {
                if *cancel.borrow() {
                    summary.cancelled = true;
                    halted = true;
                    break;
                }
                let Some(next) = ready.pop_front() else {
                    break;
                };
                self.dispatch(next, &work, &tx, &mut join_set);
                reporter.task_started(next);
                in_flight += 1;
            }

            if in_flight == 0 {
                if halted || (ready.is_empty() && waiting.is_empty()) {
                    break;
                }
                if ready.is_empty() {
                    let Some(stuck) = waiting.iter().next().copied() else {
                        break;
                    };
                    let cycle = walk_cycle(stuck, &pending, &done);
                    let Some(release) = cycle
                        .iter()
                        .filter_map(|name| waiting.get(name.as_str()).copied())
                        .min()
                    else {
                        break;
                    };
                    warn!(cycle = %format_cycle(&cycle), "dependency cycle detected, releasing {}", release);
                    summary.cycles.push(cycle);
                    waiting.remove(release);
                    if let Some(deps) = pending.get_mut(release) {
                        deps.clear();
                    }
                    ready.push_back(release);
                }
                continue;
            }

            tokio::select! {
                biased;

                Some(line) = rx.recv() => {
                    self.route_line(line, &mut buffers, reporter);
                }

                changed = cancel.changed(), if cancel_open && !summary.cancelled => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            warn!("cancellation requested, waiting for running tasks");
                            summary.cancelled = true;
                            halted = true;
                        }
                        Ok(()) => {}
                        Err(_) => cancel_open = false,
                    }
                }

                Some(joined) = join_set.join_next() => {
                    in_flight -= 1;
                    let (package, started_at, result) = match joined {
                        Ok(finished) => finished,
                        Err(e) => {
                            join_set.shutdown().await;
                            return Err(Error::Graph(format!("task panicked: {}", e)));
                        }
                    };

                    while let Ok(line) = rx.try_recv() {
                        self.route_line(line, &mut buffers, reporter);
                    }

                    let (exit_code, error) = match result {
                        Ok(outcome) => (outcome.exit_code, None),
                        Err(e) => {
                            error!(package = %package, error = %e, "task errored");
                            (1, Some(e.to_string()))
                        }
                    };

                    let output = buffers.remove(&package).unwrap_or_default();
                    if !self.config.streaming {
                        let prefix = self.config.prefix.then_some(package.as_str());
                        for line in &output {
                            reporter.output(prefix, line);
                        }
                    }

                    let run = TaskRun {
                        package: package.clone(),
                        exit_code,
                        output,
                        started_at,
                        finished_at: Instant::now(),
                        error,
                    };
                    reporter.task_finished(&run);
                    summary.runs.push(run);

                    let Some(finished) = members.get(&package).map(String::as_str) else {
                        continue;
                    };
                    done.insert(finished);

                    if exit_code != 0 {
                        let failure = TaskFailure { package: package.clone(), exit_code };
                        warn!(package = %package, exit_code, "task failed");
                        summary.failures.push(failure.clone());
                        if self.config.bail && summary.bailed.is_none() {
                            summary.bailed = Some(failure);
                            halted = true;
                        }
                    } else {
                        debug!(package = %package, "task finished");
                    }

                    for dependent in self.graph.dependents_of(finished) {
                        if let Some(deps) = pending.get_mut(dependent) {
                            if deps.remove(finished) && deps.is_empty() && waiting.remove(dependent) {
                                ready.push_back(dependent);
                            }
                        }
                    }
                }
            }
        }

        while let Ok(line) = rx.try_recv() {
            self.route_line(line, &mut buffers, reporter);
        }

        let dispatched: HashSet<&str> = summary.runs.iter().map(|r| r.package.as_str()).collect();
        summary.skipped = members
            .iter()
            .filter(|name| !dispatched.contains(name.as_str()))
            .cloned()
            .collect();

        info!(
            ran = summary.runs.len(),
            failed = summary.failures.len(),
            skipped = summary.skipped.len(),
            "run finished"
        );
        Ok(summary)
    }

    fn dispatch(
        &self,
        package: &str,
        work: &Arc<dyn UnitOfWork>,
        tx: &mpsc::UnboundedSender<OutputLine>,
        join_set: &mut JoinSet<Finished>,
    ) {
        debug!(package = %package, "dispatching");
        let graph = Arc::clone(&self.graph);
        let work = Arc::clone(work);
        let ctx = WorkContext::new(self.root.clone(), package, tx.clone(), self.cancel.clone());
        let package = package.to_string();

        join_set.spawn(async move {
            let started_at = Instant::now();
            let result = match graph.node(&package) {
                Ok(node) => work.run(node, ctx).await,
                Err(e) => Err(e),
            };
            (package, started_at, result)
        });
    }

    fn route_line(
        &self,
        line: OutputLine,
        buffers: &mut HashMap<String, Vec<OutputLine>>,
        reporter: &mut dyn TaskReporter,
    ) {
        if self.config.streaming {
            let prefix = self.config.prefix.then_some(line.package.as_str());
            reporter.output(prefix, &line);
        } else {
            buffers.entry(line.package.clone()).or_default().push(line);
        }
    }
}
