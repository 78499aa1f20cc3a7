//! Command implementations for the CLI.

mod discovery;
mod execution;
mod release;
mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tandem_adapters::get_adapter;
use tandem_core::change::{ChangeOptions, ChangeRecord, PackageSelector};
use tandem_core::filter::{PackageFilter, Since};
use tandem_core::{
    ChangeDetector, CommandOptions, GitRepository, ManifestAdapter, OrchestratorConfig,
    PackageGraph, WorkspaceContext,
};
use tokio::sync::watch as signal;

pub use discovery::{cmd_changed, cmd_graph, cmd_list, ChangedArgs, ListArgs};
pub use execution::{cmd_exec, cmd_run, ExecArgs, RunArgs};
pub use release::{cmd_publish, cmd_version, PublishArgs, VersionArgs};
pub use watch::{cmd_watch, WatchArgs};

/// Package selection flags shared by workspace-wide commands.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Include only packages whose names match the glob
    #[arg(long, value_name = "GLOB")]
    pub scope: Vec<String>,

    /// Exclude packages whose names match the glob
    #[arg(long, value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Exclude private packages
    #[arg(long, action)]
    pub no_private: bool,

    /// Only packages changed since REF, or since the last release tag
    #[arg(
        long,
        value_name = "REF",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    pub since: Option<String>,

    /// Also include every transitive dependency of the selection
    #[arg(long, action)]
    pub include_dependencies: bool,

    /// Also include every transitive dependent of the selection
    #[arg(long, action)]
    pub include_dependents: bool,
}

impl FilterArgs {
    fn to_filter(&self) -> PackageFilter {
        PackageFilter {
            scope: self.scope.clone(),
            ignore: self.ignore.clone(),
            include_private: !self.no_private,
            since: self.since.as_ref().map(|reference| {
                if reference.is_empty() {
                    Since::LastTag
                } else {
                    Since::Ref(reference.clone())
                }
            }),
            include_dependencies: self.include_dependencies,
            include_dependents: self.include_dependents,
        }
    }
}

/// Scheduling flags for commands that run work across packages.
#[derive(Args, Debug, Clone, Default)]
pub struct OrchestrationArgs {
    /// Maximum number of packages processed at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Run everything at once, ignoring dependency order, streaming output
    #[arg(long, action)]
    pub parallel: bool,

    /// Stream output as it is produced instead of per package
    #[arg(long, action)]
    pub stream: bool,

    /// Do not prefix output lines with the package name
    #[arg(long, action)]
    pub no_prefix: bool,

    /// Keep going after a package fails
    #[arg(long, action)]
    pub no_bail: bool,

    /// Ignore dependency order
    #[arg(long, action)]
    pub no_sort: bool,

    /// Fail instead of breaking dependency cycles
    #[arg(long, action)]
    pub reject_cycles: bool,
}

impl OrchestrationArgs {
    /// Flags win over `[command.<name>]` settings, which win over defaults.
    fn to_config(&self, options: &CommandOptions) -> OrchestratorConfig {
        let defaults = OrchestratorConfig::default();
        let bail = !self.no_bail && options.bail.unwrap_or(defaults.bail);
        let prefix = !self.no_prefix && options.prefix.unwrap_or(defaults.prefix);
        let reject_cycles =
            self.reject_cycles || options.reject_cycles.unwrap_or(defaults.reject_cycles);

        if self.parallel {
            return OrchestratorConfig {
                bail,
                prefix,
                reject_cycles,
                ..OrchestratorConfig::parallel()
            };
        }

        OrchestratorConfig {
            concurrency: self
                .concurrency
                .or(options.concurrency)
                .unwrap_or(defaults.concurrency),
            respect_graph_order: !self.no_sort && options.sort.unwrap_or(true),
            bail,
            streaming: self.stream || options.stream.unwrap_or(defaults.streaming),
            prefix,
            reject_cycles,
        }
    }
}

/// Change-detection flags shared by `changed`, `version` and `publish`.
#[derive(Args, Debug, Clone, Default)]
pub struct ChangeArgs {
    /// Treat the named packages (comma separated, `*` for all) as changed
    #[arg(
        long,
        value_name = "NAMES",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "*",
        value_delimiter = ','
    )]
    pub force_publish: Option<Vec<String>>,

    /// Treat prerelease packages (comma separated, `*` for all) as changed so
    /// they graduate
    #[arg(
        long,
        value_name = "NAMES",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "*",
        value_delimiter = ','
    )]
    pub conventional_graduate: Option<Vec<String>>,

    /// Also consider release tags reachable only through merge commits
    #[arg(long, action)]
    pub include_merged_tags: bool,

    /// Ignore changes to files matching the glob
    #[arg(long, value_name = "GLOB")]
    pub ignore_changes: Vec<String>,

    /// Prefix of fixed-mode release tags
    #[arg(long, value_name = "PREFIX")]
    pub tag_version_prefix: Option<String>,
}

/// Outcome of change detection against the last release.
pub struct Changes {
    pub reference: Option<String>,
    pub records: Vec<ChangeRecord>,
}

impl Changes {
    pub fn changed(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().filter(|r| r.changed)
    }

    pub fn is_empty(&self) -> bool {
        self.changed().next().is_none()
    }
}

/// A loaded workspace: context, graph and manifest adapter.
pub struct Workspace {
    pub ctx: WorkspaceContext,
    pub graph: PackageGraph,
    pub adapter: Box<dyn ManifestAdapter>,
    pub options: CommandOptions,
}

impl Workspace {
    pub fn load(command: &str) -> Result<Self> {
        let cwd = std::env::current_dir().context("cannot read the current directory")?;
        let ctx = WorkspaceContext::discover(&cwd, command)?;
        let options = ctx.config().command_options(command);
        let adapter = get_adapter();
        let graph = ctx.graph(adapter.as_ref(), options.graph_type.unwrap_or_default())?;
        Ok(Self {
            ctx,
            graph,
            adapter,
            options,
        })
    }

    pub fn with_cancel(mut self, cancel: signal::Receiver<bool>) -> Self {
        self.ctx = self.ctx.with_cancel(cancel);
        self
    }

    pub fn root(&self) -> PathBuf {
        self.ctx.root().to_path_buf()
    }

    pub fn tag_prefix(&self) -> String {
        self.options
            .tag_version_prefix
            .clone()
            .unwrap_or_else(|| "v".to_string())
    }

    /// Folds change flags into the command options so flags win.
    pub fn apply_change_args(&mut self, args: &ChangeArgs) {
        if let Some(prefix) = &args.tag_version_prefix {
            self.options.tag_version_prefix = Some(prefix.clone());
        }
        if args.include_merged_tags {
            self.options.include_merged_tags = Some(true);
        }
        if args.force_publish.is_some() {
            self.options.force_publish = args.force_publish.clone();
        }
        if !args.ignore_changes.is_empty() {
            self.options.ignore_changes = Some(args.ignore_changes.clone());
        }
    }

    /// Classifies every package against the last release tag.
    pub fn detect_changes(
        &self,
        repo: &GitRepository,
        conventional_graduate: Option<&[String]>,
    ) -> Result<Changes> {
        let reference = self.last_tag(repo)?;
        let options = ChangeOptions {
            ignore_changes: self
                .options
                .ignore_changes
                .clone()
                .unwrap_or_else(|| self.ctx.config().ignore_changes.clone()),
            force_publish: PackageSelector::from_flag(self.options.force_publish.as_deref()),
            conventional_graduate: PackageSelector::from_flag(conventional_graduate),
        };
        let names: Vec<&str> = self.graph.names().collect();
        let detector = ChangeDetector::new(&self.graph, repo);
        let records = detector.collect_changed(&names, reference.as_deref(), &options)?;
        Ok(Changes { reference, records })
    }

    /// The last release tag, if the workspace is in a repository that has one.
    fn last_tag(&self, repo: &GitRepository) -> Result<Option<String>> {
        let detector = ChangeDetector::new(&self.graph, repo);
        let include_merged = self.options.include_merged_tags.unwrap_or(false);
        let reference =
            detector.resolve_reference(self.ctx.mode(), &self.tag_prefix(), include_merged)?;
        Ok(reference.map(|r| r.tag))
    }

    /// Applies `filters`, consulting git only when `--since` needs it.
    pub fn select(&self, filters: &FilterArgs, command: &str) -> Result<Vec<String>> {
        let filter = filters.to_filter();
        let options = ChangeOptions {
            ignore_changes: self.ctx.config().ignore_changes_for(command),
            ..ChangeOptions::default()
        };

        if filter.since.is_none() {
            return Ok(filter.apply(&self.graph, None, None, &options)?);
        }

        let repo = self.ctx.repository()?;
        let last_tag = self.last_tag(&repo)?;
        let detector = ChangeDetector::new(&self.graph, &repo);
        Ok(filter.apply(&self.graph, Some(&detector), last_tag.as_deref(), &options)?)
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create tokio runtime")
}
