//! Release commands: `version` and `publish`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tandem_core::change::PackageSelector;
use tandem_core::registry::unpublished_packages;
use tandem_core::version::{ConventionalOptions, PlannerOptions};
use tandem_core::{
    BumpPolicy, Error, ExplicitVersion, GitRepository, HttpRegistry, OrchestratorConfig,
    PublishWork, VersionMode, VersionPlan, VersionPlanner, WorkspaceConfig,
};
use tokio::sync::watch as signal;
use tracing::{debug, info};

use crate::formatting::{
    print_info, print_plan_table, print_section_header, print_success, print_warning,
};

use super::execution::{print_run_footer, run_summary};
use super::{runtime, ChangeArgs, Workspace};

/// Environment variable holding the registry auth token.
const TOKEN_ENV: &str = "NPM_TOKEN";

#[derive(Args, Debug, Clone, Default)]
pub struct VersionArgs {
    /// Release keyword (major, minor, patch, premajor, preminor, prepatch,
    /// prerelease) or an explicit version
    pub bump: Option<String>,

    #[command(flatten)]
    pub change: ChangeArgs,

    /// Derive bumps from conventional commit messages
    #[arg(long, action)]
    pub conventional_commits: bool,

    /// Keep the named packages (comma separated, `*` for all) on prerelease
    /// versions
    #[arg(
        long,
        value_name = "NAMES",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "*",
        value_delimiter = ','
    )]
    pub conventional_prerelease: Option<Vec<String>>,

    /// Prerelease identifier, e.g. `beta`
    #[arg(long, value_name = "ID")]
    pub preid: Option<String>,

    /// Build metadata appended to every new version
    #[arg(long, value_name = "ID")]
    pub build_metadata: Option<String>,

    /// Rewrite local dependency ranges as exact versions
    #[arg(long, action)]
    pub exact: bool,

    /// Do not commit or tag the release
    #[arg(long, action)]
    pub no_git_tag_version: bool,

    /// Release commit message; `%s` is the prefixed version, `%v` the bare one
    #[arg(short, long, value_name = "MSG")]
    pub message: Option<String>,

    /// Print the plan without writing anything
    #[arg(long, action)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    #[command(flatten)]
    pub version: VersionArgs,

    /// Publish packages whose local version is missing from the registry
    /// instead of versioning first
    #[arg(long, action)]
    pub from_package: bool,

    /// Dist-tag to publish under
    #[arg(long, value_name = "TAG")]
    pub dist_tag: Option<String>,

    /// Registry base URL
    #[arg(long, value_name = "URL")]
    pub registry: Option<String>,

    /// Maximum number of packages published at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
}

/// A planned release and what was written for it.
struct Release {
    plan: VersionPlan,
    written: Vec<PathBuf>,
}

pub fn cmd_version(args: VersionArgs) -> Result<i32> {
    let mut ws = Workspace::load("version")?;
    ws.apply_change_args(&args.change);
    let _guard = ws.ctx.span().clone().entered();

    match release(&ws, &args)? {
        Some(release) if !args.dry_run => {
            print_success(&format!(
                "versioned {} packages, updated {} files",
                release.plan.bumps.len(),
                release.written.len()
            ));
        }
        Some(_) => print_info("dry run, nothing written"),
        None => print_warning("No changed packages to version"),
    }
    Ok(0)
}

pub fn cmd_publish(args: PublishArgs, cancel: signal::Receiver<bool>) -> Result<i32> {
    let mut ws = Workspace::load("publish")?.with_cancel(cancel);
    ws.apply_change_args(&args.version.change);

    let targets: Vec<String> = if args.from_package {
        let registry = args
            .registry
            .clone()
            .or_else(|| ws.ctx.config().registry.clone());
        let client = HttpRegistry::new(registry.as_deref(), std::env::var(TOKEN_ENV).ok())?;
        let rt = runtime()?;
        rt.block_on(unpublished_packages(&ws.graph, &client))?
    } else {
        match release(&ws, &args.version)? {
            Some(release) => release.plan.bumps.keys().cloned().collect(),
            None => Vec::new(),
        }
    };

    let targets: Vec<String> = targets
        .into_iter()
        .filter(|name| ws.graph.get(name).is_some_and(|n| !n.package().private))
        .collect();

    if targets.is_empty() {
        print_warning("No packages to publish");
        return Ok(0);
    }
    if args.version.dry_run {
        print_info(&format!("dry run, would publish: {}", targets.join(", ")));
        return Ok(0);
    }

    let mut work = PublishWork::new(ws.ctx.config().npm_client.clone());
    work.registry = args.registry.clone().or_else(|| ws.ctx.config().registry.clone());
    work.dist_tag = args.dist_tag.clone();

    let config = OrchestratorConfig {
        concurrency: args
            .concurrency
            .or(ws.options.concurrency)
            .unwrap_or_else(|| OrchestratorConfig::default().concurrency),
        bail: true,
        ..OrchestratorConfig::default()
    };

    let summary = run_summary(ws, &targets, Arc::new(work), config, "publish")?;
    print_run_footer(&summary);
    if summary.is_success() {
        print_success(&format!("published {} packages", summary.runs.len()));
    }
    Ok(summary.exit_code())
}

/// Detects changes, plans versions and, unless this is a dry run, writes
/// manifests then commits and tags. Returns `None` when nothing changed.
fn release(ws: &Workspace, args: &VersionArgs) -> Result<Option<Release>> {
    let repo = ws.ctx.repository()?;
    let changes = ws.detect_changes(&repo, args.change.conventional_graduate.as_deref())?;
    if changes.is_empty() {
        return Ok(None);
    }
    debug!(
        reference = changes.reference.as_deref().unwrap_or("none"),
        changed = changes.changed().count(),
        "changes detected"
    );

    let policy = bump_policy(ws, args)?;
    let mode = ws.ctx.mode().clone();
    let options = PlannerOptions {
        exact: args.exact || ws.ctx.config().exact,
        preid: args.preid.clone().or_else(|| ws.options.preid.clone()),
        build_metadata: args
            .build_metadata
            .clone()
            .or_else(|| ws.options.build_metadata.clone()),
        ..PlannerOptions::new(mode.clone())
    };

    let plan = VersionPlanner::new(&ws.graph, options)
        .with_history(&repo, changes.reference.clone())
        .plan(&changes.records, &policy)?;
    if plan.is_empty() {
        return Ok(None);
    }

    print_section_header("Version changes");
    print_plan_table(&plan);
    println!();

    if args.dry_run {
        return Ok(Some(Release {
            plan,
            written: Vec::new(),
        }));
    }

    let written = write_release(ws, &plan, &mode)?;
    let tag_release = !args.no_git_tag_version && ws.options.git_tag_version.unwrap_or(true);
    if tag_release {
        commit_and_tag(ws, &repo, &plan, &mode, &written, args.message.as_deref())?;
    }

    Ok(Some(Release { plan, written }))
}

fn bump_policy(ws: &Workspace, args: &VersionArgs) -> Result<BumpPolicy> {
    if let Some(bump) = &args.bump {
        let explicit: ExplicitVersion = bump.parse()?;
        return Ok(BumpPolicy::Explicit(explicit));
    }
    if args.conventional_commits || ws.options.conventional_commits.unwrap_or(false) {
        return Ok(BumpPolicy::CommitDriven(ConventionalOptions {
            prerelease: PackageSelector::from_flag(args.conventional_prerelease.as_deref()),
            graduate: PackageSelector::from_flag(args.change.conventional_graduate.as_deref()),
        }));
    }
    Err(Error::Validation(
        "give a release keyword or version, or pass --conventional-commits".to_string(),
    )
    .into())
}

/// Writes every touched manifest, plus the shared version in fixed mode.
fn write_release(ws: &Workspace, plan: &VersionPlan, mode: &VersionMode) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for package in plan.apply(&ws.graph) {
        written.push(ws.adapter.write(&package)?);
    }

    if let (VersionMode::Fixed(_), Some(version)) = (mode, plan.shared_version()) {
        if let Some(path) = &ws.ctx.config().config_path {
            WorkspaceConfig::write_fixed_version(path, version)?;
            written.push(path.clone());
        }
    }

    info!(files = written.len(), "manifests written");
    Ok(written)
}

fn commit_and_tag(
    ws: &Workspace,
    repo: &GitRepository,
    plan: &VersionPlan,
    mode: &VersionMode,
    written: &[PathBuf],
    message: Option<&str>,
) -> Result<()> {
    let prefix = ws.tag_prefix();
    let template = message.or(ws.options.message.as_deref());
    let message = plan.commit_message(mode, &prefix, template);

    let sha = repo
        .commit_all(&message, written)
        .context("Failed to commit release")?;
    debug!(%sha, "release committed");

    for tag in plan.tags(mode, &prefix) {
        repo.create_tag(&tag, &tag)
            .with_context(|| format!("Failed to create tag {}", tag))?;
        println!("  {}", tag);
    }
    Ok(())
}
