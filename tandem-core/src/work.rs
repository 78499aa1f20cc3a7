//! Child-process units of work: package scripts, arbitrary commands and
//! publishing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::graph::PackageGraphNode;
use crate::orchestrator::{OutputStream, UnitOfWork, WorkContext, WorkOutcome};

pub const ENV_PACKAGE_NAME: &str = "TANDEM_PACKAGE_NAME";
pub const ENV_ROOT_PATH: &str = "TANDEM_ROOT_PATH";
pub const ENV_FILE_CHANGES: &str = "TANDEM_FILE_CHANGES";

/// Runs a package script through the npm client.
#[derive(Debug, Clone)]
pub struct ScriptWork {
    pub script: String,
    pub npm_client: String,
    /// Extra arguments passed to the script after `--`.
    pub args: Vec<String>,
}

impl ScriptWork {
    pub fn new(script: impl Into<String>, npm_client: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            npm_client: npm_client.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl UnitOfWork for ScriptWork {
    fn describe(&self) -> String {
        format!("{} run {}", self.npm_client, self.script)
    }

    async fn run(&self, node: &PackageGraphNode, ctx: WorkContext) -> Result<WorkOutcome> {
        if !node.package().has_script(&self.script) {
            debug!(package = %node.name(), script = %self.script, "no such script, skipping");
            return Ok(WorkOutcome::success());
        }
        let mut args = vec!["run".to_string(), self.script.clone()];
        if !self.args.is_empty() {
            args.push("--".to_string());
            args.extend(self.args.iter().cloned());
        }
        let mut command = Command::new(&self.npm_client);
        command.args(&args);
        spawn_and_wait(command, node.location(), &[], &ctx).await
    }
}

/// Runs a shell command line in each package directory.
#[derive(Debug, Clone, Default)]
pub struct ExecWork {
    pub command: String,
    /// Paths relative to each package, exported as `TANDEM_FILE_CHANGES`.
    pub file_changes: HashMap<String, Vec<PathBuf>>,
}

impl ExecWork {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            file_changes: HashMap::new(),
        }
    }

    pub fn with_file_changes(mut self, file_changes: HashMap<String, Vec<PathBuf>>) -> Self {
        self.file_changes = file_changes;
        self
    }
}

#[async_trait]
impl UnitOfWork for ExecWork {
    fn describe(&self) -> String {
        self.command.clone()
    }

    async fn run(&self, node: &PackageGraphNode, ctx: WorkContext) -> Result<WorkOutcome> {
        let mut env = Vec::new();
        if let Some(paths) = self.file_changes.get(node.name()) {
            let joined = paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" ");
            env.push((ENV_FILE_CHANGES.to_string(), joined));
        }
        let mut command = Command::new("sh");
        command.arg("-c").arg(&self.command);
        spawn_and_wait(command, node.location(), &env, &ctx).await
    }
}

/// Publishes each package with the npm client. Private packages are skipped.
#[derive(Debug, Clone)]
pub struct PublishWork {
    pub npm_client: String,
    pub registry: Option<String>,
    pub dist_tag: Option<String>,
}

impl PublishWork {
    pub fn new(npm_client: impl Into<String>) -> Self {
        Self {
            npm_client: npm_client.into(),
            registry: None,
            dist_tag: None,
        }
    }
}

#[async_trait]
impl UnitOfWork for PublishWork {
    fn describe(&self) -> String {
        format!("{} publish", self.npm_client)
    }

    async fn run(&self, node: &PackageGraphNode, ctx: WorkContext) -> Result<WorkOutcome> {
        if node.package().private {
            warn!(package = %node.name(), "private package, not publishing");
            return Ok(WorkOutcome::success());
        }
        let mut command = Command::new(&self.npm_client);
        command.arg("publish");
        if let Some(registry) = &self.registry {
            command.arg("--registry").arg(registry);
        }
        if let Some(tag) = &self.dist_tag {
            command.arg("--tag").arg(tag);
        }
        spawn_and_wait(command, node.location(), &[], &ctx).await
    }
}

/// Spawns `command` in `dir`, forwards its output lines to `ctx`, and kills
/// it if the run is cancelled.
async fn spawn_and_wait(
    mut command: Command,
    dir: &Path,
    env: &[(String, String)],
    ctx: &WorkContext,
) -> Result<WorkOutcome> {
    command
        .current_dir(dir)
        .env(ENV_PACKAGE_NAME, &ctx.package)
        .env(ENV_ROOT_PATH, &ctx.root)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    let stdout = child.stdout.take().map(|out| {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                ctx.emit(OutputStream::Stdout, line);
            }
        })
    });
    let stderr = child.stderr.take().map(|err| {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(err).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                ctx.emit(OutputStream::Stderr, line);
            }
        })
    });

    let mut cancel = ctx.cancel_signal();
    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancelled(&mut cancel) => {
            warn!(package = %ctx.package, "interrupt received, stopping task");
            let _ = child.start_kill();
            child.wait().await?
        }
    };

    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.await;
    }

    let exit_code = status.code().unwrap_or(1);
    debug!(package = %ctx.package, exit_code, "process exited");
    Ok(WorkOutcome { exit_code })
}

/// Resolves once `cancel` reads `true`; never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
