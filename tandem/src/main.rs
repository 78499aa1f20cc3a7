mod commands;
mod formatting;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use commands::{ChangedArgs, ExecArgs, ListArgs, PublishArgs, RunArgs, VersionArgs, WatchArgs};
use formatting::print_error;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(version, about = "Versioning, publishing and task orchestration for JavaScript monorepos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(short, long, action, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List packages changed since the last release
    Changed(ChangedArgs),
    /// List workspace packages
    #[command(alias = "ls")]
    List(ListArgs),
    /// Show the dependency graph and any cycles
    Graph {
        #[arg(long, action)]
        json: bool,
    },
    /// Run a package script in every package that has it
    Run(RunArgs),
    /// Run a command in every package
    Exec(ExecArgs),
    /// Bump versions of changed packages, commit and tag
    Version(VersionArgs),
    /// Publish packages that changed since the last release
    Publish(PublishArgs),
    /// Re-run a command in packages whose files change
    Watch(WatchArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let filter = EnvFilter::try_from_env("TANDEM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = cancel_tx.send(true);
    }) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }

    match dispatch(cli.command, cancel_rx) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => exit_code(code),
        Err(e) => {
            let code = e
                .downcast_ref::<tandem_core::Error>()
                .map(tandem_core::Error::exit_code)
                .unwrap_or(1);
            print_error(&format!("{:#}", e));
            exit_code(code)
        }
    }
}

fn dispatch(command: Commands, cancel: watch::Receiver<bool>) -> Result<i32> {
    match command {
        Commands::Changed(args) => commands::cmd_changed(args),
        Commands::List(args) => commands::cmd_list(args),
        Commands::Graph { json } => commands::cmd_graph(json),
        Commands::Run(args) => commands::cmd_run(args, cancel),
        Commands::Exec(args) => commands::cmd_exec(args, cancel),
        Commands::Version(args) => commands::cmd_version(args),
        Commands::Publish(args) => commands::cmd_publish(args, cancel),
        Commands::Watch(args) => commands::cmd_watch(args, cancel),
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
