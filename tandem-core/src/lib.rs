//! Core library for workspace versioning and orchestration.

pub mod adapter;
pub mod bump;
pub mod change;
pub mod config;
pub mod context;
pub mod conventional;
pub mod error;
pub mod filter;
pub mod git;
pub mod graph;
pub mod orchestrator;
pub mod package;
pub mod registry;
pub mod scanner;
pub mod specifier;
pub mod version;
pub mod watcher;
pub mod work;

pub use adapter::ManifestAdapter;
pub use bump::ReleaseType;
pub use change::{ChangeDetector, ChangeOptions, ChangeReason, ChangeRecord, PackageSelector};
pub use config::{CommandOptions, VersionMode, WorkspaceConfig};
pub use context::WorkspaceContext;
pub use conventional::{CommitClass, CommitParser};
pub use error::{Error, RegistryError, Result};
pub use filter::{PackageFilter, Since};
pub use git::{GitRepository, VersionControl};
pub use graph::{GraphType, PackageGraph, PackageGraphNode, TopoOrder};
pub use orchestrator::{
    OrchestratorConfig, RunSummary, TaskOrchestrator, TaskReporter, TaskRun, UnitOfWork,
    WorkContext, WorkOutcome,
};
pub use package::{DependencyKind, Package};
pub use registry::{HttpRegistry, RegistryClient};
pub use scanner::Scanner;
pub use specifier::DependencySpecifier;
pub use version::{BumpPolicy, ExplicitVersion, VersionBump, VersionPlan, VersionPlanner};
pub use watcher::{FileWatcher, WatcherConfig};
pub use work::{ExecWork, PublishWork, ScriptWork};
