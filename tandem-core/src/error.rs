//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {context}: {error}")]
    Json {
        error: serde_json::Error,
        context: String,
    },

    #[error("TOML parse error in {context}: {error}")]
    Toml {
        error: toml::de::Error,
        context: String,
    },

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Invalid version {value}: {source}")]
    Semver {
        value: String,
        #[source]
        source: semver::Error,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Package name \"{name}\" is used by both {} and {}", .first.display(), .second.display())]
    DuplicatePackage {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Package not found: {name}. Available packages: {available}")]
    PackageNotFound { name: String, available: String },

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Dependency cycle detected: {path}")]
    Cycle { path: String },

    #[error("Manifest error for {package}: {message}")]
    Manifest { package: String, message: String },

    #[error("Task failed in {package} with exit code {code}")]
    Execution { package: String, code: i32 },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Watcher error: {0}")]
    Watch(String),
}

/// Failures reported by a package registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("authentication rejected for {url} (status {status})")]
    Unauthorized { url: String, status: u16 },

    #[error("endpoint not implemented by registry: {url} (status {status})")]
    NotImplemented { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

impl Error {
    /// Process exit code for this error.
    ///
    /// Task failures propagate the child's own code; every other failure is a
    /// generic `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Execution { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// A JSON failure tagged with the file or value it came from.
    pub fn json(error: serde_json::Error, context: impl Into<String>) -> Self {
        Error::Json {
            error,
            context: context.into(),
        }
    }

    pub(crate) fn semver(value: impl Into<String>, source: semver::Error) -> Self {
        Error::Semver {
            value: value.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Toml {
            error,
            context: "tandem.toml".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
