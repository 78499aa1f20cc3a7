//! Workspace configuration parsed from `tandem.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::GraphType;

pub const CONFIG_FILE: &str = "tandem.toml";

const INDEPENDENT: &str = "independent";

const VERSION_LINE: &str = r#"(?m)^(\s*version\s*=\s*)"[^"]*""#;

/// How versions are tracked across the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionMode {
    /// One shared version line, seeded by the configured version.
    Fixed(Version),
    /// Every package tracks its own version.
    Independent,
}

impl VersionMode {
    #[inline]
    pub fn is_independent(&self) -> bool {
        matches!(self, VersionMode::Independent)
    }
}

/// Per-command option overrides from `[command.<name>]` tables.
///
/// Every field is optional; unset fields fall through to CLI defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandOptions {
    pub concurrency: Option<usize>,
    pub bail: Option<bool>,
    pub stream: Option<bool>,
    pub prefix: Option<bool>,
    pub sort: Option<bool>,
    pub reject_cycles: Option<bool>,
    pub graph_type: Option<GraphType>,
    pub conventional_commits: Option<bool>,
    pub force_publish: Option<Vec<String>>,
    pub include_merged_tags: Option<bool>,
    pub build_metadata: Option<String>,
    pub preid: Option<String>,
    pub tag_version_prefix: Option<String>,
    pub message: Option<String>,
    pub git_tag_version: Option<bool>,
    pub ignore_changes: Option<Vec<String>>,
}

impl CommandOptions {
    /// Fills every unset field of `self` from `fallback`.
    pub fn or(self, fallback: &CommandOptions) -> CommandOptions {
        CommandOptions {
            concurrency: self.concurrency.or(fallback.concurrency),
            bail: self.bail.or(fallback.bail),
            stream: self.stream.or(fallback.stream),
            prefix: self.prefix.or(fallback.prefix),
            sort: self.sort.or(fallback.sort),
            reject_cycles: self.reject_cycles.or(fallback.reject_cycles),
            graph_type: self.graph_type.or(fallback.graph_type),
            conventional_commits: self.conventional_commits.or(fallback.conventional_commits),
            force_publish: self.force_publish.or_else(|| fallback.force_publish.clone()),
            include_merged_tags: self.include_merged_tags.or(fallback.include_merged_tags),
            build_metadata: self
                .build_metadata
                .or_else(|| fallback.build_metadata.clone()),
            preid: self.preid.or_else(|| fallback.preid.clone()),
            tag_version_prefix: self
                .tag_version_prefix
                .or_else(|| fallback.tag_version_prefix.clone()),
            message: self.message.or_else(|| fallback.message.clone()),
            git_tag_version: self.git_tag_version.or(fallback.git_tag_version),
            ignore_changes: self
                .ignore_changes
                .or_else(|| fallback.ignore_changes.clone()),
        }
    }
}

/// Workspace-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceConfig {
    /// Globs locating package directories, relative to the root.
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
    /// `"independent"` or the shared semver version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Path globs whose changes never mark a package as changed.
    #[serde(default)]
    pub ignore_changes: Vec<String>,
    /// Rewrite local ranges as exact pins instead of caret ranges.
    #[serde(default)]
    pub exact: bool,
    #[serde(default = "default_npm_client")]
    pub npm_client: String,
    pub registry: Option<String>,
    #[serde(default)]
    pub command: IndexMap<String, CommandOptions>,
    /// Path of the file this was loaded from.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

fn default_packages() -> Vec<String> {
    vec!["packages/*".to_string()]
}

fn default_version() -> String {
    INDEPENDENT.to_string()
}

fn default_npm_client() -> String {
    "npm".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            packages: default_packages(),
            version: default_version(),
            ignore_changes: Vec::new(),
            exact: false,
            npm_client: default_npm_client(),
            registry: None,
            command: IndexMap::new(),
            config_path: None,
        }
    }
}

impl WorkspaceConfig {
    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed TOML or an invalid `version` field.
    pub fn parse(content: &str) -> Result<Self> {
        let config: WorkspaceConfig = toml::from_str(content)?;
        config.mode()?;
        Ok(config)
    }

    /// Loads `tandem.toml` from `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::Validation(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = toml::from_str::<WorkspaceConfig>(&content).map_err(|error| {
            Error::Toml {
                error,
                context: path.display().to_string(),
            }
        })?;
        config.mode()?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// Walks up from `start` to the first directory containing
    /// `tandem.toml`, stopping at a repository root.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(CONFIG_FILE).is_file() {
                return Some(dir.to_path_buf());
            }
            if dir.join(".git").exists() {
                break;
            }
            current = dir.parent();
        }
        None
    }

    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `version` is neither `independent`
    /// nor valid semver.
    pub fn mode(&self) -> Result<VersionMode> {
        let raw = self.version.trim();
        if raw == INDEPENDENT {
            return Ok(VersionMode::Independent);
        }
        Version::parse(raw).map(VersionMode::Fixed).map_err(|e| {
            Error::Validation(format!(
                "workspace version must be \"independent\" or semver, got \"{}\": {}",
                raw, e
            ))
        })
    }

    /// Overrides for `command`. `publish` and `changed` inherit `version`
    /// settings, since both resolve releases the same way.
    pub fn command_options(&self, command: &str) -> CommandOptions {
        let own = self.command.get(command).cloned().unwrap_or_default();
        match command {
            "publish" | "changed" => {
                own.or(&self.command.get("version").cloned().unwrap_or_default())
            }
            _ => own,
        }
    }

    /// Ignore globs for change detection: command override, else top level.
    pub fn ignore_changes_for(&self, command: &str) -> Vec<String> {
        self.command_options(command)
            .ignore_changes
            .unwrap_or_else(|| self.ignore_changes.clone())
    }

    /// Rewrites the `version` entry of the config file in place, keeping the
    /// rest of the file untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has no `version` entry, or
    /// cannot be written.
    pub fn write_fixed_version(path: &Path, version: &Version) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let version_re = Regex::new(VERSION_LINE)
            .map_err(|e| Error::Validation(format!("Failed to create regex: {}", e)))?;
        if !version_re.is_match(&content) {
            return Err(Error::Validation(format!(
                "{} has no version entry to update",
                path.display()
            )));
        }
        let updated = version_re.replace(&content, format!(r#"${{1}}"{}""#, version));
        fs::write(path, updated.as_ref())?;
        Ok(())
    }
}
