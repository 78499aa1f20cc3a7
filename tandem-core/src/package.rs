//! Package data model.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};

/// Placeholder shown for packages whose manifest has no usable version.
pub const MISSING_VERSION: &str = "MISSING";

/// The four dependency maps a manifest can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyKind {
    Dependencies,
    DevDependencies,
    PeerDependencies,
    OptionalDependencies,
}

impl DependencyKind {
    /// All kinds, lowest precedence first: a name declared in several maps
    /// resolves to the last one listed here.
    pub const ALL: [DependencyKind; 4] = [
        DependencyKind::DevDependencies,
        DependencyKind::OptionalDependencies,
        DependencyKind::PeerDependencies,
        DependencyKind::Dependencies,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Dependencies => "dependencies",
            DependencyKind::DevDependencies => "devDependencies",
            DependencyKind::PeerDependencies => "peerDependencies",
            DependencyKind::OptionalDependencies => "optionalDependencies",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workspace member as read from its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub name: String,
    pub version: Option<String>,
    pub location: PathBuf,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub scripts: IndexMap<String, String>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: Option<&str>, location: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
            location: location.into(),
            private: false,
            dependencies: IndexMap::new(),
            dev_dependencies: IndexMap::new(),
            peer_dependencies: IndexMap::new(),
            optional_dependencies: IndexMap::new(),
            scripts: IndexMap::new(),
        }
    }

    pub fn with_dependency(
        mut self,
        kind: DependencyKind,
        name: impl Into<String>,
        specifier: impl Into<String>,
    ) -> Self {
        self.dependency_map_mut(kind)
            .insert(name.into(), specifier.into());
        self
    }

    pub fn with_script(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), command.into());
        self
    }

    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    #[inline]
    pub fn dependency_map(&self, kind: DependencyKind) -> &IndexMap<String, String> {
        match kind {
            DependencyKind::Dependencies => &self.dependencies,
            DependencyKind::DevDependencies => &self.dev_dependencies,
            DependencyKind::PeerDependencies => &self.peer_dependencies,
            DependencyKind::OptionalDependencies => &self.optional_dependencies,
        }
    }

    pub fn dependency_map_mut(&mut self, kind: DependencyKind) -> &mut IndexMap<String, String> {
        match kind {
            DependencyKind::Dependencies => &mut self.dependencies,
            DependencyKind::DevDependencies => &mut self.dev_dependencies,
            DependencyKind::PeerDependencies => &mut self.peer_dependencies,
            DependencyKind::OptionalDependencies => &mut self.optional_dependencies,
        }
    }

    /// The parsed version, or `None` if it is missing or not valid semver.
    pub fn semver(&self) -> Option<Version> {
        self.version
            .as_deref()
            .and_then(|v| Version::parse(v.trim()).ok())
    }

    pub fn version_or_missing(&self) -> &str {
        self.version.as_deref().unwrap_or(MISSING_VERSION)
    }

    pub fn is_prerelease(&self) -> bool {
        self.semver().is_some_and(|v| !v.pre.is_empty())
    }

    #[inline]
    pub fn has_script(&self, script: &str) -> bool {
        self.scripts.contains_key(script)
    }

    pub fn set_version(&mut self, version: &Version) {
        self.version = Some(version.to_string());
    }

    /// Rewrites `dependency` in every map that declares it. Returns whether
    /// anything changed.
    pub fn set_dependency_specifier(&mut self, dependency: &str, specifier: &str) -> bool {
        let mut changed = false;
        for kind in DependencyKind::ALL {
            if let Some(current) = self.dependency_map_mut(kind).get_mut(dependency) {
                if current != specifier {
                    *current = specifier.to_string();
                    changed = true;
                }
            }
        }
        changed
    }

    /// Location relative to `root`, falling back to the absolute path.
    pub fn relative_location(&self, root: &Path) -> PathBuf {
        self.location
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.location.clone())
    }
}
