//! Manifest adapter trait for reading and writing package manifests.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::package::Package;

/// Trait for manifest-format operations.
///
/// Adapters read a package directory into a [`Package`] and persist the
/// version and dependency specifiers back. They never install anything;
/// that is delegated to the package manager.
pub trait ManifestAdapter: Send + Sync {
    /// File name of the manifest, e.g. `package.json`.
    fn manifest_name(&self) -> &'static str;

    fn detect(&self, dir: &Path) -> bool {
        dir.join(self.manifest_name()).is_file()
    }

    fn read(&self, dir: &Path) -> Result<Package>;

    /// Writes `package` back to its manifest, leaving unknown fields intact.
    /// Returns the path written.
    fn write(&self, package: &Package) -> Result<PathBuf>;
}
