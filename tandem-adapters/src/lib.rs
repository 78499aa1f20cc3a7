pub mod package_json;

pub use package_json::PackageJsonAdapter;

use tandem_core::adapter::ManifestAdapter;

/// The adapter for workspace manifests.
pub fn get_adapter() -> Box<dyn ManifestAdapter> {
    Box::new(PackageJsonAdapter)
}
