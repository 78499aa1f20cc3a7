use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tandem_core::adapter::ManifestAdapter;
use tandem_core::error::{Error, Result};
use tandem_core::package::{DependencyKind, Package};
use tracing::debug;

const MANIFEST: &str = "package.json";

/// Reads and writes npm-style `package.json` manifests.
///
/// Writes touch only `version` and existing dependency specifiers; key order
/// and every other field survive a round trip.
pub struct PackageJsonAdapter;

impl PackageJsonAdapter {
    fn load(path: &Path) -> Result<Map<String, Value>> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|error| Error::json(error, path.display().to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Manifest {
                package: path.display().to_string(),
                message: "manifest is not a JSON object".to_string(),
            }),
        }
    }
}

impl ManifestAdapter for PackageJsonAdapter {
    fn manifest_name(&self) -> &'static str {
        MANIFEST
    }

    fn read(&self, dir: &Path) -> Result<Package> {
        let path = dir.join(MANIFEST);
        let manifest = Self::load(&path)?;

        let name = manifest
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::Manifest {
                package: dir.display().to_string(),
                message: "missing \"name\"".to_string(),
            })?;
        let version = manifest.get("version").and_then(Value::as_str);

        let mut package = Package::new(name, version, dir)
            .private(manifest.get("private").and_then(Value::as_bool).unwrap_or(false));
        for kind in DependencyKind::ALL {
            *package.dependency_map_mut(kind) = string_map(manifest.get(kind.as_str()));
        }
        package.scripts = string_map(manifest.get("scripts"));

        Ok(package)
    }

    fn write(&self, package: &Package) -> Result<PathBuf> {
        let path = package.location.join(MANIFEST);
        let mut manifest = Self::load(&path)?;

        if let Some(version) = &package.version {
            manifest.insert("version".to_string(), Value::String(version.clone()));
        }
        for kind in DependencyKind::ALL {
            let Some(Value::Object(declared)) = manifest.get_mut(kind.as_str()) else {
                continue;
            };
            for (dependency, specifier) in package.dependency_map(kind) {
                if let Some(slot) = declared.get_mut(dependency) {
                    *slot = Value::String(specifier.clone());
                }
            }
        }

        let mut content = serde_json::to_string_pretty(&Value::Object(manifest))
            .map_err(|error| Error::json(error, path.display().to_string()))?;
        content.push('\n');
        fs::write(&path, content)?;

        debug!(package = %package.name, path = %path.display(), "wrote manifest");
        Ok(path)
    }
}

/// String entries of a JSON object; anything else is skipped.
fn string_map(value: Option<&Value>) -> IndexMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_map_skips_non_strings() {
        let value: Value = serde_json::json!({ "a": "^1.0.0", "b": 2, "c": null });
        let map = string_map(Some(&value));
        assert_eq!(map.len(), 1);
        assert_eq!(map["a"], "^1.0.0");
        assert!(string_map(None).is_empty());
    }
}
