//! Semantic version arithmetic.
//!
//! [`increment`] follows the npm `semver.inc` rules: bumping a prerelease to
//! its own release line graduates it instead of skipping a version, and
//! `prerelease` rolls the trailing numeric identifier.

use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bump class of a version change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Major,
    Minor,
    Patch,
    Premajor,
    Preminor,
    Prepatch,
    Prerelease,
    None,
}

impl ReleaseType {
    pub const KEYWORDS: [ReleaseType; 7] = [
        ReleaseType::Major,
        ReleaseType::Minor,
        ReleaseType::Patch,
        ReleaseType::Premajor,
        ReleaseType::Preminor,
        ReleaseType::Prepatch,
        ReleaseType::Prerelease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseType::Major => "major",
            ReleaseType::Minor => "minor",
            ReleaseType::Patch => "patch",
            ReleaseType::Premajor => "premajor",
            ReleaseType::Preminor => "preminor",
            ReleaseType::Prepatch => "prepatch",
            ReleaseType::Prerelease => "prerelease",
            ReleaseType::None => "none",
        }
    }

    #[inline]
    pub fn is_prerelease(&self) -> bool {
        matches!(
            self,
            ReleaseType::Premajor
                | ReleaseType::Preminor
                | ReleaseType::Prepatch
                | ReleaseType::Prerelease
        )
    }

    /// Size of the change, for picking the largest of several bumps.
    pub fn rank(&self) -> u8 {
        match self {
            ReleaseType::None => 0,
            ReleaseType::Prerelease => 1,
            ReleaseType::Prepatch | ReleaseType::Patch => 2,
            ReleaseType::Preminor | ReleaseType::Minor => 3,
            ReleaseType::Premajor | ReleaseType::Major => 4,
        }
    }

    /// The `pre*` counterpart of a release bump.
    pub fn to_prerelease(self) -> ReleaseType {
        match self {
            ReleaseType::Major => ReleaseType::Premajor,
            ReleaseType::Minor => ReleaseType::Preminor,
            ReleaseType::Patch => ReleaseType::Prepatch,
            other => other,
        }
    }

    /// Classifies the change from `current` to `next`.
    pub fn between(current: &Version, next: &Version) -> ReleaseType {
        if next.cmp_precedence(current) != std::cmp::Ordering::Greater {
            return ReleaseType::None;
        }
        let pre = !next.pre.is_empty();
        if next.major != current.major {
            if pre {
                ReleaseType::Premajor
            } else {
                ReleaseType::Major
            }
        } else if next.minor != current.minor {
            if pre {
                ReleaseType::Preminor
            } else {
                ReleaseType::Minor
            }
        } else if next.patch != current.patch {
            if pre {
                ReleaseType::Prepatch
            } else {
                ReleaseType::Patch
            }
        } else if pre {
            ReleaseType::Prerelease
        } else if next.patch != 0 {
            ReleaseType::Patch
        } else if next.minor != 0 {
            ReleaseType::Minor
        } else {
            ReleaseType::Major
        }
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ReleaseType::KEYWORDS
            .iter()
            .chain(std::iter::once(&ReleaseType::None))
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| Error::Validation(format!("unknown release type \"{}\"", s)))
    }
}

/// Applies `release` to `version`.
///
/// `preid` names the prerelease identifier for `pre*` bumps; without it the
/// prerelease is purely numeric. Build metadata is always dropped.
///
/// # Errors
///
/// Returns an error if `preid` is not a valid prerelease identifier.
pub fn increment(version: &Version, release: ReleaseType, preid: Option<&str>) -> Result<Version> {
    let mut next = version.clone();
    next.build = BuildMetadata::EMPTY;

    match release {
        ReleaseType::None => {}
        ReleaseType::Major => {
            if next.minor != 0 || next.patch != 0 || next.pre.is_empty() {
                next.major += 1;
            }
            next.minor = 0;
            next.patch = 0;
            next.pre = Prerelease::EMPTY;
        }
        ReleaseType::Minor => {
            if next.patch != 0 || next.pre.is_empty() {
                next.minor += 1;
            }
            next.patch = 0;
            next.pre = Prerelease::EMPTY;
        }
        ReleaseType::Patch => {
            if next.pre.is_empty() {
                next.patch += 1;
            }
            next.pre = Prerelease::EMPTY;
        }
        ReleaseType::Premajor => {
            next.major += 1;
            next.minor = 0;
            next.patch = 0;
            next.pre = first_prerelease(preid)?;
        }
        ReleaseType::Preminor => {
            next.minor += 1;
            next.patch = 0;
            next.pre = first_prerelease(preid)?;
        }
        ReleaseType::Prepatch => {
            next.patch += 1;
            next.pre = first_prerelease(preid)?;
        }
        ReleaseType::Prerelease => {
            if next.pre.is_empty() {
                next.patch += 1;
                next.pre = first_prerelease(preid)?;
            } else {
                next.pre = roll_prerelease(&next.pre, preid)?;
            }
        }
    }

    Ok(next)
}

fn first_prerelease(preid: Option<&str>) -> Result<Prerelease> {
    let raw = match preid {
        Some(id) if !id.is_empty() => format!("{}.0", id),
        _ => "0".to_string(),
    };
    Prerelease::new(&raw).map_err(|e| Error::semver(raw, e))
}

fn roll_prerelease(current: &Prerelease, preid: Option<&str>) -> Result<Prerelease> {
    let mut parts: Vec<String> = current.as_str().split('.').map(str::to_string).collect();

    if let Some(id) = preid.filter(|id| !id.is_empty()) {
        if parts.first().map(String::as_str) != Some(id) {
            return first_prerelease(Some(id));
        }
    }

    match parts.iter().rposition(|p| p.parse::<u64>().is_ok()) {
        Some(idx) => {
            let n: u64 = parts[idx].parse().unwrap_or(0);
            parts[idx] = (n + 1).to_string();
        }
        None => parts.push("0".to_string()),
    }

    let raw = parts.join(".");
    Prerelease::new(&raw).map_err(|e| Error::semver(raw, e))
}

/// Attaches `metadata` to `version`, replacing any existing metadata.
///
/// # Errors
///
/// Returns an error if `metadata` is not a valid build identifier.
pub fn apply_build_metadata(version: &Version, metadata: &str) -> Result<Version> {
    let build = BuildMetadata::new(metadata).map_err(|e| Error::semver(metadata, e))?;
    let mut next = version.clone();
    next.build = build;
    Ok(next)
}

/// Picks the release type for a prerelease-targeted bump.
///
/// A version already on a prerelease line stays on it (`prerelease`) unless
/// the requested bump leaves that line, in which case the `pre*` form is used.
pub fn prerelease_target(requested: ReleaseType, current: &Version) -> ReleaseType {
    if requested.is_prerelease() || requested == ReleaseType::None {
        return requested;
    }
    let leaves_line = if current.pre.is_empty() {
        true
    } else {
        match requested {
            ReleaseType::Major => current.minor != 0 || current.patch != 0,
            ReleaseType::Minor => current.patch != 0,
            _ => false,
        }
    };
    if leaves_line {
        requested.to_prerelease()
    } else {
        ReleaseType::Prerelease
    }
}
