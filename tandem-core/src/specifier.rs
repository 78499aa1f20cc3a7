//! Dependency specifiers as written in package manifests.
//!
//! npm ranges differ from Cargo requirements in a few ways that matter here:
//! a bare version is an exact pin rather than a caret range, comparators are
//! separated by whitespace instead of commas, and `||` introduces
//! alternatives. [`VersionRange`] translates the npm dialect into one
//! [`semver::VersionReq`] per alternative.

use std::fmt;

use semver::{Version, VersionReq};

/// A parsed dependency specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpecifier {
    /// A semver range such as `^1.2.0` or `>=1.0.0 <2.0.0`.
    Range(VersionRange),
    /// A `workspace:` protocol reference.
    Workspace(WorkspaceRange),
    /// A filesystem reference (`file:`, `link:`, or a relative path).
    Path(String),
    /// A distribution tag such as `latest` or `next`.
    Tag(String),
    /// Git URLs, tarball URLs and aliases. Never resolved inside the workspace.
    Remote(String),
}

/// The right-hand side of a `workspace:` specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceRange {
    /// `workspace:*`, `workspace:^` or `workspace:~`; always the local copy.
    Alias(String),
    Range(VersionRange),
}

impl DependencySpecifier {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Some(rest) = raw.strip_prefix("workspace:") {
            return match rest {
                "" | "*" | "^" | "~" => {
                    DependencySpecifier::Workspace(WorkspaceRange::Alias(rest.to_string()))
                }
                _ => match VersionRange::parse(rest) {
                    Some(range) => DependencySpecifier::Workspace(WorkspaceRange::Range(range)),
                    None => DependencySpecifier::Workspace(WorkspaceRange::Alias(rest.to_string())),
                },
            };
        }

        if is_path_reference(raw) {
            let path = raw
                .strip_prefix("file:")
                .or_else(|| raw.strip_prefix("link:"))
                .unwrap_or(raw);
            return DependencySpecifier::Path(path.to_string());
        }

        if let Some(range) = VersionRange::parse(raw) {
            return DependencySpecifier::Range(range);
        }

        if is_tag_name(raw) {
            DependencySpecifier::Tag(raw.to_string())
        } else {
            DependencySpecifier::Remote(raw.to_string())
        }
    }

    /// Whether a workspace package at `version` satisfies this specifier.
    ///
    /// Path and tag references always point at the local copy. A missing
    /// version never satisfies a range.
    pub fn is_satisfied_by(&self, version: Option<&Version>) -> bool {
        match self {
            DependencySpecifier::Range(range) => version.is_some_and(|v| range.matches(v)),
            DependencySpecifier::Workspace(WorkspaceRange::Alias(_)) => true,
            DependencySpecifier::Workspace(WorkspaceRange::Range(range)) => {
                version.is_some_and(|v| range.matches(v))
            }
            DependencySpecifier::Path(_) | DependencySpecifier::Tag(_) => true,
            DependencySpecifier::Remote(_) => false,
        }
    }

    /// Whether this specifier is range-typed and must track the dependency's
    /// version.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            DependencySpecifier::Range(_)
                | DependencySpecifier::Workspace(WorkspaceRange::Range(_))
        )
    }

    /// Produces the specifier text pointing at `version`, or `None` when the
    /// specifier does not encode a version at all.
    ///
    /// Build metadata is dropped, ranges cannot carry it.
    pub fn rewrite(&self, version: &Version, exact: bool) -> Option<String> {
        let mut bare = version.clone();
        bare.build = semver::BuildMetadata::EMPTY;
        let pinned = if exact {
            bare.to_string()
        } else {
            format!("^{}", bare)
        };

        match self {
            DependencySpecifier::Range(_) => Some(pinned),
            DependencySpecifier::Workspace(WorkspaceRange::Range(_)) => {
                Some(format!("workspace:{}", pinned))
            }
            _ => None,
        }
    }
}

impl fmt::Display for DependencySpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencySpecifier::Range(range) => write!(f, "{}", range),
            DependencySpecifier::Workspace(WorkspaceRange::Alias(alias)) => {
                write!(f, "workspace:{}", alias)
            }
            DependencySpecifier::Workspace(WorkspaceRange::Range(range)) => {
                write!(f, "workspace:{}", range)
            }
            DependencySpecifier::Path(path) => write!(f, "file:{}", path),
            DependencySpecifier::Tag(tag) => write!(f, "{}", tag),
            DependencySpecifier::Remote(raw) => write!(f, "{}", raw),
        }
    }
}

/// An npm range: one or more alternatives joined by `||`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parses an npm range, returning `None` if any alternative is not a
    /// valid range.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Some(Self {
                raw: raw.to_string(),
                alternatives: vec![VersionReq::STAR],
            });
        }

        let alternatives = raw
            .split("||")
            .map(|alt| translate_alternative(alt).and_then(|req| VersionReq::parse(&req).ok()))
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn translate_alternative(alt: &str) -> Option<String> {
    let alt = alt.trim();
    if alt.is_empty() || alt == "*" || alt.eq_ignore_ascii_case("x") {
        return Some("*".to_string());
    }

    if let Some((low, high)) = alt.split_once(" - ") {
        let low = normalize_version(low.trim())?;
        let high = normalize_version(high.trim())?;
        return Some(format!(">={}, <={}", low, high));
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in alt.split_whitespace() {
        if is_operator(token) {
            pending_op = Some(token);
            continue;
        }
        let comparator = match pending_op.take() {
            Some(op) => format!("{}{}", op, normalize_version(token)?),
            None => translate_comparator(token)?,
        };
        comparators.push(comparator);
    }

    if pending_op.is_some() || comparators.is_empty() {
        return None;
    }
    Some(comparators.join(", "))
}

fn translate_comparator(token: &str) -> Option<String> {
    for op in [">=", "<=", ">", "<", "=", "^", "~"] {
        if let Some(rest) = token.strip_prefix(op) {
            return Some(format!("{}{}", op, normalize_version(rest)?));
        }
    }

    let version = normalize_version(token)?;
    if version.contains('*') {
        Some(version)
    } else {
        Some(format!("={}", version))
    }
}

fn normalize_version(token: &str) -> Option<String> {
    let token = token.trim().trim_start_matches('v');
    if token.is_empty() {
        return None;
    }
    let first = token.chars().next()?;
    if !(first.is_ascii_digit() || first == '*' || first == 'x' || first == 'X') {
        return None;
    }

    let (core, suffix) = match token.find(|c: char| c == '-' || c == '+') {
        Some(idx) => token.split_at(idx),
        None => (token, ""),
    };
    let core = core
        .split('.')
        .map(|part| match part {
            "x" | "X" => "*",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(".");
    Some(format!("{}{}", core, suffix))
}

fn is_operator(token: &str) -> bool {
    matches!(token, ">=" | "<=" | ">" | "<" | "=" | "^" | "~")
}

fn is_path_reference(raw: &str) -> bool {
    raw.starts_with("file:")
        || raw.starts_with("link:")
        || raw.starts_with("./")
        || raw.starts_with("../")
        || raw.starts_with('/')
        || raw.starts_with("~/")
}

fn is_tag_name(raw: &str) -> bool {
    !raw.is_empty()
        && !raw.starts_with(|c: char| c.is_ascii_digit())
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
