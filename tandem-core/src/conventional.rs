//! Conventional commit classification.

use regex::Regex;
use semver::Version;

use crate::bump::ReleaseType;
use crate::error::{Error, Result};

const HEADER: &str = r"^(?P<type>[A-Za-z][A-Za-z0-9_-]*)(?:\((?P<scope>[^)]*)\))?(?P<breaking>!)?:\s*(?P<subject>\S.*)$";

const BREAKING_FOOTERS: [&str; 2] = ["BREAKING CHANGE:", "BREAKING-CHANGE:"];

/// Impact of a commit, ordered from least to most significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommitClass {
    Other,
    Fix,
    Feature,
    Breaking,
}

impl CommitClass {
    /// The release type this class calls for at `current`.
    ///
    /// Below 1.0.0 a breaking change only bumps the minor version.
    pub fn release_type(&self, current: &Version) -> ReleaseType {
        match self {
            CommitClass::Breaking if current.major == 0 => ReleaseType::Minor,
            CommitClass::Breaking => ReleaseType::Major,
            CommitClass::Feature => ReleaseType::Minor,
            CommitClass::Fix | CommitClass::Other => ReleaseType::Patch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionalCommit {
    pub kind: String,
    pub scope: Option<String>,
    pub breaking: bool,
    pub subject: String,
}

impl ConventionalCommit {
    pub fn class(&self) -> CommitClass {
        if self.breaking {
            return CommitClass::Breaking;
        }
        match self.kind.to_ascii_lowercase().as_str() {
            "feat" | "feature" => CommitClass::Feature,
            "fix" => CommitClass::Fix,
            _ => CommitClass::Other,
        }
    }
}

/// Parses commit messages against the conventional header format.
pub struct CommitParser {
    header: Regex,
}

impl CommitParser {
    /// # Errors
    ///
    /// Returns an error if the header pattern fails to compile.
    pub fn new() -> Result<Self> {
        let header = Regex::new(HEADER)
            .map_err(|e| Error::Validation(format!("Failed to create regex: {}", e)))?;
        Ok(Self { header })
    }

    /// Parses `message`, or `None` when the first line is not a conventional
    /// header.
    pub fn parse(&self, message: &str) -> Option<ConventionalCommit> {
        let mut lines = message.lines();
        let first = lines.next()?.trim();
        let caps = self.header.captures(first)?;

        let footer_breaking = lines.any(|line| {
            let line = line.trim_start();
            BREAKING_FOOTERS.iter().any(|footer| line.starts_with(footer))
        });

        Some(ConventionalCommit {
            kind: caps["type"].to_string(),
            scope: caps
                .name("scope")
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty()),
            breaking: caps.name("breaking").is_some() || footer_breaking,
            subject: caps["subject"].trim().to_string(),
        })
    }

    /// Class of a single message; non-conventional messages are `Other`.
    pub fn classify(&self, message: &str) -> CommitClass {
        self.parse(message)
            .map(|commit| commit.class())
            .unwrap_or(CommitClass::Other)
    }

    /// Highest class among `messages`, `None` when there are none.
    pub fn highest<'m, I>(&self, messages: I) -> Option<CommitClass>
    where
        I: IntoIterator<Item = &'m str>,
    {
        messages.into_iter().map(|m| self.classify(m)).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaking_marker_and_footer() {
        let parser = CommitParser::new().unwrap();
        assert_eq!(parser.classify("feat(api)!: drop v1"), CommitClass::Breaking);
        assert_eq!(
            parser.classify("fix: tweak\n\nBREAKING CHANGE: renamed option"),
            CommitClass::Breaking
        );
        assert_eq!(parser.classify("feat: add thing"), CommitClass::Feature);
        assert_eq!(parser.classify("fix(core): null check"), CommitClass::Fix);
        assert_eq!(parser.classify("chore: deps"), CommitClass::Other);
        assert_eq!(parser.classify("Merge branch 'main'"), CommitClass::Other);
    }

    #[test]
    fn parses_scope_and_subject() {
        let parser = CommitParser::new().unwrap();
        let commit = parser.parse("docs(readme): explain flags").unwrap();
        assert_eq!(commit.kind, "docs");
        assert_eq!(commit.scope.as_deref(), Some("readme"));
        assert_eq!(commit.subject, "explain flags");
        assert!(!commit.breaking);
    }

    #[test]
    fn zero_major_breaking_is_minor() {
        let v = Version::new(0, 4, 2);
        assert_eq!(CommitClass::Breaking.release_type(&v), ReleaseType::Minor);
        let v = Version::new(2, 0, 0);
        assert_eq!(CommitClass::Breaking.release_type(&v), ReleaseType::Major);
    }
}
