use semver::Version;
use tandem_core::specifier::{DependencySpecifier, VersionRange, WorkspaceRange};

fn v(raw: &str) -> Version {
    Version::parse(raw).unwrap()
}

#[test]
fn test_caret_and_tilde() {
    let caret = VersionRange::parse("^1.2.0").unwrap();
    assert!(caret.matches(&v("1.9.0")));
    assert!(!caret.matches(&v("2.0.0")));

    let tilde = VersionRange::parse("~1.2.0").unwrap();
    assert!(tilde.matches(&v("1.2.5")));
    assert!(!tilde.matches(&v("1.3.0")));
}

#[test]
fn test_bare_version_is_exact() {
    let exact = VersionRange::parse("1.2.3").unwrap();
    assert!(exact.matches(&v("1.2.3")));
    assert!(!exact.matches(&v("1.2.4")));
}

#[test]
fn test_whitespace_comparators_are_conjunctive() {
    let range = VersionRange::parse(">=1.0.0 <2.0.0").unwrap();
    assert!(range.matches(&v("1.5.0")));
    assert!(!range.matches(&v("2.0.0")));

    let spaced = VersionRange::parse(">= 1.0.0 < 1.5.0").unwrap();
    assert!(spaced.matches(&v("1.4.9")));
    assert!(!spaced.matches(&v("1.5.0")));
}

#[test]
fn test_hyphen_and_alternatives() {
    let hyphen = VersionRange::parse("1.0.0 - 1.4.0").unwrap();
    assert!(hyphen.matches(&v("1.4.0")));
    assert!(!hyphen.matches(&v("1.4.1")));

    let either = VersionRange::parse("^1.0.0 || ^3.0.0").unwrap();
    assert!(either.matches(&v("3.1.0")));
    assert!(!either.matches(&v("2.0.0")));
}

#[test]
fn test_wildcards() {
    assert!(VersionRange::parse("*").unwrap().matches(&v("9.9.9")));
    assert!(VersionRange::parse("1.x").unwrap().matches(&v("1.7.0")));
    assert!(!VersionRange::parse("1.x").unwrap().matches(&v("2.0.0")));
}

#[test]
fn test_parse_kinds() {
    assert!(matches!(
        DependencySpecifier::parse("^1.0.0"),
        DependencySpecifier::Range(_)
    ));
    assert_eq!(
        DependencySpecifier::parse("file:../lib"),
        DependencySpecifier::Path("../lib".to_string())
    );
    assert!(matches!(
        DependencySpecifier::parse("./local"),
        DependencySpecifier::Path(_)
    ));
    assert_eq!(
        DependencySpecifier::parse("latest"),
        DependencySpecifier::Tag("latest".to_string())
    );
    assert!(matches!(
        DependencySpecifier::parse("workspace:*"),
        DependencySpecifier::Workspace(WorkspaceRange::Alias(_))
    ));
    assert!(matches!(
        DependencySpecifier::parse("workspace:^1.0.0"),
        DependencySpecifier::Workspace(WorkspaceRange::Range(_))
    ));
    assert!(matches!(
        DependencySpecifier::parse("git+https://example.com/repo.git"),
        DependencySpecifier::Remote(_)
    ));
}

#[test]
fn test_satisfaction() {
    let version = v("1.2.0");
    assert!(DependencySpecifier::parse("^1.0.0").is_satisfied_by(Some(&version)));
    assert!(!DependencySpecifier::parse("^2.0.0").is_satisfied_by(Some(&version)));
    assert!(!DependencySpecifier::parse("^1.0.0").is_satisfied_by(None));
    assert!(DependencySpecifier::parse("next").is_satisfied_by(None));
    assert!(DependencySpecifier::parse("link:../x").is_satisfied_by(None));
}

#[test]
fn test_rewrite_preserves_protocol_and_exactness() {
    let next = v("2.0.0");
    assert_eq!(
        DependencySpecifier::parse("^1.0.0").rewrite(&next, false).as_deref(),
        Some("^2.0.0")
    );
    assert_eq!(
        DependencySpecifier::parse("^1.0.0").rewrite(&next, true).as_deref(),
        Some("2.0.0")
    );
    assert_eq!(
        DependencySpecifier::parse("workspace:^1.0.0")
            .rewrite(&next, false)
            .as_deref(),
        Some("workspace:^2.0.0")
    );
    assert_eq!(DependencySpecifier::parse("latest").rewrite(&next, false), None);

    let with_build = v("2.0.0+sha.abc");
    assert_eq!(
        DependencySpecifier::parse("^1.0.0")
            .rewrite(&with_build, true)
            .as_deref(),
        Some("2.0.0")
    );
}
