//! Version planning: next versions for changed packages plus the dependency
//! range rewrites they force on dependents.

use std::collections::VecDeque;
use std::str::FromStr;

use indexmap::IndexMap;
use semver::{BuildMetadata, Version};
use tracing::{debug, info};

use crate::bump::{self, ReleaseType};
use crate::change::{ChangeRecord, PackageSelector};
use crate::config::VersionMode;
use crate::conventional::{CommitClass, CommitParser};
use crate::error::{Error, Result};
use crate::git::VersionControl;
use crate::graph::{PackageGraph, PackageGraphNode};
use crate::package::Package;

/// A version given directly on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplicitVersion {
    Keyword(ReleaseType),
    Literal(Version),
}

impl FromStr for ExplicitVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(keyword) = ReleaseType::KEYWORDS.iter().find(|k| k.as_str() == s) {
            return Ok(ExplicitVersion::Keyword(*keyword));
        }
        let literal = s.strip_prefix('v').unwrap_or(s);
        Version::parse(literal)
            .map(ExplicitVersion::Literal)
            .map_err(|e| Error::semver(s, e))
    }
}

/// Options for commit-driven bumps.
#[derive(Debug, Clone, Default)]
pub struct ConventionalOptions {
    /// Packages restricted to prerelease increments.
    pub prerelease: PackageSelector,
    /// Packages whose prerelease identifier is dropped.
    pub graduate: PackageSelector,
}

#[derive(Debug, Clone)]
pub enum BumpPolicy {
    Explicit(ExplicitVersion),
    CommitDriven(ConventionalOptions),
}

#[derive(Debug, Clone)]
pub struct PlannerOptions {
    pub mode: VersionMode,
    /// Rewrite ranges as exact pins instead of caret ranges.
    pub exact: bool,
    pub preid: Option<String>,
    pub build_metadata: Option<String>,
}

impl PlannerOptions {
    pub fn new(mode: VersionMode) -> Self {
        Self {
            mode,
            exact: false,
            preid: None,
            build_metadata: None,
        }
    }
}

/// Next version for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBump {
    pub name: String,
    pub current: Option<Version>,
    /// Next version, build metadata included.
    pub next: Version,
    pub bump_class: ReleaseType,
    pub build_metadata: Option<String>,
    /// Bumped only because a dependency moved out of its declared range.
    pub propagated: bool,
}

impl VersionBump {
    pub fn current_display(&self) -> String {
        self.current
            .as_ref()
            .map(Version::to_string)
            .unwrap_or_else(|| crate::package::MISSING_VERSION.to_string())
    }
}

/// A dependency specifier that must change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRewrite {
    pub dependent: String,
    pub dependency: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default)]
pub struct VersionPlan {
    pub bumps: IndexMap<String, VersionBump>,
    pub rewrites: Vec<RangeRewrite>,
}

impl VersionPlan {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bumps.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&VersionBump> {
        self.bumps.get(name)
    }

    /// The version shared by every bump, if they all agree.
    pub fn shared_version(&self) -> Option<&Version> {
        let first = &self.bumps.values().next()?.next;
        self.bumps
            .values()
            .all(|b| b.next == *first)
            .then_some(first)
    }

    /// Copies of every package the plan touches, with versions and
    /// specifiers updated, in graph order.
    pub fn apply(&self, graph: &PackageGraph) -> Vec<Package> {
        graph
            .nodes()
            .filter_map(|node| {
                let bump = self.bumps.get(node.name());
                let rewrites: Vec<&RangeRewrite> = self
                    .rewrites
                    .iter()
                    .filter(|r| r.dependent == node.name())
                    .collect();
                if bump.is_none() && rewrites.is_empty() {
                    return None;
                }
                let mut package = node.package().clone();
                if let Some(bump) = bump {
                    package.set_version(&bump.next);
                }
                for rewrite in rewrites {
                    package.set_dependency_specifier(&rewrite.dependency, &rewrite.to);
                }
                Some(package)
            })
            .collect()
    }

    /// Tags to create: one `<prefix><version>` for a fixed workspace,
    /// `<name>@<version>` per package otherwise.
    pub fn tags(&self, mode: &VersionMode, tag_prefix: &str) -> Vec<String> {
        match mode {
            VersionMode::Fixed(_) => self
                .shared_version()
                .map(|v| vec![format!("{}{}", tag_prefix, v)])
                .unwrap_or_default(),
            VersionMode::Independent => self
                .bumps
                .values()
                .map(|b| format!("{}@{}", b.name, b.next))
                .collect(),
        }
    }

    /// Release commit message. In `template`, `%s` becomes the prefixed
    /// shared version and `%v` the bare one. Independent releases list every
    /// package below the subject.
    pub fn commit_message(&self, mode: &VersionMode, tag_prefix: &str, template: Option<&str>) -> String {
        let shared = self.shared_version().map(Version::to_string).unwrap_or_default();
        let default = match mode {
            VersionMode::Fixed(_) => "%s",
            VersionMode::Independent => "Publish",
        };
        let mut message = template
            .unwrap_or(default)
            .replace("%s", &format!("{}{}", tag_prefix, shared))
            .replace("%v", &shared);
        if mode.is_independent() {
            message.push_str("\n\n");
            for bump in self.bumps.values() {
                message.push_str(&format!(" - {}@{}\n", bump.name, bump.next));
            }
        }
        message
    }
}

/// Computes next versions and cascading range rewrites.
pub struct VersionPlanner<'a> {
    graph: &'a PackageGraph,
    options: PlannerOptions,
    history: Option<&'a dyn VersionControl>,
    reference: Option<String>,
}

impl<'a> VersionPlanner<'a> {
    pub fn new(graph: &'a PackageGraph, options: PlannerOptions) -> Self {
        Self {
            graph,
            options,
            history: None,
            reference: None,
        }
    }

    /// Supplies commit history for commit-driven policies. `reference` is the
    /// last release tag, if any.
    pub fn with_history(mut self, history: &'a dyn VersionControl, reference: Option<String>) -> Self {
        self.history = Some(history);
        self.reference = reference;
        self
    }

    /// Plans bumps for every changed record, then propagates to dependents
    /// whose declared ranges no longer match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a bump needs a version a package does
    /// not have, or a literal version does not move forward.
    pub fn plan(&self, changes: &[ChangeRecord], policy: &BumpPolicy) -> Result<VersionPlan> {
        let changed: Vec<&PackageGraphNode> = changes
            .iter()
            .filter(|r| r.changed)
            .map(|r| self.graph.node(&r.name))
            .collect::<Result<_>>()?;

        let mut plan = VersionPlan::default();
        if changed.is_empty() {
            return Ok(plan);
        }

        let shared = match &self.options.mode {
            VersionMode::Fixed(seed) => Some(self.fixed_next(seed, &changed, policy)?),
            VersionMode::Independent => None,
        };

        for node in &changed {
            let next = match &shared {
                Some(version) => version.clone(),
                None => self.independent_next(node, policy)?,
            };
            if let BumpPolicy::Explicit(ExplicitVersion::Literal(literal)) = policy {
                ensure_forward(node, literal)?;
            }
            let bump = self.make_bump(node, next, false)?;
            plan.bumps.insert(bump.name.clone(), bump);
        }

        self.propagate(&mut plan, shared.as_ref(), policy)?;

        info!(
            bumps = plan.bumps.len(),
            rewrites = plan.rewrites.len(),
            "planned versions"
        );
        Ok(plan)
    }

    fn fixed_next(
        &self,
        seed: &Version,
        changed: &[&PackageGraphNode],
        policy: &BumpPolicy,
    ) -> Result<Version> {
        match policy {
            BumpPolicy::Explicit(ExplicitVersion::Literal(v)) => Ok(v.clone()),
            BumpPolicy::Explicit(ExplicitVersion::Keyword(kind)) => {
                bump::increment(seed, *kind, self.options.preid.as_deref())
            }
            BumpPolicy::CommitDriven(conventional) => {
                let parser = CommitParser::new()?;
                let mut class = CommitClass::Other;
                for node in changed {
                    class = class.max(self.commit_class(&parser, node, self.reference.as_deref())?);
                }
                let requested = class.release_type(seed);
                let release = if !seed.pre.is_empty()
                    && changed.iter().any(|n| conventional.graduate.matches(n.name()))
                {
                    requested
                } else if changed.iter().any(|n| conventional.prerelease.matches(n.name())) {
                    bump::prerelease_target(requested, seed)
                } else {
                    requested
                };
                debug!(class = ?class, release = %release, "fixed commit-driven bump");
                bump::increment(seed, release, self.options.preid.as_deref())
            }
        }
    }

    fn independent_next(&self, node: &PackageGraphNode, policy: &BumpPolicy) -> Result<Version> {
        match policy {
            BumpPolicy::Explicit(ExplicitVersion::Literal(v)) => Ok(v.clone()),
            BumpPolicy::Explicit(ExplicitVersion::Keyword(kind)) => {
                bump::increment(require_version(node)?, *kind, self.options.preid.as_deref())
            }
            BumpPolicy::CommitDriven(conventional) => {
                let current = require_version(node)?;
                let parser = CommitParser::new()?;
                let reference = self.package_reference(node)?;
                let class = self.commit_class(&parser, node, reference.as_deref())?;
                let requested = class.release_type(current);
                let release = if conventional.graduate.matches(node.name()) && !current.pre.is_empty() {
                    requested
                } else if conventional.prerelease.matches(node.name()) {
                    bump::prerelease_target(requested, current)
                } else {
                    requested
                };
                debug!(package = %node.name(), class = ?class, release = %release, "commit-driven bump");
                bump::increment(current, release, self.options.preid.as_deref())
            }
        }
    }

    /// `<name>@<version>` when that tag exists, else the workspace reference.
    fn package_reference(&self, node: &PackageGraphNode) -> Result<Option<String>> {
        if let (Some(history), Some(version)) = (self.history, node.version()) {
            let tag = format!("{}@{}", node.name(), version);
            if history.tag_exists(&tag)? {
                return Ok(Some(tag));
            }
        }
        Ok(self.reference.clone())
    }

    fn commit_class(
        &self,
        parser: &CommitParser,
        node: &PackageGraphNode,
        reference: Option<&str>,
    ) -> Result<CommitClass> {
        let history = self.history.ok_or_else(|| {
            Error::Validation("commit-driven versioning requires a git repository".to_string())
        })?;
        let commits = history.commits_since(reference, node.location())?;
        Ok(parser
            .highest(commits.iter().map(|c| c.message.as_str()))
            .unwrap_or(CommitClass::Other))
    }

    fn propagate(
        &self,
        plan: &mut VersionPlan,
        shared: Option<&Version>,
        policy: &BumpPolicy,
    ) -> Result<()> {
        let mut rewrites: IndexMap<(String, String), RangeRewrite> = IndexMap::new();
        let mut queue: VecDeque<String> = plan.bumps.keys().cloned().collect();

        while let Some(updated) = queue.pop_front() {
            let mut next = plan.bumps[&updated].next.clone();
            next.build = BuildMetadata::EMPTY;

            for dependent in self.graph.node(&updated)?.dependents() {
                let dependent_node = self.graph.node(dependent)?;
                let Some(specifier) = dependent_node.local_specifier(&updated) else {
                    continue;
                };
                if specifier.is_satisfied_by(Some(&next)) {
                    continue;
                }
                let Some(to) = specifier.rewrite(&next, self.options.exact) else {
                    continue;
                };
                let from = dependent_node
                    .local_dependencies()
                    .get(&updated)
                    .cloned()
                    .unwrap_or_default();

                debug!(
                    package = %dependent,
                    dependency = %updated,
                    from = %from,
                    to = %to,
                    "rewriting dependency range"
                );
                rewrites.insert(
                    (dependent.clone(), updated.clone()),
                    RangeRewrite {
                        dependent: dependent.clone(),
                        dependency: updated.clone(),
                        from,
                        to,
                    },
                );

                if !plan.bumps.contains_key(dependent) {
                    let next = match shared {
                        Some(version) => version.clone(),
                        None => self.propagated_next(dependent_node, policy)?,
                    };
                    let bump = self.make_bump(dependent_node, next, true)?;
                    info!(package = %dependent, next = %bump.next, "bumping dependent");
                    plan.bumps.insert(dependent.clone(), bump);
                    queue.push_back(dependent.clone());
                }
            }
        }

        plan.rewrites = rewrites.into_values().collect();
        Ok(())
    }

    fn propagated_next(&self, node: &PackageGraphNode, policy: &BumpPolicy) -> Result<Version> {
        let release = match policy {
            BumpPolicy::Explicit(ExplicitVersion::Literal(v)) => return Ok(v.clone()),
            BumpPolicy::Explicit(ExplicitVersion::Keyword(kind)) => *kind,
            BumpPolicy::CommitDriven(conventional) => {
                let current = require_version(node)?;
                if conventional.prerelease.matches(node.name()) {
                    bump::prerelease_target(ReleaseType::Patch, current)
                } else {
                    ReleaseType::Patch
                }
            }
        };
        bump::increment(require_version(node)?, release, self.options.preid.as_deref())
    }

    fn make_bump(&self, node: &PackageGraphNode, next: Version, propagated: bool) -> Result<VersionBump> {
        let current = node.version().cloned();
        let bump_class = current
            .as_ref()
            .map(|c| ReleaseType::between(c, &next))
            .unwrap_or(ReleaseType::Major);
        let next = match &self.options.build_metadata {
            Some(metadata) => bump::apply_build_metadata(&next, metadata)?,
            None => next,
        };
        Ok(VersionBump {
            name: node.name().to_string(),
            current,
            next,
            bump_class,
            build_metadata: self.options.build_metadata.clone(),
            propagated,
        })
    }
}

fn require_version(node: &PackageGraphNode) -> Result<&Version> {
    node.version().ok_or_else(|| {
        Error::Validation(format!(
            "package {} has no valid version ({})",
            node.name(),
            node.package().version_or_missing()
        ))
    })
}

fn ensure_forward(node: &PackageGraphNode, literal: &Version) -> Result<()> {
    if let Some(current) = node.version() {
        if literal.cmp_precedence(current) != std::cmp::Ordering::Greater {
            return Err(Error::Validation(format!(
                "version {} for {} does not move past {}",
                literal,
                node.name(),
                current
            )));
        }
    }
    Ok(())
}
