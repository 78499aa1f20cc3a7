//! Dependency graph management using petgraph.
//!
//! Nodes are addressed by package name. Edges point from a dependent to the
//! dependency it declares, so `Outgoing` neighbours are dependencies and
//! `Incoming` neighbours are dependents. The graph is never mutated after
//! [`PackageGraph::new`] returns.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::package::{DependencyKind, Package};
use crate::specifier::DependencySpecifier;

/// Which manifest maps produce graph edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GraphType {
    /// Every dependency map, including `devDependencies`.
    #[default]
    AllDependencies,
    /// Everything except `devDependencies`.
    Dependencies,
}

impl GraphType {
    fn includes(&self, kind: DependencyKind) -> bool {
        match self {
            GraphType::AllDependencies => true,
            GraphType::Dependencies => kind != DependencyKind::DevDependencies,
        }
    }
}

/// A package plus the edges derived from its manifest.
#[derive(Debug, Clone)]
pub struct PackageGraphNode {
    package: Package,
    version: Option<Version>,
    local_dependencies: IndexMap<String, String>,
    external_dependencies: IndexMap<String, String>,
    dependents: BTreeSet<String>,
}

impl PackageGraphNode {
    #[inline]
    pub fn name(&self) -> &str {
        &self.package.name
    }

    #[inline]
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Parsed version; `None` when the manifest version is missing or invalid.
    #[inline]
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    #[inline]
    pub fn location(&self) -> &Path {
        &self.package.location
    }

    /// Dependencies resolved to another node of this graph.
    #[inline]
    pub fn local_dependencies(&self) -> &IndexMap<String, String> {
        &self.local_dependencies
    }

    #[inline]
    pub fn external_dependencies(&self) -> &IndexMap<String, String> {
        &self.external_dependencies
    }

    /// Names of packages in the graph that depend on this one.
    #[inline]
    pub fn dependents(&self) -> &BTreeSet<String> {
        &self.dependents
    }

    pub fn local_specifier(&self, dependency: &str) -> Option<DependencySpecifier> {
        self.local_dependencies
            .get(dependency)
            .map(|raw| DependencySpecifier::parse(raw))
    }
}

/// Result of a topological sort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopoOrder {
    /// Package names, dependencies before dependents.
    pub order: Vec<String>,
    /// Every cycle broken while sorting, in traversal order with the first
    /// node repeated at the end.
    pub cycles: Vec<Vec<String>>,
}

/// Formats a cycle as `a -> b -> a`.
pub fn format_cycle(cycle: &[String]) -> String {
    cycle.join(" -> ")
}

/// Directed graph of workspace packages.
#[derive(Debug, Clone)]
pub struct PackageGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
    nodes: IndexMap<String, PackageGraphNode>,
}

impl PackageGraph {
    /// Builds the graph over all dependency maps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePackage`] if two packages share a name.
    pub fn new(packages: Vec<Package>) -> Result<Self> {
        Self::with_graph_type(packages, GraphType::AllDependencies)
    }

    /// Builds the graph, creating edges only from the maps selected by
    /// `graph_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePackage`] if two packages share a name.
    pub fn with_graph_type(packages: Vec<Package>, graph_type: GraphType) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();
        let mut nodes: IndexMap<String, PackageGraphNode> = IndexMap::new();

        for package in packages {
            if let Some(existing) = nodes.get(&package.name) {
                return Err(Error::DuplicatePackage {
                    name: package.name.clone(),
                    first: existing.package.location.clone(),
                    second: package.location.clone(),
                });
            }
            let index = graph.add_node(package.name.clone());
            node_map.insert(package.name.clone(), index);
            nodes.insert(
                package.name.clone(),
                PackageGraphNode {
                    version: package.semver(),
                    package,
                    local_dependencies: IndexMap::new(),
                    external_dependencies: IndexMap::new(),
                    dependents: BTreeSet::new(),
                },
            );
        }

        let versions: HashMap<String, Option<Version>> = nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.version.clone()))
            .collect();

        for node in nodes.values_mut() {
            let mut declared: IndexMap<String, String> = IndexMap::new();
            for kind in DependencyKind::ALL {
                if !graph_type.includes(kind) {
                    continue;
                }
                for (name, spec) in node.package.dependency_map(kind) {
                    declared.insert(name.clone(), spec.clone());
                }
            }

            for (dep_name, raw_spec) in declared {
                let resolved = match versions.get(&dep_name) {
                    Some(version) if dep_name != node.package.name => {
                        let specifier = DependencySpecifier::parse(&raw_spec);
                        if specifier.is_satisfied_by(version.as_ref()) {
                            true
                        } else {
                            if specifier.is_range() {
                                warn!(
                                    package = %node.package.name,
                                    dependency = %dep_name,
                                    specifier = %raw_spec,
                                    "local version does not satisfy range, treating as external"
                                );
                            }
                            false
                        }
                    }
                    _ => false,
                };

                if resolved {
                    node.local_dependencies.insert(dep_name, raw_spec);
                } else {
                    node.external_dependencies.insert(dep_name, raw_spec);
                }
            }
        }

        for node in nodes.values() {
            let from = node_map[node.name()];
            for dep_name in node.local_dependencies.keys() {
                graph.add_edge(from, node_map[dep_name.as_str()], ());
            }
        }

        let reverse: Vec<(String, String)> = nodes
            .values()
            .flat_map(|node| {
                node.local_dependencies
                    .keys()
                    .map(|dep| (dep.clone(), node.name().to_string()))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (dependency, dependent) in reverse {
            if let Some(node) = nodes.get_mut(&dependency) {
                node.dependents.insert(dependent);
            }
        }

        debug!(
            packages = nodes.len(),
            edges = graph.edge_count(),
            "built package graph"
        );

        Ok(Self {
            graph,
            node_map,
            nodes,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&PackageGraphNode> {
        self.nodes.get(name)
    }

    /// Looks a node up, failing with the list of known names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PackageNotFound`] for unknown names.
    pub fn node(&self, name: &str) -> Result<&PackageGraphNode> {
        self.nodes.get(name).ok_or_else(|| Error::PackageNotFound {
            name: name.to_string(),
            available: self.names().collect::<Vec<_>>().join(", "),
        })
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &PackageGraphNode> {
        self.nodes.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Direct local dependencies of a package.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is not in the graph.
    pub fn dependency_names(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.node(name)?.local_dependencies.keys().cloned().collect())
    }

    /// Direct dependents of a package.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is not in the graph.
    pub fn dependent_names(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.node(name)?.dependents.iter().cloned().collect())
    }

    /// Local dependencies of `name` that are also in `within`, excluding
    /// self-references.
    pub(crate) fn dependencies_within<'g>(
        &'g self,
        name: &str,
        within: &IndexSet<String>,
    ) -> BTreeSet<&'g str> {
        self.nodes
            .get(name)
            .map(|node| {
                node.local_dependencies
                    .keys()
                    .map(String::as_str)
                    .filter(|dep| *dep != name && within.contains(*dep))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn dependents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|node| node.dependents.iter().map(String::as_str))
    }

    /// The selected packages plus everything they transitively depend on.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected name is not in the graph.
    pub fn expand_dependencies<I, S>(&self, selected: I) -> Result<IndexSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.expand(selected, Direction::Outgoing)
    }

    /// The selected packages plus everything that transitively depends on
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected name is not in the graph.
    pub fn expand_dependents<I, S>(&self, selected: I) -> Result<IndexSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.expand(selected, Direction::Incoming)
    }

    fn expand<I, S>(&self, selected: I, direction: Direction) -> Result<IndexSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut visited: IndexSet<String> = IndexSet::new();
        let mut queue = VecDeque::new();

        for name in selected {
            let node = self.node(name.as_ref())?;
            if visited.insert(node.name().to_string()) {
                queue.push_back(node.name().to_string());
            }
        }

        while let Some(current) = queue.pop_front() {
            for next in self.neighbours(&current, direction) {
                if visited.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }

        Ok(visited)
    }

    fn neighbours(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(node) = self.nodes.get(name) else {
            return Vec::new();
        };
        match direction {
            Direction::Outgoing => node.local_dependencies.keys().cloned().collect(),
            Direction::Incoming => node.dependents.iter().cloned().collect(),
        }
    }

    /// Topologically sorts every package in the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cycle`] if `reject_cycles` is set and a cycle exists.
    pub fn topological_order(&self, reject_cycles: bool) -> Result<TopoOrder> {
        let names: Vec<&str> = self.names().collect();
        self.toposort(&names, reject_cycles)
    }

    /// Kahn's algorithm restricted to `names`.
    ///
    /// Only edges between members of `names` count. When every remaining node
    /// still waits on a dependency, the cycle blocking the smallest remaining
    /// name is recorded and the lexically smallest node on that cycle is
    /// released, unless `reject_cycles` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cycle`] when a cycle is found and `reject_cycles` is
    /// set, or [`Error::PackageNotFound`] for unknown names.
    pub fn toposort<S: AsRef<str>>(&self, names: &[S], reject_cycles: bool) -> Result<TopoOrder> {
        let mut members: IndexSet<&str> = IndexSet::new();
        for name in names {
            members.insert(self.node(name.as_ref())?.name());
        }

        let mut pending: HashMap<&str, BTreeSet<&str>> = members
            .iter()
            .map(|name| {
                let deps = self.nodes[*name]
                    .local_dependencies
                    .keys()
                    .map(String::as_str)
                    .filter(|dep| *dep != *name && members.contains(dep))
                    .collect();
                (*name, deps)
            })
            .collect();

        let mut queue: VecDeque<&str> = members
            .iter()
            .copied()
            .filter(|name| pending[name].is_empty())
            .collect();
        let mut done: HashSet<&str> = HashSet::new();
        let mut result = TopoOrder::default();

        while done.len() < members.len() {
            let Some(current) = queue.pop_front() else {
                let stuck = members
                    .iter()
                    .copied()
                    .filter(|name| !done.contains(name))
                    .min()
                    .ok_or_else(|| Error::Graph("toposort stalled without pending nodes".into()))?;
                let cycle = walk_cycle(stuck, &pending, &done);
                if reject_cycles {
                    return Err(Error::Cycle {
                        path: format_cycle(&cycle),
                    });
                }
                let release = cycle
                    .iter()
                    .filter_map(|name| members.get(name.as_str()).copied())
                    .min()
                    .unwrap_or(stuck);
                warn!(cycle = %format_cycle(&cycle), "dependency cycle detected, releasing {}", release);
                result.cycles.push(cycle);
                queue.push_back(release);
                pending.insert(release, BTreeSet::new());
                continue;
            };

            if !done.insert(current) {
                continue;
            }
            result.order.push(current.to_string());

            for dependent in &self.nodes[current].dependents {
                let dependent = dependent.as_str();
                if done.contains(dependent) {
                    continue;
                }
                if let Some(waiting) = pending.get_mut(dependent) {
                    if waiting.remove(current) && waiting.is_empty() {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        Ok(result)
    }

    /// Every strongly connected component that forms a cycle.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self
                        .graph
                        .find_edge(component[0], component[0])
                        .is_some()
            })
            .map(|component| {
                let mut names: Vec<String> =
                    component.iter().map(|idx| self.graph[*idx].clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Local adjacency keyed by package name, optionally with external
    /// dependency names appended.
    pub fn adjacency(&self, include_external: bool) -> IndexMap<String, Vec<String>> {
        self.nodes
            .values()
            .map(|node| {
                let idx = self.node_map[node.name()];
                let mut deps: Vec<String> = self
                    .graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .map(|dep| self.graph[dep].clone())
                    .collect();
                deps.sort();
                if include_external {
                    deps.extend(node.external_dependencies.keys().cloned());
                }
                (node.name().to_string(), deps)
            })
            .collect()
    }
}

/// Follows unfinished dependencies from `start` until a node repeats and
/// returns the loop, first node repeated at the end.
pub(crate) fn walk_cycle(
    start: &str,
    pending: &HashMap<&str, BTreeSet<&str>>,
    done: &HashSet<&str>,
) -> Vec<String> {
    let mut path: Vec<&str> = vec![start];
    let mut current = start;

    loop {
        let next = pending
            .get(current)
            .and_then(|deps| deps.iter().copied().find(|dep| !done.contains(dep)));
        let Some(next) = next else {
            return vec![start.to_string()];
        };
        if let Some(pos) = path.iter().position(|seen| *seen == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(next.to_string());
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
