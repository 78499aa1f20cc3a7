use std::collections::HashSet;

use proptest::prelude::*;
use tandem_core::graph::PackageGraph;
use tandem_core::package::{DependencyKind, Package};

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

/// Packages whose dependencies only point at earlier names, so the graph is
/// acyclic.
fn gen_acyclic_packages() -> impl Strategy<Value = Vec<Package>> {
    prop::collection::vec(prop::collection::vec(any::<bool>(), NAMES.len()), NAMES.len()).prop_map(
        |matrix| {
            NAMES
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let mut package = Package::new(*name, Some("1.0.0"), format!("pkg-{}", name));
                    for (j, dep) in NAMES.iter().enumerate().take(i) {
                        if matrix[i][j] {
                            package = package.with_dependency(
                                DependencyKind::Dependencies,
                                *dep,
                                "^1.0.0",
                            );
                        }
                    }
                    package
                })
                .collect()
        },
    )
}

/// Arbitrary edges, cycles included.
fn gen_any_packages() -> impl Strategy<Value = Vec<Package>> {
    prop::collection::vec(prop::collection::vec(any::<bool>(), NAMES.len()), NAMES.len()).prop_map(
        |matrix| {
            NAMES
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let mut package = Package::new(*name, Some("1.0.0"), format!("pkg-{}", name));
                    for (j, dep) in NAMES.iter().enumerate() {
                        if matrix[i][j] && i != j {
                            package = package.with_dependency(
                                DependencyKind::Dependencies,
                                *dep,
                                "^1.0.0",
                            );
                        }
                    }
                    package
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn test_dependencies_precede_dependents(packages in gen_acyclic_packages()) {
        let graph = PackageGraph::new(packages).unwrap();
        let order = graph.topological_order(true).unwrap();
        prop_assert!(order.cycles.is_empty());

        let position = |name: &str| order.order.iter().position(|n| n == name).unwrap();
        for node in graph.nodes() {
            for dep in node.local_dependencies().keys() {
                prop_assert!(position(dep) < position(node.name()));
            }
        }
    }

    #[test]
    fn test_order_is_a_permutation(packages in gen_any_packages()) {
        let graph = PackageGraph::new(packages).unwrap();
        let order = graph.topological_order(false).unwrap();

        prop_assert_eq!(order.order.len(), NAMES.len());
        let mut seen = HashSet::new();
        for name in &order.order {
            prop_assert!(seen.insert(name.clone()), "Duplicate package in order: {}", name);
        }
    }

    #[test]
    fn test_sort_is_deterministic(packages in gen_any_packages()) {
        let graph = PackageGraph::new(packages).unwrap();
        let first = graph.topological_order(false).unwrap();
        let second = graph.topological_order(false).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_reported_cycles_are_closed_loops(packages in gen_any_packages()) {
        let graph = PackageGraph::new(packages).unwrap();
        let order = graph.topological_order(false).unwrap();
        for cycle in &order.cycles {
            prop_assert!(cycle.len() >= 2);
            prop_assert_eq!(cycle.first(), cycle.last());
        }
        prop_assert_eq!(order.cycles.is_empty(), graph.cycles().is_empty());
    }

    #[test]
    fn test_expansion_contains_selection(packages in gen_any_packages(), pick in 0usize..NAMES.len()) {
        let graph = PackageGraph::new(packages).unwrap();
        let name = NAMES[pick];
        let deps = graph.expand_dependencies([name]).unwrap();
        let dependents = graph.expand_dependents([name]).unwrap();
        prop_assert!(deps.contains(name));
        prop_assert!(dependents.contains(name));
        for dep in graph.dependency_names(name).unwrap() {
            prop_assert!(deps.contains(&dep));
        }
    }
}
