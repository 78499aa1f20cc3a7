use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tandem_core::bump::ReleaseType;
use tandem_core::change::{ChangeReason, ChangeRecord};
use tandem_core::config::VersionMode;
use tandem_core::graph::PackageGraph;
use tandem_core::package::{DependencyKind, Package};
use tandem_core::version::{BumpPolicy, ExplicitVersion, PlannerOptions, VersionPlanner};

fn generate_packages(count: usize, deps_per_package: usize) -> Vec<Package> {
    (0..count)
        .map(|i| {
            let mut package = Package::new(
                format!("package-{}", i),
                Some("1.0.0"),
                format!("packages/package-{}", i),
            )
            .with_script("build", "echo build");
            for j in 0..deps_per_package.min(i) {
                package = package.with_dependency(
                    DependencyKind::Dependencies,
                    format!("package-{}", i - 1 - j),
                    "^1.0.0",
                );
            }
            package
        })
        .collect()
}

fn benchmark_graph_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_construction");

    for count in [100, 500, 1000, 2000] {
        group.bench_function(format!("{}_packages", count), |b| {
            let packages = generate_packages(count, 3);
            b.iter(|| black_box(PackageGraph::new(packages.clone()).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_topological_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_order");

    for count in [100, 500, 1000, 2000] {
        let graph = PackageGraph::new(generate_packages(count, 3)).unwrap();

        group.bench_function(format!("{}_packages", count), |b| {
            b.iter(|| black_box(graph.topological_order(false).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_expand_dependents(c: &mut Criterion) {
    let mut group = c.benchmark_group("expand_dependents");

    for count in [100, 500, 1000, 2000] {
        let graph = PackageGraph::new(generate_packages(count, 3)).unwrap();
        let changed = vec!["package-0".to_string(), format!("package-{}", count / 10)];

        group.bench_function(format!("{}_packages", count), |b| {
            b.iter(|| black_box(graph.expand_dependents(&changed).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_version_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("version_propagation");

    for count in [100, 500, 1000] {
        let graph = PackageGraph::new(generate_packages(count, 3)).unwrap();
        let changes = vec![ChangeRecord {
            name: "package-0".to_string(),
            changed: true,
            reason: Some(ChangeReason::FileDiff),
        }];
        let policy = BumpPolicy::Explicit(ExplicitVersion::Keyword(ReleaseType::Major));

        group.bench_function(format!("{}_packages", count), |b| {
            b.iter(|| {
                let planner =
                    VersionPlanner::new(&graph, PlannerOptions::new(VersionMode::Independent));
                black_box(planner.plan(&changes, &policy).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_graph_construction,
    benchmark_topological_order,
    benchmark_expand_dependents,
    benchmark_version_propagation
);
criterion_main!(benches);
