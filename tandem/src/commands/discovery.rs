//! Read-only commands: `changed`, `list` and `graph`.

use anyhow::Result;
use clap::Args;
use indexmap::IndexMap;
use owo_colors::OwoColorize;
use serde::Serialize;
use tandem_core::graph::format_cycle;
use tandem_core::PackageGraphNode;

use crate::formatting::{
    print_graph_table, print_key_value, print_package_table, print_section_header, print_success,
    print_warning,
};

use super::{ChangeArgs, FilterArgs, Workspace};

#[derive(Args, Debug, Clone)]
pub struct ChangedArgs {
    #[command(flatten)]
    pub change: ChangeArgs,

    /// Print JSON
    #[arg(long, action)]
    pub json: bool,

    /// Show version and location
    #[arg(short, long, action)]
    pub long: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Print JSON
    #[arg(long, action)]
    pub json: bool,

    /// Include private packages
    #[arg(short, long, action)]
    pub all: bool,

    /// Show version and location
    #[arg(short, long, action)]
    pub long: bool,

    /// Sort dependencies before dependents
    #[arg(long, action)]
    pub toposort: bool,

    /// Print the dependency graph as JSON
    #[arg(long, action)]
    pub graph: bool,
}

#[derive(Serialize)]
struct PackageJson<'a> {
    name: &'a str,
    version: &'a str,
    private: bool,
    location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl<'a> PackageJson<'a> {
    fn new(node: &'a PackageGraphNode) -> Self {
        let package = node.package();
        Self {
            name: node.name(),
            version: package.version_or_missing(),
            private: package.private,
            location: package.location.display().to_string(),
            reason: None,
        }
    }
}

pub fn cmd_changed(args: ChangedArgs) -> Result<i32> {
    let mut ws = Workspace::load("changed")?;
    ws.apply_change_args(&args.change);
    let repo = ws.ctx.repository()?;
    let changes = ws.detect_changes(&repo, args.change.conventional_graduate.as_deref())?;

    if changes.is_empty() {
        print_warning("No changed packages found");
        return Ok(1);
    }

    if args.json {
        let mut rows = Vec::new();
        for record in changes.changed() {
            let mut row = PackageJson::new(ws.graph.node(&record.name)?);
            row.reason = record.reason.map(|r| r.as_str());
            rows.push(row);
        }
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(0);
    }

    if args.long {
        let nodes = changes
            .changed()
            .map(|r| ws.graph.node(&r.name))
            .collect::<tandem_core::Result<Vec<_>>>()?;
        print_package_table(&nodes, ws.ctx.root());
    } else {
        for record in changes.changed() {
            let reason = record.reason.map(|r| r.as_str()).unwrap_or_default();
            println!("{} {}", record.name, format!("({})", reason).bright_black());
        }
    }

    let count = changes.changed().count();
    let since = changes
        .reference
        .as_deref()
        .unwrap_or("the initial commit");
    eprintln!();
    print_success(&format!("found {} changed packages since {}", count, since));
    Ok(0)
}

pub fn cmd_list(args: ListArgs) -> Result<i32> {
    let ws = Workspace::load("list")?;
    let mut filters = args.filters.clone();
    filters.no_private = filters.no_private || !args.all;
    let mut selected = ws.select(&filters, "list")?;

    if args.toposort {
        let sorted = ws.graph.toposort(&selected, false)?;
        for cycle in &sorted.cycles {
            print_warning(&format!("dependency cycle: {}", format_cycle(cycle)));
        }
        selected = sorted.order;
    }

    if args.graph {
        let adjacency: IndexMap<String, Vec<String>> = ws
            .graph
            .adjacency(args.all)
            .into_iter()
            .filter(|(name, _)| selected.contains(name))
            .collect();
        println!("{}", serde_json::to_string_pretty(&adjacency)?);
        return Ok(0);
    }

    let nodes = selected
        .iter()
        .map(|name| ws.graph.node(name))
        .collect::<tandem_core::Result<Vec<_>>>()?;

    if args.json {
        let rows: Vec<PackageJson<'_>> = nodes.iter().map(|n| PackageJson::new(n)).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if args.long {
        print_package_table(&nodes, ws.ctx.root());
    } else {
        for node in &nodes {
            println!("{}", node.name());
        }
    }

    if nodes.is_empty() {
        print_warning("No packages matched");
    }
    Ok(0)
}

pub fn cmd_graph(json: bool) -> Result<i32> {
    let ws = Workspace::load("graph")?;
    let adjacency = ws.graph.adjacency(false);
    let cycles = ws.graph.cycles();

    if json {
        let value = serde_json::json!({
            "packages": adjacency,
            "cycles": cycles,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(0);
    }

    print_section_header("Dependency graph");
    print_graph_table(&adjacency);
    println!();
    print_key_value("Packages:", &ws.graph.len().to_string());

    if cycles.is_empty() {
        print_success("no dependency cycles");
    } else {
        for cycle in &cycles {
            let mut closed = cycle.clone();
            if let Some(first) = cycle.first() {
                closed.push(first.clone());
            }
            print_warning(&format!("dependency cycle: {}", format_cycle(&closed)));
        }
    }
    Ok(0)
}
