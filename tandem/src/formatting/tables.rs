//! Table formatting utilities using comfy-table.

use std::path::Path;

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use indexmap::IndexMap;
use tandem_core::graph::PackageGraphNode;
use tandem_core::orchestrator::RunSummary;
use tandem_core::version::VersionPlan;

use super::output::format_duration;
use super::status::Status;

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Packages with version, location and visibility.
pub fn print_package_table(nodes: &[&PackageGraphNode], root: &Path) {
    let mut table = new_table(&["Package", "Version", "Location", "Private"]);
    for node in nodes {
        let package = node.package();
        table.add_row(vec![
            Cell::new(node.name()).fg(Color::White),
            Cell::new(package.version_or_missing()).fg(Color::Cyan),
            Cell::new(package.relative_location(root).display()).fg(Color::DarkGrey),
            Cell::new(if package.private { "yes" } else { "" }).fg(Color::Yellow),
        ]);
    }
    println!("{}", table);
}

pub fn print_plan_table(plan: &VersionPlan) {
    let mut table = new_table(&["Package", "Current", "Next", "Bump", "Reason"]);
    for bump in plan.bumps.values() {
        let reason = if bump.propagated {
            "dependency updated"
        } else {
            "changed"
        };
        table.add_row(vec![
            Cell::new(&bump.name).fg(Color::White),
            Cell::new(bump.current_display()).fg(Color::DarkGrey),
            Cell::new(bump.next.to_string()).fg(Color::Green),
            Cell::new(bump.bump_class.as_str()),
            Cell::new(reason).fg(Color::DarkGrey),
        ]);
    }
    println!("{}", table);

    if !plan.rewrites.is_empty() {
        let mut rewrites = new_table(&["Dependent", "Dependency", "From", "To"]);
        for rewrite in &plan.rewrites {
            rewrites.add_row(vec![
                Cell::new(&rewrite.dependent).fg(Color::White),
                Cell::new(&rewrite.dependency),
                Cell::new(&rewrite.from).fg(Color::DarkGrey),
                Cell::new(&rewrite.to).fg(Color::Green),
            ]);
        }
        println!("{}", rewrites);
    }
}

pub fn print_run_table(summary: &RunSummary) {
    let mut table = new_table(&["Status", "Package", "Exit", "Duration", "Details"]);
    for run in &summary.runs {
        let status = Status::of_run(run);
        let color = if status == Status::Success {
            Color::Green
        } else {
            Color::Red
        };
        table.add_row(vec![
            Cell::new(status.symbol()).fg(color),
            Cell::new(&run.package).fg(if run.is_success() { Color::White } else { Color::Red }),
            Cell::new(run.exit_code),
            Cell::new(format_duration(run.duration().as_secs_f64())).fg(Color::DarkGrey),
            Cell::new(run.error.as_deref().unwrap_or("")).fg(Color::Red),
        ]);
    }
    for skipped in &summary.skipped {
        table.add_row(vec![
            Cell::new(Status::Skipped.symbol()).fg(Color::DarkGrey),
            Cell::new(skipped).fg(Color::DarkGrey),
            Cell::new(""),
            Cell::new(""),
            Cell::new("skipped").fg(Color::DarkGrey),
        ]);
    }
    println!("{}", table);
}

/// Each package with the packages it depends on.
pub fn print_graph_table(adjacency: &IndexMap<String, Vec<String>>) {
    let mut table = new_table(&["Package", "Depends on"]);
    for (name, deps) in adjacency {
        let deps = if deps.is_empty() {
            "(none)".to_string()
        } else {
            deps.join(", ")
        };
        table.add_row(vec![Cell::new(name).fg(Color::White), Cell::new(deps)]);
    }
    println!("{}", table);
}
