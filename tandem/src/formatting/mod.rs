//! CLI output: headers and status lines, tables, and the task reporter.

mod output;
mod reporter;
mod status;
mod tables;

pub use output::{
    format_duration, print_key_value, print_section_header, print_separator_with_spacing,
    print_summary_box,
};
pub use reporter::ConsoleReporter;
pub use status::{print_error, print_info, print_success, print_warning};
pub use tables::{print_graph_table, print_package_table, print_plan_table, print_run_table};
