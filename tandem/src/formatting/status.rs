//! Status markers for messages and task results.

use owo_colors::OwoColorize;
use tandem_core::orchestrator::TaskRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failed,
    Skipped,
    Warning,
    Info,
}

impl Status {
    pub fn of_run(run: &TaskRun) -> Self {
        if run.is_success() {
            Status::Success
        } else {
            Status::Failed
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Success => "✓",
            Status::Failed => "✗",
            Status::Skipped => "-",
            Status::Warning => "⚠",
            Status::Info => "→",
        }
    }

    /// Symbol and message in the status color.
    pub fn format(&self, message: &str) -> String {
        let symbol = self.symbol();
        match self {
            Status::Success => format!("{} {}", symbol.green(), message.green().bold()),
            Status::Failed => format!("{} {}", symbol.red(), message.red().bold()),
            Status::Skipped => format!("{} {}", symbol.bright_black(), message.bright_black()),
            Status::Warning => format!("{} {}", symbol.yellow(), message.yellow().bold()),
            Status::Info => format!("{} {}", symbol.cyan(), message.cyan()),
        }
    }
}

pub fn print_success(message: &str) {
    println!("  {}", Status::Success.format(message));
}

/// Written to stderr.
pub fn print_error(message: &str) {
    eprintln!("  {}", Status::Failed.format(message));
}

pub fn print_warning(message: &str) {
    eprintln!("  {}", Status::Warning.format(message));
}

pub fn print_info(message: &str) {
    println!("  {}", Status::Info.format(message));
}
