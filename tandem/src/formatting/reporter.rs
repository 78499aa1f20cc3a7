//! Console implementation of the orchestrator's reporter.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tandem_core::orchestrator::{OutputLine, OutputStream, TaskReporter, TaskRun};

use super::status::Status;

/// Prints task output with optional package prefixes. In buffered mode a
/// progress bar tracks finished packages.
pub struct ConsoleReporter {
    progress: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub fn new(total: usize, streaming: bool, quiet: bool) -> Self {
        let progress = (!streaming && !quiet).then(|| progress_bar(total as u64));
        Self { progress }
    }

    fn print(&self, text: String, stderr: bool) {
        match &self.progress {
            Some(pb) => pb.suspend(|| emit(&text, stderr)),
            None => emit(&text, stderr),
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {pos}/{len} packages [{wide_bar:.cyan/.blue}] {elapsed} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    pb.set_message("starting");
    pb
}

fn emit(text: &str, stderr: bool) {
    if stderr {
        eprintln!("{}", text);
    } else {
        println!("{}", text);
    }
}

impl TaskReporter for ConsoleReporter {
    fn task_started(&mut self, package: &str) {
        if let Some(pb) = &self.progress {
            pb.set_message(package.to_string());
        }
    }

    fn output(&mut self, prefix: Option<&str>, line: &OutputLine) {
        let stderr = line.stream == OutputStream::Stderr;
        let text = match prefix {
            Some(prefix) => format!("{} {}", format!("{}:", prefix).bright_black().bold(), line.line),
            None => line.line.clone(),
        };
        self.print(text, stderr);
    }

    fn task_finished(&mut self, run: &TaskRun) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        if !run.is_success() {
            let message = format!("{} exited with code {}", run.package, run.exit_code);
            self.print(format!("  {}", Status::Failed.format(&message)), true);
        }
    }
}
