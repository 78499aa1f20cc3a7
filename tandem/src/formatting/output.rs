//! Headers, separators and summary boxes.

use owo_colors::OwoColorize;

pub fn print_section_header(title: &str) {
    println!("{}", title.cyan().bold());
    println!();
}

pub fn print_separator_with_spacing() {
    println!();
    println!("{}", "─".repeat(60).bright_black());
    println!();
}

/// Prints `items` as aligned key/value rows inside a titled box.
pub fn print_summary_box(title: &str, items: &[(&str, &str)]) {
    let width = items.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    println!("┌─ {} {}", title.cyan().bold(), "─".repeat(50).bright_black());
    for (key, value) in items {
        println!(
            "│ {} {}",
            format!("{:<width$}", key, width = width).bright_black().bold(),
            value.bold()
        );
    }
    println!("└{}", "─".repeat(60).bright_black());
}

pub fn print_key_value(key: &str, value: &str) {
    println!("  {} {}", key.bright_black().bold(), value.bold());
}

/// Human-readable duration: milliseconds, seconds, or minutes and seconds.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.2}s", seconds)
    } else {
        let mins = (seconds / 60.0) as u64;
        format!("{}m {:.1}s", mins, seconds % 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.25), "250ms");
        assert_eq!(format_duration(1.5), "1.50s");
        assert_eq!(format_duration(90.0), "1m 30.0s");
    }
}
