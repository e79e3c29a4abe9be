//! CLI output formatting utilities.

use crate::chunking::truncate_at_word;
use crate::models::{Citation, SourceSummary};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// One line per source in a listing.
    pub fn source_line(summary: &SourceSummary) {
        let source = &summary.source;
        let mut details = vec![source.kind.label().to_string(), format!("{} chunks", summary.chunk_count)];
        if let Some(duration) = source.duration_seconds {
            details.push(format_duration(duration));
        }
        if let Some(author) = &source.author {
            details.push(author.clone());
        }
        println!(
            "  {} {} ({})\n    {}",
            style("*").cyan(),
            style(&source.title).bold(),
            details.join(", "),
            style(source.id).dim()
        );
    }

    /// Print a citation under an answer.
    pub fn citation(index: usize, citation: &Citation) {
        let position = citation
            .timestamp
            .as_deref()
            .map(|t| format!(" @ {}", style(t).cyan()))
            .unwrap_or_default();
        println!(
            "\n{} [{}] {}{} (score: {:.2})",
            style(">>").green(),
            index,
            style(&citation.title).bold(),
            position,
            citation.score
        );
        println!("   {}", truncate_at_word(&citation.snippet.replace('\n', " "), 200));
        if let Some(url) = &citation.url {
            println!("   {}", style(url).dim());
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format duration in seconds to a human-readable string.
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
