//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl results,
//! including item statistics, failures and the license breakdown.

use crate::output::summary::{CrawlSummary, OutputResult};
use crate::state::ItemState;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Failures listed in full before the rest are only counted
const MAX_LISTED_FAILURES: usize = 50;

/// Generates a markdown summary from crawl statistics
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Escapes a value for use inside a markdown table cell
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

/// Formats a crawl summary as markdown
///
/// # Arguments
///
/// * `summary` - The crawl summary data
///
/// # Returns
///
/// A formatted markdown string
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sense Typing Font Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    if let Some(next_page) = summary.next_page {
        md.push_str(&format!("- **Next Listing Page**: {}\n", next_page));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Fonts Stored (all runs)**: {}\n", summary.total_fonts));
    md.push_str(&format!(
        "- **Items Finished This Run**: {}\n",
        summary.total_terminal_items()
    ));
    md.push_str(&format!("- **Total Errors**: {}\n", summary.total_errors()));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    // State breakdown
    md.push_str("## Item State Breakdown\n\n");
    md.push_str("| State | Count |\n");
    md.push_str("|-------|-------|\n");
    for state in ItemState::all_states() {
        let count = summary.items_in(state);
        if count > 0 || state == ItemState::Stored {
            md.push_str(&format!("| {} | {} |\n", state, count));
        }
    }
    md.push('\n');

    // Licenses
    if !summary.license_breakdown.is_empty() {
        md.push_str("## Licenses\n\n");
        md.push_str("| License | Fonts |\n");
        md.push_str("|---------|-------|\n");
        for (license, count) in &summary.license_breakdown {
            let license = license.as_deref().map(cell);
            md.push_str(&format!(
                "| {} | {} |\n",
                license.as_deref().unwrap_or("*(none)*"),
                count
            ));
        }
        md.push('\n');
    }

    // Failures
    if !summary.failures.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| URL | State | Status | Attempts | Message |\n");
        md.push_str("|-----|-------|--------|----------|---------|\n");

        for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                cell(&failure.url),
                failure.state,
                failure
                    .status_code
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                failure.attempts,
                cell(failure.message.as_deref().unwrap_or(""))
            ));
        }
        if summary.failures.len() > MAX_LISTED_FAILURES {
            md.push_str(&format!(
                "\n... and {} more\n",
                summary.failures.len() - MAX_LISTED_FAILURES
            ));
        }
        md.push('\n');
    }

    md
}
