//! Rendering of search hits for the command line.
//!
//! - Markdown - a numbered list with a small field table per hit
//! - JSON - structured data for scripts
//! - Plain Text - copy-paste friendly

use crate::portal::SearchHit;
use chrono::Utc;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
    #[value(name = "plain")]
    PlainText,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Show the owner summary under each hit.
    pub include_summary: bool,
    /// Show whether the hit is publicly visible (privileged listings).
    pub include_visibility: bool,
    /// Maximum summary length in characters (0 = unlimited)
    pub max_summary_len: usize,
    pub query: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_summary: true,
            include_visibility: false,
            max_summary_len: 300,
            query: None,
        }
    }
}

pub fn export_results(hits: &[SearchHit], format: ExportFormat, options: &ExportOptions) -> String {
    match format {
        ExportFormat::Markdown => export_markdown(hits, options),
        ExportFormat::Json => export_json(hits, options),
        ExportFormat::PlainText => export_plain_text(hits, options),
    }
}

/// Escape special Markdown characters to prevent formatting issues or injection.
fn escape_markdown(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('*', "\\*")
        .replace('_', "\\_")
        .replace('[', "\\[")
        .replace(']', "\\]")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('`', "\\`")
}

fn visibility(public: bool) -> &'static str {
    if public { "public" } else { "hidden" }
}

fn export_markdown(hits: &[SearchHit], options: &ExportOptions) -> String {
    let mut output = String::new();

    output.push_str("# Search Results\n\n");

    if let Some(query) = &options.query {
        output.push_str(&format!("**Query:** `{}`\n\n", query.replace('`', "")));
    }

    output.push_str(&format!(
        "**Results:** {} | **Exported:** {}\n\n",
        hits.len(),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output.push_str("---\n\n");

    for (i, hit) in hits.iter().enumerate() {
        output.push_str(&format!("## {}. {}\n\n", i + 1, escape_markdown(&hit.title)));

        output.push_str("| Field | Value |\n");
        output.push_str("|-------|-------|\n");
        output.push_str(&format!("| Type | {} |\n", hit.owner.owner_type));
        output.push_str(&format!("| Id | {} |\n", hit.owner.id));
        if options.include_visibility {
            output.push_str(&format!("| Visibility | {} |\n", visibility(hit.public)));
        }
        output.push('\n');

        if options.include_summary
            && let Some(summary) = hit.summary.as_deref().filter(|s| !s.trim().is_empty())
        {
            let summary = truncate_text(summary, options.max_summary_len);
            for line in summary.lines() {
                output.push_str(&format!("> {}\n", escape_markdown(line)));
            }
            output.push('\n');
        }

        output.push_str("---\n\n");
    }

    output
}

fn export_json(hits: &[SearchHit], options: &ExportOptions) -> String {
    let export_data = serde_json::json!({
        "query": options.query,
        "count": hits.len(),
        "exported_at": Utc::now().to_rfc3339(),
        "hits": hits.iter().map(|hit| {
            let mut obj = serde_json::json!({
                "type": hit.owner.owner_type,
                "id": hit.owner.id,
                "title": hit.title,
            });

            if options.include_summary
                && let Some(summary) = &hit.summary
            {
                obj["summary"] = serde_json::json!(truncate_text(summary, options.max_summary_len));
            }

            if options.include_visibility {
                obj["public"] = serde_json::json!(hit.public);
            }

            obj
        }).collect::<Vec<_>>()
    });

    serde_json::to_string_pretty(&export_data).unwrap_or_else(|_| "{}".to_string())
}

fn export_plain_text(hits: &[SearchHit], options: &ExportOptions) -> String {
    let mut output = String::new();

    output.push_str("SEARCH RESULTS\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');

    if let Some(query) = &options.query {
        output.push_str(&format!("Query: {query}\n"));
    }

    output.push_str(&format!("Results: {}\n", hits.len()));
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    for (i, hit) in hits.iter().enumerate() {
        output.push_str(&format!("[{}] {} ({})\n", i + 1, hit.title, hit.owner));
        if options.include_visibility {
            output.push_str(&format!("Visibility: {}\n", visibility(hit.public)));
        }
        if options.include_summary
            && let Some(summary) = &hit.summary
        {
            for line in truncate_text(summary, options.max_summary_len).lines() {
                output.push_str(&format!("  {line}\n"));
            }
        }
        output.push('\n');
    }

    output
}

/// Truncate text to max length (in characters), adding ellipsis if needed
fn truncate_text(text: &str, max_len: usize) -> String {
    if max_len == 0 {
        return text.to_string();
    }

    let char_count = text.chars().count();
    if char_count <= max_len {
        return text.to_string();
    }

    let mut truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
