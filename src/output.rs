//! User-facing output utilities for clean, colored terminal messages
//!
//! Warnings and errors for people at a terminal, without the timestamps
//! and module paths of the `log` output. Search results themselves go to
//! stdout from the CLI handlers.

use owo_colors::OwoColorize;

use crate::config::ClientConfig;
use crate::models::SearchResult;

/// Display a warning message to the user in yellow with padding
///
/// # Example
/// ```ignore
/// output::warn("The server reported errors; results may be incomplete.");
/// ```
pub fn warn(message: &str) {
    eprintln!("\n{}\n", message.yellow());
}

/// Display an error message to the user in red with padding
pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

/// Display an informational message to the user in default color with padding
pub fn info(message: &str) {
    eprintln!("\n{}\n", message);
}

/// Format a result grep-style: `path:line:col: text` for matches,
/// `path-line- text` for context (1-indexed, as people read them)
pub fn format_result(result: &SearchResult, config: &ClientConfig, plain: bool) -> String {
    match result {
        SearchResult::Match(m) => {
            let location = format!(
                "{}:{}:{}",
                config.file_uri(&m.path),
                m.range.start.line + 1,
                m.range.start.col + 1
            );
            let preview = m
                .preview_text
                .lines()
                .skip(m.preview_matches.first().map_or(0, |r| r.start.line))
                .take(m.range.end.line - m.range.start.line + 1)
                .collect::<Vec<_>>()
                .join("\n    ");
            if plain {
                format!("{}: {}", location, preview)
            } else {
                format!("{}: {}", location.green(), preview)
            }
        }
        SearchResult::Context(c) => {
            let location = format!("{}-{}", config.file_uri(&c.path), c.line_number + 1);
            if plain {
                format!("{}- {}", location, c.text)
            } else {
                format!("{}- {}", location.dimmed(), c.text.dimmed())
            }
        }
    }
}
