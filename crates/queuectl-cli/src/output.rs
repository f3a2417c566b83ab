//! Console rendering for queue output: headings, aligned detail fields,
//! JSON emission, and cell truncation for the job tables.

use serde::Serialize;

use queuectl_core::result::AppResult;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

impl OutputFormat {
    /// Whether machine-readable JSON was requested.
    pub fn is_json(self) -> bool {
        self == Self::Json
    }
}

/// Pretty-print a value as JSON to stdout.
pub fn json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a section heading with an underline, e.g. for status reports.
pub fn heading(title: &str) {
    println!("{title}");
    println!("{}", "=".repeat(title.chars().count()));
}

/// Print one aligned detail line of a report, `  Label:    value`.
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<26}{}", format!("{label}:"), value);
}

/// Truncate a command or error message for table display, appending `...`
/// when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
