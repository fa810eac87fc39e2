//! Terminal rendering for invocation outcomes and listings.
//!
//! Replies go to stdout untouched so they can be piped; everything else
//! goes to stderr.

use std::fmt::Write as _;
use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::gateway::InvocationOutcome;
use crate::session::SessionKey;

/// Print an error line in the `ERR <pid>: <message>` format.
pub fn print_error(message: &str) {
    eprintln!(
        "{} {}",
        format!("ERR {}:", std::process::id()).red().bold(),
        message
    );
}

/// Write the reply text followed by a newline.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn write_response(out: &mut impl Write, outcome: &InvocationOutcome) -> io::Result<()> {
    writeln!(out, "{}", outcome.response())
}

/// Write the outcome as a single JSON line.
///
/// # Errors
///
/// Returns an error if serialization fails or stdout is closed.
pub fn write_outcome_json(out: &mut impl Write, outcome: &InvocationOutcome) -> io::Result<()> {
    serde_json::to_writer(&mut *out, outcome)?;
    writeln!(out)
}

/// Render the configured models and the sessions on disk.
#[must_use]
pub fn format_catalog(models: &[String], sessions: &[SessionKey]) -> String {
    let mut out = String::new();

    out.push_str("Available models:\n");
    if models.is_empty() {
        out.push_str("  (none configured)\n");
    }
    for model in models {
        let _ = writeln!(out, "  {model}");
    }

    out.push_str("\nActive sessions:\n");
    if sessions.is_empty() {
        out.push_str("  (none)\n");
    }
    for key in sessions {
        let _ = writeln!(out, "  -s {} (model: {})", key.id, key.model);
    }

    out
}

/// Write the catalog with highlighted headings.
///
/// # Errors
///
/// Returns an error if the writer fails.
pub fn write_catalog(
    out: &mut impl Write,
    models: &[String],
    sessions: &[SessionKey],
) -> io::Result<()> {
    for line in format_catalog(models, sessions).lines() {
        if line.ends_with(':') && !line.starts_with(' ') {
            writeln!(out, "{}", line.blue().bold())?;
        } else {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()
}

/// Print the catalog to stdout.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn print_catalog(models: &[String], sessions: &[SessionKey]) -> io::Result<()> {
    write_catalog(&mut io::stdout().lock(), models, sessions)
}
