//! Output of last resort for failures that must not go back through the
//! logging pipeline.

use chrono::{SecondsFormat, Utc};
use std::fmt::Display;
use std::io::Write;

/// Build the single JSON line written for a failure.
pub(crate) fn render(message: &str, error: &dyn Display) -> String {
    serde_json::json!({
        "error": error.to_string(),
        "message": message,
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
    .to_string()
}

/// Write one JSON line to stderr. Write errors are ignored.
pub fn report(message: &str, error: &dyn Display) {
    let line = render(message, error);
    let _ = writeln!(std::io::stderr().lock(), "{}", line);
}
