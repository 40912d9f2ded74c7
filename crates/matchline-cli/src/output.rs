//! Output formatting for CLI commands
//!
//! Every command honors the global `--json` flag: human-readable text by
//! default, one JSON document on stdout for scripting.

use serde_json::Value;

/// How command output should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// Maps the global `--json` flag to a format
    #[must_use]
    pub fn from_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }

    /// Returns true when JSON output was requested
    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Prints a JSON document, pretty-printed
pub fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Formats an optional millisecond timestamp for text output
#[must_use]
pub fn format_time(ms: Option<i64>) -> String {
    ms.and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flag() {
        assert_eq!(OutputFormat::from_flag(true), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flag(false), OutputFormat::Text);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(None), "never");
        assert!(format_time(Some(0)).starts_with("1970-01-01"));
    }
}
