//! Output formatter for human-readable and JSON output
//!
//! Ensures consistent output formatting across all commands. Results go to
//! stdout; errors, warnings and guidance go to stderr.

use awss_core::{AccessLevel, Bucket};
use comfy_table::presets::{NOTHING, UTF8_FULL_CONDENSED};
use comfy_table::{Cell, ContentArrangement, Table};
use console::style;
use serde::Serialize;

use super::OutputConfig;
use crate::exit_code::ExitCode;

/// Formatter for CLI output
///
/// Handles both human-readable and JSON output formats based on configuration.
/// When JSON mode is enabled, all output is strict JSON without colors or progress.
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    /// Create a new formatter with the given configuration
    pub fn new(config: OutputConfig) -> Self {
        if config.no_color || config.json {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Check if JSON output mode is enabled
    pub fn is_json(&self) -> bool {
        self.config.json
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.config.quiet
    }

    /// Check if colors are enabled
    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Output a success message
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        println!("{} {message}", style("✓").green());
    }

    /// Output an error message
    ///
    /// Errors are always printed, even in quiet mode.
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else {
            eprintln!("{} {message}", style("✗").red());
        }
    }

    /// Report an engine error with its guidance and return the matching exit code
    pub fn fail(&self, err: &awss_core::Error) -> ExitCode {
        let guidance = err.guidance();
        if self.config.json {
            let error = serde_json::json!({
                "error": err.to_string(),
                "hint": guidance,
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| err.to_string())
            );
        } else {
            eprintln!("{} {err}", style("✗").red());
            if let Some(hint) = guidance {
                eprintln!("  {}", style(hint).dim());
            }
        }
        ExitCode::from(err)
    }

    /// Output a warning message
    pub fn warning(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        eprintln!("{} {message}", style("⚠").yellow());
    }

    /// Output JSON directly
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Print a line of text (respects quiet mode)
    pub fn println(&self, message: &str) {
        if self.config.quiet {
            return;
        }
        println!("{message}");
    }

    /// A table with a header row, borders only when colors are on
    pub fn table<I, S>(&self, header: I) -> Table
    where
        I: IntoIterator<Item = S>,
        S: Into<Cell>,
    {
        let mut table = Table::new();
        table
            .load_preset(if self.colors_enabled() { UTF8_FULL_CONDENSED } else { NOTHING })
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(header);
        table
    }

    /// Print a table (respects quiet mode)
    pub fn print_table(&self, table: &Table) {
        self.println(&table.to_string());
    }

    /// Human label for a bucket's access level
    pub fn access_label(&self, bucket: &Bucket) -> String {
        let label = access_text(bucket);
        let styled = match bucket.access_level {
            AccessLevel::Good => style(label).green(),
            AccessLevel::NoDownload if bucket.is_empty == Some(true) => style(label).cyan(),
            AccessLevel::NoDownload => style(label).yellow(),
            AccessLevel::NoView => style(label).red(),
            AccessLevel::Unknown => style(label).dim(),
        };
        styled.to_string()
    }
}

/// Access text without styling; an empty bucket is not a permission problem
pub fn access_text(bucket: &Bucket) -> &'static str {
    match bucket.access_level {
        AccessLevel::NoDownload if bucket.is_empty == Some(true) => "empty",
        AccessLevel::Good => "ok",
        AccessLevel::NoDownload => "no download",
        AccessLevel::NoView => "no view",
        AccessLevel::Unknown => "unknown",
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}
