//! Terminal output formatting.
//!
//! Human-facing messages are colored when stdout is a terminal; JSON
//! documents are printed verbatim so they can be piped.

pub mod colors;
pub mod errors;

use husk_core::error::HuskResult;
use serde_json::Value;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colors: colors::ColorSupport::detect(),
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        println!("{}", self.colors.dim(message));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("+"), message);
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        println!("{} {}", self.colors.yellow("!"), message);
    }

    /// Print a line without decoration
    pub fn plain(&self, message: &str) {
        println!("{}", message);
    }

    /// Pretty-print a JSON value
    pub fn json(&self, value: &Value) -> HuskResult<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
