//! Error message formatting with actionable suggestions.

use std::error::Error;

use husk_core::error::HuskError;

use super::colors::ColorSupport;

/// Renders a [`HuskError`] with its suggestion and cause chain
pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    /// Format an error with context and suggestions
    pub fn format_error(&self, error: &HuskError) -> String {
        let mut output = String::new();

        output.push_str(&self.colors.red("error"));
        output.push_str(&format!("[{}]: ", error.status_code()));
        output.push_str(&error.to_string());
        output.push('\n');

        if let Some(suggestion) = error.suggestion() {
            output.push('\n');
            output.push_str(&self.colors.dim("help"));
            output.push_str(": ");
            output.push_str(suggestion);
            output.push('\n');
        }

        let mut source = error.source();
        while let Some(err) = source {
            output.push('\n');
            output.push_str(&self.colors.dim("caused by"));
            output.push_str(": ");
            output.push_str(&err.to_string());
            source = err.source();
        }

        output
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> ErrorFormatter {
        ErrorFormatter {
            colors: ColorSupport::disabled(),
        }
    }

    #[test]
    fn test_format_with_suggestion() {
        let text = formatter().format_error(&HuskError::not_found("package 'left-pad'"));
        assert!(text.starts_with("error[404]: package 'left-pad' not found\n"));
        assert!(text.contains("help: Check the package name spelling"));
    }

    #[test]
    fn test_format_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only file system");
        let text = formatter().format_error(&HuskError::io("Failed to write meta.json".to_string(), io));
        assert!(text.contains("caused by: read-only file system"));
    }
}
