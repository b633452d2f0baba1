//! Terminal output formatting.
//!
//! Consistent message styling across commands, with colors only when
//! stdout is a terminal and the user has not opted out.

use std::io::IsTerminal;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colored: bool,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colored: std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.colored {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        println!("{}", self.paint("2", message));
    }

    /// Print a plain line
    pub fn line(&self, message: &str) {
        println!("{message}");
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        println!("{} {}", self.paint("32", "✓"), message);
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        println!("{} {}", self.paint("33", "⚠"), message);
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.paint("31", "✗"), message);
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
