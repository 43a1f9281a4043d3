//! Diagnostics for parse and compile errors
//!
//! All front-end errors flow through the `Diagnostic` type so the lexer,
//! parser, and compiler report in one format.

use serde::Serialize;
use std::fmt;

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Fatal error that prevents execution
    Error,
    /// Warning that doesn't prevent execution
    Warning,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message (error or warning) tied to a source line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity level
    pub level: DiagnosticLevel,
    /// Main diagnostic message
    pub message: String,
    /// Source line (1-based)
    pub line: u32,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(message: impl Into<String>, line: u32) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
            line,
        }
    }

    /// Create a new warning diagnostic
    pub fn warning(message: impl Into<String>, line: u32) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
            line,
        }
    }

    /// Format as compact JSON string
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] {}: {}", self.line, self.level, self.message)
    }
}
