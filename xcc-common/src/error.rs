//! Error handling for the xcc compiler
//!
//! Defines the shared error type, the diagnostic record used for
//! recoverable static errors, and the reporter that collects them.

use crate::source_loc::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main compiler error type that encompasses all phases of compilation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerError {
    #[error("lexical error at {location}: {message}")]
    Lex {
        location: SourceLocation,
        message: String,
    },

    #[error("parse error at {location}: {message}")]
    Parse {
        location: SourceLocation,
        message: String,
    },

    /// Static errors were collected by the reporter; the driver prints
    /// them and stops before emitting any artifact.
    #[error("{0} error(s) reported")]
    Reported(usize),

    #[error("I/O error: {message}")]
    Io { message: String },

    /// An IR or pass invariant was broken. This is a bug in the
    /// compiler itself, never in the input program.
    #[error("internal compiler error: {message}")]
    Internal { message: String },
}

impl CompilerError {
    pub fn lex(message: impl Into<String>, location: SourceLocation) -> Self {
        CompilerError::Lex {
            location,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>, location: SourceLocation) -> Self {
        CompilerError::Parse {
            location,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompilerError::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::Io {
            message: err.to_string(),
        }
    }
}

/// The static error categories surfaced by the middle end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    LvalueRequired,
    OperatorMisuse,
    DuplicateCase,
    DuplicateLabel,
    UnresolvedLabel,
    ZeroDivide,
    TypeMismatch,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::LvalueRequired => write!(f, "lvalue required"),
            DiagnosticKind::OperatorMisuse => write!(f, "operator misuse"),
            DiagnosticKind::DuplicateCase => write!(f, "duplicate case"),
            DiagnosticKind::DuplicateLabel => write!(f, "duplicate label"),
            DiagnosticKind::UnresolvedLabel => write!(f, "unresolved label"),
            DiagnosticKind::ZeroDivide => write!(f, "zero divide in constant expression"),
            DiagnosticKind::TypeMismatch => write!(f, "type mismatch"),
        }
    }
}

/// A single diagnostic: kind, optional location, message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Option<SourceLocation>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "error at {}: {}: {}", loc, self.kind, self.message),
            None => write!(f, "error: {}: {}", self.kind, self.message),
        }
    }
}

/// Collects diagnostics across a compilation. First-error-wins
/// ordering falls out of the push order.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &mut self,
        kind: DiagnosticKind,
        location: Option<SourceLocation>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            kind,
            location,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Print all diagnostics to stderr
    pub fn print_diagnostics(&self) {
        for diagnostic in &self.diagnostics {
            eprintln!("{}", diagnostic);
        }
    }

    pub fn summary(&self) -> String {
        let e = self.error_count();
        format!("{} error{}", e, if e == 1 { "" } else { "s" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_collects_in_order() {
        let mut reporter = ErrorReporter::new();
        assert!(!reporter.has_errors());

        reporter.report(DiagnosticKind::DuplicateCase, None, "case 1");
        reporter.report(
            DiagnosticKind::UnresolvedLabel,
            Some(SourceLocation::new_simple(4, 1)),
            "label 'done'",
        );

        assert!(reporter.has_errors());
        assert_eq!(reporter.error_count(), 2);
        assert_eq!(reporter.diagnostics()[0].kind, DiagnosticKind::DuplicateCase);
        assert_eq!(reporter.summary(), "2 errors");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic {
            kind: DiagnosticKind::ZeroDivide,
            location: Some(SourceLocation::new("a.c", 2, 9)),
            message: "in initializer of 'g'".to_string(),
        };
        assert_eq!(
            diag.to_string(),
            "error at a.c:2:9: zero divide in constant expression: in initializer of 'g'"
        );
    }
}
