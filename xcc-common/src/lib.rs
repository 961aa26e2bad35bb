//! xcc - Common Types and Utilities
//!
//! This crate contains shared types, error definitions, and utilities
//! used across all components of the xcc compiler.

pub mod error;
pub mod source_loc;

pub use error::{CompilerError, Diagnostic, DiagnosticKind, ErrorReporter};
pub use source_loc::SourceLocation;
