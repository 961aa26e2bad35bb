//! Abstract syntax tree
//!
//! The AST is the transport between the parser and the IR builder.
//! Expression types are computed during IR generation, not stored
//! here.

pub mod expressions;
pub mod ops;
pub mod statements;

pub use expressions::{Expression, ExpressionKind};
pub use ops::{BinaryOp, UnaryOp};
pub use statements::{ForInit, Statement, StatementKind};

use crate::types::Type;
use serde::{Deserialize, Serialize};
use xcc_common::SourceLocation;

/// Storage class of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    None,
    Static,
    Extern,
}

/// A single declarator with its resolved type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub ty: Type,
    pub storage: StorageClass,
    pub init: Option<Expression>,
    pub loc: SourceLocation,
}

/// A function definition with a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    /// Always a `Type::Function`
    pub ty: Type,
    pub body: Statement,
    pub is_inline: bool,
    pub is_noreturn: bool,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TopLevelItem {
    Function(FunctionDef),
    Declaration(Declaration),
}

/// A parsed source file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub items: Vec<TopLevelItem>,
}
