//! Statement AST nodes

use super::expressions::Expression;
use super::Declaration;
use serde::{Deserialize, Serialize};
use xcc_common::SourceLocation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub loc: SourceLocation,
}

impl Statement {
    pub fn new(kind: StatementKind, loc: SourceLocation) -> Self {
        Self { kind, loc }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    Compound(Vec<Statement>),

    /// Expression statement; `None` is the empty statement `;`
    Expr(Option<Expression>),

    Decl(Declaration),

    If {
        cond: Expression,
        then_stmt: Box<Statement>,
        else_stmt: Option<Box<Statement>>,
    },

    While {
        cond: Expression,
        body: Box<Statement>,
    },

    DoWhile {
        body: Box<Statement>,
        cond: Expression,
    },

    For {
        init: Option<Box<ForInit>>,
        cond: Option<Expression>,
        step: Option<Expression>,
        body: Box<Statement>,
    },

    Switch {
        cond: Expression,
        body: Box<Statement>,
    },

    Case {
        value: Expression,
        body: Box<Statement>,
    },

    Default {
        body: Box<Statement>,
    },

    Break,
    Continue,

    Return(Option<Expression>),

    Goto(String),

    Label {
        name: String,
        body: Box<Statement>,
    },
}

/// The first clause of a `for` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForInit {
    Decl(Declaration),
    Expr(Expression),
}
