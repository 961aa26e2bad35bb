//! Expression AST nodes

use super::ops::{BinaryOp, UnaryOp};
use crate::types::Type;
use serde::{Deserialize, Serialize};
use xcc_common::SourceLocation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub loc: SourceLocation,
}

impl Expression {
    pub fn new(kind: ExpressionKind, loc: SourceLocation) -> Self {
        Self { kind, loc }
    }

    /// Syntactically an lvalue?
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Identifier(_)
                | ExpressionKind::Index { .. }
                | ExpressionKind::Unary {
                    op: UnaryOp::Deref,
                    ..
                }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpressionKind {
    /// Integer literal with its source base and suffix, which decide
    /// the literal's type
    IntLiteral {
        value: u64,
        base: u32,
        suffix: String,
    },

    /// Floating literal with its optional suffix character
    FloatLiteral { value: f64, suffix: Option<char> },

    CharLiteral(u8),

    Identifier(String),

    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// Assignment; `op` is the compound operator, if any
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expression>,
        value: Box<Expression>,
    },

    Conditional {
        cond: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },

    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },

    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },

    Cast {
        target: Type,
        operand: Box<Expression>,
    },

    SizeofExpr(Box<Expression>),
    SizeofType(Type),

    Comma {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lvalue_classification() {
        let loc = SourceLocation::dummy();
        let ident = Expression::new(ExpressionKind::Identifier("x".into()), loc.clone());
        assert!(ident.is_lvalue());

        let deref = Expression::new(
            ExpressionKind::Unary {
                op: UnaryOp::Deref,
                operand: Box::new(ident),
            },
            loc.clone(),
        );
        assert!(deref.is_lvalue());

        let lit = Expression::new(
            ExpressionKind::IntLiteral {
                value: 1,
                base: 10,
                suffix: String::new(),
            },
            loc,
        );
        assert!(!lit.is_lvalue());
    }
}
