//! Expression parsing with operator precedence

use crate::ast::*;
use crate::lexer::TokenType;
use crate::parser::Parser;
use crate::types::Type;
use xcc_common::CompilerError;

impl Parser {
    /// Full expression, including the comma operator
    pub(super) fn parse_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut left = self.parse_assignment_expression()?;
        while self.check(&TokenType::Comma) {
            let loc = self.loc();
            self.advance();
            let right = self.parse_assignment_expression()?;
            left = Expression::new(
                ExpressionKind::Comma {
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    pub(super) fn parse_assignment_expression(&mut self) -> Result<Expression, CompilerError> {
        let target = self.parse_conditional_expression()?;

        let op = match self.peek().token_type {
            TokenType::Equal => None,
            TokenType::PlusEqual => Some(BinaryOp::Add),
            TokenType::MinusEqual => Some(BinaryOp::Sub),
            TokenType::StarEqual => Some(BinaryOp::Mul),
            TokenType::SlashEqual => Some(BinaryOp::Div),
            TokenType::PercentEqual => Some(BinaryOp::Mod),
            TokenType::AmpersandEqual => Some(BinaryOp::BitAnd),
            TokenType::PipeEqual => Some(BinaryOp::BitOr),
            TokenType::CaretEqual => Some(BinaryOp::BitXor),
            TokenType::LeftShiftEqual => Some(BinaryOp::Shl),
            TokenType::RightShiftEqual => Some(BinaryOp::Shr),
            _ => return Ok(target),
        };
        let loc = self.loc();
        self.advance();
        let value = self.parse_assignment_expression()?;
        Ok(Expression::new(
            ExpressionKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            loc,
        ))
    }

    pub(super) fn parse_conditional_expression(&mut self) -> Result<Expression, CompilerError> {
        let cond = self.parse_logical_or_expression()?;
        if !self.check(&TokenType::Question) {
            return Ok(cond);
        }
        let loc = self.loc();
        self.advance();
        let then_expr = self.parse_expression()?;
        self.expect(TokenType::Colon, "conditional expression")?;
        let else_expr = self.parse_conditional_expression()?;
        Ok(Expression::new(
            ExpressionKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            loc,
        ))
    }

    fn parse_binary_level(
        &mut self,
        ops: &[(TokenType, BinaryOp)],
        next: fn(&mut Self) -> Result<Expression, CompilerError>,
    ) -> Result<Expression, CompilerError> {
        let mut left = next(self)?;
        'outer: loop {
            for (tt, op) in ops {
                if self.check(tt) {
                    let loc = self.loc();
                    self.advance();
                    let right = next(self)?;
                    left = Expression::new(
                        ExpressionKind::Binary {
                            op: *op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        loc,
                    );
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_logical_or_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[(TokenType::PipePipe, BinaryOp::LogicalOr)],
            Self::parse_logical_and_expression,
        )
    }

    fn parse_logical_and_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[(TokenType::AmpersandAmpersand, BinaryOp::LogicalAnd)],
            Self::parse_bitor_expression,
        )
    }

    fn parse_bitor_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[(TokenType::Pipe, BinaryOp::BitOr)],
            Self::parse_bitxor_expression,
        )
    }

    fn parse_bitxor_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[(TokenType::Caret, BinaryOp::BitXor)],
            Self::parse_bitand_expression,
        )
    }

    fn parse_bitand_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[(TokenType::Ampersand, BinaryOp::BitAnd)],
            Self::parse_equality_expression,
        )
    }

    fn parse_equality_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[
                (TokenType::EqualEqual, BinaryOp::Eq),
                (TokenType::BangEqual, BinaryOp::Ne),
            ],
            Self::parse_relational_expression,
        )
    }

    fn parse_relational_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[
                (TokenType::Less, BinaryOp::Lt),
                (TokenType::Greater, BinaryOp::Gt),
                (TokenType::LessEqual, BinaryOp::Le),
                (TokenType::GreaterEqual, BinaryOp::Ge),
            ],
            Self::parse_shift_expression,
        )
    }

    fn parse_shift_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[
                (TokenType::LeftShift, BinaryOp::Shl),
                (TokenType::RightShift, BinaryOp::Shr),
            ],
            Self::parse_additive_expression,
        )
    }

    fn parse_additive_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[
                (TokenType::Plus, BinaryOp::Add),
                (TokenType::Minus, BinaryOp::Sub),
            ],
            Self::parse_multiplicative_expression,
        )
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Expression, CompilerError> {
        self.parse_binary_level(
            &[
                (TokenType::Star, BinaryOp::Mul),
                (TokenType::Slash, BinaryOp::Div),
                (TokenType::Percent, BinaryOp::Mod),
            ],
            Self::parse_cast_expression,
        )
    }

    fn parse_cast_expression(&mut self) -> Result<Expression, CompilerError> {
        if self.check(&TokenType::LeftParen) && self.peek_at(1).token_type.starts_type() {
            let loc = self.loc();
            self.advance();
            let target = self.parse_type_name()?;
            self.expect(TokenType::RightParen, "cast")?;
            let operand = self.parse_cast_expression()?;
            return Ok(Expression::new(
                ExpressionKind::Cast {
                    target,
                    operand: Box::new(operand),
                },
                loc,
            ));
        }
        self.parse_unary_expression()
    }

    /// A type name: specifiers plus an abstract declarator
    pub(super) fn parse_type_name(&mut self) -> Result<Type, CompilerError> {
        let spec = self.parse_decl_specifiers()?;
        let (name, ty) = self.parse_declarator(spec.base)?;
        if name.is_some() {
            return Err(CompilerError::parse("type name cannot declare a name", self.loc()));
        }
        Ok(ty)
    }

    fn parse_unary_expression(&mut self) -> Result<Expression, CompilerError> {
        let loc = self.loc();
        let op = match self.peek().token_type {
            TokenType::Plus => Some(UnaryOp::Plus),
            TokenType::Minus => Some(UnaryOp::Minus),
            TokenType::Tilde => Some(UnaryOp::BitNot),
            TokenType::Bang => Some(UnaryOp::LogicalNot),
            TokenType::Star => Some(UnaryOp::Deref),
            TokenType::Ampersand => Some(UnaryOp::AddrOf),
            TokenType::PlusPlus => Some(UnaryOp::PreInc),
            TokenType::MinusMinus => Some(UnaryOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_cast_expression()?;
            return Ok(Expression::new(
                ExpressionKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                loc,
            ));
        }

        if self.match_token(&TokenType::Sizeof) {
            if self.check(&TokenType::LeftParen) && self.peek_at(1).token_type.starts_type() {
                self.advance();
                let ty = self.parse_type_name()?;
                self.expect(TokenType::RightParen, "sizeof")?;
                return Ok(Expression::new(ExpressionKind::SizeofType(ty), loc));
            }
            let operand = self.parse_unary_expression()?;
            return Ok(Expression::new(
                ExpressionKind::SizeofExpr(Box::new(operand)),
                loc,
            ));
        }

        self.parse_postfix_expression()
    }

    fn parse_postfix_expression(&mut self) -> Result<Expression, CompilerError> {
        let mut expr = self.parse_primary_expression()?;
        loop {
            let loc = self.loc();
            if self.match_token(&TokenType::LeftParen) {
                let mut args = Vec::new();
                if !self.check(&TokenType::RightParen) {
                    loop {
                        args.push(self.parse_assignment_expression()?);
                        if !self.match_token(&TokenType::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenType::RightParen, "call")?;
                expr = Expression::new(
                    ExpressionKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    loc,
                );
            } else if self.match_token(&TokenType::LeftBracket) {
                let index = self.parse_expression()?;
                self.expect(TokenType::RightBracket, "subscript")?;
                expr = Expression::new(
                    ExpressionKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    loc,
                );
            } else if self.match_token(&TokenType::PlusPlus) {
                expr = Expression::new(
                    ExpressionKind::Unary {
                        op: UnaryOp::PostInc,
                        operand: Box::new(expr),
                    },
                    loc,
                );
            } else if self.match_token(&TokenType::MinusMinus) {
                expr = Expression::new(
                    ExpressionKind::Unary {
                        op: UnaryOp::PostDec,
                        operand: Box::new(expr),
                    },
                    loc,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, CompilerError> {
        let loc = self.loc();
        match self.peek().token_type.clone() {
            TokenType::IntLiteral {
                value,
                base,
                suffix,
            } => {
                self.advance();
                Ok(Expression::new(
                    ExpressionKind::IntLiteral {
                        value,
                        base,
                        suffix,
                    },
                    loc,
                ))
            }
            TokenType::FloatLiteral { value, suffix } => {
                self.advance();
                Ok(Expression::new(
                    ExpressionKind::FloatLiteral { value, suffix },
                    loc,
                ))
            }
            TokenType::CharLiteral(c) => {
                self.advance();
                Ok(Expression::new(ExpressionKind::CharLiteral(c), loc))
            }
            TokenType::Identifier(name) => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Identifier(name), loc))
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenType::RightParen, "expression")?;
                Ok(expr)
            }
            other => Err(CompilerError::parse(
                format!("expected expression, found '{other}'"),
                loc,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_expr(src: &str) -> Expression {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        parser.parse_expression().unwrap()
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse_expr("1 + 2 * 3");
        match expr.kind {
            ExpressionKind::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => {
                assert!(matches!(
                    right.kind,
                    ExpressionKind::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("expected add at top, got {other:?}"),
        }
    }

    #[test]
    fn test_assignment_right_associative() {
        let expr = parse_expr("a = b = 1");
        match expr.kind {
            ExpressionKind::Assign { value, .. } => {
                assert!(matches!(value.kind, ExpressionKind::Assign { .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_cast_vs_parenthesized() {
        let cast = parse_expr("(long) x");
        assert!(matches!(cast.kind, ExpressionKind::Cast { .. }));

        let paren = parse_expr("(x) + 1");
        assert!(matches!(
            paren.kind,
            ExpressionKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse_expr("a[1](2)");
        match expr.kind {
            ExpressionKind::Call { callee, args } => {
                assert_eq!(args.len(), 1);
                assert!(matches!(callee.kind, ExpressionKind::Index { .. }));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_sizeof_forms() {
        assert!(matches!(
            parse_expr("sizeof(int)").kind,
            ExpressionKind::SizeofType(_)
        ));
        assert!(matches!(
            parse_expr("sizeof x").kind,
            ExpressionKind::SizeofExpr(_)
        ));
    }
}
