//! Statement parsing

use crate::ast::*;
use crate::lexer::TokenType;
use crate::parser::Parser;
use xcc_common::CompilerError;

impl Parser {
    pub(super) fn parse_statement(&mut self) -> Result<Statement, CompilerError> {
        let loc = self.loc();

        // a label is an identifier followed by a colon
        if let TokenType::Identifier(name) = self.peek().token_type.clone() {
            if self.peek_at(1).token_type == TokenType::Colon {
                self.advance();
                self.advance();
                let body = self.parse_statement()?;
                return Ok(Statement::new(
                    StatementKind::Label {
                        name,
                        body: Box::new(body),
                    },
                    loc,
                ));
            }
        }

        match self.peek().token_type.clone() {
            TokenType::LeftBrace => self.parse_compound_statement(),
            _ if self.at_declaration() => {
                let decls = self.parse_declaration_list()?;
                let mut stmts: Vec<Statement> = decls
                    .into_iter()
                    .map(|d| {
                        let loc = d.loc.clone();
                        Statement::new(StatementKind::Decl(d), loc)
                    })
                    .collect();
                if stmts.len() == 1 {
                    Ok(stmts.pop().unwrap())
                } else {
                    Ok(Statement::new(StatementKind::Compound(stmts), loc))
                }
            }
            TokenType::If => {
                self.advance();
                self.expect(TokenType::LeftParen, "if")?;
                let cond = self.parse_expression()?;
                self.expect(TokenType::RightParen, "if")?;
                let then_stmt = Box::new(self.parse_statement()?);
                let else_stmt = if self.match_token(&TokenType::Else) {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(Statement::new(
                    StatementKind::If {
                        cond,
                        then_stmt,
                        else_stmt,
                    },
                    loc,
                ))
            }
            TokenType::While => {
                self.advance();
                self.expect(TokenType::LeftParen, "while")?;
                let cond = self.parse_expression()?;
                self.expect(TokenType::RightParen, "while")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Statement::new(StatementKind::While { cond, body }, loc))
            }
            TokenType::Do => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                self.expect(TokenType::While, "do-while")?;
                self.expect(TokenType::LeftParen, "do-while")?;
                let cond = self.parse_expression()?;
                self.expect(TokenType::RightParen, "do-while")?;
                self.expect(TokenType::Semicolon, "do-while")?;
                Ok(Statement::new(StatementKind::DoWhile { body, cond }, loc))
            }
            TokenType::For => {
                self.advance();
                self.expect(TokenType::LeftParen, "for")?;

                let init = if self.match_token(&TokenType::Semicolon) {
                    None
                } else if self.at_declaration() {
                    let mut decls = self.parse_declaration_list()?;
                    if decls.len() != 1 {
                        return Err(CompilerError::parse(
                            "for-init declares more than one name",
                            loc,
                        ));
                    }
                    Some(Box::new(ForInit::Decl(decls.pop().unwrap())))
                } else {
                    let expr = self.parse_expression()?;
                    self.expect(TokenType::Semicolon, "for")?;
                    Some(Box::new(ForInit::Expr(expr)))
                };

                let cond = if self.check(&TokenType::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenType::Semicolon, "for")?;

                let step = if self.check(&TokenType::RightParen) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenType::RightParen, "for")?;

                let body = Box::new(self.parse_statement()?);
                Ok(Statement::new(
                    StatementKind::For {
                        init,
                        cond,
                        step,
                        body,
                    },
                    loc,
                ))
            }
            TokenType::Switch => {
                self.advance();
                self.expect(TokenType::LeftParen, "switch")?;
                let cond = self.parse_expression()?;
                self.expect(TokenType::RightParen, "switch")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Statement::new(StatementKind::Switch { cond, body }, loc))
            }
            TokenType::Case => {
                self.advance();
                let value = self.parse_conditional_expression()?;
                self.expect(TokenType::Colon, "case")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Statement::new(StatementKind::Case { value, body }, loc))
            }
            TokenType::Default => {
                self.advance();
                self.expect(TokenType::Colon, "default")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Statement::new(StatementKind::Default { body }, loc))
            }
            TokenType::Break => {
                self.advance();
                self.expect(TokenType::Semicolon, "break")?;
                Ok(Statement::new(StatementKind::Break, loc))
            }
            TokenType::Continue => {
                self.advance();
                self.expect(TokenType::Semicolon, "continue")?;
                Ok(Statement::new(StatementKind::Continue, loc))
            }
            TokenType::Goto => {
                self.advance();
                let name = match self.peek().token_type.clone() {
                    TokenType::Identifier(n) => {
                        self.advance();
                        n
                    }
                    other => {
                        return Err(CompilerError::parse(
                            format!("expected label after goto, found '{other}'"),
                            self.loc(),
                        ));
                    }
                };
                self.expect(TokenType::Semicolon, "goto")?;
                Ok(Statement::new(StatementKind::Goto(name), loc))
            }
            TokenType::Return => {
                self.advance();
                let value = if self.check(&TokenType::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenType::Semicolon, "return")?;
                Ok(Statement::new(StatementKind::Return(value), loc))
            }
            TokenType::Semicolon => {
                self.advance();
                Ok(Statement::new(StatementKind::Expr(None), loc))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenType::Semicolon, "expression statement")?;
                Ok(Statement::new(StatementKind::Expr(Some(expr)), loc))
            }
        }
    }

    fn parse_compound_statement(&mut self) -> Result<Statement, CompilerError> {
        let loc = self.loc();
        self.expect(TokenType::LeftBrace, "block")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenType::RightBrace) {
            if self.check(&TokenType::EndOfFile) {
                return Err(CompilerError::parse("unterminated block", loc));
            }
            stmts.push(self.parse_statement()?);
        }
        self.advance();
        Ok(Statement::new(StatementKind::Compound(stmts), loc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_stmt(src: &str) -> Statement {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        Parser::new(tokens).parse_statement().unwrap()
    }

    #[test]
    fn test_if_else() {
        let stmt = parse_stmt("if (a) return 1; else return 0;");
        match stmt.kind {
            StatementKind::If { else_stmt, .. } => assert!(else_stmt.is_some()),
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_for_with_declaration() {
        let stmt = parse_stmt("for (int i = 0; i < 10; i++) total += i;");
        match stmt.kind {
            StatementKind::For {
                init, cond, step, ..
            } => {
                assert!(matches!(init.as_deref(), Some(ForInit::Decl(_))));
                assert!(cond.is_some());
                assert!(step.is_some());
            }
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn test_switch_with_cases() {
        let stmt = parse_stmt("switch (x) { case 1: f(); case 2: g(); default: h(); }");
        match stmt.kind {
            StatementKind::Switch { body, .. } => match body.kind {
                StatementKind::Compound(items) => assert_eq!(items.len(), 3),
                other => panic!("expected compound, got {other:?}"),
            },
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn test_label_and_goto() {
        let stmt = parse_stmt("{ goto done; done: ; }");
        match stmt.kind {
            StatementKind::Compound(items) => {
                assert!(matches!(items[0].kind, StatementKind::Goto(_)));
                assert!(matches!(items[1].kind, StatementKind::Label { .. }));
            }
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn test_multi_declarator_statement() {
        let stmt = parse_stmt("int a = 1, b;");
        match stmt.kind {
            StatementKind::Compound(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0].kind, StatementKind::Decl(_)));
            }
            other => panic!("expected compound of declarations, got {other:?}"),
        }
    }
}
