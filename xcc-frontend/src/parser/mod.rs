//! Recursive-descent parser
//!
//! Produces a [`TranslationUnit`] from the token stream. The grammar
//! is the C subset described in the project documentation: scalar and
//! array types, pointers, the usual statement forms, and expressions
//! with full operator precedence. Struct/union/enum and typedef are
//! rejected up front.

mod declarations;
mod expressions;
mod statements;

use crate::ast::TranslationUnit;
use crate::lexer::{Token, TokenType};
use xcc_common::{CompilerError, SourceLocation};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse_translation_unit(&mut self) -> Result<TranslationUnit, CompilerError> {
        let mut unit = TranslationUnit::default();
        while !self.check(&TokenType::EndOfFile) {
            let mut items = self.parse_external_declaration()?;
            unit.items.append(&mut items);
        }
        Ok(unit)
    }

    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    pub(super) fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.position + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(super) fn loc(&self) -> SourceLocation {
        self.peek().loc.clone()
    }

    pub(super) fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        tok
    }

    pub(super) fn check(&self, tt: &TokenType) -> bool {
        &self.peek().token_type == tt
    }

    /// Consume the token if it matches
    pub(super) fn match_token(&mut self, tt: &TokenType) -> bool {
        if self.check(tt) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, tt: TokenType, context: &str) -> Result<Token, CompilerError> {
        if self.check(&tt) {
            Ok(self.advance())
        } else {
            Err(CompilerError::parse(
                format!("expected '{}' in {}, found '{}'", tt, context, self.peek().token_type),
                self.loc(),
            ))
        }
    }

    /// Does the current position start a declaration?
    pub(super) fn at_declaration(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::Static | TokenType::Extern
        ) || self.peek().token_type.starts_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::lexer::Lexer;
    use crate::types::Type;

    fn parse(src: &str) -> TranslationUnit {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        Parser::new(tokens).parse_translation_unit().unwrap()
    }

    #[test]
    fn test_simple_function() {
        let unit = parse("int main() { return 42; }");
        assert_eq!(unit.items.len(), 1);
        match &unit.items[0] {
            TopLevelItem::Function(func) => {
                assert_eq!(func.name, "main");
                match &func.ty {
                    Type::Function { ret, params, variadic } => {
                        assert_eq!(**ret, Type::int());
                        assert!(params.is_empty());
                        assert!(!variadic);
                    }
                    other => panic!("expected function type, got {other}"),
                }
            }
            _ => panic!("expected function definition"),
        }
    }

    #[test]
    fn test_global_with_initializer() {
        let unit = parse("int g = (2 + 3) * 4;");
        match &unit.items[0] {
            TopLevelItem::Declaration(decl) => {
                assert_eq!(decl.name, "g");
                assert!(decl.init.is_some());
            }
            _ => panic!("expected declaration"),
        }
    }

    #[test]
    fn test_variadic_extern() {
        let unit = parse("extern int printf(char *fmt, ...);");
        match &unit.items[0] {
            TopLevelItem::Declaration(decl) => {
                assert_eq!(decl.storage, StorageClass::Extern);
                match &decl.ty {
                    Type::Function { variadic, params, .. } => {
                        assert!(variadic);
                        assert_eq!(params.len(), 1);
                    }
                    other => panic!("expected function type, got {other}"),
                }
            }
            _ => panic!("expected declaration"),
        }
    }

    #[test]
    fn test_struct_rejected() {
        let mut lexer = Lexer::new("struct S { int a; };");
        let tokens = lexer.tokenize().unwrap();
        assert!(Parser::new(tokens).parse_translation_unit().is_err());
    }

    #[test]
    fn test_function_pointer_declarator() {
        let unit = parse("int (*handler)(int);");
        match &unit.items[0] {
            TopLevelItem::Declaration(decl) => {
                assert_eq!(decl.name, "handler");
                match &decl.ty {
                    Type::Pointer(inner) => assert!(inner.is_function()),
                    other => panic!("expected pointer type, got {other}"),
                }
            }
            _ => panic!("expected declaration"),
        }
    }

    #[test]
    fn test_multi_dimensional_array() {
        let unit = parse("int grid[2][3];");
        match &unit.items[0] {
            TopLevelItem::Declaration(decl) => match &decl.ty {
                Type::Array { elem, len: Some(2) } => {
                    assert_eq!(
                        **elem,
                        Type::Array {
                            elem: Box::new(Type::int()),
                            len: Some(3)
                        }
                    );
                }
                other => panic!("expected array type, got {other}"),
            },
            _ => panic!("expected declaration"),
        }
    }
}
