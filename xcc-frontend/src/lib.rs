//! xcc - Frontend
//!
//! Lexer, recursive-descent parser and AST for the xcc compiler. The
//! frontend's contract is to deliver a structurally correct AST;
//! expression typing happens in the IR builder.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod types;

pub use ast::{
    BinaryOp, Declaration, Expression, ExpressionKind, ForInit, FunctionDef, Statement,
    StatementKind, StorageClass, TopLevelItem, TranslationUnit, UnaryOp,
};
pub use lexer::{Lexer, Token, TokenType};
pub use parser::Parser;
pub use types::Type;

use xcc_common::CompilerError;

/// High-level frontend interface
pub struct Frontend;

impl Frontend {
    /// Parse source text into an AST
    pub fn parse_source(source: &str, filename: &str) -> Result<TranslationUnit, CompilerError> {
        let mut lexer = Lexer::with_filename(source, filename);
        let tokens = lexer.tokenize()?;
        log::debug!("lexed {} tokens from {filename}", tokens.len());

        let mut parser = Parser::new(tokens);
        parser.parse_translation_unit()
    }

    /// Tokenize source text (for tooling and tests)
    pub fn tokenize_source(source: &str) -> Result<Vec<Token>, CompilerError> {
        let mut lexer = Lexer::new(source);
        lexer.tokenize()
    }
}
