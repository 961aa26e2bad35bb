//! Declaration and declarator parsing

use crate::ast::*;
use crate::lexer::TokenType;
use crate::parser::Parser;
use crate::types::Type;
use xcc_common::CompilerError;

/// Declaration specifiers before the declarator
pub(super) struct DeclSpec {
    pub base: Type,
    pub storage: StorageClass,
    pub is_inline: bool,
    pub is_noreturn: bool,
}

impl Parser {
    /// Parse one external declaration: a function definition or a
    /// list of declarators
    pub(super) fn parse_external_declaration(
        &mut self,
    ) -> Result<Vec<TopLevelItem>, CompilerError> {
        let loc = self.loc();
        let spec = self.parse_decl_specifiers()?;
        let (name, ty) = self.parse_declarator(spec.base.clone())?;

        // a body makes it a function definition
        if ty.is_function() && self.check(&TokenType::LeftBrace) {
            let name = name.ok_or_else(|| {
                CompilerError::parse("function definition requires a name", loc.clone())
            })?;
            let body = self.parse_statement()?;
            return Ok(vec![TopLevelItem::Function(FunctionDef {
                name,
                ty,
                body,
                is_inline: spec.is_inline,
                is_noreturn: spec.is_noreturn,
                loc,
            })]);
        }

        let mut items = Vec::new();
        let mut name = name;
        let mut ty = ty;
        loop {
            let decl_name = name.take().ok_or_else(|| {
                CompilerError::parse("declaration requires a name", loc.clone())
            })?;
            let init = if self.match_token(&TokenType::Equal) {
                Some(self.parse_assignment_expression()?)
            } else {
                None
            };
            items.push(TopLevelItem::Declaration(Declaration {
                name: decl_name,
                ty: ty.clone(),
                storage: spec.storage,
                init,
                loc: loc.clone(),
            }));

            if !self.match_token(&TokenType::Comma) {
                break;
            }
            let (n, t) = self.parse_declarator(spec.base.clone())?;
            name = n;
            ty = t;
        }
        self.expect(TokenType::Semicolon, "declaration")?;
        Ok(items)
    }

    /// Parse a local declaration list: `int a = 1, *b;`
    pub(super) fn parse_declaration_list(&mut self) -> Result<Vec<Declaration>, CompilerError> {
        let loc = self.loc();
        let spec = self.parse_decl_specifiers()?;
        let mut decls = Vec::new();
        loop {
            let (name, ty) = self.parse_declarator(spec.base.clone())?;
            let name = name.ok_or_else(|| {
                CompilerError::parse("declaration requires a name", loc.clone())
            })?;
            let init = if self.match_token(&TokenType::Equal) {
                Some(self.parse_assignment_expression()?)
            } else {
                None
            };
            decls.push(Declaration {
                name,
                ty,
                storage: spec.storage,
                init,
                loc: loc.clone(),
            });
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::Semicolon, "declaration")?;
        Ok(decls)
    }

    pub(super) fn parse_decl_specifiers(&mut self) -> Result<DeclSpec, CompilerError> {
        let loc = self.loc();
        let mut storage = StorageClass::None;
        let mut is_inline = false;
        let mut is_noreturn = false;

        // accumulated type words
        let mut base: Option<TokenType> = None;
        let mut long_count = 0u32;
        let mut short = false;
        let mut signedness: Option<bool> = None;

        loop {
            match self.peek().token_type.clone() {
                TokenType::Static => {
                    self.advance();
                    storage = StorageClass::Static;
                }
                TokenType::Extern => {
                    self.advance();
                    storage = StorageClass::Extern;
                }
                TokenType::Inline => {
                    self.advance();
                    is_inline = true;
                }
                TokenType::Noreturn => {
                    self.advance();
                    is_noreturn = true;
                }
                TokenType::Const | TokenType::Volatile | TokenType::Register | TokenType::Auto => {
                    // qualifiers carry no code-generation meaning here
                    self.advance();
                }
                TokenType::Signed => {
                    self.advance();
                    signedness = Some(true);
                }
                TokenType::Unsigned => {
                    self.advance();
                    signedness = Some(false);
                }
                TokenType::Short => {
                    self.advance();
                    short = true;
                }
                TokenType::Long => {
                    self.advance();
                    long_count += 1;
                }
                tt @ (TokenType::Void
                | TokenType::Bool
                | TokenType::Char
                | TokenType::Int
                | TokenType::Float
                | TokenType::Double) => {
                    if base.is_some() {
                        return Err(CompilerError::parse(
                            "conflicting type specifiers",
                            self.loc(),
                        ));
                    }
                    self.advance();
                    base = Some(tt);
                }
                TokenType::Struct | TokenType::Union | TokenType::Enum | TokenType::Typedef => {
                    return Err(CompilerError::parse(
                        format!(
                            "'{}' is not supported in this subset",
                            self.peek().token_type
                        ),
                        self.loc(),
                    ));
                }
                _ => break,
            }
        }

        let signed = signedness.unwrap_or(true);
        let ty = match base {
            Some(TokenType::Void) => Type::Void,
            Some(TokenType::Bool) => Type::Bool,
            Some(TokenType::Char) => Type::Char { signed },
            Some(TokenType::Float) => Type::Float,
            Some(TokenType::Double) => Type::Double,
            Some(TokenType::Int) | None => {
                if short {
                    Type::Short { signed }
                } else if long_count >= 2 {
                    Type::LongLong { signed }
                } else if long_count == 1 {
                    Type::Long { signed }
                } else if base.is_none() && signedness.is_none() && long_count == 0 && !short {
                    return Err(CompilerError::parse("expected type specifier", loc));
                } else {
                    Type::Int { signed }
                }
            }
            _ => unreachable!(),
        };

        Ok(DeclSpec {
            base: ty,
            storage,
            is_inline,
            is_noreturn,
        })
    }

    /// Parse a declarator against the given base type, returning the
    /// declared name (absent for abstract declarators) and full type
    pub(super) fn parse_declarator(
        &mut self,
        base: Type,
    ) -> Result<(Option<String>, Type), CompilerError> {
        let mut ty = base;
        while self.match_token(&TokenType::Star) {
            while matches!(
                self.peek().token_type,
                TokenType::Const | TokenType::Volatile
            ) {
                self.advance();
            }
            ty = Type::Pointer(Box::new(ty));
        }
        self.parse_direct_declarator(ty)
    }

    fn parse_direct_declarator(
        &mut self,
        base: Type,
    ) -> Result<(Option<String>, Type), CompilerError> {
        // a parenthesized declarator binds tighter than the suffixes
        // that follow; it is parsed against a placeholder and resolved
        // once the suffix type is known
        let (name, nested) = if self.check(&TokenType::LeftParen)
            && self.peek_at(1).token_type == TokenType::Star
        {
            self.advance();
            let inner = self.parse_declarator(Type::Void)?;
            self.expect(TokenType::RightParen, "declarator")?;
            (inner.0, Some(inner.1))
        } else if let TokenType::Identifier(n) = self.peek().token_type.clone() {
            self.advance();
            (Some(n), None)
        } else {
            (None, None)
        };

        let mut ty = base;
        let mut dims = Vec::new();
        loop {
            if self.match_token(&TokenType::LeftBracket) {
                if self.match_token(&TokenType::RightBracket) {
                    dims.push(None);
                } else {
                    let loc = self.loc();
                    let len_expr = self.parse_conditional_expression()?;
                    let len = fold_array_len(&len_expr).ok_or_else(|| {
                        CompilerError::parse("array length must be a constant expression", loc)
                    })?;
                    self.expect(TokenType::RightBracket, "array declarator")?;
                    dims.push(Some(len));
                }
            } else if self.check(&TokenType::LeftParen) {
                ty = self.parse_function_suffix(ty)?;
                break;
            } else {
                break;
            }
        }
        for dim in dims.into_iter().rev() {
            ty = Type::Array {
                elem: Box::new(ty),
                len: dim,
            };
        }

        let ty = match nested {
            None => ty,
            Some(inner) => substitute_placeholder(inner, ty),
        };
        Ok((name, ty))
    }

    fn parse_function_suffix(&mut self, ret: Type) -> Result<Type, CompilerError> {
        self.expect(TokenType::LeftParen, "parameter list")?;

        let mut params = Vec::new();
        let mut variadic = false;

        if self.match_token(&TokenType::RightParen) {
            return Ok(Type::Function {
                ret: Box::new(ret),
                params,
                variadic,
            });
        }
        // `(void)` declares zero parameters
        if self.check(&TokenType::Void) && self.peek_at(1).token_type == TokenType::RightParen {
            self.advance();
            self.advance();
            return Ok(Type::Function {
                ret: Box::new(ret),
                params,
                variadic,
            });
        }

        loop {
            if self.match_token(&TokenType::Ellipsis) {
                variadic = true;
                break;
            }
            let spec = self.parse_decl_specifiers()?;
            let (name, ty) = self.parse_declarator(spec.base)?;
            // arrays and functions decay to pointers in parameters
            let ty = match ty {
                Type::Array { elem, .. } => Type::Pointer(elem),
                f @ Type::Function { .. } => Type::Pointer(Box::new(f)),
                other => other,
            };
            params.push((name, ty));
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RightParen, "parameter list")?;
        Ok(Type::Function {
            ret: Box::new(ret),
            params,
            variadic,
        })
    }
}

/// Replace the placeholder base of a nested declarator with the type
/// built from its suffixes
fn substitute_placeholder(inner: Type, actual: Type) -> Type {
    match inner {
        Type::Void => actual,
        Type::Pointer(t) => Type::Pointer(Box::new(substitute_placeholder(*t, actual))),
        Type::Array { elem, len } => Type::Array {
            elem: Box::new(substitute_placeholder(*elem, actual)),
            len,
        },
        Type::Function {
            ret,
            params,
            variadic,
        } => Type::Function {
            ret: Box::new(substitute_placeholder(*ret, actual)),
            params,
            variadic,
        },
        other => other,
    }
}

/// Fold an array-length expression made of integer literals
fn fold_array_len(expr: &Expression) -> Option<u64> {
    match &expr.kind {
        ExpressionKind::IntLiteral { value, .. } => Some(*value),
        ExpressionKind::CharLiteral(c) => Some(*c as u64),
        ExpressionKind::Binary { op, left, right } => {
            let l = fold_array_len(left)?;
            let r = fold_array_len(right)?;
            match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div if r != 0 => Some(l / r),
                BinaryOp::Shl => Some(l << (r & 63)),
                BinaryOp::Shr => Some(l >> (r & 63)),
                _ => None,
            }
        }
        _ => None,
    }
}
