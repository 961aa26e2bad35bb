//! Literal scanning
//!
//! Integer literals keep their base and suffix so the parser can
//! apply the type promotion matrix; float literals keep their suffix
//! character.

use crate::lexer::{Lexer, TokenType};
use xcc_common::CompilerError;

impl Lexer {
    /// Scan an integer or floating literal
    pub(super) fn scan_number(&mut self) -> Result<TokenType, CompilerError> {
        let start = self.current_location();

        // hex
        if self.current_char() == Some('0')
            && matches!(self.peek_char(1), Some('x') | Some('X'))
        {
            self.advance();
            self.advance();
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            if digits.is_empty() {
                return Err(CompilerError::lex("invalid hex literal", start));
            }
            let value = u64::from_str_radix(&digits, 16)
                .map_err(|_| CompilerError::lex(format!("hex literal 0x{digits} overflows"), start))?;
            let suffix = self.take_int_suffix();
            return Ok(TokenType::IntLiteral {
                value,
                base: 16,
                suffix,
            });
        }

        let integral = self.take_while(|c| c.is_ascii_digit());

        // a fractional part or exponent makes it a float literal
        let is_float = matches!(self.current_char(), Some('.'))
            || matches!(self.current_char(), Some('e') | Some('E'));
        if is_float {
            let mut text = integral;
            if self.current_char() == Some('.') {
                text.push('.');
                self.advance();
                text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            }
            if matches!(self.current_char(), Some('e') | Some('E')) {
                text.push('e');
                self.advance();
                if matches!(self.current_char(), Some('+') | Some('-')) {
                    text.push(self.current_char().unwrap());
                    self.advance();
                }
                let exp = self.take_while(|c| c.is_ascii_digit());
                if exp.is_empty() {
                    return Err(CompilerError::lex("exponent has no digits", start));
                }
                text.push_str(&exp);
            }
            let value: f64 = text
                .parse()
                .map_err(|_| CompilerError::lex(format!("invalid float literal {text}"), start))?;
            let suffix = match self.current_char() {
                Some(c @ ('f' | 'F' | 'l' | 'L')) => {
                    self.advance();
                    Some(c)
                }
                _ => None,
            };
            return Ok(TokenType::FloatLiteral { value, suffix });
        }

        // octal when it starts with 0 and has more digits
        let (base, digits) = if integral.len() > 1 && integral.starts_with('0') {
            (8, integral[1..].to_string())
        } else {
            (10, integral)
        };
        let value = u64::from_str_radix(&digits, base)
            .map_err(|_| CompilerError::lex(format!("integer literal {digits} overflows"), start))?;
        let suffix = self.take_int_suffix();
        Ok(TokenType::IntLiteral {
            value,
            base,
            suffix,
        })
    }

    fn take_int_suffix(&mut self) -> String {
        self.take_while(|c| matches!(c, 'u' | 'U' | 'l' | 'L'))
    }

    /// Scan a character literal, handling the usual escapes
    pub(super) fn scan_char_literal(&mut self) -> Result<TokenType, CompilerError> {
        let start = self.current_location();
        self.advance(); // opening quote

        let ch = match self.current_char() {
            Some('\\') => {
                self.advance();
                let c = match self.current_char() {
                    Some('n') => b'\n',
                    Some('t') => b'\t',
                    Some('r') => b'\r',
                    Some('0') => 0,
                    Some('\\') => b'\\',
                    Some('\'') => b'\'',
                    Some(other) => {
                        return Err(CompilerError::lex(
                            format!("invalid escape sequence \\{other}"),
                            start,
                        ));
                    }
                    None => {
                        return Err(CompilerError::lex("unterminated character literal", start));
                    }
                };
                self.advance();
                c
            }
            Some(c) if c != '\'' => {
                self.advance();
                c as u8
            }
            _ => {
                return Err(CompilerError::lex("empty character literal", start));
            }
        };

        if self.current_char() != Some('\'') {
            return Err(CompilerError::lex("unterminated character literal", start));
        }
        self.advance();
        Ok(TokenType::CharLiteral(ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_one(src: &str) -> TokenType {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        tokens[0].token_type.clone()
    }

    #[test]
    fn test_decimal_with_suffix() {
        assert_eq!(
            lex_one("42ull"),
            TokenType::IntLiteral {
                value: 42,
                base: 10,
                suffix: "ull".to_string()
            }
        );
    }

    #[test]
    fn test_hex_and_octal() {
        assert_eq!(
            lex_one("0xff"),
            TokenType::IntLiteral {
                value: 255,
                base: 16,
                suffix: String::new()
            }
        );
        assert_eq!(
            lex_one("0755"),
            TokenType::IntLiteral {
                value: 493,
                base: 8,
                suffix: String::new()
            }
        );
    }

    #[test]
    fn test_float_forms() {
        assert_eq!(
            lex_one("1.5f"),
            TokenType::FloatLiteral {
                value: 1.5,
                suffix: Some('f')
            }
        );
        assert_eq!(
            lex_one("2e3"),
            TokenType::FloatLiteral {
                value: 2000.0,
                suffix: None
            }
        );
    }

    #[test]
    fn test_char_escapes() {
        assert_eq!(lex_one("'\\n'"), TokenType::CharLiteral(b'\n'));
        assert_eq!(lex_one("'A'"), TokenType::CharLiteral(b'A'));
    }
}
