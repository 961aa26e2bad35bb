//! Source-level type system
//!
//! Types as the C surface sees them, before lowering to IR types.
//! The data model is LP64: `int` is 32 bits, `long` and pointers are
//! 64 bits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source-level type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    Char { signed: bool },
    Short { signed: bool },
    Int { signed: bool },
    Long { signed: bool },
    LongLong { signed: bool },
    Float,
    Double,
    Pointer(Box<Type>),
    Array {
        elem: Box<Type>,
        len: Option<u64>,
    },
    Function {
        ret: Box<Type>,
        params: Vec<(Option<String>, Type)>,
        variadic: bool,
    },
}

impl Type {
    pub fn int() -> Self {
        Type::Int { signed: true }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Char { .. }
                | Type::Short { .. }
                | Type::Int { .. }
                | Type::Long { .. }
                | Type::LongLong { .. }
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    /// Bit width of an integer or float type
    pub fn width(&self) -> Option<u8> {
        match self {
            Type::Bool => Some(1),
            Type::Char { .. } => Some(8),
            Type::Short { .. } => Some(16),
            Type::Int { .. } | Type::Float => Some(32),
            Type::Long { .. } | Type::LongLong { .. } | Type::Double => Some(64),
            _ => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        match self {
            Type::Char { signed }
            | Type::Short { signed }
            | Type::Int { signed }
            | Type::Long { signed }
            | Type::LongLong { signed } => *signed,
            _ => false,
        }
    }

    /// The pointee of a pointer or element of an array
    pub fn inner(&self) -> Option<&Type> {
        match self {
            Type::Pointer(t) => Some(t),
            Type::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// The type of an integer literal with the given base and suffix,
    /// per the promotion matrix
    pub fn for_int_literal(value: u64, base: u32, suffix: &str) -> Type {
        let suffix = {
            // normalize: lowercase, unsigned marker first
            let mut s = suffix.to_ascii_lowercase();
            if s == "lu" {
                s = "ul".to_string();
            } else if s == "llu" {
                s = "ull".to_string();
            }
            s
        };
        let fits_i32 = value <= i32::MAX as u64;
        let fits_u32 = value <= u32::MAX as u64;
        let fits_i64 = value <= i64::MAX as u64;

        match suffix.as_str() {
            "" | "l" if base == 10 => {
                if fits_i32 {
                    Type::Int { signed: true }
                } else {
                    Type::Long { signed: true }
                }
            }
            "" | "l" => {
                if fits_i32 {
                    Type::Int { signed: true }
                } else if fits_u32 {
                    Type::Int { signed: false }
                } else if fits_i64 {
                    Type::Long { signed: true }
                } else {
                    Type::Long { signed: false }
                }
            }
            "u" | "ul" => {
                if fits_u32 {
                    Type::Int { signed: false }
                } else {
                    Type::Long { signed: false }
                }
            }
            "ll" if base == 10 => Type::LongLong { signed: true },
            "ll" => {
                if fits_i64 {
                    Type::LongLong { signed: true }
                } else {
                    Type::LongLong { signed: false }
                }
            }
            _ => Type::LongLong { signed: false }, // "ull"
        }
    }

    /// The type of a float literal with the given suffix. An
    /// unsuffixed literal stays `float` while it fits.
    pub fn for_float_literal(value: f64, suffix: Option<char>) -> Type {
        match suffix.map(|c| c.to_ascii_lowercase()) {
            Some('f') => Type::Float,
            Some(_) => Type::Double,
            None => {
                if value.abs() < f32::MAX as f64 {
                    Type::Float
                } else {
                    Type::Double
                }
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "_Bool"),
            Type::Char { signed: true } => write!(f, "char"),
            Type::Char { signed: false } => write!(f, "unsigned char"),
            Type::Short { signed: true } => write!(f, "short"),
            Type::Short { signed: false } => write!(f, "unsigned short"),
            Type::Int { signed: true } => write!(f, "int"),
            Type::Int { signed: false } => write!(f, "unsigned int"),
            Type::Long { signed: true } => write!(f, "long"),
            Type::Long { signed: false } => write!(f, "unsigned long"),
            Type::LongLong { signed: true } => write!(f, "long long"),
            Type::LongLong { signed: false } => write!(f, "unsigned long long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Pointer(t) => write!(f, "{t}*"),
            Type::Array { elem, len: Some(n) } => write!(f, "{elem}[{n}]"),
            Type::Array { elem, len: None } => write!(f, "{elem}[]"),
            Type::Function { ret, params, variadic } => {
                write!(f, "{ret} (")?;
                for (i, (_, p)) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                if *variadic {
                    write!(f, ", ...")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decimal_literal_typing() {
        assert_eq!(Type::for_int_literal(42, 10, ""), Type::Int { signed: true });
        assert_eq!(
            Type::for_int_literal(i32::MAX as u64, 10, ""),
            Type::Int { signed: true }
        );
        assert_eq!(
            Type::for_int_literal(i32::MAX as u64 + 1, 10, ""),
            Type::Long { signed: true }
        );
    }

    #[test]
    fn test_hex_literal_typing() {
        // non-decimal literals may land in unsigned types
        assert_eq!(
            Type::for_int_literal(0x8000_0000, 16, ""),
            Type::Int { signed: false }
        );
        assert_eq!(
            Type::for_int_literal(0x1_0000_0000, 16, ""),
            Type::Long { signed: true }
        );
        assert_eq!(
            Type::for_int_literal(u64::MAX, 16, ""),
            Type::Long { signed: false }
        );
    }

    #[test]
    fn test_suffixed_literal_typing() {
        assert_eq!(
            Type::for_int_literal(1, 10, "u"),
            Type::Int { signed: false }
        );
        assert_eq!(
            Type::for_int_literal(u32::MAX as u64 + 1, 10, "U"),
            Type::Long { signed: false }
        );
        assert_eq!(
            Type::for_int_literal(7, 10, "ll"),
            Type::LongLong { signed: true }
        );
        assert_eq!(
            Type::for_int_literal(7, 10, "ULL"),
            Type::LongLong { signed: false }
        );
        assert_eq!(
            Type::for_int_literal(7, 10, "lu"),
            Type::Int { signed: false }
        );
    }

    #[test]
    fn test_float_literal_typing() {
        assert_eq!(Type::for_float_literal(1.5, Some('f')), Type::Float);
        assert_eq!(Type::for_float_literal(1.5, Some('L')), Type::Double);
        assert_eq!(Type::for_float_literal(1.5, None), Type::Float);
        assert_eq!(Type::for_float_literal(1e300, None), Type::Double);
    }
}
