//! IR Operand Universe
//!
//! Operands are immediate constants, named virtual registers, or
//! global symbol references. Register names beginning with `@` denote
//! linker symbols; `%` denotes function-local values. Constants have
//! no definition site; every non-global register is defined by exactly
//! one instruction and, by builder guarantee, used at most once.

use crate::types::{IrType, TypeRef};
use std::fmt;

/// Integer constant. The value is stored as the two's-complement bit
/// pattern truncated to the declared width.
#[derive(Debug, Clone, PartialEq)]
pub struct IntConst {
    pub value: u64,
    pub ty: TypeRef,
}

impl IntConst {
    pub fn new(value: u64, ty: TypeRef) -> Self {
        debug_assert!(ty.is_integer());
        let width = match *ty {
            IrType::Int { width, .. } => width,
            _ => 64,
        };
        Self {
            value: truncate_to_width(value, width),
            ty,
        }
    }

    /// The value sign-extended to 64 bits when the type is signed
    pub fn as_i64(&self) -> i64 {
        let width = match *self.ty {
            IrType::Int { width, .. } => width,
            _ => 64,
        };
        if self.ty.is_signed() && width < 64 {
            let shift = 64 - width as u32;
            ((self.value << shift) as i64) >> shift
        } else {
            self.value as i64
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }
}

/// Truncate a two's-complement bit pattern to the given width
pub fn truncate_to_width(value: u64, width: u8) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

/// Floating-point constant
#[derive(Debug, Clone, PartialEq)]
pub struct FloatConst {
    pub value: f64,
    pub ty: TypeRef,
}

impl FloatConst {
    pub fn new(value: f64, ty: TypeRef) -> Self {
        debug_assert!(ty.is_float());
        Self { value, ty }
    }

    /// The raw bit pattern at the declared width, for immediate
    /// materialization in the emitter
    pub fn bits(&self) -> u64 {
        match *self.ty {
            IrType::Float { width: 32 } => (self.value as f32).to_bits() as u64,
            _ => self.value.to_bits(),
        }
    }
}

/// Named virtual register or global symbol reference
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub name: String,
    pub ty: TypeRef,
}

impl Register {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Does this register name a linker symbol?
    pub fn is_global(&self) -> bool {
        self.name.starts_with('@')
    }

    /// The symbol name without the `@` sigil
    pub fn symbol(&self) -> &str {
        self.name.trim_start_matches('@')
    }
}

/// Any value an instruction may consume
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(IntConst),
    Float(FloatConst),
    Reg(Register),
}

impl Operand {
    pub fn int(value: u64, ty: TypeRef) -> Self {
        Operand::Int(IntConst::new(value, ty))
    }

    pub fn float(value: f64, ty: TypeRef) -> Self {
        Operand::Float(FloatConst::new(value, ty))
    }

    pub fn reg(name: impl Into<String>, ty: TypeRef) -> Self {
        Operand::Reg(Register::new(name, ty))
    }

    pub fn ty(&self) -> &TypeRef {
        match self {
            Operand::Int(c) => &c.ty,
            Operand::Float(c) => &c.ty,
            Operand::Reg(r) => &r.ty,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Operand::Int(_) | Operand::Float(_))
    }

    pub fn as_int(&self) -> Option<&IntConst> {
        match self {
            Operand::Int(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&FloatConst> {
        match self {
            Operand::Float(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_reg(&self) -> Option<&Register> {
        match self {
            Operand::Reg(r) => Some(r),
            _ => None,
        }
    }

    /// A function-local register, i.e. one subject to the
    /// single-def/single-use discipline
    pub fn as_local_reg(&self) -> Option<&Register> {
        match self {
            Operand::Reg(r) if !r.is_global() => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(c) => write!(f, "{}", c.as_i64()),
            Operand::Float(c) => write!(f, "{}", c.value),
            Operand::Reg(r) => write!(f, "{}", r.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypePool;

    #[test]
    fn test_int_const_truncates_to_width() {
        let mut pool = TypePool::new();
        let i8t = pool.int(8, true);
        let c = IntConst::new(0x1_ff, i8t);
        assert_eq!(c.value, 0xff);
        assert_eq!(c.as_i64(), -1);
    }

    #[test]
    fn test_unsigned_display() {
        let mut pool = TypePool::new();
        let u8t = pool.int(8, false);
        let c = Operand::int(0xff, u8t);
        assert_eq!(c.to_string(), "255");
    }

    #[test]
    fn test_register_sigils() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let local = Register::new("%4", i32t.clone());
        let global = Register::new("@counter", pool.ptr_to(i32t));

        assert!(!local.is_global());
        assert!(global.is_global());
        assert_eq!(global.symbol(), "counter");
    }

    #[test]
    fn test_float_bits() {
        let mut pool = TypePool::new();
        let f32t = pool.float(32);
        let f64t = pool.float(64);
        assert_eq!(FloatConst::new(1.0, f32t).bits(), 0x3f80_0000);
        assert_eq!(FloatConst::new(1.0, f64t).bits(), 0x3ff0_0000_0000_0000);
    }
}
