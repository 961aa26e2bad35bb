//! IR operation tags
//!
//! Binary operations, comparison conditions and conversion kinds.
//! Integer and floating-point arithmetic are distinct tags so that a
//! pass can dispatch without inspecting operand types.

use std::fmt;

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrBinaryOp {
    // Integer arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Floating-point arithmetic
    FAdd,
    FSub,
    FMul,
    FDiv,

    // Shifts
    Shl,
    Lshr,
    Ashr,

    // Bitwise
    And,
    Or,
    Xor,
}

impl IrBinaryOp {
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            IrBinaryOp::FAdd | IrBinaryOp::FSub | IrBinaryOp::FMul | IrBinaryOp::FDiv
        )
    }
}

impl fmt::Display for IrBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IrBinaryOp::Add => "add",
            IrBinaryOp::Sub => "sub",
            IrBinaryOp::Mul => "mul",
            IrBinaryOp::Div => "div",
            IrBinaryOp::Mod => "mod",
            IrBinaryOp::FAdd => "fadd",
            IrBinaryOp::FSub => "fsub",
            IrBinaryOp::FMul => "fmul",
            IrBinaryOp::FDiv => "fdiv",
            IrBinaryOp::Shl => "shl",
            IrBinaryOp::Lshr => "lshr",
            IrBinaryOp::Ashr => "ashr",
            IrBinaryOp::And => "and",
            IrBinaryOp::Or => "or",
            IrBinaryOp::Xor => "xor",
        };
        write!(f, "{s}")
    }
}

/// Comparison conditions for `icmp` and `fcmp`. Signedness is taken
/// from the operand types at emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Condition {
    /// The condition with operands swapped
    pub fn swapped(&self) -> Condition {
        match self {
            Condition::Eq => Condition::Eq,
            Condition::Ne => Condition::Ne,
            Condition::Lt => Condition::Gt,
            Condition::Le => Condition::Ge,
            Condition::Gt => Condition::Lt,
            Condition::Ge => Condition::Le,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Lt => "lt",
            Condition::Le => "le",
            Condition::Gt => "gt",
            Condition::Ge => "ge",
        };
        write!(f, "{s}")
    }
}

/// Conversion kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvOp {
    /// Integer truncation
    Trunc,
    /// f64 to f32
    Ftrunc,
    /// Zero extension
    Zext,
    /// Sign extension
    Sext,
    /// f32 to f64
    Fext,
    /// Float to unsigned integer
    FtoU,
    /// Float to signed integer
    FtoS,
    /// Unsigned integer to float
    UtoF,
    /// Signed integer to float
    StoF,
    PtrToI,
    IToPtr,
    Bitcast,
}

impl fmt::Display for ConvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConvOp::Trunc => "trunc",
            ConvOp::Ftrunc => "ftrunc",
            ConvOp::Zext => "zext",
            ConvOp::Sext => "sext",
            ConvOp::Fext => "fext",
            ConvOp::FtoU => "ftou",
            ConvOp::FtoS => "ftos",
            ConvOp::UtoF => "utof",
            ConvOp::StoF => "stof",
            ConvOp::PtrToI => "ptrtoi",
            ConvOp::IToPtr => "itoptr",
            ConvOp::Bitcast => "bitcast",
        };
        write!(f, "{s}")
    }
}
