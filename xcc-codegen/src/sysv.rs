//! System V parameter classification
//!
//! The first six integer/pointer arguments travel in
//! `{rdi, rsi, rdx, rcx, r8, r9}`, the first eight floating arguments
//! in `{xmm0..xmm7}`; everything else goes on the stack. Stack
//! arguments are pushed right to left, so the leftmost overflow
//! argument sits closest to the return address.

use crate::x64::RegTag;
use xcc_ir::TypeRef;

pub const INT_ARG_REGS: [RegTag; 6] = [
    RegTag::Rdi,
    RegTag::Rsi,
    RegTag::Rdx,
    RegTag::Rcx,
    RegTag::R8,
    RegTag::R9,
];

pub const FLOAT_ARG_REGS: [RegTag; 8] = [
    RegTag::Xmm0,
    RegTag::Xmm1,
    RegTag::Xmm2,
    RegTag::Xmm3,
    RegTag::Xmm4,
    RegTag::Xmm5,
    RegTag::Xmm6,
    RegTag::Xmm7,
];

/// Where one argument lives at the call boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLoc {
    IntReg(RegTag),
    FloatReg(RegTag),
    /// Byte offset from the incoming stack pointer (after the return
    /// address; the first overflow argument is at offset 0)
    Stack { offset: i64 },
}

/// Classification of a full argument or parameter list
#[derive(Debug, Clone, Default)]
pub struct SysVConv {
    pub locs: Vec<ArgLoc>,
    /// Bytes of stack the overflow arguments occupy
    pub stack_bytes: u64,
    /// Number of vector registers used; variadic callees read this
    /// from `%al`
    pub vector_count: u8,
}

impl SysVConv {
    pub fn classify(types: &[TypeRef]) -> SysVConv {
        let mut conv = SysVConv::default();
        let mut ints = 0;
        let mut floats = 0;
        let mut stack = 0i64;

        for ty in types {
            if ty.is_float() {
                if floats < FLOAT_ARG_REGS.len() {
                    conv.locs.push(ArgLoc::FloatReg(FLOAT_ARG_REGS[floats]));
                    floats += 1;
                    conv.vector_count += 1;
                } else {
                    conv.locs.push(ArgLoc::Stack { offset: stack });
                    stack += 8;
                }
            } else if ints < INT_ARG_REGS.len() {
                conv.locs.push(ArgLoc::IntReg(INT_ARG_REGS[ints]));
                ints += 1;
            } else {
                conv.locs.push(ArgLoc::Stack { offset: stack });
                stack += 8;
            }
        }
        conv.stack_bytes = stack as u64;
        conv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcc_ir::TypePool;

    #[test]
    fn test_int_args_use_the_six_registers() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let types: Vec<_> = (0..7).map(|_| i32t.clone()).collect();

        let conv = SysVConv::classify(&types);
        assert_eq!(conv.locs[0], ArgLoc::IntReg(RegTag::Rdi));
        assert_eq!(conv.locs[5], ArgLoc::IntReg(RegTag::R9));
        assert_eq!(conv.locs[6], ArgLoc::Stack { offset: 0 });
        assert_eq!(conv.stack_bytes, 8);
    }

    #[test]
    fn test_float_and_int_counted_separately() {
        let mut pool = TypePool::new();
        let i64t = pool.int(64, true);
        let f64t = pool.float(64);
        let types = vec![f64t.clone(), i64t.clone(), f64t.clone(), i64t];

        let conv = SysVConv::classify(&types);
        assert_eq!(conv.locs[0], ArgLoc::FloatReg(RegTag::Xmm0));
        assert_eq!(conv.locs[1], ArgLoc::IntReg(RegTag::Rdi));
        assert_eq!(conv.locs[2], ArgLoc::FloatReg(RegTag::Xmm1));
        assert_eq!(conv.locs[3], ArgLoc::IntReg(RegTag::Rsi));
        assert_eq!(conv.vector_count, 2);
        assert_eq!(conv.stack_bytes, 0);
    }

    #[test]
    fn test_ninth_float_overflows() {
        let mut pool = TypePool::new();
        let f64t = pool.float(64);
        let types: Vec<_> = (0..9).map(|_| f64t.clone()).collect();

        let conv = SysVConv::classify(&types);
        assert_eq!(conv.locs[7], ArgLoc::FloatReg(RegTag::Xmm7));
        assert_eq!(conv.locs[8], ArgLoc::Stack { offset: 0 });
        assert_eq!(conv.vector_count, 8);
    }
}
