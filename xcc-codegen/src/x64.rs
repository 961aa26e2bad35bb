//! x86-64 operand model
//!
//! Physical registers and the locations a virtual register can be
//! bound to. Rendering is AT&T syntax; general-purpose register names
//! depend on the access size.

use std::fmt;

/// Physical registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegTag {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
}

impl RegTag {
    pub fn is_xmm(&self) -> bool {
        *self >= RegTag::Xmm0
    }

    /// Callee-saved under the System V ABI. Every `xmm` register is
    /// caller-saved.
    pub fn is_callee_saved(&self) -> bool {
        matches!(
            self,
            RegTag::Rbx | RegTag::Rbp | RegTag::R12 | RegTag::R13 | RegTag::R14 | RegTag::R15
        )
    }

    /// AT&T name for the given access size in bytes
    pub fn name(&self, size: u64) -> &'static str {
        use RegTag::*;
        if self.is_xmm() {
            return match self {
                Xmm0 => "%xmm0",
                Xmm1 => "%xmm1",
                Xmm2 => "%xmm2",
                Xmm3 => "%xmm3",
                Xmm4 => "%xmm4",
                Xmm5 => "%xmm5",
                Xmm6 => "%xmm6",
                Xmm7 => "%xmm7",
                Xmm8 => "%xmm8",
                Xmm9 => "%xmm9",
                Xmm10 => "%xmm10",
                Xmm11 => "%xmm11",
                Xmm12 => "%xmm12",
                Xmm13 => "%xmm13",
                Xmm14 => "%xmm14",
                Xmm15 => "%xmm15",
                _ => unreachable!(),
            };
        }
        match size {
            8 => match self {
                Rax => "%rax",
                Rbx => "%rbx",
                Rcx => "%rcx",
                Rdx => "%rdx",
                Rsi => "%rsi",
                Rdi => "%rdi",
                Rbp => "%rbp",
                Rsp => "%rsp",
                R8 => "%r8",
                R9 => "%r9",
                R10 => "%r10",
                R11 => "%r11",
                R12 => "%r12",
                R13 => "%r13",
                R14 => "%r14",
                R15 => "%r15",
                _ => unreachable!(),
            },
            4 => match self {
                Rax => "%eax",
                Rbx => "%ebx",
                Rcx => "%ecx",
                Rdx => "%edx",
                Rsi => "%esi",
                Rdi => "%edi",
                Rbp => "%ebp",
                Rsp => "%esp",
                R8 => "%r8d",
                R9 => "%r9d",
                R10 => "%r10d",
                R11 => "%r11d",
                R12 => "%r12d",
                R13 => "%r13d",
                R14 => "%r14d",
                R15 => "%r15d",
                _ => unreachable!(),
            },
            2 => match self {
                Rax => "%ax",
                Rbx => "%bx",
                Rcx => "%cx",
                Rdx => "%dx",
                Rsi => "%si",
                Rdi => "%di",
                Rbp => "%bp",
                Rsp => "%sp",
                R8 => "%r8w",
                R9 => "%r9w",
                R10 => "%r10w",
                R11 => "%r11w",
                R12 => "%r12w",
                R13 => "%r13w",
                R14 => "%r14w",
                R15 => "%r15w",
                _ => unreachable!(),
            },
            _ => match self {
                Rax => "%al",
                Rbx => "%bl",
                Rcx => "%cl",
                Rdx => "%dl",
                Rsi => "%sil",
                Rdi => "%dil",
                Rbp => "%bpl",
                Rsp => "%spl",
                R8 => "%r8b",
                R9 => "%r9b",
                R10 => "%r10b",
                R11 => "%r11b",
                R12 => "%r12b",
                R13 => "%r13b",
                R14 => "%r14b",
                R15 => "%r15b",
                _ => unreachable!(),
            },
        }
    }
}

impl fmt::Display for RegTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name(8))
    }
}

/// Where a virtual register's value lives after allocation
#[derive(Debug, Clone, PartialEq)]
pub enum X64 {
    /// A physical register
    Reg(RegTag),

    /// An immediate; the raw bit pattern
    Imm(u64),

    /// A rip-relative global symbol. As a value this denotes the
    /// symbol's address.
    Label(String),

    /// An `alloca` result: the register's value is `rbp + offset`
    /// (the address of the stack object)
    Addr { offset: i64 },

    /// A stack slot holding the value itself (spill or stack-passed
    /// parameter)
    Slot { offset: i64 },
}

impl X64 {
    /// Render as an instruction operand. `bias` shifts rbp-relative
    /// negative offsets below the pushed callee-saved area; `size`
    /// selects the GPR name.
    pub fn operand(&self, size: u64, bias: i64) -> String {
        match self {
            X64::Reg(tag) => tag.name(size).to_string(),
            X64::Imm(bits) => format!("${}", *bits as i64),
            X64::Label(name) => format!("{name}(%rip)"),
            X64::Slot { offset } | X64::Addr { offset } => {
                let off = if *offset < 0 { offset - bias } else { *offset };
                format!("{off}(%rbp)")
            }
        }
    }

    pub fn is_reg(&self) -> bool {
        matches!(self, X64::Reg(_))
    }

    pub fn is_imm(&self) -> bool {
        matches!(self, X64::Imm(_))
    }

    /// Register or memory: usable as the r/m side of an instruction
    pub fn is_rm(&self) -> bool {
        !matches!(self, X64::Imm(_) | X64::Addr { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sized_register_names() {
        assert_eq!(RegTag::Rbx.name(8), "%rbx");
        assert_eq!(RegTag::Rbx.name(4), "%ebx");
        assert_eq!(RegTag::Rbx.name(1), "%bl");
        assert_eq!(RegTag::R12.name(2), "%r12w");
        assert_eq!(RegTag::Xmm8.name(8), "%xmm8");
        assert_eq!(RegTag::Xmm8.name(4), "%xmm8");
    }

    #[test]
    fn test_callee_saved_classification() {
        assert!(RegTag::Rbx.is_callee_saved());
        assert!(RegTag::R12.is_callee_saved());
        assert!(RegTag::R13.is_callee_saved());
        assert!(!RegTag::Rax.is_callee_saved());
        assert!(!RegTag::R10.is_callee_saved());
        // System V makes every xmm register caller-saved
        assert!(!RegTag::Xmm8.is_callee_saved());
    }

    #[test]
    fn test_operand_rendering() {
        assert_eq!(X64::Reg(RegTag::R13).operand(8, 0), "%r13");
        assert_eq!(X64::Imm(5).operand(8, 0), "$5");
        assert_eq!(X64::Imm(u64::MAX).operand(8, 0), "$-1");
        assert_eq!(X64::Label("counter".into()).operand(8, 0), "counter(%rip)");
        assert_eq!(X64::Slot { offset: -16 }.operand(8, 0), "-16(%rbp)");
        // pushed callee-saved registers shift locals down
        assert_eq!(X64::Slot { offset: -16 }.operand(8, 8), "-24(%rbp)");
        // incoming stack parameters stay put
        assert_eq!(X64::Slot { offset: 16 }.operand(8, 8), "16(%rbp)");
    }
}
