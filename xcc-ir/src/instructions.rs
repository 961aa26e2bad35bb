//! IR Instructions
//!
//! The instruction set is a tagged sum; passes dispatch with a single
//! match on the tag. Every block ends in exactly one terminator
//! (`br`, `ret` or `switch`).

use crate::ops::{Condition, ConvOp, IrBinaryOp};
use crate::types::TypeRef;
use crate::values::{IntConst, Operand, Register};
use std::fmt;

/// Label of a basic block. Labels are issued by the same counter as
/// `%N` register names.
pub type BlockLabel = u32;

/// IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// result = op lhs, rhs
    Binary {
        result: Register,
        op: IrBinaryOp,
        lhs: Operand,
        rhs: Operand,
    },

    /// Integer comparison, result is `i1`
    Icmp {
        result: Register,
        cond: Condition,
        lhs: Operand,
        rhs: Operand,
    },

    /// Floating-point comparison, result is `i1`
    Fcmp {
        result: Register,
        cond: Condition,
        lhs: Operand,
        rhs: Operand,
    },

    /// Reserve stack storage; the result is the address
    Alloca { result: Register, ty: TypeRef },

    /// result = *ptr
    Load { result: Register, ptr: Operand },

    /// *ptr = value
    Store { value: Operand, ptr: Operand },

    /// Pointer into an aggregate: result = base + index * sizeof(elem)
    GetElePtr {
        result: Register,
        base: Operand,
        index: Operand,
    },

    /// Type conversion
    Convert {
        result: Register,
        op: ConvOp,
        value: Operand,
    },

    /// Function call. `result` is `None` for void calls and for calls
    /// whose value is discarded.
    Call {
        result: Option<Register>,
        callee: Operand,
        args: Vec<Operand>,
    },

    /// Unconditional branch
    Br { target: BlockLabel },

    /// Conditional branch on an `i1` operand
    CondBr {
        cond: Operand,
        then_blk: BlockLabel,
        else_blk: BlockLabel,
    },

    /// Return from function
    Ret { value: Option<Operand> },

    /// Multi-way branch. Cases preserve source order.
    Switch {
        value: Operand,
        default: BlockLabel,
        cases: Vec<(IntConst, BlockLabel)>,
    },

    /// result = cond ? tval : fval
    Select {
        result: Register,
        cond: Operand,
        tval: Operand,
        fval: Operand,
    },

    /// SSA merge. Part of the instruction set, but never produced by
    /// the builder; the allocator rejects it.
    Phi {
        result: Register,
        incoming: Vec<(Operand, BlockLabel)>,
    },
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Br { .. }
                | Instruction::CondBr { .. }
                | Instruction::Ret { .. }
                | Instruction::Switch { .. }
        )
    }

    /// The register this instruction defines, if any
    pub fn result(&self) -> Option<&Register> {
        match self {
            Instruction::Binary { result, .. }
            | Instruction::Icmp { result, .. }
            | Instruction::Fcmp { result, .. }
            | Instruction::Alloca { result, .. }
            | Instruction::Load { result, .. }
            | Instruction::GetElePtr { result, .. }
            | Instruction::Convert { result, .. }
            | Instruction::Select { result, .. }
            | Instruction::Phi { result, .. } => Some(result),
            Instruction::Call { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// All operands this instruction reads
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instruction::Binary { lhs, rhs, .. }
            | Instruction::Icmp { lhs, rhs, .. }
            | Instruction::Fcmp { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Alloca { .. } => vec![],
            Instruction::Load { ptr, .. } => vec![ptr],
            Instruction::Store { value, ptr } => vec![value, ptr],
            Instruction::GetElePtr { base, index, .. } => vec![base, index],
            Instruction::Convert { value, .. } => vec![value],
            Instruction::Call { callee, args, .. } => {
                let mut ops = vec![callee];
                ops.extend(args.iter());
                ops
            }
            Instruction::Br { .. } => vec![],
            Instruction::CondBr { cond, .. } => vec![cond],
            Instruction::Ret { value } => value.iter().collect(),
            Instruction::Switch { value, .. } => vec![value],
            Instruction::Select {
                cond, tval, fval, ..
            } => vec![cond, tval, fval],
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(op, _)| op).collect(),
        }
    }

    /// Branch targets of a terminator, in textual order, without
    /// de-duplication. Non-terminators have none.
    pub fn targets(&self) -> Vec<BlockLabel> {
        match self {
            Instruction::Br { target } => vec![*target],
            Instruction::CondBr {
                then_blk, else_blk, ..
            } => vec![*then_blk, *else_blk],
            Instruction::Switch { default, cases, .. } => {
                let mut t = vec![*default];
                t.extend(cases.iter().map(|(_, blk)| *blk));
                t
            }
            _ => vec![],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Binary {
                result,
                op,
                lhs,
                rhs,
            } => {
                write!(f, "{} = {} {} {}, {}", result.name, op, result.ty, lhs, rhs)
            }
            Instruction::Icmp {
                result,
                cond,
                lhs,
                rhs,
            } => {
                write!(
                    f,
                    "{} = icmp {} {} {}, {}",
                    result.name,
                    cond,
                    lhs.ty(),
                    lhs,
                    rhs
                )
            }
            Instruction::Fcmp {
                result,
                cond,
                lhs,
                rhs,
            } => {
                write!(
                    f,
                    "{} = fcmp {} {} {}, {}",
                    result.name,
                    cond,
                    lhs.ty(),
                    lhs,
                    rhs
                )
            }
            Instruction::Alloca { result, ty } => {
                write!(f, "{} = alloca {}", result.name, ty)
            }
            Instruction::Load { result, ptr } => {
                write!(f, "{} = load {} {}", result.name, result.ty, ptr)
            }
            Instruction::Store { value, ptr } => {
                write!(f, "store {} {}, {}", value.ty(), value, ptr)
            }
            Instruction::GetElePtr {
                result,
                base,
                index,
            } => {
                write!(
                    f,
                    "{} = geteleptr {} {}, {}",
                    result.name, result.ty, base, index
                )
            }
            Instruction::Convert { result, op, value } => {
                write!(f, "{} = {} {} {}", result.name, op, result.ty, value)
            }
            Instruction::Call {
                result,
                callee,
                args,
            } => {
                if let Some(result) = result {
                    write!(f, "{} = call {} {}(", result.name, result.ty, callee)?;
                } else {
                    write!(f, "call void {}(", callee)?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Instruction::Br { target } => write!(f, "br L{target}"),
            Instruction::CondBr {
                cond,
                then_blk,
                else_blk,
            } => {
                write!(f, "br i1 {cond}, L{then_blk}, L{else_blk}")
            }
            Instruction::Ret { value: Some(v) } => write!(f, "ret {} {}", v.ty(), v),
            Instruction::Ret { value: None } => write!(f, "ret void"),
            Instruction::Switch {
                value,
                default,
                cases,
            } => {
                write!(f, "switch {} {}, default L{}", value.ty(), value, default)?;
                for (c, blk) in cases {
                    write!(f, ", {}: L{}", c.as_i64(), blk)?;
                }
                Ok(())
            }
            Instruction::Select {
                result,
                cond,
                tval,
                fval,
            } => {
                write!(
                    f,
                    "{} = select {} {}, {}, {}",
                    result.name, result.ty, cond, tval, fval
                )
            }
            Instruction::Phi { result, incoming } => {
                write!(f, "{} = phi {} ", result.name, result.ty)?;
                for (i, (op, blk)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{op}, L{blk}]")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypePool;

    #[test]
    fn test_terminator_classification() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);

        let add = Instruction::Binary {
            result: Register::new("%2", i32t.clone()),
            op: IrBinaryOp::Add,
            lhs: Operand::reg("%0", i32t.clone()),
            rhs: Operand::reg("%1", i32t.clone()),
        };
        let ret = Instruction::Ret {
            value: Some(Operand::int(0, i32t)),
        };

        assert!(!add.is_terminator());
        assert!(ret.is_terminator());
    }

    #[test]
    fn test_switch_targets_preserve_order() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let sw = Instruction::Switch {
            value: Operand::reg("%0", i32t.clone()),
            default: 9,
            cases: vec![
                (IntConst::new(1, i32t.clone()), 3),
                (IntConst::new(2, i32t.clone()), 5),
                (IntConst::new(3, i32t), 9),
            ],
        };
        assert_eq!(sw.targets(), vec![9, 3, 5, 9]);
    }

    #[test]
    fn test_display() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let add = Instruction::Binary {
            result: Register::new("%2", i32t.clone()),
            op: IrBinaryOp::Add,
            lhs: Operand::reg("%1", i32t.clone()),
            rhs: Operand::int(5, i32t.clone()),
        };
        assert_eq!(add.to_string(), "%2 = add i32 %1, 5");

        let icmp = Instruction::Icmp {
            result: Register::new("%3", pool.bool()),
            cond: Condition::Lt,
            lhs: Operand::reg("%2", i32t.clone()),
            rhs: Operand::int(10, i32t),
        };
        assert_eq!(icmp.to_string(), "%3 = icmp lt i32 %2, 10");
    }
}
