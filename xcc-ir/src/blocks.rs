//! Basic blocks
//!
//! A block is a straight-line instruction sequence ending in exactly
//! one terminator. Empty blocks are illegal once the builder has
//! finished a function.

use crate::instructions::{BlockLabel, Instruction};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: BlockLabel,
    pub instrs: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(label: BlockLabel) -> Self {
        Self {
            label,
            instrs: Vec::new(),
        }
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instrs.push(instr);
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn has_terminator(&self) -> bool {
        self.instrs
            .last()
            .is_some_and(Instruction::is_terminator)
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instrs.last().filter(|i| i.is_terminator())
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  L{}:", self.label)?;
        for instr in &self.instrs {
            writeln!(f, "    {instr};")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypePool;
    use crate::values::Operand;

    #[test]
    fn test_terminator_detection() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let mut blk = BasicBlock::new(0);
        assert!(blk.is_empty());
        assert!(!blk.has_terminator());

        blk.push(Instruction::Ret {
            value: Some(Operand::int(1, i32t)),
        });
        assert!(blk.has_terminator());
        assert!(blk.terminator().is_some());
    }
}
