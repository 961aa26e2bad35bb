//! Def-use analysis
//!
//! Records, for every local register, its defining instruction and
//! its use sites. The builder guarantees that every non-alloca local
//! register is defined once and used exactly once; the allocator
//! depends on that guarantee, so this pass checks it and fails hard
//! when it is broken.

use crate::function::Function;
use crate::instructions::{BlockLabel, Instruction};
use std::collections::HashMap;
use xcc_common::CompilerError;

/// Position of an instruction: (block label, index within block)
pub type InstrSite = (BlockLabel, usize);

#[derive(Debug, Clone, Default)]
pub struct DefUse {
    defs: HashMap<String, InstrSite>,
    uses: HashMap<String, Vec<InstrSite>>,
    allocas: HashMap<String, bool>,
    params: Vec<String>,
}

impl DefUse {
    /// Scan a function and verify the single-def/single-use
    /// discipline. Parameters count as defined at entry.
    pub fn compute(func: &Function) -> Result<DefUse, CompilerError> {
        let mut du = DefUse::default();
        for param in &func.params {
            du.params.push(param.name.clone());
        }

        for block in &func.blocks {
            for (idx, instr) in block.instrs.iter().enumerate() {
                let site = (block.label, idx);

                if let Some(result) = instr.result() {
                    if du.defs.insert(result.name.clone(), site).is_some() {
                        return Err(CompilerError::internal(format!(
                            "register {} defined twice in '{}'",
                            result.name, func.name
                        )));
                    }
                    du.allocas.insert(
                        result.name.clone(),
                        matches!(instr, Instruction::Alloca { .. }),
                    );
                }

                for op in instr.operands() {
                    if let Some(reg) = op.as_local_reg() {
                        du.uses.entry(reg.name.clone()).or_default().push(site);
                    }
                }
            }
        }

        du.validate(func)?;
        Ok(du)
    }

    fn validate(&self, func: &Function) -> Result<(), CompilerError> {
        for (name, sites) in &self.uses {
            if !self.defs.contains_key(name) && !self.params.contains(name) {
                return Err(CompilerError::internal(format!(
                    "register {name} used without a definition in '{}'",
                    func.name
                )));
            }
            if !self.is_alloca(name) && sites.len() != 1 {
                return Err(CompilerError::internal(format!(
                    "register {name} has {} uses in '{}', exactly 1 expected",
                    sites.len(),
                    func.name
                )));
            }
        }
        for name in self.defs.keys() {
            if !self.is_alloca(name) && !self.uses.contains_key(name) {
                return Err(CompilerError::internal(format!(
                    "register {name} is never used in '{}'",
                    func.name
                )));
            }
        }
        for name in &self.params {
            let count = self.uses.get(name).map(Vec::len).unwrap_or(0);
            if count != 1 {
                return Err(CompilerError::internal(format!(
                    "parameter {name} has {count} uses in '{}', exactly 1 expected",
                    func.name
                )));
            }
        }
        Ok(())
    }

    /// Where a register is defined; `None` for parameters
    pub fn def_of(&self, name: &str) -> Option<InstrSite> {
        self.defs.get(name).copied()
    }

    /// The single use site of a register
    pub fn use_of(&self, name: &str) -> Option<InstrSite> {
        self.uses.get(name).and_then(|v| v.first()).copied()
    }

    pub fn use_count(&self, name: &str) -> usize {
        self.uses.get(name).map(Vec::len).unwrap_or(0)
    }

    pub fn is_alloca(&self, name: &str) -> bool {
        self.allocas.get(name).copied().unwrap_or(false)
    }

    pub fn is_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BasicBlock;
    use crate::ops::IrBinaryOp;
    use crate::types::TypePool;
    use crate::values::{Operand, Register};

    fn single_block(instrs: Vec<Instruction>) -> Function {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let fty = pool.func_of(i32t, vec![], false);
        let mut func = Function::new("f", fty);
        let mut blk = BasicBlock::new(0);
        for i in instrs {
            blk.push(i);
        }
        func.add_block(blk);
        func
    }

    #[test]
    fn test_single_use_accepted() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let func = single_block(vec![
            Instruction::Binary {
                result: Register::new("%0", i32t.clone()),
                op: IrBinaryOp::Add,
                lhs: Operand::int(1, i32t.clone()),
                rhs: Operand::int(2, i32t.clone()),
            },
            Instruction::Ret {
                value: Some(Operand::reg("%0", i32t)),
            },
        ]);

        let du = DefUse::compute(&func).unwrap();
        assert_eq!(du.def_of("%0"), Some((0, 0)));
        assert_eq!(du.use_of("%0"), Some((0, 1)));
        assert_eq!(du.use_count("%0"), 1);
    }

    #[test]
    fn test_double_use_rejected() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let func = single_block(vec![
            Instruction::Binary {
                result: Register::new("%0", i32t.clone()),
                op: IrBinaryOp::Add,
                lhs: Operand::int(1, i32t.clone()),
                rhs: Operand::int(2, i32t.clone()),
            },
            Instruction::Binary {
                result: Register::new("%1", i32t.clone()),
                op: IrBinaryOp::Mul,
                lhs: Operand::reg("%0", i32t.clone()),
                rhs: Operand::reg("%0", i32t.clone()),
            },
            Instruction::Ret {
                value: Some(Operand::reg("%1", i32t)),
            },
        ]);

        assert!(DefUse::compute(&func).is_err());
    }

    #[test]
    fn test_alloca_may_have_many_uses() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let p32 = pool.ptr_to(i32t.clone());
        let func = single_block(vec![
            Instruction::Alloca {
                result: Register::new("%0", p32.clone()),
                ty: i32t.clone(),
            },
            Instruction::Store {
                value: Operand::int(1, i32t.clone()),
                ptr: Operand::reg("%0", p32.clone()),
            },
            Instruction::Load {
                result: Register::new("%1", i32t.clone()),
                ptr: Operand::reg("%0", p32),
            },
            Instruction::Ret {
                value: Some(Operand::reg("%1", i32t)),
            },
        ]);

        let du = DefUse::compute(&func).unwrap();
        assert!(du.is_alloca("%0"));
        assert_eq!(du.use_count("%0"), 2);
    }

    #[test]
    fn test_undefined_use_rejected() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let func = single_block(vec![Instruction::Ret {
            value: Some(Operand::reg("%7", i32t)),
        }]);

        assert!(DefUse::compute(&func).is_err());
    }

    #[test]
    fn test_globals_exempt() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let p32 = pool.ptr_to(i32t.clone());
        let func = single_block(vec![
            Instruction::Load {
                result: Register::new("%0", i32t.clone()),
                ptr: Operand::reg("@g", p32.clone()),
            },
            Instruction::Load {
                result: Register::new("%1", i32t.clone()),
                ptr: Operand::reg("@g", p32),
            },
            Instruction::Binary {
                result: Register::new("%2", i32t.clone()),
                op: IrBinaryOp::Add,
                lhs: Operand::reg("%0", i32t.clone()),
                rhs: Operand::reg("%1", i32t.clone()),
            },
            Instruction::Ret {
                value: Some(Operand::reg("%2", i32t)),
            },
        ]);

        let du = DefUse::compute(&func).unwrap();
        assert_eq!(du.use_count("@g"), 0);
    }
}
