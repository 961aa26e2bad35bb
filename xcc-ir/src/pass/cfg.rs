//! Control-flow graph construction
//!
//! Successor and predecessor maps are read off each block's
//! terminator. `br` contributes one or two edges, `switch` one edge
//! per distinct target, `ret` none.

use crate::function::Function;
use crate::instructions::BlockLabel;
use std::collections::HashMap;
use xcc_common::CompilerError;

/// Per-function successor/predecessor maps
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    succ: HashMap<BlockLabel, Vec<BlockLabel>>,
    pred: HashMap<BlockLabel, Vec<BlockLabel>>,
}

impl FlowGraph {
    /// Build the graph for a function. Every block must carry exactly
    /// one terminator; anything else is an IR consistency bug.
    pub fn compute(func: &Function) -> Result<FlowGraph, CompilerError> {
        let mut graph = FlowGraph::default();
        for block in &func.blocks {
            graph.succ.entry(block.label).or_default();
            graph.pred.entry(block.label).or_default();
        }

        for block in &func.blocks {
            let term = block.terminator().ok_or_else(|| {
                CompilerError::internal(format!(
                    "block L{} of '{}' has no terminator",
                    block.label, func.name
                ))
            })?;
            let mut seen = Vec::new();
            for target in term.targets() {
                if seen.contains(&target) {
                    continue;
                }
                seen.push(target);
                if func.get_block(target).is_none() {
                    return Err(CompilerError::internal(format!(
                        "block L{} of '{}' branches to missing block L{}",
                        block.label, func.name, target
                    )));
                }
                graph.succ.entry(block.label).or_default().push(target);
                graph.pred.entry(target).or_default().push(block.label);
            }
        }
        Ok(graph)
    }

    pub fn successors(&self, label: BlockLabel) -> &[BlockLabel] {
        self.succ.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, label: BlockLabel) -> &[BlockLabel] {
        self.pred.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BasicBlock;
    use crate::instructions::Instruction;
    use crate::types::TypePool;
    use crate::values::{IntConst, Operand};

    /// A diamond: 0 -> {1, 2} -> 3
    fn diamond() -> Function {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let fty = pool.func_of(i32t.clone(), vec![], false);
        let mut func = Function::new("f", fty);

        let mut entry = BasicBlock::new(0);
        entry.push(Instruction::CondBr {
            cond: Operand::reg("%9", pool.bool()),
            then_blk: 1,
            else_blk: 2,
        });
        func.add_block(entry);

        for label in [1, 2] {
            let mut blk = BasicBlock::new(label);
            blk.push(Instruction::Br { target: 3 });
            func.add_block(blk);
        }

        let mut exit = BasicBlock::new(3);
        exit.push(Instruction::Ret {
            value: Some(Operand::int(0, i32t)),
        });
        func.add_block(exit);
        func
    }

    #[test]
    fn test_diamond_edges() {
        let func = diamond();
        let cfg = FlowGraph::compute(&func).unwrap();

        assert_eq!(cfg.successors(0), &[1, 2]);
        assert_eq!(cfg.successors(1), &[3]);
        assert_eq!(cfg.successors(3), &[] as &[u32]);
        assert_eq!(cfg.predecessors(3), &[1, 2]);
        assert_eq!(cfg.predecessors(0), &[] as &[u32]);
    }

    #[test]
    fn test_switch_targets_deduplicated() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let fty = pool.func_of(i32t.clone(), vec![], false);
        let mut func = Function::new("f", fty);

        let mut entry = BasicBlock::new(0);
        entry.push(Instruction::Switch {
            value: Operand::reg("%9", i32t.clone()),
            default: 1,
            cases: vec![
                (IntConst::new(1, i32t.clone()), 1),
                (IntConst::new(2, i32t.clone()), 1),
            ],
        });
        func.add_block(entry);

        let mut exit = BasicBlock::new(1);
        exit.push(Instruction::Ret {
            value: Some(Operand::int(0, i32t)),
        });
        func.add_block(exit);

        let cfg = FlowGraph::compute(&func).unwrap();
        assert_eq!(cfg.successors(0), &[1]);
        assert_eq!(cfg.predecessors(1), &[0]);
    }

    #[test]
    fn test_missing_terminator_is_internal_error() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let fty = pool.func_of(i32t, vec![], false);
        let mut func = Function::new("f", fty);
        func.add_block(BasicBlock::new(0));

        assert!(FlowGraph::compute(&func).is_err());
    }
}
