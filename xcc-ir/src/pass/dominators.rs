//! Dominator computation
//!
//! The implementation follows "A Simple, Fast Dominance Algorithm" by
//! Cooper, Harvey and Kennedy: blocks are numbered in postorder (the
//! entry receives the largest index), immediate dominators are found
//! by iterating a two-finger intersection to a fixed point, and the
//! full dominator sets are derived by climbing the idom chain.
//! Blocks unreachable from the entry are omitted.

use crate::function::Function;
use crate::instructions::BlockLabel;
use crate::pass::FlowGraph;
use std::collections::HashMap;
use xcc_common::CompilerError;

#[derive(Debug, Clone, Default)]
pub struct Dominators {
    /// Immediate dominator per reachable block; the entry maps to
    /// itself
    idom: HashMap<BlockLabel, BlockLabel>,
    /// Postorder index per reachable block
    postorder: HashMap<BlockLabel, usize>,
}

impl Dominators {
    pub fn compute(func: &Function, cfg: &FlowGraph) -> Result<Dominators, CompilerError> {
        let entry = func
            .entry_block()
            .map(|b| b.label)
            .ok_or_else(|| CompilerError::internal("dominators over an empty function"))?;

        // postorder via iterative DFS; the entry finishes last and so
        // receives the largest index
        let mut order: Vec<BlockLabel> = Vec::new();
        let mut postorder: HashMap<BlockLabel, usize> = HashMap::new();
        let mut visited: Vec<BlockLabel> = vec![entry];
        let mut stack: Vec<(BlockLabel, usize)> = vec![(entry, 0)];
        while let Some((block, child)) = stack.pop() {
            let succs = cfg.successors(block);
            if child < succs.len() {
                stack.push((block, child + 1));
                let next = succs[child];
                if !visited.contains(&next) {
                    visited.push(next);
                    stack.push((next, 0));
                }
            } else {
                postorder.insert(block, order.len());
                order.push(block);
            }
        }

        // index-keyed working arrays, per the paper
        let n = order.len();
        let entry_idx = n - 1;
        let mut idom: Vec<Option<usize>> = vec![None; n];
        idom[entry_idx] = Some(entry_idx);

        let intersect = |idom: &[Option<usize>], mut a: usize, mut b: usize| -> usize {
            while a != b {
                while a < b {
                    a = idom[a].expect("processed predecessor");
                }
                while b < a {
                    b = idom[b].expect("processed predecessor");
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            // reverse postorder, entry excluded
            for &block in order.iter().rev().skip(1) {
                let b_idx = postorder[&block];
                let mut new_idom: Option<usize> = None;
                for &pred in cfg.predecessors(block) {
                    let Some(&p_idx) = postorder.get(&pred) else {
                        continue; // unreachable predecessor
                    };
                    if idom[p_idx].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p_idx,
                        Some(cur) => intersect(&idom, p_idx, cur),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom[b_idx] != Some(new_idom) {
                        idom[b_idx] = Some(new_idom);
                        changed = true;
                    }
                }
            }
        }

        let mut idom_map = HashMap::new();
        for (idx, block) in order.iter().enumerate() {
            if let Some(d) = idom[idx] {
                idom_map.insert(*block, order[d]);
            }
        }
        Ok(Dominators {
            idom: idom_map,
            postorder,
        })
    }

    /// Immediate dominator of a block; the entry returns itself.
    /// `None` for blocks unreachable from the entry.
    pub fn idom(&self, block: BlockLabel) -> Option<BlockLabel> {
        self.idom.get(&block).copied()
    }

    pub fn is_reachable(&self, block: BlockLabel) -> bool {
        self.postorder.contains_key(&block)
    }

    /// All dominators of a block (the block itself included), derived
    /// by climbing the idom chain to the entry
    pub fn dominators_of(&self, block: BlockLabel) -> Vec<BlockLabel> {
        let mut doms = Vec::new();
        let mut cur = block;
        if !self.idom.contains_key(&cur) {
            return doms;
        }
        loop {
            doms.push(cur);
            let up = self.idom[&cur];
            if up == cur {
                return doms;
            }
            cur = up;
        }
    }

    /// Does `a` dominate `b`?
    pub fn dominates(&self, a: BlockLabel, b: BlockLabel) -> bool {
        self.dominators_of(b).contains(&a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BasicBlock;
    use crate::instructions::Instruction;
    use crate::types::TypePool;
    use crate::values::Operand;

    fn func_with_edges(n: u32, edges: &[(u32, Vec<u32>)]) -> Function {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let b = pool.bool();
        let fty = pool.func_of(i32t.clone(), vec![], false);
        let mut func = Function::new("f", fty);

        for label in 0..n {
            let mut blk = BasicBlock::new(label);
            let targets = edges
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, t)| t.clone())
                .unwrap_or_default();
            match targets.len() {
                0 => blk.push(Instruction::Ret {
                    value: Some(Operand::int(0, i32t.clone())),
                }),
                1 => blk.push(Instruction::Br { target: targets[0] }),
                _ => blk.push(Instruction::CondBr {
                    cond: Operand::reg(format!("%c{label}"), b.clone()),
                    then_blk: targets[0],
                    else_blk: targets[1],
                }),
            }
            func.add_block(blk);
        }
        func
    }

    #[test]
    fn test_diamond_idoms() {
        // A=0 -> {B=1, C=2} -> D=3
        let func = func_with_edges(4, &[(0, vec![1, 2]), (1, vec![3]), (2, vec![3])]);
        let cfg = FlowGraph::compute(&func).unwrap();
        let doms = Dominators::compute(&func, &cfg).unwrap();

        assert_eq!(doms.idom(0), Some(0));
        assert_eq!(doms.idom(1), Some(0));
        assert_eq!(doms.idom(2), Some(0));
        assert_eq!(doms.idom(3), Some(0));
    }

    #[test]
    fn test_chain_dominator_sets() {
        // 0 -> 1 -> 2
        let func = func_with_edges(3, &[(0, vec![1]), (1, vec![2])]);
        let cfg = FlowGraph::compute(&func).unwrap();
        let doms = Dominators::compute(&func, &cfg).unwrap();

        assert_eq!(doms.idom(2), Some(1));
        let mut set = doms.dominators_of(2);
        set.sort_unstable();
        assert_eq!(set, vec![0, 1, 2]);
        assert!(doms.dominates(0, 2));
        assert!(!doms.dominates(2, 0));
    }

    #[test]
    fn test_loop_idoms() {
        // 0 -> 1 (cond) -> {2 (body), 3 (exit)}; 2 -> 1
        let func = func_with_edges(
            4,
            &[(0, vec![1]), (1, vec![2, 3]), (2, vec![1])],
        );
        let cfg = FlowGraph::compute(&func).unwrap();
        let doms = Dominators::compute(&func, &cfg).unwrap();

        assert_eq!(doms.idom(1), Some(0));
        assert_eq!(doms.idom(2), Some(1));
        assert_eq!(doms.idom(3), Some(1));
    }

    #[test]
    fn test_unreachable_block_omitted() {
        // block 2 has no incoming edge
        let func = func_with_edges(3, &[(0, vec![1])]);
        let cfg = FlowGraph::compute(&func).unwrap();
        let doms = Dominators::compute(&func, &cfg).unwrap();

        assert!(doms.is_reachable(1));
        assert!(!doms.is_reachable(2));
        assert_eq!(doms.idom(2), None);
        assert!(doms.dominators_of(2).is_empty());
    }
}
