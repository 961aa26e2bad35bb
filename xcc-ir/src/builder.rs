//! Function-level IR construction
//!
//! [`FuncBuilder`] owns the function being built and a cursor into
//! its current block. Register names and block labels are issued by
//! one monotonic counter. Branches whose target is not yet known
//! (`return`, `goto`) are inserted with a pending target and patched
//! at function epilog.

use crate::blocks::BasicBlock;
use crate::function::Function;
use crate::instructions::{BlockLabel, Instruction};
use crate::ops::{Condition, ConvOp, IrBinaryOp};
use crate::types::{IrType, TypeRef};
use crate::values::{IntConst, Operand, Register};
use std::collections::HashMap;
use xcc_common::{CompilerError, SourceLocation};

/// Position of an inserted instruction: (block label, index)
pub type InstrSite = (BlockLabel, usize);

/// Placeholder for a branch target patched later
const PENDING: BlockLabel = BlockLabel::MAX;

#[derive(Debug)]
pub struct FuncBuilder {
    func: Function,
    cur: Option<BlockLabel>,
    counter: u32,
    /// Branch sites emitted by `return`, patched to the terminal block
    ret_sites: Vec<InstrSite>,
    /// Branch sites emitted by `goto`, keyed by label name
    goto_sites: Vec<(InstrSite, String, SourceLocation)>,
    /// Source label name to block label
    labels: HashMap<String, BlockLabel>,
}

impl FuncBuilder {
    pub fn new(func: Function) -> Self {
        Self {
            func,
            cur: None,
            counter: 0,
            ret_sites: Vec::new(),
            goto_sites: Vec::new(),
            labels: HashMap::new(),
        }
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        &mut self.func
    }

    fn fresh_index(&mut self) -> u32 {
        let n = self.counter;
        self.counter += 1;
        n
    }

    /// Issue a fresh `%N` register of the given type
    pub fn new_reg(&mut self, ty: TypeRef) -> Register {
        let n = self.fresh_index();
        Register::new(format!("%{n}"), ty)
    }

    /// Append a new block and return its label; the cursor is not
    /// moved.
    pub fn new_block(&mut self) -> BlockLabel {
        let label = self.fresh_index();
        self.func.add_block(BasicBlock::new(label));
        label
    }

    pub fn switch_to(&mut self, label: BlockLabel) {
        debug_assert!(self.func.get_block(label).is_some());
        self.cur = Some(label);
    }

    pub fn current_block(&self) -> Option<BlockLabel> {
        self.cur
    }

    pub fn current_has_terminator(&self) -> bool {
        self.cur
            .and_then(|l| self.func.get_block(l))
            .is_some_and(BasicBlock::has_terminator)
    }

    /// Insert an instruction at the cursor. Instructions arriving
    /// after a terminator open a fresh (unreachable) block so that
    /// the one-terminator-per-block invariant holds.
    pub fn insert(&mut self, instr: Instruction) -> Result<InstrSite, CompilerError> {
        if self.cur.is_none() || self.current_has_terminator() {
            let label = self.new_block();
            self.cur = Some(label);
        }
        let label = self.cur.unwrap();
        let block = self
            .func
            .get_block_mut(label)
            .ok_or_else(|| CompilerError::internal("builder cursor names a missing block"))?;
        block.push(instr);
        Ok((label, block.instrs.len() - 1))
    }

    fn instr_mut(&mut self, site: InstrSite) -> Result<&mut Instruction, CompilerError> {
        self.func
            .get_block_mut(site.0)
            .and_then(|b| b.instrs.get_mut(site.1))
            .ok_or_else(|| CompilerError::internal("stale instruction site"))
    }

    pub fn build_binary(
        &mut self,
        op: IrBinaryOp,
        lhs: Operand,
        rhs: Operand,
        ty: TypeRef,
    ) -> Result<Operand, CompilerError> {
        let result = self.new_reg(ty);
        self.insert(Instruction::Binary {
            result: result.clone(),
            op,
            lhs,
            rhs,
        })?;
        Ok(Operand::Reg(result))
    }

    pub fn build_icmp(
        &mut self,
        cond: Condition,
        lhs: Operand,
        rhs: Operand,
    ) -> Result<Operand, CompilerError> {
        let ty = self.func.types.bool();
        let result = self.new_reg(ty);
        self.insert(Instruction::Icmp {
            result: result.clone(),
            cond,
            lhs,
            rhs,
        })?;
        Ok(Operand::Reg(result))
    }

    pub fn build_fcmp(
        &mut self,
        cond: Condition,
        lhs: Operand,
        rhs: Operand,
    ) -> Result<Operand, CompilerError> {
        let ty = self.func.types.bool();
        let result = self.new_reg(ty);
        self.insert(Instruction::Fcmp {
            result: result.clone(),
            cond,
            lhs,
            rhs,
        })?;
        Ok(Operand::Reg(result))
    }

    pub fn build_alloca(&mut self, ty: TypeRef) -> Result<Register, CompilerError> {
        let ptr_ty = self.func.types.ptr_to(ty.clone());
        let result = self.new_reg(ptr_ty);
        self.insert(Instruction::Alloca {
            result: result.clone(),
            ty,
        })?;
        Ok(result)
    }

    pub fn build_load(&mut self, ptr: Operand) -> Result<Operand, CompilerError> {
        let value_ty = match &**ptr.ty() {
            IrType::Ptr { pointee } => pointee.clone(),
            other => {
                return Err(CompilerError::internal(format!(
                    "load through non-pointer type {other}"
                )))
            }
        };
        let result = self.new_reg(value_ty);
        self.insert(Instruction::Load {
            result: result.clone(),
            ptr,
        })?;
        Ok(Operand::Reg(result))
    }

    pub fn build_store(&mut self, value: Operand, ptr: Operand) -> Result<(), CompilerError> {
        self.insert(Instruction::Store { value, ptr })?;
        Ok(())
    }

    /// `result = base + index * sizeof(element)`. A pointer to an
    /// array yields a pointer to its element type (array decay).
    pub fn build_gep(&mut self, base: Operand, index: Operand) -> Result<Operand, CompilerError> {
        let result_ty = match &**base.ty() {
            IrType::Ptr { pointee } => match &**pointee {
                IrType::Array { elem, .. } => self.func.types.ptr_to(elem.clone()),
                _ => base.ty().clone(),
            },
            other => {
                return Err(CompilerError::internal(format!(
                    "geteleptr through non-pointer type {other}"
                )))
            }
        };
        let result = self.new_reg(result_ty);
        self.insert(Instruction::GetElePtr {
            result: result.clone(),
            base,
            index,
        })?;
        Ok(Operand::Reg(result))
    }

    pub fn build_convert(
        &mut self,
        op: ConvOp,
        value: Operand,
        target: TypeRef,
    ) -> Result<Operand, CompilerError> {
        let result = self.new_reg(target);
        self.insert(Instruction::Convert {
            result: result.clone(),
            op,
            value,
        })?;
        Ok(Operand::Reg(result))
    }

    pub fn build_call(
        &mut self,
        callee: Operand,
        args: Vec<Operand>,
        ret: TypeRef,
        want_value: bool,
    ) -> Result<Option<Operand>, CompilerError> {
        let result = if ret.is_void() || !want_value {
            None
        } else {
            Some(self.new_reg(ret))
        };
        self.insert(Instruction::Call {
            result: result.clone(),
            callee,
            args,
        })?;
        Ok(result.map(Operand::Reg))
    }

    pub fn build_br(&mut self, target: BlockLabel) -> Result<(), CompilerError> {
        self.insert(Instruction::Br { target })?;
        Ok(())
    }

    pub fn build_condbr(
        &mut self,
        cond: Operand,
        then_blk: BlockLabel,
        else_blk: BlockLabel,
    ) -> Result<(), CompilerError> {
        self.insert(Instruction::CondBr {
            cond,
            then_blk,
            else_blk,
        })?;
        Ok(())
    }

    pub fn build_select(
        &mut self,
        cond: Operand,
        tval: Operand,
        fval: Operand,
        ty: TypeRef,
    ) -> Result<Operand, CompilerError> {
        let result = self.new_reg(ty);
        self.insert(Instruction::Select {
            result: result.clone(),
            cond,
            tval,
            fval,
        })?;
        Ok(Operand::Reg(result))
    }

    pub fn build_switch(&mut self, value: Operand) -> Result<InstrSite, CompilerError> {
        self.insert(Instruction::Switch {
            value,
            default: PENDING,
            cases: Vec::new(),
        })
    }

    /// Append a case arm. Returns false when the constant duplicates
    /// an existing arm.
    pub fn add_switch_case(
        &mut self,
        site: InstrSite,
        value: IntConst,
        target: BlockLabel,
    ) -> Result<bool, CompilerError> {
        match self.instr_mut(site)? {
            Instruction::Switch { cases, .. } => {
                if cases.iter().any(|(c, _)| c.value == value.value) {
                    return Ok(false);
                }
                cases.push((value, target));
                Ok(true)
            }
            _ => Err(CompilerError::internal("case site is not a switch")),
        }
    }

    pub fn set_switch_default(
        &mut self,
        site: InstrSite,
        target: BlockLabel,
    ) -> Result<(), CompilerError> {
        match self.instr_mut(site)? {
            Instruction::Switch { default, .. } => {
                *default = target;
                Ok(())
            }
            _ => Err(CompilerError::internal("default site is not a switch")),
        }
    }

    /// Insert a branch whose target is filled in later
    fn pending_br(&mut self) -> Result<InstrSite, CompilerError> {
        self.insert(Instruction::Br { target: PENDING })
    }

    fn patch_br(&mut self, site: InstrSite, target: BlockLabel) -> Result<(), CompilerError> {
        match self.instr_mut(site)? {
            Instruction::Br { target: t } => {
                *t = target;
                Ok(())
            }
            _ => Err(CompilerError::internal("patched site is not a branch")),
        }
    }

    /// Branch to the terminal block on behalf of a `return`
    pub fn build_ret_br(&mut self) -> Result<(), CompilerError> {
        let site = self.pending_br()?;
        self.ret_sites.push(site);
        Ok(())
    }

    /// Branch to a source label, resolved at epilog
    pub fn build_goto(&mut self, label: &str, loc: SourceLocation) -> Result<(), CompilerError> {
        let site = self.pending_br()?;
        self.goto_sites.push((site, label.to_string(), loc));
        Ok(())
    }

    /// Bind a source label to a fresh block and move the cursor
    /// there. Returns `None` when the label was already bound.
    pub fn bind_label(&mut self, name: &str) -> Result<Option<BlockLabel>, CompilerError> {
        if self.labels.contains_key(name) {
            return Ok(None);
        }
        let label = self.new_block();
        if !self.current_has_terminator() && self.cur.is_some() {
            self.build_br(label)?;
        }
        self.switch_to(label);
        self.labels.insert(name.to_string(), label);
        Ok(Some(label))
    }

    /// Close the function: create the terminal block, patch return
    /// branches, resolve gotos, and give every unterminated block a
    /// fall-through branch to the terminal block. Unresolved labels
    /// are returned for reporting.
    pub fn epilog(&mut self) -> Result<Vec<(String, SourceLocation)>, CompilerError> {
        let terminal = self.new_block();
        self.switch_to(terminal);

        match self.func.return_slot.clone() {
            Some(slot) => {
                let value = self.build_load(Operand::Reg(slot))?;
                self.insert(Instruction::Ret { value: Some(value) })?;
            }
            None => {
                self.insert(Instruction::Ret { value: None })?;
            }
        }

        for site in std::mem::take(&mut self.ret_sites) {
            self.patch_br(site, terminal)?;
        }

        let mut unresolved = Vec::new();
        for (site, name, loc) in std::mem::take(&mut self.goto_sites) {
            match self.labels.get(&name).copied() {
                Some(target) => self.patch_br(site, target)?,
                None => {
                    // keep the branch well-formed even though the
                    // module will be rejected
                    self.patch_br(site, terminal)?;
                    unresolved.push((name, loc));
                }
            }
        }

        // blocks left open (loop exits at end of body, empty merge
        // blocks) fall through to the terminal block
        let open: Vec<BlockLabel> = self
            .func
            .blocks
            .iter()
            .filter(|b| b.label != terminal && !b.has_terminator())
            .map(|b| b.label)
            .collect();
        for label in open {
            self.func
                .get_block_mut(label)
                .unwrap()
                .push(Instruction::Br { target: terminal });
        }

        Ok(unresolved)
    }

    pub fn finish(self) -> Function {
        self.func
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypePool;

    fn int_func() -> (Function, TypeRef) {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let fty = pool.func_of(i32t.clone(), vec![], false);
        (Function::new("f", fty), i32t)
    }

    #[test]
    fn test_names_and_labels_share_counter() {
        let (func, i32t) = int_func();
        let mut b = FuncBuilder::new(func);

        let entry = b.new_block();
        b.switch_to(entry);
        let r = b.new_reg(i32t);

        assert_eq!(entry, 0);
        assert_eq!(r.name, "%1");
        assert_eq!(b.new_block(), 2);
    }

    #[test]
    fn test_ret_branches_resolve_to_terminal() {
        let (mut func, i32t) = int_func();
        func.return_slot = None;
        let mut b = FuncBuilder::new(func);

        let entry = b.new_block();
        b.switch_to(entry);
        b.build_ret_br().unwrap();

        let unresolved = b.epilog().unwrap();
        assert!(unresolved.is_empty());

        let func = b.finish();
        let entry = func.entry_block().unwrap();
        match entry.terminator().unwrap() {
            Instruction::Br { target } => {
                let terminal = func.get_block(*target).unwrap();
                assert!(matches!(
                    terminal.terminator().unwrap(),
                    Instruction::Ret { value: None }
                ));
            }
            other => panic!("expected br, got {other}"),
        }
        let _ = i32t;
    }

    #[test]
    fn test_unresolved_goto_reported() {
        let (func, _) = int_func();
        let mut b = FuncBuilder::new(func);

        let entry = b.new_block();
        b.switch_to(entry);
        b.build_goto("missing", SourceLocation::new_simple(1, 1)).unwrap();

        let unresolved = b.epilog().unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].0, "missing");
    }

    #[test]
    fn test_duplicate_case_detected() {
        let (func, i32t) = int_func();
        let mut b = FuncBuilder::new(func);
        let entry = b.new_block();
        b.switch_to(entry);

        let scrut = Operand::reg("%9", i32t.clone());
        let site = b.build_switch(scrut).unwrap();
        let blk = b.new_block();

        assert!(b
            .add_switch_case(site, IntConst::new(1, i32t.clone()), blk)
            .unwrap());
        assert!(!b
            .add_switch_case(site, IntConst::new(1, i32t), blk)
            .unwrap());
    }
}
