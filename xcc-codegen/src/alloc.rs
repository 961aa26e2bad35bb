//! 3-TOSCA register allocation
//!
//! Three callee-saved integer registers `{rbx, r12, r13}` and three
//! vector registers `{xmm8, xmm9, xmm10}` rotate as a cache of
//! temporaries. Binding a virtual register takes a spare slot; the
//! register's single use releases it immediately. When all three
//! slots of a class are taken, the longest-held binding moves to a
//! fresh stack slot.
//!
//! The whole scheme leans on the builder's guarantee that every
//! non-alloca register is assigned once and used exactly once: at the
//! moment of use the binding is observably last-touched, so releasing
//! it is sound. Running this allocator on IR whose uses have been
//! duplicated or renamed across blocks is undefined; the def-use
//! results are required as a checked precondition.

use crate::sysv::{ArgLoc, SysVConv};
use crate::x64::{RegTag, X64};
use crate::CodegenError;
use std::collections::{BTreeSet, HashMap, VecDeque};
use xcc_ir::pass::DefUse;
use xcc_ir::{Function, Instruction, Operand};

/// The finished binding map for one function
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    map: HashMap<String, X64>,
    /// Bytes of locals and spill slots below the saved registers
    pub frame_size: u64,
    /// Callee-saved registers handed out at least once, in first-use
    /// order; drives the prologue/epilogue save set
    pub used_callee_saved: Vec<RegTag>,
}

impl Allocation {
    /// The bound location of any operand: constants become
    /// immediates, globals rip-relative labels, locals whatever the
    /// rotation assigned
    pub fn location_of(&self, op: &Operand) -> Result<X64, CodegenError> {
        match op {
            Operand::Int(c) => Ok(X64::Imm(c.as_i64() as u64)),
            Operand::Float(c) => Ok(X64::Imm(c.bits())),
            Operand::Reg(r) if r.is_global() => Ok(X64::Label(r.symbol().to_string())),
            Operand::Reg(r) => self
                .map
                .get(&r.name)
                .cloned()
                .ok_or_else(|| CodegenError::Unbound(r.name.clone())),
        }
    }

    pub fn reg_location(&self, name: &str) -> Result<X64, CodegenError> {
        self.map
            .get(name)
            .cloned()
            .ok_or_else(|| CodegenError::Unbound(name.to_string()))
    }
}

const INT_ROTATION: [RegTag; 3] = [RegTag::Rbx, RegTag::R12, RegTag::R13];
const FLOAT_ROTATION: [RegTag; 3] = [RegTag::Xmm8, RegTag::Xmm9, RegTag::Xmm10];

pub struct SimpleAlloc<'a> {
    du: &'a DefUse,
    map: HashMap<String, X64>,
    stack: u64,
    int_spare: BTreeSet<RegTag>,
    float_spare: BTreeSet<RegTag>,
    /// Names currently bound to a rotation register, oldest first
    int_active: VecDeque<String>,
    float_active: VecDeque<String>,
    used_callee_saved: Vec<RegTag>,
}

impl<'a> SimpleAlloc<'a> {
    /// Bind every register of a function. `du` must come from the
    /// same, unmodified function.
    pub fn allocate(func: &Function, du: &'a DefUse) -> Result<Allocation, CodegenError> {
        let mut alloc = SimpleAlloc {
            du,
            map: HashMap::new(),
            stack: 0,
            int_spare: INT_ROTATION.into_iter().collect(),
            float_spare: FLOAT_ROTATION.into_iter().collect(),
            int_active: VecDeque::new(),
            float_active: VecDeque::new(),
            used_callee_saved: Vec::new(),
        };

        alloc.bind_params(func);
        for block in &func.blocks {
            for instr in &block.instrs {
                alloc.visit(instr)?;
            }
        }

        Ok(Allocation {
            map: alloc.map,
            frame_size: make_align(alloc.stack, 16),
            used_callee_saved: alloc.used_callee_saved,
        })
    }

    /// Parameters land where System V delivers them: the first six
    /// integer and eight floating parameters in their argument
    /// registers, the rest at positive offsets from the incoming
    /// frame (return address at `8(%rbp)`, first overflow parameter
    /// at `16(%rbp)`).
    fn bind_params(&mut self, func: &Function) {
        let conv = SysVConv::classify(func.param_types());
        for (param, loc) in func.params.iter().zip(conv.locs) {
            let bound = match loc {
                ArgLoc::IntReg(r) | ArgLoc::FloatReg(r) => X64::Reg(r),
                ArgLoc::Stack { offset } => X64::Slot {
                    offset: 16 + offset,
                },
            };
            self.map.insert(param.name.clone(), bound);
        }
    }

    fn visit(&mut self, instr: &Instruction) -> Result<(), CodegenError> {
        if matches!(instr, Instruction::Phi { .. }) {
            return Err(CodegenError::Precondition(
                "phi instructions cannot be allocated".to_string(),
            ));
        }

        // every operand use is the register's last (and only) touch,
        // so its slot goes spare right here
        for op in instr.operands() {
            if let Operand::Reg(reg) = op {
                if !reg.is_global() && !self.du.is_alloca(&reg.name) {
                    self.release(&reg.name)?;
                }
            }
        }

        // xmm registers are caller-saved: float bindings that live
        // across the call move to the stack now
        if matches!(instr, Instruction::Call { .. }) {
            self.spill_floats_for_call();
        }

        match instr {
            Instruction::Alloca { result, ty } => {
                let offset = self.alloc_stack(ty.size().max(1), ty.align().max(1));
                self.map.insert(result.name.clone(), X64::Addr { offset });
            }
            _ => {
                if let Some(result) = instr.result() {
                    if self.du.use_count(&result.name) == 0 {
                        return Err(CodegenError::Precondition(format!(
                            "register {} has no use", result.name
                        )));
                    }
                    self.bind(result.name.clone(), result.ty.is_float());
                }
            }
        }
        Ok(())
    }

    fn bind(&mut self, name: String, float: bool) {
        let spare_empty = if float {
            self.float_spare.is_empty()
        } else {
            self.int_spare.is_empty()
        };
        if spare_empty {
            self.evict_oldest(float);
        }

        let tag = if float {
            let tag = *self.float_spare.iter().next().expect("spare register");
            self.float_spare.remove(&tag);
            self.float_active.push_back(name.clone());
            tag
        } else {
            let tag = *self.int_spare.iter().next().expect("spare register");
            self.int_spare.remove(&tag);
            self.int_active.push_back(name.clone());
            tag
        };

        log::trace!("bound {name} to {tag}");
        self.map.insert(name, X64::Reg(tag));

        if tag.is_callee_saved() && !self.used_callee_saved.contains(&tag) {
            self.used_callee_saved.push(tag);
        }
    }

    /// All three slots taken: the longest-held binding moves to a
    /// fresh stack slot and its register goes spare
    fn evict_oldest(&mut self, float: bool) {
        let victim = if float {
            self.float_active.pop_front()
        } else {
            self.int_active.pop_front()
        }
        .expect("rotation full but no active binding");

        let tag = match self.map.get(&victim) {
            Some(X64::Reg(tag)) => *tag,
            _ => unreachable!("active binding is not in a register"),
        };
        let offset = self.alloc_stack(8, 8);
        log::trace!("evicting {victim} from {tag} to {offset}(%rbp)");
        self.map.insert(victim, X64::Slot { offset });
        if float {
            self.float_spare.insert(tag);
        } else {
            self.int_spare.insert(tag);
        }
    }

    fn release(&mut self, name: &str) -> Result<(), CodegenError> {
        let loc = self
            .map
            .get(name)
            .ok_or_else(|| CodegenError::Unbound(name.to_string()))?;
        if let X64::Reg(tag) = *loc {
            if INT_ROTATION.contains(&tag) {
                self.int_spare.insert(tag);
                self.int_active.retain(|n| n != name);
            } else if FLOAT_ROTATION.contains(&tag) {
                self.float_spare.insert(tag);
                self.float_active.retain(|n| n != name);
            }
            // parameter registers fall out of scope on their own
        }
        Ok(())
    }

    fn spill_floats_for_call(&mut self) {
        while let Some(name) = self.float_active.pop_front() {
            let tag = match self.map.get(&name) {
                Some(X64::Reg(tag)) => *tag,
                _ => continue,
            };
            let offset = self.alloc_stack(8, 8);
            self.map.insert(name, X64::Slot { offset });
            self.float_spare.insert(tag);
        }
    }

    fn alloc_stack(&mut self, size: u64, align: u64) -> i64 {
        self.stack = round_up(self.stack, align) + size;
        -(self.stack as i64)
    }
}

fn round_up(v: u64, align: u64) -> u64 {
    v.div_ceil(align) * align
}

/// The frame padding rule: land `base + 16` on an `align` boundary
fn make_align(base: u64, align: u64) -> u64 {
    if (base + 16) % align == 0 {
        base
    } else {
        (base + 16) + align - (base + 16) % align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcc_common::ErrorReporter;
    use xcc_frontend::Frontend;
    use xcc_ir::lower_to_ir;

    fn allocate_fn(src: &str, name: &str) -> (Allocation, Function) {
        let unit = Frontend::parse_source(src, "test.c").unwrap();
        let mut reporter = ErrorReporter::new();
        let module = lower_to_ir(&unit, "test", &mut reporter).unwrap();
        assert!(!reporter.has_errors(), "{:?}", reporter.diagnostics());
        let func = module.get_function(name).unwrap().clone();
        let du = DefUse::compute(&func).unwrap();
        let alloc = SimpleAlloc::allocate(&func, &du).unwrap();
        (alloc, func)
    }

    #[test]
    fn test_allocas_go_to_stack() {
        let (alloc, func) = allocate_fn("int f(void) { int a = 1; return a; }", "f");
        let alloca = func
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .find_map(|i| match i {
                Instruction::Alloca { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        match alloc.reg_location(&alloca.name).unwrap() {
            X64::Addr { offset } => assert!(offset < 0),
            other => panic!("expected stack address, got {other:?}"),
        }
        assert_eq!(alloc.frame_size % 16, 0);
    }

    #[test]
    fn test_rotation_prefers_rbx_first() {
        let (alloc, func) = allocate_fn("int f(int x) { return x + 1; }", "f");
        // the load of x is the first rotation binding
        let load = func
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .find_map(|i| match i {
                Instruction::Load { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            alloc.reg_location(&load.name).unwrap(),
            X64::Reg(RegTag::Rbx)
        );
        assert!(alloc.used_callee_saved.contains(&RegTag::Rbx));
    }

    #[test]
    fn test_params_bound_per_sysv() {
        let (alloc, func) = allocate_fn(
            "long f(long a, long b, long c, long d, long e, long g, long h) { return a + h; }",
            "f",
        );
        assert_eq!(
            alloc.reg_location(&func.params[0].name).unwrap(),
            X64::Reg(RegTag::Rdi)
        );
        assert_eq!(
            alloc.reg_location(&func.params[5].name).unwrap(),
            X64::Reg(RegTag::R9)
        );
        // seventh parameter: first overflow slot above the frame
        assert_eq!(
            alloc.reg_location(&func.params[6].name).unwrap(),
            X64::Slot { offset: 16 }
        );
    }

    #[test]
    fn test_constants_and_globals_bind_directly() {
        let (alloc, _) = allocate_fn("int g; int f(void) { return g; }", "f");
        let mut pool = xcc_ir::TypePool::new();
        let i32t = pool.int(32, true);
        let c = Operand::int(7, i32t.clone());
        assert_eq!(alloc.location_of(&c).unwrap(), X64::Imm(7));

        let p = pool.ptr_to(i32t);
        let g = Operand::reg("@g", p);
        assert_eq!(
            alloc.location_of(&g).unwrap(),
            X64::Label("g".to_string())
        );
    }

    #[test]
    fn test_phi_rejected() {
        let mut pool = xcc_ir::TypePool::new();
        let i32t = pool.int(32, true);
        let fty = pool.func_of(i32t.clone(), vec![], false);
        let mut func = Function::new("f", fty);
        let mut blk = xcc_ir::BasicBlock::new(0);
        blk.push(Instruction::Phi {
            result: xcc_ir::Register::new("%0", i32t.clone()),
            incoming: vec![],
        });
        blk.push(Instruction::Ret {
            value: Some(Operand::reg("%0", i32t)),
        });
        func.add_block(blk);

        // def-use itself accepts the phi; the allocator refuses it
        let du = DefUse::compute(&func).unwrap();
        assert!(matches!(
            SimpleAlloc::allocate(&func, &du),
            Err(CodegenError::Precondition(_))
        ));
    }

    #[test]
    fn test_fourth_live_temporary_spills() {
        // the nested sums keep four integer temporaries live at once,
        // one more than the rotation holds
        let (alloc, func) = allocate_fn(
            "int f(int a, int b, int c, int d, int e, int g, int h, int i) {
                return ((a + b) + (c + d)) + ((e + g) + (h + i));
            }",
            "f",
        );
        let spilled: Vec<_> = func
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .filter_map(|i| i.result())
            .filter(|r| {
                !r.ty.is_pointer()
                    && matches!(
                        alloc.reg_location(&r.name),
                        Ok(X64::Slot { offset }) if offset < 0
                    )
            })
            .collect();
        assert!(!spilled.is_empty(), "expected at least one spill");
        for reg in spilled {
            match alloc.reg_location(&reg.name).unwrap() {
                X64::Slot { offset } => assert_eq!(offset.unsigned_abs() % 8, 0),
                _ => unreachable!(),
            }
        }
        assert_eq!(alloc.frame_size % 16, 0);
        assert!(alloc.frame_size >= 8);
    }

    #[test]
    fn test_float_bindings_spill_across_calls() {
        // xmm registers are caller-saved, so a float value live
        // across the call moves to the stack
        let (alloc, func) = allocate_fn(
            "extern double h(void);\ndouble f(double a) { double x = a * 2.0; return x + h(); }",
            "f",
        );
        let call_pos = func
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .position(|i| matches!(i, Instruction::Call { .. }))
            .expect("call instruction");
        // the load of x feeding the final add is defined before the
        // call and used after it
        let crossing = func
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .take(call_pos)
            .filter_map(|i| i.result())
            .filter(|r| r.ty.is_float())
            .filter(|r| alloc.reg_location(&r.name).is_ok())
            .collect::<Vec<_>>();
        assert!(crossing
            .iter()
            .any(|r| matches!(alloc.reg_location(&r.name), Ok(X64::Slot { .. }))));
    }

    #[test]
    fn test_frame_alignment_rule() {
        assert_eq!(make_align(0, 16), 0);
        assert_eq!(make_align(16, 16), 16);
        // 8 bytes of slots pad out to a 16-byte boundary
        let padded = make_align(8, 16);
        assert!(padded >= 8);
        assert_eq!((padded + 16) % 16, 0);
    }
}
