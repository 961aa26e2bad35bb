//! AT&T assembly emission
//!
//! Walks blocks in layout order and prints the minimal sequence for
//! each allocated instruction. Scratch traffic goes through `r10`,
//! `r11` and `xmm11`/`xmm12`; `rax`/`rdx` keep their fixed roles in
//! division and `rcx` holds variable shift counts. Spilled operands
//! are reloaded on use and spilled results stored on definition.

use crate::alloc::{Allocation, SimpleAlloc};
use crate::sysv::{ArgLoc, SysVConv};
use crate::x64::{RegTag, X64};
use crate::CodegenError;
use xcc_ir::pass::DefUse;
use xcc_ir::{
    BlockLabel, Condition, ConvOp, Function, GlobalVar, InitTree, Instruction, IrBinaryOp, IrType,
    Module, Operand, Symbol,
};

/// Emit a whole module as one assembly file
pub fn emit_module(module: &Module) -> Result<String, CodegenError> {
    let mut out = String::new();
    for sym in module.symbols() {
        match sym {
            Symbol::Global(var) => emit_global(&mut out, var),
            Symbol::Func(func) if !func.is_external() => {
                log::debug!("emitting function '{}'", func.name);
                let du = DefUse::compute(func)
                    .map_err(|e| CodegenError::Precondition(e.to_string()))?;
                let alloc = SimpleAlloc::allocate(func, &du)?;
                Emitter::new(func, alloc, &mut out).run()?;
            }
            Symbol::Func(_) => {}
        }
    }
    Ok(out)
}

fn emit_global(out: &mut String, var: &GlobalVar) {
    if var.is_extern {
        return;
    }
    let size = var.ty.size().max(1);
    let align = var.ty.align().max(1);

    let Some(init) = &var.init else {
        // zero-initialized storage
        if var.is_static {
            out.push_str(&format!("    .local {}\n", var.name));
        }
        out.push_str(&format!("    .comm {},{},{}\n", var.name, size, align));
        return;
    };

    out.push_str("    .data\n");
    if !var.is_static {
        out.push_str(&format!("    .globl {}\n", var.name));
    }
    out.push_str(&format!("    .align {align}\n"));
    out.push_str(&format!("{}:\n", var.name));
    match init {
        InitTree::Const(Operand::Int(c)) => {
            let directive = match c.ty.size().max(1) {
                1 => ".byte",
                2 => ".short",
                4 => ".long",
                _ => ".quad",
            };
            out.push_str(&format!("    {directive} {}\n", c.as_i64()));
        }
        InitTree::Const(Operand::Float(c)) => {
            if c.ty.size() == 4 {
                out.push_str(&format!("    .long {}\n", c.bits()));
            } else {
                out.push_str(&format!("    .quad {}\n", c.bits()));
            }
        }
        InitTree::Const(Operand::Reg(_)) => unreachable!("registers cannot initialize globals"),
        InitTree::Addr { base, offset } if *offset == 0 => {
            out.push_str(&format!("    .quad {base}\n"));
        }
        InitTree::Addr { base, offset } if *offset > 0 => {
            out.push_str(&format!("    .quad {base}+{offset}\n"));
        }
        InitTree::Addr { base, offset } => {
            out.push_str(&format!("    .quad {base}{offset}\n"));
        }
    }
}

struct Emitter<'a> {
    func: &'a Function,
    alloc: Allocation,
    out: &'a mut String,
    /// Bytes of pushed callee-saved registers; shifts rbp-relative
    /// locals down
    bias: i64,
    /// Bytes subtracted from rsp after the pushes
    frame: u64,
    /// Local-label counter for short branches inside one lowering
    local: u32,
}

impl<'a> Emitter<'a> {
    fn new(func: &'a Function, alloc: Allocation, out: &'a mut String) -> Self {
        let pushes = alloc.used_callee_saved.len() as u64;
        // rsp is 16-aligned after the prologue: odd push counts take
        // one extra 8-byte pad
        let frame = alloc.frame_size + if pushes % 2 == 1 { 8 } else { 0 };
        Self {
            bias: (pushes * 8) as i64,
            frame,
            func,
            alloc,
            out,
            local: 0,
        }
    }

    fn run(mut self) -> Result<(), CodegenError> {
        let func = self.func;
        self.raw("    .text\n");
        self.raw(&format!("    .globl {}\n", func.name));
        self.raw(&format!("{}:\n", func.name));
        self.line("pushq %rbp");
        self.line("movq %rsp, %rbp");
        let saved = self.alloc.used_callee_saved.clone();
        for tag in &saved {
            self.line(&format!("pushq {}", tag.name(8)));
        }
        if self.frame > 0 {
            self.line(&format!("subq ${}, %rsp", self.frame));
        }

        for block in &func.blocks {
            self.raw(&format!("{}:\n", self.block_label(block.label)));
            for instr in &block.instrs {
                self.emit_instr(instr)?;
            }
        }
        self.raw("\n");
        Ok(())
    }

    fn raw(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn line(&mut self, s: &str) {
        self.out.push_str("    ");
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn block_label(&self, label: BlockLabel) -> String {
        format!(".L{}_{}", self.func.name, label)
    }

    fn fresh_local(&mut self) -> u32 {
        self.local += 1;
        self.local
    }

    fn loc(&self, op: &Operand) -> Result<X64, CodegenError> {
        self.alloc.location_of(op)
    }

    fn opnd(&self, x: &X64, size: u64) -> String {
        x.operand(size, self.bias)
    }

    // ---- scratch moves -------------------------------------------------

    /// Move any integer-class location into a physical register
    fn load_int_to(&mut self, x: &X64, size: u64, dst: RegTag) {
        match x {
            X64::Imm(bits) => {
                let v = *bits as i64;
                if size == 8 && (v > i32::MAX as i64 || v < i32::MIN as i64) {
                    self.line(&format!("movabsq ${v}, {}", dst.name(8)));
                } else {
                    self.line(&format!("mov{} ${v}, {}", suffix(size), dst.name(size)));
                }
            }
            X64::Reg(r) => {
                if r != &dst {
                    self.line(&format!(
                        "mov{} {}, {}",
                        suffix(size),
                        r.name(size),
                        dst.name(size)
                    ));
                }
            }
            X64::Slot { .. } => {
                let mem = self.opnd(x, size);
                self.line(&format!("mov{} {}, {}", suffix(size), mem, dst.name(size)));
            }
            X64::Addr { .. } => {
                let mem = self.opnd(x, 8);
                self.line(&format!("leaq {}, {}", mem, dst.name(8)));
            }
            X64::Label(name) => {
                self.line(&format!("leaq {name}(%rip), {}", dst.name(8)));
            }
        }
    }

    /// Move any float-class location into an xmm register
    fn load_float_to(&mut self, x: &X64, size: u64, dst: RegTag) {
        match x {
            X64::Imm(bits) => {
                // float immediates are materialized through a GPR
                if size == 4 {
                    self.line(&format!("movl ${}, %r11d", *bits as u32));
                    self.line(&format!("movd %r11d, {}", dst.name(size)));
                } else {
                    self.line(&format!("movabsq ${}, %r11", *bits as i64));
                    self.line(&format!("movq %r11, {}", dst.name(size)));
                }
            }
            X64::Reg(r) => {
                if r != &dst {
                    self.line(&format!(
                        "movs{} {}, {}",
                        fsuffix(size),
                        r.name(size),
                        dst.name(size)
                    ));
                }
            }
            X64::Slot { .. } | X64::Label(_) => {
                let mem = self.opnd(x, size);
                self.line(&format!("movs{} {}, {}", fsuffix(size), mem, dst.name(size)));
            }
            X64::Addr { .. } => unreachable!("stack addresses are integer-class"),
        }
    }

    /// Store a physical register into a binding
    fn store_int_from(&mut self, src: RegTag, x: &X64, size: u64) -> Result<(), CodegenError> {
        match x {
            X64::Reg(r) => {
                if r != &src {
                    self.line(&format!(
                        "mov{} {}, {}",
                        suffix(size),
                        src.name(size),
                        r.name(size)
                    ));
                }
                Ok(())
            }
            X64::Slot { .. } => {
                let mem = self.opnd(x, size);
                self.line(&format!("mov{} {}, {}", suffix(size), src.name(size), mem));
                Ok(())
            }
            other => Err(CodegenError::Internal(format!(
                "cannot store a result into {other:?}"
            ))),
        }
    }

    fn store_float_from(&mut self, src: RegTag, x: &X64, size: u64) -> Result<(), CodegenError> {
        match x {
            X64::Reg(r) => {
                if r != &src {
                    self.line(&format!(
                        "movs{} {}, {}",
                        fsuffix(size),
                        src.name(size),
                        r.name(size)
                    ));
                }
                Ok(())
            }
            X64::Slot { .. } => {
                let mem = self.opnd(x, size);
                self.line(&format!("movs{} {}, {}", fsuffix(size), src.name(size), mem));
                Ok(())
            }
            other => Err(CodegenError::Internal(format!(
                "cannot store a result into {other:?}"
            ))),
        }
    }

    /// A memory operand dereferencing a pointer binding; may emit a
    /// reload into `r10`
    fn mem_through(&mut self, ptr: &X64) -> String {
        match ptr {
            X64::Addr { .. } => self.opnd(ptr, 8),
            X64::Label(name) => format!("{name}(%rip)"),
            X64::Reg(r) => format!("({})", r.name(8)),
            X64::Slot { .. } => {
                let mem = self.opnd(ptr, 8);
                self.line(&format!("movq {mem}, %r10"));
                "(%r10)".to_string()
            }
            X64::Imm(bits) => {
                self.line(&format!("movabsq ${}, %r10", *bits as i64));
                "(%r10)".to_string()
            }
        }
    }

    /// Render a location usable as the r/m side of an ALU op,
    /// spilling address-like locations through `r10`
    fn rm_or_imm(&mut self, x: &X64, size: u64) -> String {
        match x {
            X64::Imm(bits) => {
                let v = *bits as i64;
                if size == 8 && (v > i32::MAX as i64 || v < i32::MIN as i64) {
                    self.load_int_to(x, size, RegTag::R10);
                    RegTag::R10.name(size).to_string()
                } else {
                    format!("${v}")
                }
            }
            X64::Reg(r) => r.name(size).to_string(),
            X64::Slot { .. } => self.opnd(x, size),
            X64::Addr { .. } | X64::Label(_) => {
                self.load_int_to(x, size, RegTag::R10);
                RegTag::R10.name(size).to_string()
            }
        }
    }

    // ---- instructions --------------------------------------------------

    fn emit_instr(&mut self, instr: &Instruction) -> Result<(), CodegenError> {
        match instr {
            Instruction::Binary {
                result,
                op,
                lhs,
                rhs,
            } => {
                let dst = self.alloc.reg_location(&result.name)?;
                let size = result.ty.size().max(1);
                let l = self.loc(lhs)?;
                let r = self.loc(rhs)?;
                if op.is_float() {
                    self.emit_float_binary(*op, &l, &r, &dst, size)
                } else {
                    self.emit_int_binary(*op, &l, &r, &dst, size, result.ty.is_signed())
                }
            }
            Instruction::Icmp {
                result,
                cond,
                lhs,
                rhs,
            } => {
                let dst = self.alloc.reg_location(&result.name)?;
                let size = lhs.ty().size().max(1);
                let signed = lhs.ty().is_signed();
                let l = self.loc(lhs)?;
                let r = self.loc(rhs)?;

                // an immediate left side goes on the cmp's immediate
                // slot directly; the flags then describe rhs against
                // lhs, so the condition is swapped to compensate
                if let (X64::Imm(bits), X64::Reg(_) | X64::Slot { .. }) = (&l, &r) {
                    let imm = *bits as i64;
                    if size < 8 || (i32::MIN as i64..=i32::MAX as i64).contains(&imm) {
                        let rhs_rm = self.opnd(&r, size);
                        self.line(&format!("cmp{} ${imm}, {}", suffix(size), rhs_rm));
                        self.line(&format!("set{} %r11b", cc(cond.swapped(), signed)));
                        return self.store_int_from(RegTag::R11, &dst, 1);
                    }
                }

                self.load_int_to(&l, size, RegTag::R11);
                let rhs_rm = self.rm_or_imm(&r, size);
                self.line(&format!(
                    "cmp{} {}, {}",
                    suffix(size),
                    rhs_rm,
                    RegTag::R11.name(size)
                ));
                self.line(&format!("set{} %r11b", cc(*cond, signed)));
                self.store_int_from(RegTag::R11, &dst, 1)
            }
            Instruction::Fcmp {
                result,
                cond,
                lhs,
                rhs,
            } => {
                let dst = self.alloc.reg_location(&result.name)?;
                let size = lhs.ty().size().max(4);
                let l = self.loc(lhs)?;
                let r = self.loc(rhs)?;

                self.load_float_to(&l, size, RegTag::Xmm11);
                let rhs_rm = match &r {
                    X64::Reg(x) => x.name(size).to_string(),
                    X64::Slot { .. } | X64::Label(_) => self.opnd(&r, size),
                    _ => {
                        self.load_float_to(&r, size, RegTag::Xmm12);
                        RegTag::Xmm12.name(size).to_string()
                    }
                };
                self.line(&format!("ucomis{} {}, %xmm11", fsuffix(size), rhs_rm));
                self.line(&format!("set{} %r11b", cc(*cond, false)));
                self.store_int_from(RegTag::R11, &dst, 1)
            }
            Instruction::Alloca { .. } => Ok(()),
            Instruction::Load { result, ptr } => {
                let dst = self.alloc.reg_location(&result.name)?;
                let size = result.ty.size().max(1);
                let p = self.loc(ptr)?;
                let mem = self.mem_through(&p);
                if result.ty.is_float() {
                    self.line(&format!("movs{} {}, %xmm11", fsuffix(size), mem));
                    self.store_float_from(RegTag::Xmm11, &dst, size)
                } else {
                    self.line(&format!("mov{} {}, {}", suffix(size), mem, RegTag::R11.name(size)));
                    self.store_int_from(RegTag::R11, &dst, size)
                }
            }
            Instruction::Store { value, ptr } => {
                let size = value.ty().size().max(1);
                let v = self.loc(value)?;
                let p = self.loc(ptr)?;
                let mem = self.mem_through(&p);
                if value.ty().is_float() {
                    self.load_float_to(&v, size, RegTag::Xmm11);
                    self.line(&format!("movs{} %xmm11, {}", fsuffix(size), mem));
                } else {
                    match &v {
                        X64::Imm(bits) => {
                            let imm = *bits as i64;
                            if size == 8 && (imm > i32::MAX as i64 || imm < i32::MIN as i64) {
                                self.load_int_to(&v, size, RegTag::R11);
                                self.line(&format!("movq %r11, {mem}"));
                            } else {
                                self.line(&format!("mov{} ${imm}, {}", suffix(size), mem));
                            }
                        }
                        _ => {
                            self.load_int_to(&v, size, RegTag::R11);
                            self.line(&format!(
                                "mov{} {}, {}",
                                suffix(size),
                                RegTag::R11.name(size),
                                mem
                            ));
                        }
                    }
                }
                Ok(())
            }
            Instruction::GetElePtr {
                result,
                base,
                index,
            } => self.emit_gep(result, base, index),
            Instruction::Convert { result, op, value } => self.emit_convert(result, *op, value),
            Instruction::Call {
                result,
                callee,
                args,
            } => self.emit_call(result.as_ref(), callee, args),
            Instruction::Br { target } => {
                let label = self.block_label(*target);
                self.line(&format!("jmp {label}"));
                Ok(())
            }
            Instruction::CondBr {
                cond,
                then_blk,
                else_blk,
            } => {
                let then_label = self.block_label(*then_blk);
                let else_label = self.block_label(*else_blk);
                let c = self.loc(cond)?;
                match &c {
                    X64::Imm(bits) => {
                        let target = if *bits != 0 { then_label } else { else_label };
                        self.line(&format!("jmp {target}"));
                    }
                    X64::Reg(r) => {
                        self.line(&format!("cmpb $0, {}", r.name(1)));
                        self.line(&format!("jne {then_label}"));
                        self.line(&format!("jmp {else_label}"));
                    }
                    _ => {
                        let rm = self.opnd(&c, 1);
                        self.line(&format!("cmpb $0, {rm}"));
                        self.line(&format!("jne {then_label}"));
                        self.line(&format!("jmp {else_label}"));
                    }
                }
                Ok(())
            }
            Instruction::Ret { value } => self.emit_ret(value.as_ref()),
            Instruction::Switch {
                value,
                default,
                cases,
            } => {
                let size = value.ty().size().max(4);
                let v = self.loc(value)?;
                self.load_int_to(&v, size, RegTag::R11);
                for (case, target) in cases {
                    let target = self.block_label(*target);
                    let c = case.as_i64();
                    if size == 8 && (c > i32::MAX as i64 || c < i32::MIN as i64) {
                        self.line(&format!("movabsq ${c}, %r10"));
                        self.line("cmpq %r10, %r11");
                    } else {
                        self.line(&format!("cmp{} ${c}, {}", suffix(size), RegTag::R11.name(size)));
                    }
                    self.line(&format!("je {target}"));
                }
                let default = self.block_label(*default);
                self.line(&format!("jmp {default}"));
                Ok(())
            }
            Instruction::Select {
                result,
                cond,
                tval,
                fval,
            } => self.emit_select(result, cond, tval, fval),
            Instruction::Phi { .. } => Err(CodegenError::Precondition(
                "phi reached the emitter".to_string(),
            )),
        }
    }

    fn emit_int_binary(
        &mut self,
        op: IrBinaryOp,
        l: &X64,
        r: &X64,
        dst: &X64,
        size: u64,
        signed: bool,
    ) -> Result<(), CodegenError> {
        match op {
            IrBinaryOp::Div | IrBinaryOp::Mod => {
                self.load_int_to(l, size, RegTag::Rax);
                if signed {
                    self.line(if size == 8 { "cqto" } else { "cltd" });
                } else {
                    self.line("xorl %edx, %edx");
                }
                let divisor = match r {
                    X64::Reg(x) => x.name(size).to_string(),
                    X64::Slot { .. } => self.opnd(r, size),
                    _ => {
                        self.load_int_to(r, size, RegTag::R10);
                        RegTag::R10.name(size).to_string()
                    }
                };
                let mnemonic = if signed { "idiv" } else { "div" };
                self.line(&format!("{mnemonic}{} {divisor}", suffix(size)));
                let res = if matches!(op, IrBinaryOp::Div) {
                    RegTag::Rax
                } else {
                    RegTag::Rdx
                };
                self.store_int_from(res, dst, size)
            }
            IrBinaryOp::Shl | IrBinaryOp::Lshr | IrBinaryOp::Ashr => {
                let mnemonic = match op {
                    IrBinaryOp::Shl => "sal",
                    IrBinaryOp::Lshr => "shr",
                    _ => "sar",
                };
                self.load_int_to(l, size, RegTag::R11);
                match r {
                    X64::Imm(bits) => {
                        self.line(&format!(
                            "{mnemonic}{} ${}, {}",
                            suffix(size),
                            *bits as i64,
                            RegTag::R11.name(size)
                        ));
                    }
                    _ => {
                        self.load_int_to(r, size, RegTag::Rcx);
                        self.line(&format!(
                            "{mnemonic}{} %cl, {}",
                            suffix(size),
                            RegTag::R11.name(size)
                        ));
                    }
                }
                self.store_int_from(RegTag::R11, dst, size)
            }
            _ => {
                let mnemonic = match op {
                    IrBinaryOp::Add => "add",
                    IrBinaryOp::Sub => "sub",
                    IrBinaryOp::Mul => "imul",
                    IrBinaryOp::And => "and",
                    IrBinaryOp::Or => "or",
                    IrBinaryOp::Xor => "xor",
                    other => {
                        return Err(CodegenError::Internal(format!(
                            "{other} is not an integer op"
                        )))
                    }
                };
                // imul has no 8-bit two-operand form
                let size = if matches!(op, IrBinaryOp::Mul) && size < 2 { 4 } else { size };
                self.load_int_to(l, size, RegTag::R11);
                let rhs = self.rm_or_imm(r, size);
                self.line(&format!(
                    "{mnemonic}{} {}, {}",
                    suffix(size),
                    rhs,
                    RegTag::R11.name(size)
                ));
                self.store_int_from(RegTag::R11, dst, size)
            }
        }
    }

    fn emit_float_binary(
        &mut self,
        op: IrBinaryOp,
        l: &X64,
        r: &X64,
        dst: &X64,
        size: u64,
    ) -> Result<(), CodegenError> {
        let mnemonic = match op {
            IrBinaryOp::FAdd => "adds",
            IrBinaryOp::FSub => "subs",
            IrBinaryOp::FMul => "muls",
            IrBinaryOp::FDiv => "divs",
            other => {
                return Err(CodegenError::Internal(format!(
                    "{other} is not a float op"
                )))
            }
        };
        self.load_float_to(l, size, RegTag::Xmm11);
        let rhs = match r {
            X64::Reg(x) => x.name(size).to_string(),
            X64::Slot { .. } | X64::Label(_) => self.opnd(r, size),
            _ => {
                self.load_float_to(r, size, RegTag::Xmm12);
                RegTag::Xmm12.name(size).to_string()
            }
        };
        self.line(&format!("{mnemonic}{} {}, %xmm11", fsuffix(size), rhs));
        self.store_float_from(RegTag::Xmm11, dst, size)
    }

    fn emit_gep(
        &mut self,
        result: &xcc_ir::Register,
        base: &Operand,
        index: &Operand,
    ) -> Result<(), CodegenError> {
        let dst = self.alloc.reg_location(&result.name)?;
        let scale = match &*result.ty {
            IrType::Ptr { pointee } => pointee.size().max(1),
            _ => return Err(CodegenError::Internal("geteleptr result is not a pointer".into())),
        };
        let b = self.loc(base)?;
        let i = self.loc(index)?;

        if let X64::Imm(bits) = &i {
            let disp = (*bits as i64) * scale as i64;
            match &b {
                X64::Addr { offset } => {
                    let total = offset - self.bias + disp;
                    self.line(&format!("leaq {total}(%rbp), %r11"));
                }
                X64::Reg(r) => {
                    self.line(&format!("leaq {disp}({}), %r11", r.name(8)));
                }
                X64::Label(name) if disp >= 0 => {
                    self.line(&format!("leaq {name}+{disp}(%rip), %r11"));
                }
                X64::Label(name) => {
                    self.line(&format!("leaq {name}{disp}(%rip), %r11"));
                }
                _ => {
                    self.load_int_to(&b, 8, RegTag::R10);
                    self.line(&format!("leaq {disp}(%r10), %r11"));
                }
            }
            return self.store_int_from(RegTag::R11, &dst, 8);
        }

        self.load_int_to(&i, 8, RegTag::R11);
        let scale = if matches!(scale, 1 | 2 | 4 | 8) {
            scale
        } else {
            self.line(&format!("imulq ${scale}, %r11"));
            1
        };
        match &b {
            X64::Addr { offset } => {
                let off = offset - self.bias;
                self.line(&format!("leaq {off}(%rbp,%r11,{scale}), %r11"));
            }
            X64::Reg(r) => {
                self.line(&format!("leaq ({},%r11,{scale}), %r11", r.name(8)));
            }
            _ => {
                self.load_int_to(&b, 8, RegTag::R10);
                self.line(&format!("leaq (%r10,%r11,{scale}), %r11"));
            }
        }
        self.store_int_from(RegTag::R11, &dst, 8)
    }

    fn emit_convert(
        &mut self,
        result: &xcc_ir::Register,
        op: ConvOp,
        value: &Operand,
    ) -> Result<(), CodegenError> {
        let dst = self.alloc.reg_location(&result.name)?;
        let ds = result.ty.size().max(1);
        let ss = value.ty().size().max(1);
        let v = self.loc(value)?;

        match op {
            ConvOp::Trunc | ConvOp::Bitcast | ConvOp::PtrToI | ConvOp::IToPtr => {
                // plain move; the destination size selects the bits
                self.load_int_to(&v, ss.max(ds), RegTag::R11);
                self.store_int_from(RegTag::R11, &dst, ds)
            }
            ConvOp::Zext | ConvOp::Sext => {
                if let X64::Imm(_) = v {
                    self.load_int_to(&v, ds, RegTag::R11);
                    return self.store_int_from(RegTag::R11, &dst, ds);
                }
                let src_rm = self.rm_or_imm(&v, ss);
                let signed = matches!(op, ConvOp::Sext);
                match (ss, ds, signed) {
                    (4, 8, false) => {
                        // 32-bit moves zero the upper half
                        self.line(&format!("movl {src_rm}, %r11d"));
                    }
                    (4, 8, true) => {
                        self.line(&format!("movslq {src_rm}, %r11"));
                    }
                    _ => {
                        let m = if signed { "movs" } else { "movz" };
                        let pair = format!("{}{}", narrow_suffix(ss), suffix(ds));
                        self.line(&format!("{m}{pair} {src_rm}, {}", RegTag::R11.name(ds)));
                    }
                }
                self.store_int_from(RegTag::R11, &dst, ds)
            }
            ConvOp::Fext => {
                self.load_float_to(&v, 4, RegTag::Xmm11);
                self.line("cvtss2sd %xmm11, %xmm11");
                self.store_float_from(RegTag::Xmm11, &dst, 8)
            }
            ConvOp::Ftrunc => {
                self.load_float_to(&v, 8, RegTag::Xmm11);
                self.line("cvtsd2ss %xmm11, %xmm11");
                self.store_float_from(RegTag::Xmm11, &dst, 4)
            }
            ConvOp::StoF | ConvOp::UtoF => {
                // widen to 64 bits first, then convert
                match (&v, ss, matches!(op, ConvOp::StoF)) {
                    (X64::Imm(_), _, _) | (_, 8, _) => self.load_int_to(&v, 8, RegTag::R11),
                    (_, 4, true) => {
                        let rm = self.rm_or_imm(&v, 4);
                        self.line(&format!("movslq {rm}, %r11"));
                    }
                    (_, 4, false) => {
                        let rm = self.rm_or_imm(&v, 4);
                        self.line(&format!("movl {rm}, %r11d"));
                    }
                    (_, _, signed) => {
                        let rm = self.rm_or_imm(&v, ss);
                        let m = if signed { "movs" } else { "movz" };
                        self.line(&format!("{m}{}q {rm}, %r11", narrow_suffix(ss)));
                    }
                }
                self.line(&format!("cvtsi2s{}q %r11, %xmm11", fsuffix(ds)));
                self.store_float_from(RegTag::Xmm11, &dst, ds)
            }
            ConvOp::FtoS | ConvOp::FtoU => {
                self.load_float_to(&v, ss, RegTag::Xmm11);
                if matches!(op, ConvOp::FtoU) && ds == 8 {
                    // values at or above 2^63 do not survive the
                    // signed truncating convert; rebase them by 2^63
                    // and fold the bit back in afterwards
                    let two63_bits: u64 = if ss == 4 {
                        0x5F00_0000
                    } else {
                        0x43E0_0000_0000_0000
                    };
                    let small = self.fresh_local();
                    let done = self.fresh_local();
                    if ss == 4 {
                        self.line(&format!("movl ${two63_bits}, %r11d"));
                        self.line("movd %r11d, %xmm12");
                    } else {
                        self.line(&format!("movabsq ${two63_bits}, %r11"));
                        self.line("movq %r11, %xmm12");
                    }
                    self.line(&format!("ucomis{} %xmm12, %xmm11", fsuffix(ss)));
                    self.line(&format!("jb {small}f"));
                    self.line(&format!("subs{} %xmm12, %xmm11", fsuffix(ss)));
                    self.line(&format!("cvtts{}2siq %xmm11, %r11", fsuffix(ss)));
                    self.line(&format!("movabsq ${}, %r10", i64::MIN));
                    self.line("xorq %r10, %r11");
                    self.line(&format!("jmp {done}f"));
                    self.raw(&format!("{small}:\n"));
                    self.line(&format!("cvtts{}2siq %xmm11, %r11", fsuffix(ss)));
                    self.raw(&format!("{done}:\n"));
                } else {
                    self.line(&format!("cvtts{}2siq %xmm11, %r11", fsuffix(ss)));
                }
                self.store_int_from(RegTag::R11, &dst, ds)
            }
        }
    }

    fn emit_select(
        &mut self,
        result: &xcc_ir::Register,
        cond: &Operand,
        tval: &Operand,
        fval: &Operand,
    ) -> Result<(), CodegenError> {
        let dst = self.alloc.reg_location(&result.name)?;
        let size = result.ty.size().max(1);
        let c = self.loc(cond)?;
        let t = self.loc(tval)?;
        let f = self.loc(fval)?;

        if result.ty.is_float() {
            self.load_float_to(&f, size, RegTag::Xmm11);
            self.emit_cond_test(&c);
            let skip = self.fresh_local();
            self.line(&format!("je {skip}f"));
            self.load_float_to(&t, size, RegTag::Xmm11);
            self.raw(&format!("{skip}:\n"));
            return self.store_float_from(RegTag::Xmm11, &dst, size);
        }

        // cmov works on 32/64-bit registers only
        let csize = size.max(4);
        self.load_int_to(&f, size, RegTag::R11);
        self.load_int_to(&t, size, RegTag::R10);
        self.emit_cond_test(&c);
        self.line(&format!(
            "cmovne{} {}, {}",
            suffix(csize),
            RegTag::R10.name(csize),
            RegTag::R11.name(csize)
        ));
        self.store_int_from(RegTag::R11, &dst, size)
    }

    /// Set flags from an `i1` condition location
    fn emit_cond_test(&mut self, c: &X64) {
        match c {
            X64::Imm(bits) => {
                self.line(&format!("movb ${}, %al", *bits as i64));
                self.line("cmpb $0, %al");
            }
            X64::Reg(r) => {
                self.line(&format!("cmpb $0, {}", r.name(1)));
            }
            _ => {
                let rm = self.opnd(c, 1);
                self.line(&format!("cmpb $0, {rm}"));
            }
        }
    }

    fn emit_call(
        &mut self,
        result: Option<&xcc_ir::Register>,
        callee: &Operand,
        args: &[Operand],
    ) -> Result<(), CodegenError> {
        let arg_types: Vec<_> = args.iter().map(|a| a.ty().clone()).collect();
        let conv = SysVConv::classify(&arg_types);

        let variadic = match &**callee.ty() {
            IrType::Ptr { pointee } => matches!(&**pointee, IrType::Func { variadic: true, .. }),
            _ => false,
        };

        // overflow arguments are pushed right to left
        let stack_args: Vec<usize> = conv
            .locs
            .iter()
            .enumerate()
            .filter(|(_, l)| matches!(l, ArgLoc::Stack { .. }))
            .map(|(i, _)| i)
            .collect();
        let mut cleanup = 8 * stack_args.len() as u64;
        if stack_args.len() % 2 == 1 {
            self.line("subq $8, %rsp");
            cleanup += 8;
        }
        for &i in stack_args.iter().rev() {
            let loc = self.loc(&args[i])?;
            if args[i].ty().is_float() {
                let size = args[i].ty().size().max(4);
                self.load_float_to(&loc, size, RegTag::Xmm11);
                self.line("movq %xmm11, %r11");
            } else {
                self.load_int_to(&loc, 8, RegTag::R11);
            }
            self.line("pushq %r11");
        }

        for (i, arg_loc) in conv.locs.iter().enumerate() {
            let loc = self.loc(&args[i])?;
            let size = args[i].ty().size().max(1);
            match arg_loc {
                ArgLoc::IntReg(r) => self.load_int_to(&loc, size.max(4), *r),
                ArgLoc::FloatReg(x) => self.load_float_to(&loc, size, *x),
                ArgLoc::Stack { .. } => {}
            }
        }

        if variadic {
            self.line(&format!("movb ${}, %al", conv.vector_count));
        }

        match self.loc(callee)? {
            X64::Label(name) => self.line(&format!("call {name}")),
            X64::Reg(r) => self.line(&format!("call *{}", r.name(8))),
            other => {
                self.load_int_to(&other, 8, RegTag::R10);
                self.line("call *%r10");
            }
        }

        if cleanup > 0 {
            self.line(&format!("addq ${cleanup}, %rsp"));
        }

        if let Some(result) = result {
            let dst = self.alloc.reg_location(&result.name)?;
            let size = result.ty.size().max(1);
            if result.ty.is_float() {
                self.store_float_from(RegTag::Xmm0, &dst, size)?;
            } else {
                self.store_int_from(RegTag::Rax, &dst, size)?;
            }
        }
        Ok(())
    }

    fn emit_ret(&mut self, value: Option<&Operand>) -> Result<(), CodegenError> {
        if let Some(value) = value {
            let loc = self.loc(value)?;
            let size = value.ty().size().max(1);
            if value.ty().is_float() {
                self.load_float_to(&loc, size, RegTag::Xmm0);
            } else {
                self.load_int_to(&loc, size, RegTag::Rax);
            }
        }
        if self.frame > 0 {
            self.line(&format!("addq ${}, %rsp", self.frame));
        }
        let saved = self.alloc.used_callee_saved.clone();
        for tag in saved.iter().rev() {
            self.line(&format!("popq {}", tag.name(8)));
        }
        self.line("popq %rbp");
        self.line("ret");
        Ok(())
    }
}

fn suffix(size: u64) -> &'static str {
    match size {
        1 => "b",
        2 => "w",
        4 => "l",
        _ => "q",
    }
}

/// Source-size letter for movz/movs pairs
fn narrow_suffix(size: u64) -> &'static str {
    match size {
        1 => "b",
        2 => "w",
        _ => "l",
    }
}

fn fsuffix(size: u64) -> &'static str {
    if size == 4 {
        "s"
    } else {
        "d"
    }
}

/// Condition-code letters for `set`/`j`
fn cc(cond: Condition, signed: bool) -> &'static str {
    match (cond, signed) {
        (Condition::Eq, _) => "e",
        (Condition::Ne, _) => "ne",
        (Condition::Lt, true) => "l",
        (Condition::Le, true) => "le",
        (Condition::Gt, true) => "g",
        (Condition::Ge, true) => "ge",
        (Condition::Lt, false) => "b",
        (Condition::Le, false) => "be",
        (Condition::Gt, false) => "a",
        (Condition::Ge, false) => "ae",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcc_common::ErrorReporter;
    use xcc_frontend::Frontend;
    use xcc_ir::lower_to_ir;

    fn emit(src: &str) -> String {
        let unit = Frontend::parse_source(src, "test.c").unwrap();
        let mut reporter = ErrorReporter::new();
        let module = lower_to_ir(&unit, "test", &mut reporter).unwrap();
        assert!(!reporter.has_errors(), "{:?}", reporter.diagnostics());
        emit_module(&module).unwrap()
    }

    #[test]
    fn test_prologue_and_epilogue() {
        let asm = emit("int main(void) { return 42; }");
        assert!(asm.contains(".globl main"), "{asm}");
        assert!(asm.contains("pushq %rbp"), "{asm}");
        assert!(asm.contains("movq %rsp, %rbp"), "{asm}");
        assert!(asm.contains("popq %rbp"), "{asm}");
        assert!(asm.contains("ret"), "{asm}");
    }

    #[test]
    fn test_callee_saved_pushed_when_used() {
        let asm = emit("int f(int x) { return x + 1; }");
        assert!(asm.contains("pushq %rbx"), "{asm}");
        assert!(asm.contains("popq %rbx"), "{asm}");
    }

    #[test]
    fn test_call_uses_sysv_argument_registers() {
        let asm = emit(
            "extern int g(int a, int b, int c);\nint f(void) { return g(1, 2, 3); }",
        );
        assert!(asm.contains("movl $1, %edi"), "{asm}");
        assert!(asm.contains("movl $2, %esi"), "{asm}");
        assert!(asm.contains("movl $3, %edx"), "{asm}");
        assert!(asm.contains("call g"), "{asm}");
    }

    #[test]
    fn test_variadic_call_sets_al() {
        let asm = emit(
            "extern int printf(char *fmt, ...);\nint f(char *fmt) { return printf(fmt, 1); }",
        );
        assert!(asm.contains("movb $0, %al"), "{asm}");
    }

    #[test]
    fn test_comparison_lowered_to_setcc() {
        let asm = emit("int f(int a, int b) { return a < b; }");
        assert!(asm.contains("setl %r11b"), "{asm}");
        assert!(asm.contains("cmpl"), "{asm}");
    }

    #[test]
    fn test_unsigned_comparison_uses_below() {
        let asm = emit("int f(unsigned a, unsigned b) { return a < b; }");
        assert!(asm.contains("setb %r11b"), "{asm}");
    }

    #[test]
    fn test_immediate_lhs_compares_swapped() {
        // the constant goes on the immediate slot of the cmp and the
        // condition flips to compensate
        let asm = emit("int f(int a) { return 5 < a; }");
        assert!(asm.contains("cmpl $5, %ebx"), "{asm}");
        assert!(asm.contains("setg %r11b"), "{asm}");
    }

    #[test]
    fn test_float_to_u64_rebases_large_values() {
        let asm = emit("unsigned long f(double d) { return (unsigned long) d; }");
        assert!(asm.contains("ucomisd %xmm12, %xmm11"), "{asm}");
        assert!(asm.contains("subsd %xmm12, %xmm11"), "{asm}");
        assert_eq!(asm.matches("cvttsd2siq").count(), 2, "{asm}");

        // the signed conversion stays a single truncating convert
        let signed = emit("long f(double d) { return (long) d; }");
        assert!(!signed.contains("subsd"), "{signed}");
        assert_eq!(signed.matches("cvttsd2siq").count(), 1, "{signed}");
    }

    #[test]
    fn test_switch_is_compare_chain() {
        let asm = emit(
            "int f(int x) { switch (x) { case 1: return 10; case 2: return 20; default: return 30; } }",
        );
        assert!(asm.contains("cmpl $1,"), "{asm}");
        assert!(asm.contains("cmpl $2,"), "{asm}");
        let je_count = asm.matches("je .L").count();
        assert!(je_count >= 2, "{asm}");
    }

    #[test]
    fn test_globals_emitted_as_data_and_bss() {
        let asm = emit("int a = 20;\nint b;\nint main(void) { return a + b; }");
        assert!(asm.contains(".data"), "{asm}");
        assert!(asm.contains("a:"), "{asm}");
        assert!(asm.contains(".long 20"), "{asm}");
        assert!(asm.contains(".comm b,4,4"), "{asm}");
        assert!(asm.contains("a(%rip)"), "{asm}");
    }

    #[test]
    fn test_extern_global_emits_nothing() {
        let asm = emit("extern int e;\nint main(void) { return e; }");
        assert!(!asm.contains(".comm e"), "{asm}");
        assert!(asm.contains("e(%rip)"), "{asm}");
    }

    #[test]
    fn test_spilling_function_reserves_padded_frame() {
        // four concurrently live integer temporaries force a spill;
        // the prologue must reserve stack for it
        let asm = emit(
            "int f(int a, int b, int c, int d, int e, int g, int h, int i) {
                return ((a + b) + (c + d)) + ((e + g) + (h + i));
            }",
        );
        let sub = asm
            .lines()
            .find(|l| l.contains("subq $") && l.contains("%rsp"))
            .expect("frame reservation");
        let bytes: u64 = sub
            .trim_start()
            .trim_start_matches("subq $")
            .split(',')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!(bytes >= 8, "{asm}");
        // a spill store writes the evicted value to its 8-aligned slot
        assert!(
            asm.lines().any(|l| l.contains("movl %r11d, -") && l.contains("(%rbp)")),
            "{asm}"
        );
    }

    #[test]
    fn test_float_arithmetic_uses_sse() {
        let asm = emit("double f(double a, double b) { return a * b + 1.5; }");
        assert!(asm.contains("mulsd"), "{asm}");
        assert!(asm.contains("addsd"), "{asm}");
        assert!(asm.contains("%xmm"), "{asm}");
    }

    #[test]
    fn test_division_uses_fixed_registers() {
        let asm = emit("int f(int a, int b) { return a / b; }");
        assert!(asm.contains("cltd"), "{asm}");
        assert!(asm.contains("idivl"), "{asm}");
    }

    #[test]
    fn test_stack_args_pushed_for_overflow() {
        let asm = emit(
            "extern int g(long a, long b, long c, long d, long e, long f, long h, long i);
             int f(void) { return g(1, 2, 3, 4, 5, 6, 7, 8); }",
        );
        assert!(asm.contains("pushq %r11"), "{asm}");
        assert!(asm.contains("addq $16, %rsp"), "{asm}");
    }

    #[test]
    fn test_address_initializer_directive() {
        let asm = emit("int table[4];\nint *p = &table[2];\nint main(void) { return 0; }");
        assert!(asm.contains(".quad table+8"), "{asm}");
    }
}
