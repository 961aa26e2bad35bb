//! Statement lowering
//!
//! Control flow follows the block patterns described in the design
//! notes: `if` branches into `then`/`else` blocks and falls through
//! into a continuation; loops use a cond/body/exit triple; `switch`
//! emits one `switch` instruction whose arms are patched as case
//! labels appear. All returns funnel through the shared return slot.

use super::{Binding, IrGen, SwitchCtx};
use crate::eval;
use crate::values::Operand;
use xcc_common::{CompilerError, DiagnosticKind, SourceLocation};
use xcc_frontend::{Declaration, Expression, ForInit, Statement, StatementKind, StorageClass};

impl IrGen<'_> {
    pub(crate) fn lower_stmt(&mut self, s: &Statement) -> Result<(), CompilerError> {
        match &s.kind {
            StatementKind::Compound(stmts) => {
                self.scopes.push();
                for stmt in stmts {
                    self.lower_stmt(stmt)?;
                }
                self.scopes.pop();
                Ok(())
            }
            StatementKind::Expr(Some(e)) => self.lower_for_effect(e),
            StatementKind::Expr(None) => Ok(()),
            StatementKind::Decl(decl) => self.lower_local_decl(decl),
            StatementKind::If {
                cond,
                then_stmt,
                else_stmt,
            } => self.lower_if(cond, then_stmt, else_stmt.as_deref(), &s.loc),
            StatementKind::While { cond, body } => self.lower_while(cond, body, &s.loc),
            StatementKind::DoWhile { body, cond } => self.lower_do_while(body, cond, &s.loc),
            StatementKind::For {
                init,
                cond,
                step,
                body,
            } => self.lower_for(init.as_deref(), cond.as_ref(), step.as_ref(), body, &s.loc),
            StatementKind::Switch { cond, body } => self.lower_switch(cond, body, &s.loc),
            StatementKind::Case { value, body } => self.lower_case(value, body, &s.loc),
            StatementKind::Default { body } => self.lower_default(body, &s.loc),
            StatementKind::Break => {
                match self.breaks.last().copied() {
                    Some(target) => self.b_mut()?.build_br(target)?,
                    None => self.diag(
                        DiagnosticKind::OperatorMisuse,
                        &s.loc,
                        "'break' outside of loop or switch",
                    ),
                }
                Ok(())
            }
            StatementKind::Continue => {
                match self.continues.last().copied() {
                    Some(target) => self.b_mut()?.build_br(target)?,
                    None => self.diag(
                        DiagnosticKind::OperatorMisuse,
                        &s.loc,
                        "'continue' outside of loop",
                    ),
                }
                Ok(())
            }
            StatementKind::Return(value) => self.lower_return(value.as_ref(), &s.loc),
            StatementKind::Goto(label) => self.b_mut()?.build_goto(label, s.loc.clone()),
            StatementKind::Label { name, body } => {
                if self.b_mut()?.bind_label(name)?.is_none() {
                    self.diag(
                        DiagnosticKind::DuplicateLabel,
                        &s.loc,
                        format!("label '{name}' is already defined"),
                    );
                }
                self.lower_stmt(body)
            }
        }
    }

    /// Branch on a condition expression. A constant condition becomes
    /// an unconditional branch, keeping both targets in the graph.
    fn branch_on(
        &mut self,
        cond: &Expression,
        true_blk: u32,
        false_blk: u32,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let v = match self.lower_value(cond)? {
            Some(v) => v,
            None => {
                self.b_mut()?.build_br(false_blk)?;
                return Ok(());
            }
        };
        let c = match self.to_cond(v, loc)? {
            Some(c) => c,
            None => {
                self.b_mut()?.build_br(false_blk)?;
                return Ok(());
            }
        };
        match &c {
            Operand::Int(k) => {
                let target = if k.is_zero() { false_blk } else { true_blk };
                self.b_mut()?.build_br(target)
            }
            _ => self.b_mut()?.build_condbr(c, true_blk, false_blk),
        }
    }

    fn lower_if(
        &mut self,
        cond: &Expression,
        then_stmt: &Statement,
        else_stmt: Option<&Statement>,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let then_blk = self.b_mut()?.new_block();
        let else_blk = if else_stmt.is_some() {
            Some(self.b_mut()?.new_block())
        } else {
            None
        };
        let cont_blk = self.b_mut()?.new_block();

        self.branch_on(cond, then_blk, else_blk.unwrap_or(cont_blk), loc)?;

        self.b_mut()?.switch_to(then_blk);
        self.lower_stmt(then_stmt)?;
        if !self.b_mut()?.current_has_terminator() {
            self.b_mut()?.build_br(cont_blk)?;
        }

        if let (Some(else_blk), Some(else_stmt)) = (else_blk, else_stmt) {
            self.b_mut()?.switch_to(else_blk);
            self.lower_stmt(else_stmt)?;
            if !self.b_mut()?.current_has_terminator() {
                self.b_mut()?.build_br(cont_blk)?;
            }
        }

        self.b_mut()?.switch_to(cont_blk);
        Ok(())
    }

    fn lower_while(
        &mut self,
        cond: &Expression,
        body: &Statement,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let cond_blk = self.b_mut()?.new_block();
        let body_blk = self.b_mut()?.new_block();
        let exit_blk = self.b_mut()?.new_block();

        self.b_mut()?.build_br(cond_blk)?;
        self.b_mut()?.switch_to(cond_blk);
        self.branch_on(cond, body_blk, exit_blk, loc)?;

        self.breaks.push(exit_blk);
        self.continues.push(cond_blk);
        self.b_mut()?.switch_to(body_blk);
        self.lower_stmt(body)?;
        if !self.b_mut()?.current_has_terminator() {
            self.b_mut()?.build_br(cond_blk)?;
        }
        self.breaks.pop();
        self.continues.pop();

        self.b_mut()?.switch_to(exit_blk);
        Ok(())
    }

    fn lower_do_while(
        &mut self,
        body: &Statement,
        cond: &Expression,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let body_blk = self.b_mut()?.new_block();
        let cond_blk = self.b_mut()?.new_block();
        let exit_blk = self.b_mut()?.new_block();

        self.b_mut()?.build_br(body_blk)?;

        self.breaks.push(exit_blk);
        self.continues.push(cond_blk);
        self.b_mut()?.switch_to(body_blk);
        self.lower_stmt(body)?;
        if !self.b_mut()?.current_has_terminator() {
            self.b_mut()?.build_br(cond_blk)?;
        }
        self.breaks.pop();
        self.continues.pop();

        self.b_mut()?.switch_to(cond_blk);
        self.branch_on(cond, body_blk, exit_blk, loc)?;

        self.b_mut()?.switch_to(exit_blk);
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&ForInit>,
        cond: Option<&Expression>,
        step: Option<&Expression>,
        body: &Statement,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        self.scopes.push();
        match init {
            Some(ForInit::Decl(decl)) => self.lower_local_decl(decl)?,
            Some(ForInit::Expr(e)) => self.lower_for_effect(e)?,
            None => {}
        }

        let cond_blk = self.b_mut()?.new_block();
        let body_blk = self.b_mut()?.new_block();
        let step_blk = self.b_mut()?.new_block();
        let exit_blk = self.b_mut()?.new_block();

        self.b_mut()?.build_br(cond_blk)?;
        self.b_mut()?.switch_to(cond_blk);
        match cond {
            Some(c) => self.branch_on(c, body_blk, exit_blk, loc)?,
            None => self.b_mut()?.build_br(body_blk)?,
        }

        self.breaks.push(exit_blk);
        self.continues.push(step_blk);
        self.b_mut()?.switch_to(body_blk);
        self.lower_stmt(body)?;
        if !self.b_mut()?.current_has_terminator() {
            self.b_mut()?.build_br(step_blk)?;
        }
        self.breaks.pop();
        self.continues.pop();

        self.b_mut()?.switch_to(step_blk);
        if let Some(step) = step {
            self.lower_for_effect(step)?;
        }
        self.b_mut()?.build_br(cond_blk)?;

        self.b_mut()?.switch_to(exit_blk);
        self.scopes.pop();
        Ok(())
    }

    fn lower_switch(
        &mut self,
        cond: &Expression,
        body: &Statement,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let Some(v) = self.lower_value(cond)? else {
            return Ok(());
        };
        if !v.ty().is_integer() {
            self.diag(
                DiagnosticKind::TypeMismatch,
                loc,
                "switch scrutinee must have integer type",
            );
            return Ok(());
        }
        let ty = eval::promote_type(self.pool_mut(), v.ty());
        let v = self.convert(v, &ty)?;

        let site = self.b_mut()?.build_switch(v)?;
        let exit_blk = self.b_mut()?.new_block();

        self.breaks.push(exit_blk);
        self.switches.push(SwitchCtx {
            site,
            default_blk: None,
            scrutinee_ty: ty,
        });

        self.lower_stmt(body)?;
        if !self.b_mut()?.current_has_terminator() {
            self.b_mut()?.build_br(exit_blk)?;
        }

        self.breaks.pop();
        let ctx = self
            .switches
            .pop()
            .ok_or_else(|| CompilerError::internal("switch context vanished"))?;
        let default = ctx.default_blk.unwrap_or(exit_blk);
        self.b_mut()?.set_switch_default(ctx.site, default)?;

        self.b_mut()?.switch_to(exit_blk);
        Ok(())
    }

    fn lower_case(
        &mut self,
        value: &Expression,
        body: &Statement,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let Some(ctx_ty) = self.switches.last().map(|c| c.scrutinee_ty.clone()) else {
            self.diag(
                DiagnosticKind::OperatorMisuse,
                loc,
                "'case' label outside of switch",
            );
            return self.lower_stmt(body);
        };

        let const_val = match self.lower_value(value)? {
            Some(v @ Operand::Int(_)) => {
                let converted = self.convert(v, &ctx_ty)?;
                match converted {
                    Operand::Int(c) => Some(c),
                    _ => None,
                }
            }
            Some(_) => None,
            None => return self.lower_stmt(body),
        };

        let blk = self.b_mut()?.new_block();
        // source order is block layout order, so a case without a
        // terminator falls through into the next one
        if !self.b_mut()?.current_has_terminator() {
            self.b_mut()?.build_br(blk)?;
        }
        self.b_mut()?.switch_to(blk);

        match const_val {
            Some(c) => {
                let site = self.switches.last().map(|ctx| ctx.site);
                if let Some(site) = site {
                    if !self.b_mut()?.add_switch_case(site, c.clone(), blk)? {
                        self.diag(
                            DiagnosticKind::DuplicateCase,
                            loc,
                            format!("duplicate case value {}", c.as_i64()),
                        );
                    }
                }
            }
            None => {
                self.diag(
                    DiagnosticKind::TypeMismatch,
                    loc,
                    "case value must be an integer constant expression",
                );
            }
        }

        self.lower_stmt(body)
    }

    fn lower_default(
        &mut self,
        body: &Statement,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        if self.switches.is_empty() {
            self.diag(
                DiagnosticKind::OperatorMisuse,
                loc,
                "'default' label outside of switch",
            );
            return self.lower_stmt(body);
        }

        let blk = self.b_mut()?.new_block();
        if !self.b_mut()?.current_has_terminator() {
            self.b_mut()?.build_br(blk)?;
        }
        self.b_mut()?.switch_to(blk);

        let taken = self
            .switches
            .last()
            .is_some_and(|ctx| ctx.default_blk.is_some());
        if taken {
            self.diag(
                DiagnosticKind::DuplicateCase,
                loc,
                "multiple 'default' labels in one switch",
            );
        } else if let Some(ctx) = self.switches.last_mut() {
            ctx.default_blk = Some(blk);
        }
        self.lower_stmt(body)
    }

    fn lower_return(
        &mut self,
        value: Option<&Expression>,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let slot = self.b_mut()?.func().return_slot.clone();
        match (slot, value) {
            (Some(slot), Some(e)) => {
                let Some(v) = self.lower_value(e)? else {
                    self.b_mut()?.build_ret_br()?;
                    return Ok(());
                };
                let ret_ty = slot.ty.inner().cloned().ok_or_else(|| {
                    CompilerError::internal("return slot is not pointer-typed")
                })?;
                let v = self.convert(v, &ret_ty)?;
                self.b_mut()?.build_store(v, Operand::Reg(slot))?;
            }
            (Some(_), None) => {
                self.diag(
                    DiagnosticKind::TypeMismatch,
                    loc,
                    "non-void function returns no value",
                );
            }
            (None, Some(e)) => {
                self.diag(
                    DiagnosticKind::TypeMismatch,
                    loc,
                    "void function returns a value",
                );
                self.lower_for_effect(e)?;
            }
            (None, None) => {}
        }
        self.b_mut()?.build_ret_br()
    }

    fn lower_local_decl(&mut self, decl: &Declaration) -> Result<(), CompilerError> {
        if decl.ty.is_function() {
            self.declare_function(&decl.name, &decl.ty, false, false)?;
            return Ok(());
        }

        match decl.storage {
            StorageClass::Extern => {
                let ty = super::ctype_to_ir(self.pool_mut(), &decl.ty);
                if decl.init.is_some() {
                    self.diag(
                        DiagnosticKind::TypeMismatch,
                        &decl.loc,
                        "'extern' declaration cannot be initialized here",
                    );
                }
                self.scopes.bind(
                    &decl.name,
                    Binding::Global {
                        symbol: decl.name.clone(),
                        ty,
                    },
                );
                Ok(())
            }
            StorageClass::Static => self.lower_static_local(decl),
            StorageClass::None => {
                let ty = super::ctype_to_ir(self.pool_mut(), &decl.ty);
                if ty.is_void() {
                    self.diag(
                        DiagnosticKind::TypeMismatch,
                        &decl.loc,
                        format!("variable '{}' has incomplete type 'void'", decl.name),
                    );
                    return Ok(());
                }
                let addr = self.b_mut()?.build_alloca(ty.clone())?;
                self.scopes
                    .bind(&decl.name, Binding::Local { addr: addr.clone() });

                if let Some(init) = &decl.init {
                    if ty.is_array() {
                        self.diag(
                            DiagnosticKind::TypeMismatch,
                            &decl.loc,
                            "array initializers are not supported",
                        );
                        return Ok(());
                    }
                    if let Some(v) = self.lower_value(init)? {
                        self.store_init(v, addr, &decl.loc)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn store_init(
        &mut self,
        v: Operand,
        addr: crate::values::Register,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        // reuse the assignment conversion rules
        let _ = self.store_converted(v, Operand::Reg(addr), loc)?;
        Ok(())
    }
}
