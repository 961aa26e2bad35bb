//! Global variable lowering
//!
//! Initializers are folded bottom-up on an [`InitBuilder`] stack into
//! a single constant or an address expression over one global symbol.
//! The stack is drained when each global is finalized; anything else
//! is a static error.

use super::{Binding, IrGen};
use crate::eval;
use crate::inittree::{InitBuilder, InitTree};
use crate::module::GlobalVar;
use crate::types::{IrType, TypeRef};
use crate::values::Operand;
use xcc_common::{CompilerError, DiagnosticKind, SourceLocation};
use xcc_frontend::{Declaration, Expression, ExpressionKind, StorageClass, Type, UnaryOp};

impl IrGen<'_> {
    pub(crate) fn lower_global(&mut self, decl: &Declaration) -> Result<(), CompilerError> {
        let ty = super::ctype_to_ir(&mut self.module.types, &decl.ty);
        self.scopes.bind_global(
            &decl.name,
            Binding::Global {
                symbol: decl.name.clone(),
                ty: ty.clone(),
            },
        );

        let mut var = GlobalVar::new(&decl.name, ty.clone());
        var.is_static = decl.storage == StorageClass::Static;
        var.is_extern = decl.storage == StorageClass::Extern && decl.init.is_none();
        if let Some(init) = &decl.init {
            var.init = self.fold_initializer(init, &ty, &decl.loc)?;
        }
        self.module.add_global(var);
        Ok(())
    }

    /// A function-scope `static`: storage in the module under a
    /// uniqued symbol, visible only through the local binding
    pub(crate) fn lower_static_local(&mut self, decl: &Declaration) -> Result<(), CompilerError> {
        let ty = super::ctype_to_ir(self.pool_mut(), &decl.ty);
        let symbol = self.static_symbol(&decl.name);

        // the module pool owns the type of a module-level symbol
        let module_ty = {
            let cty = &decl.ty;
            super::ctype_to_ir(&mut self.module.types, cty)
        };
        let mut var = GlobalVar::new(&symbol, module_ty.clone());
        var.is_static = true;
        if let Some(init) = &decl.init {
            var.init = self.fold_initializer(init, &module_ty, &decl.loc)?;
        }
        self.module.add_global(var);

        self.scopes.bind(&decl.name, Binding::Global { symbol, ty });
        Ok(())
    }

    fn fold_initializer(
        &mut self,
        init: &Expression,
        ty: &TypeRef,
        loc: &SourceLocation,
    ) -> Result<Option<InitTree>, CompilerError> {
        let mut ib = InitBuilder::new();
        if !self.fold_init_node(init, &mut ib)? {
            return Ok(None);
        }
        match ib.finalize(ty) {
            Ok(tree) => Ok(Some(tree)),
            Err(err) => {
                self.diag(DiagnosticKind::TypeMismatch, loc, err.to_string());
                Ok(None)
            }
        }
    }

    /// Fold one initializer node onto the stack. Pure arithmetic
    /// subtrees collapse to a constant; address-bearing subtrees push
    /// an address node and fold offsets into it.
    fn fold_init_node(
        &mut self,
        e: &Expression,
        ib: &mut InitBuilder,
    ) -> Result<bool, CompilerError> {
        if !self.has_address(e) {
            let Some(op) = self.fold_const_expr(e)? else {
                return Ok(false);
            };
            ib.push_const(op);
            return Ok(true);
        }

        match &e.kind {
            ExpressionKind::Identifier(name) => {
                // an address-bearing identifier is an array or
                // function designator decaying to its address
                match self.scopes.lookup(name).cloned() {
                    Some(Binding::Global { symbol, .. }) | Some(Binding::Func { symbol, .. }) => {
                        ib.push_addr(symbol);
                        Ok(true)
                    }
                    _ => {
                        self.not_constant(&e.loc);
                        Ok(false)
                    }
                }
            }
            ExpressionKind::Unary {
                op: UnaryOp::AddrOf,
                operand,
            } => self.fold_address_of(operand, ib),
            ExpressionKind::Binary { op, left, right }
                if matches!(
                    op,
                    xcc_frontend::BinaryOp::Add | xcc_frontend::BinaryOp::Sub
                ) =>
            {
                let negate = matches!(op, xcc_frontend::BinaryOp::Sub);
                let scale = self.address_scale(e)?;
                if !self.fold_init_node(left, ib)? || !self.fold_init_node(right, ib)? {
                    return Ok(false);
                }
                match ib.merge_offset(negate, scale) {
                    Ok(()) => Ok(true),
                    Err(err) => {
                        self.diag(DiagnosticKind::OperatorMisuse, &e.loc, err.to_string());
                        Ok(false)
                    }
                }
            }
            ExpressionKind::Cast { operand, .. } => self.fold_init_node(operand, ib),
            _ => {
                self.not_constant(&e.loc);
                Ok(false)
            }
        }
    }

    /// Fold `&lvalue` when the lvalue is a global (optionally with a
    /// constant subscript)
    fn fold_address_of(
        &mut self,
        operand: &Expression,
        ib: &mut InitBuilder,
    ) -> Result<bool, CompilerError> {
        match &operand.kind {
            ExpressionKind::Identifier(name) => match self.scopes.lookup(name).cloned() {
                Some(Binding::Global { symbol, .. }) | Some(Binding::Func { symbol, .. }) => {
                    ib.push_addr(symbol);
                    Ok(true)
                }
                _ => {
                    self.not_constant(&operand.loc);
                    Ok(false)
                }
            },
            ExpressionKind::Index { base, index } => {
                if !self.fold_init_node(base, ib)? {
                    return Ok(false);
                }
                let Some(idx) = self.fold_const_expr(index)? else {
                    return Ok(false);
                };
                let elem_size = match self.type_of_expr(base)? {
                    Some(ty) => ty.inner().map(|t| t.size()).unwrap_or(1),
                    None => return Ok(false),
                };
                ib.push_const(idx);
                match ib.merge_offset(false, elem_size.max(1)) {
                    Ok(()) => Ok(true),
                    Err(err) => {
                        self.diag(DiagnosticKind::OperatorMisuse, &operand.loc, err.to_string());
                        Ok(false)
                    }
                }
            }
            _ => {
                self.not_constant(&operand.loc);
                Ok(false)
            }
        }
    }

    /// Byte scale for pointer arithmetic in an initializer: the
    /// pointee size of the address-bearing side, 1 for plain numbers
    fn address_scale(&mut self, e: &Expression) -> Result<u64, CompilerError> {
        if let ExpressionKind::Binary { left, right, .. } = &e.kind {
            for side in [left, right] {
                if self.has_address(side) {
                    if let Some(ty) = self.type_of_expr(side)? {
                        let scale = match &*ty {
                            IrType::Ptr { pointee } => pointee.size(),
                            IrType::Array { elem, .. } => elem.size(),
                            _ => 1,
                        };
                        return Ok(scale.max(1));
                    }
                }
            }
        }
        Ok(1)
    }

    /// Does this expression contribute a relocatable address?
    fn has_address(&self, e: &Expression) -> bool {
        match &e.kind {
            ExpressionKind::Unary {
                op: UnaryOp::AddrOf,
                ..
            } => true,
            ExpressionKind::Identifier(name) => match self.scopes.lookup(name) {
                Some(Binding::Global { ty, .. }) => ty.is_array(),
                Some(Binding::Func { .. }) => true,
                _ => false,
            },
            ExpressionKind::Binary { left, right, .. } => {
                self.has_address(left) || self.has_address(right)
            }
            ExpressionKind::Unary { operand, .. } => self.has_address(operand),
            ExpressionKind::Cast { operand, .. } => self.has_address(operand),
            _ => false,
        }
    }

    fn not_constant(&mut self, loc: &SourceLocation) {
        self.diag(
            DiagnosticKind::TypeMismatch,
            loc,
            "initializer is not a constant expression",
        );
    }

    /// Evaluate a pure constant expression to a single operand
    pub(crate) fn fold_const_expr(
        &mut self,
        e: &Expression,
    ) -> Result<Option<Operand>, CompilerError> {
        match &e.kind {
            ExpressionKind::IntLiteral {
                value,
                base,
                suffix,
            } => {
                let cty = Type::for_int_literal(*value, *base, suffix);
                let ty = super::ctype_to_ir(self.pool_mut(), &cty);
                Ok(Some(Operand::int(*value, ty)))
            }
            ExpressionKind::FloatLiteral { value, suffix } => {
                let cty = Type::for_float_literal(*value, *suffix);
                let ty = super::ctype_to_ir(self.pool_mut(), &cty);
                Ok(Some(Operand::float(*value, ty)))
            }
            ExpressionKind::CharLiteral(c) => {
                let ty = self.pool_mut().int(32, true);
                Ok(Some(Operand::int(*c as u64, ty)))
            }
            ExpressionKind::SizeofType(cty) => {
                let ty = super::ctype_to_ir(self.pool_mut(), cty);
                let u64t = self.pool_mut().int(64, false);
                Ok(Some(Operand::int(ty.size(), u64t)))
            }
            ExpressionKind::SizeofExpr(inner) => {
                let Some(ty) = self.type_of_expr(inner)? else {
                    return Ok(None);
                };
                let u64t = self.pool_mut().int(64, false);
                Ok(Some(Operand::int(ty.size(), u64t)))
            }
            ExpressionKind::Unary { op, operand } => {
                let Some(v) = self.fold_const_expr(operand)? else {
                    return Ok(None);
                };
                match eval::eval_unary(self.pool_mut(), *op, &v) {
                    Ok(folded) => Ok(Some(folded)),
                    Err(err) => {
                        self.report_eval_error(err, &e.loc);
                        Ok(None)
                    }
                }
            }
            ExpressionKind::Binary { op, left, right } => {
                let Some(l) = self.fold_const_expr(left)? else {
                    return Ok(None);
                };
                let Some(r) = self.fold_const_expr(right)? else {
                    return Ok(None);
                };
                match eval::eval_binary(self.pool_mut(), *op, &l, &r) {
                    Ok(folded) => Ok(Some(folded)),
                    Err(err) => {
                        self.report_eval_error(err, &e.loc);
                        Ok(None)
                    }
                }
            }
            ExpressionKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let Some(c) = self.fold_const_expr(cond)? else {
                    return Ok(None);
                };
                let truthy = match &c {
                    Operand::Int(k) => !k.is_zero(),
                    Operand::Float(k) => k.value != 0.0,
                    Operand::Reg(_) => false,
                };
                if truthy {
                    self.fold_const_expr(then_expr)
                } else {
                    self.fold_const_expr(else_expr)
                }
            }
            ExpressionKind::Cast { target, operand } => {
                let Some(v) = self.fold_const_expr(operand)? else {
                    return Ok(None);
                };
                let ty = super::ctype_to_ir(self.pool_mut(), target);
                match (&v, &*ty) {
                    // a constant cast to a pointer stays an integer
                    // constant; the emitter writes the raw value
                    (Operand::Int(c), IrType::Ptr { .. }) => {
                        let u64t = self.pool_mut().int(64, false);
                        Ok(Some(Operand::int(c.value, u64t)))
                    }
                    _ if ty.is_integer() || ty.is_float() => self.convert(v, &ty).map(Some),
                    _ => {
                        self.not_constant(&e.loc);
                        Ok(None)
                    }
                }
            }
            _ => {
                self.not_constant(&e.loc);
                Ok(None)
            }
        }
    }
}
