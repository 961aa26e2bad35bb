//! Expression lowering
//!
//! Every expression can be lowered to its value or to its address.
//! Assignment targets, operands of `&`, and subscript bases take the
//! address path; everything else takes the value path. Lowering never
//! reuses a produced register: whenever a value is needed twice (the
//! `++` family, compound assignment), the lvalue is re-derived and
//! re-loaded so that every non-alloca register keeps exactly one use.

use super::{Binding, IrGen};
use crate::eval::{self, EvalError};
use crate::ops::{Condition, ConvOp, IrBinaryOp};
use crate::types::{IrType, TypePool, TypeRef};
use crate::values::Operand;
use xcc_common::{CompilerError, DiagnosticKind, SourceLocation};
use xcc_frontend::{BinaryOp, Expression, ExpressionKind, Type, UnaryOp};

impl IrGen<'_> {
    pub(crate) fn pool_mut(&mut self) -> &mut TypePool {
        match &mut self.b {
            Some(b) => &mut b.func_mut().types,
            None => &mut self.module.types,
        }
    }

    fn zero_of(ty: &TypeRef) -> Operand {
        if ty.is_float() {
            Operand::float(0.0, ty.clone())
        } else {
            Operand::int(0, ty.clone())
        }
    }

    /// Lower an expression to its value
    pub(crate) fn lower_value(&mut self, e: &Expression) -> Result<Option<Operand>, CompilerError> {
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
            ExpressionKind::Identifier(name) => match self.scopes.lookup(name).cloned() {
                None => {
                    self.diag(
                        DiagnosticKind::TypeMismatch,
                        &e.loc,
                        format!("use of undeclared identifier '{name}'"),
                    );
                    Ok(None)
                }
                Some(Binding::Func { symbol, ty }) => {
                    let ptr = self.pool_mut().ptr_to(ty);
                    Ok(Some(Operand::reg(format!("@{symbol}"), ptr)))
                }
                Some(_) => {
                    let Some(addr) = self.lower_addr(e)? else {
                        return Ok(None);
                    };
                    self.load_or_decay(addr).map(Some)
                }
            },
            ExpressionKind::Unary { op, operand } => self.lower_unary(*op, operand, &e.loc),
            ExpressionKind::Binary { op, left, right } => {
                self.lower_binary(*op, left, right, &e.loc)
            }
            ExpressionKind::Assign { op, target, value } => {
                self.lower_assign(*op, target, value, &e.loc, true)
            }
            ExpressionKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => self.lower_conditional(cond, then_expr, else_expr, &e.loc),
            ExpressionKind::Call { callee, args } => {
                let Some(result) = self.lower_call(callee, args, &e.loc, true)? else {
                    return Ok(None);
                };
                match result {
                    Some(v) => Ok(Some(v)),
                    None => {
                        self.diag(
                            DiagnosticKind::TypeMismatch,
                            &e.loc,
                            "void value is not ignored as it ought to be",
                        );
                        Ok(None)
                    }
                }
            }
            ExpressionKind::Index { .. } => {
                let Some(addr) = self.lower_addr(e)? else {
                    return Ok(None);
                };
                self.load_or_decay(addr).map(Some)
            }
            ExpressionKind::Cast { target, operand } => {
                let Some(v) = self.lower_value(operand)? else {
                    return Ok(None);
                };
                if target.is_void() {
                    self.diag(
                        DiagnosticKind::TypeMismatch,
                        &e.loc,
                        "void value is not ignored as it ought to be",
                    );
                    return Ok(None);
                }
                let ty = super::ctype_to_ir(self.pool_mut(), target);
                self.convert(v, &ty).map(Some)
            }
            ExpressionKind::SizeofExpr(inner) => {
                let Some(ty) = self.type_of_expr(inner)? else {
                    return Ok(None);
                };
                let u64t = self.pool_mut().int(64, false);
                Ok(Some(Operand::int(ty.size(), u64t)))
            }
            ExpressionKind::SizeofType(cty) => {
                let ty = super::ctype_to_ir(self.pool_mut(), cty);
                let u64t = self.pool_mut().int(64, false);
                Ok(Some(Operand::int(ty.size(), u64t)))
            }
            ExpressionKind::Comma { lhs, rhs } => {
                self.lower_for_effect(lhs)?;
                self.lower_value(rhs)
            }
        }
    }

    /// Lower an expression to the address of its storage
    pub(crate) fn lower_addr(&mut self, e: &Expression) -> Result<Option<Operand>, CompilerError> {
        match &e.kind {
            ExpressionKind::Identifier(name) => match self.scopes.lookup(name).cloned() {
                None => {
                    self.diag(
                        DiagnosticKind::TypeMismatch,
                        &e.loc,
                        format!("use of undeclared identifier '{name}'"),
                    );
                    Ok(None)
                }
                Some(Binding::Local { addr }) => Ok(Some(Operand::Reg(addr))),
                Some(Binding::Global { symbol, ty }) => {
                    let ptr = self.pool_mut().ptr_to(ty);
                    Ok(Some(Operand::reg(format!("@{symbol}"), ptr)))
                }
                Some(Binding::Func { symbol, ty }) => {
                    let ptr = self.pool_mut().ptr_to(ty);
                    Ok(Some(Operand::reg(format!("@{symbol}"), ptr)))
                }
            },
            ExpressionKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let Some(v) = self.lower_value(operand)? else {
                    return Ok(None);
                };
                if !v.ty().is_pointer() {
                    self.diag(
                        DiagnosticKind::OperatorMisuse,
                        &e.loc,
                        "cannot dereference a non-pointer value",
                    );
                    return Ok(None);
                }
                Ok(Some(v))
            }
            ExpressionKind::Index { base, index } => {
                let Some(base_ptr) = self.lower_subscript_base(base)? else {
                    return Ok(None);
                };
                let Some(idx) = self.lower_value(index)? else {
                    return Ok(None);
                };
                if !idx.ty().is_integer() {
                    self.diag(
                        DiagnosticKind::TypeMismatch,
                        &e.loc,
                        "array subscript is not an integer",
                    );
                    return Ok(None);
                }
                let i64t = self.pool_mut().int(64, true);
                let idx = self.convert(idx, &i64t)?;
                self.b_mut()?.build_gep(base_ptr, idx).map(Some)
            }
            _ => {
                self.diag(
                    DiagnosticKind::LvalueRequired,
                    &e.loc,
                    "expression is not an lvalue",
                );
                Ok(None)
            }
        }
    }

    /// The pointer a subscript indexes through: an array lvalue is
    /// used by address, a pointer lvalue by value
    fn lower_subscript_base(&mut self, base: &Expression) -> Result<Option<Operand>, CompilerError> {
        if base.is_lvalue() {
            let Some(addr) = self.lower_addr(base)? else {
                return Ok(None);
            };
            let pointee = match &**addr.ty() {
                IrType::Ptr { pointee } => pointee.clone(),
                _ => return Err(CompilerError::internal("address is not pointer-typed")),
            };
            if pointee.is_array() {
                return Ok(Some(addr));
            }
            if pointee.is_pointer() {
                return self.b_mut()?.build_load(addr).map(Some);
            }
            self.diag(
                DiagnosticKind::TypeMismatch,
                &base.loc,
                "subscripted value is neither array nor pointer",
            );
            return Ok(None);
        }

        let Some(v) = self.lower_value(base)? else {
            return Ok(None);
        };
        if !v.ty().is_pointer() {
            self.diag(
                DiagnosticKind::TypeMismatch,
                &base.loc,
                "subscripted value is neither array nor pointer",
            );
            return Ok(None);
        }
        Ok(Some(v))
    }

    /// Load through an address, or decay an array address to a
    /// pointer to its first element
    fn load_or_decay(&mut self, addr: Operand) -> Result<Operand, CompilerError> {
        let pointee = match &**addr.ty() {
            IrType::Ptr { pointee } => pointee.clone(),
            _ => return Err(CompilerError::internal("address is not pointer-typed")),
        };
        if pointee.is_array() {
            let i64t = self.pool_mut().int(64, true);
            return self.b_mut()?.build_gep(addr, Operand::int(0, i64t));
        }
        self.b_mut()?.build_load(addr)
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expression,
        loc: &SourceLocation,
    ) -> Result<Option<Operand>, CompilerError> {
        match op {
            UnaryOp::AddrOf => {
                if !operand.is_lvalue()
                    && !matches!(operand.kind, ExpressionKind::Identifier(_))
                {
                    self.diag(DiagnosticKind::LvalueRequired, loc, "cannot take this address");
                    return Ok(None);
                }
                self.lower_addr(operand)
            }
            UnaryOp::Deref => {
                let Some(v) = self.lower_value(operand)? else {
                    return Ok(None);
                };
                match &**v.ty() {
                    IrType::Ptr { pointee } if pointee.is_function() => Ok(Some(v)),
                    IrType::Ptr { .. } => self.load_or_decay(v).map(Some),
                    _ => {
                        self.diag(
                            DiagnosticKind::OperatorMisuse,
                            loc,
                            "cannot dereference a non-pointer value",
                        );
                        Ok(None)
                    }
                }
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                self.inc_dec_effect(operand, op, loc)?;
                let Some(addr) = self.lower_addr(operand)? else {
                    return Ok(None);
                };
                self.b_mut()?.build_load(addr).map(Some)
            }
            UnaryOp::PostInc | UnaryOp::PostDec => {
                let Some(addr) = self.lower_addr(operand)? else {
                    return Ok(None);
                };
                let old = self.b_mut()?.build_load(addr)?;
                self.inc_dec_effect(operand, op, loc)?;
                Ok(Some(old))
            }
            UnaryOp::Plus | UnaryOp::Minus | UnaryOp::BitNot | UnaryOp::LogicalNot => {
                let Some(v) = self.lower_value(operand)? else {
                    return Ok(None);
                };
                if v.is_const() {
                    return match eval::eval_unary(self.pool_mut(), op, &v) {
                        Ok(folded) => Ok(Some(folded)),
                        Err(err) => {
                            self.report_eval_error(err, loc);
                            Ok(None)
                        }
                    };
                }
                match op {
                    UnaryOp::Plus => Ok(Some(v)),
                    UnaryOp::Minus => {
                        if v.ty().is_float() {
                            let zero = Self::zero_of(v.ty());
                            let ty = v.ty().clone();
                            self.b_mut()?
                                .build_binary(IrBinaryOp::FSub, zero, v, ty)
                                .map(Some)
                        } else if v.ty().is_integer() {
                            let ty = eval::promote_type(self.pool_mut(), v.ty());
                            let v = self.convert(v, &ty)?;
                            let zero = Self::zero_of(&ty);
                            self.b_mut()?
                                .build_binary(IrBinaryOp::Sub, zero, v, ty)
                                .map(Some)
                        } else {
                            self.diag(DiagnosticKind::OperatorMisuse, loc, "cannot negate this");
                            Ok(None)
                        }
                    }
                    UnaryOp::BitNot => {
                        if !v.ty().is_integer() {
                            self.diag(
                                DiagnosticKind::OperatorMisuse,
                                loc,
                                "operand of '~' must have integer type",
                            );
                            return Ok(None);
                        }
                        let ty = eval::promote_type(self.pool_mut(), v.ty());
                        let v = self.convert(v, &ty)?;
                        let ones = Operand::int(u64::MAX, ty.clone());
                        self.b_mut()?
                            .build_binary(IrBinaryOp::Xor, v, ones, ty)
                            .map(Some)
                    }
                    UnaryOp::LogicalNot => self.compare_with_zero(v, Condition::Eq, loc),
                    _ => unreachable!(),
                }
            }
        }
    }

    /// `v <cond> 0` as an `i1`; the core of `!` and of branching on a
    /// scalar
    fn compare_with_zero(
        &mut self,
        v: Operand,
        cond: Condition,
        loc: &SourceLocation,
    ) -> Result<Option<Operand>, CompilerError> {
        match &**v.ty() {
            IrType::Int { .. } => {
                let zero = Self::zero_of(v.ty());
                self.b_mut()?.build_icmp(cond, v, zero).map(Some)
            }
            IrType::Float { .. } => {
                let zero = Self::zero_of(v.ty());
                self.b_mut()?.build_fcmp(cond, v, zero).map(Some)
            }
            IrType::Ptr { .. } => {
                let i64t = self.pool_mut().int(64, false);
                let as_int = self.b_mut()?.build_convert(ConvOp::PtrToI, v, i64t.clone())?;
                let zero = Operand::int(0, i64t);
                self.b_mut()?.build_icmp(cond, as_int, zero).map(Some)
            }
            _ => {
                self.diag(
                    DiagnosticKind::TypeMismatch,
                    loc,
                    "scalar value required here",
                );
                Ok(None)
            }
        }
    }

    /// Reduce a value to an `i1` condition
    pub(crate) fn to_cond(
        &mut self,
        v: Operand,
        loc: &SourceLocation,
    ) -> Result<Option<Operand>, CompilerError> {
        if matches!(&**v.ty(), IrType::Int { width: 1, .. }) {
            return Ok(Some(v));
        }
        if v.is_const() {
            let truthy = match &v {
                Operand::Int(c) => !c.is_zero(),
                Operand::Float(c) => c.value != 0.0,
                Operand::Reg(_) => unreachable!(),
            };
            let b = self.pool_mut().bool();
            return Ok(Some(Operand::int(truthy as u64, b)));
        }
        self.compare_with_zero(v, Condition::Ne, loc)
    }

    /// The shared increment/decrement side effect: re-derives the
    /// lvalue for the read and again for the write
    fn inc_dec_effect(
        &mut self,
        lv: &Expression,
        op: UnaryOp,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let decrement = matches!(op, UnaryOp::PreDec | UnaryOp::PostDec);
        let Some(addr) = self.lower_addr(lv)? else {
            return Ok(());
        };
        let cur = self.b_mut()?.build_load(addr)?;
        let ty = cur.ty().clone();

        let next = match &*ty {
            IrType::Ptr { .. } => {
                let i64t = self.pool_mut().int(64, true);
                let delta = Operand::int(if decrement { -1i64 as u64 } else { 1 }, i64t);
                self.b_mut()?.build_gep(cur, delta)?
            }
            IrType::Float { .. } => {
                let one = Operand::float(1.0, ty.clone());
                let op = if decrement {
                    IrBinaryOp::FSub
                } else {
                    IrBinaryOp::FAdd
                };
                self.b_mut()?.build_binary(op, cur, one, ty.clone())?
            }
            IrType::Int { .. } => {
                let pty = eval::promote_type(self.pool_mut(), &ty);
                let cur = self.convert(cur, &pty)?;
                let one = Operand::int(1, pty.clone());
                let op = if decrement { IrBinaryOp::Sub } else { IrBinaryOp::Add };
                let widened = self.b_mut()?.build_binary(op, cur, one, pty)?;
                self.convert(widened, &ty)?
            }
            _ => {
                self.diag(
                    DiagnosticKind::OperatorMisuse,
                    loc,
                    "operand of '++'/'--' must be scalar",
                );
                return Ok(());
            }
        };

        let Some(addr) = self.lower_addr(lv)? else {
            return Ok(());
        };
        self.b_mut()?.build_store(next, addr)
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        loc: &SourceLocation,
    ) -> Result<Option<Operand>, CompilerError> {
        if op.is_logical() {
            return self.lower_logical(op, left, right, loc);
        }
        let Some(l) = self.lower_value(left)? else {
            return Ok(None);
        };
        let Some(r) = self.lower_value(right)? else {
            return Ok(None);
        };
        self.emit_binary(op, l, r, loc)
    }

    /// Lower a binary operation over already-computed operands. Both
    /// constants fold; pointer arithmetic becomes `geteleptr`.
    pub(crate) fn emit_binary(
        &mut self,
        op: BinaryOp,
        l: Operand,
        r: Operand,
        loc: &SourceLocation,
    ) -> Result<Option<Operand>, CompilerError> {
        if l.is_const() && r.is_const() {
            return match eval::eval_binary(self.pool_mut(), op, &l, &r) {
                Ok(v) => Ok(Some(v)),
                Err(err) => {
                    self.report_eval_error(err, loc);
                    Ok(None)
                }
            };
        }

        let lp = l.ty().is_pointer();
        let rp = r.ty().is_pointer();

        if op.is_comparison() {
            let (cl, cr, float) = if lp || rp {
                // the integer side of a pointer comparison is a null
                // constant or an integer coerced to the pointer type
                let ptr_ty = if lp { l.ty().clone() } else { r.ty().clone() };
                let cl = self.convert(l, &ptr_ty)?;
                let cr = self.convert(r, &ptr_ty)?;
                (cl, cr, false)
            } else {
                let ty = eval::common_type(self.pool_mut(), l.ty(), r.ty());
                let cl = self.convert(l, &ty)?;
                let cr = self.convert(r, &ty)?;
                let float = ty.is_float();
                (cl, cr, float)
            };
            let cond = comparison_condition(op);
            return if float {
                self.b_mut()?.build_fcmp(cond, cl, cr).map(Some)
            } else {
                self.b_mut()?.build_icmp(cond, cl, cr).map(Some)
            };
        }

        // pointer arithmetic
        if (lp || rp) && matches!(op, BinaryOp::Add | BinaryOp::Sub) {
            return self.emit_pointer_arith(op, l, r, loc);
        }
        if lp || rp {
            self.diag(
                DiagnosticKind::OperatorMisuse,
                loc,
                format!("'{op}' cannot be applied to pointers"),
            );
            return Ok(None);
        }

        if op.is_integer_only() && (l.ty().is_float() || r.ty().is_float()) {
            self.diag(
                DiagnosticKind::OperatorMisuse,
                loc,
                format!("'{op}' requires integer operands"),
            );
            return Ok(None);
        }
        if !l.ty().is_integer() && !l.ty().is_float()
            || !r.ty().is_integer() && !r.ty().is_float()
        {
            self.diag(
                DiagnosticKind::TypeMismatch,
                loc,
                format!("'{op}' requires arithmetic operands"),
            );
            return Ok(None);
        }

        if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
            let ty = eval::promote_type(self.pool_mut(), l.ty());
            let cl = self.convert(l, &ty)?;
            let cr = self.convert(r, &ty)?;
            let ir_op = if matches!(op, BinaryOp::Shl) {
                IrBinaryOp::Shl
            } else if ty.is_signed() {
                IrBinaryOp::Ashr
            } else {
                IrBinaryOp::Lshr
            };
            return self.b_mut()?.build_binary(ir_op, cl, cr, ty).map(Some);
        }

        let ty = eval::common_type(self.pool_mut(), l.ty(), r.ty());
        let cl = self.convert(l, &ty)?;
        let cr = self.convert(r, &ty)?;
        let ir_op = if ty.is_float() {
            match op {
                BinaryOp::Add => IrBinaryOp::FAdd,
                BinaryOp::Sub => IrBinaryOp::FSub,
                BinaryOp::Mul => IrBinaryOp::FMul,
                BinaryOp::Div => IrBinaryOp::FDiv,
                _ => unreachable!("integer-only op on float rejected above"),
            }
        } else {
            match op {
                BinaryOp::Add => IrBinaryOp::Add,
                BinaryOp::Sub => IrBinaryOp::Sub,
                BinaryOp::Mul => IrBinaryOp::Mul,
                BinaryOp::Div => IrBinaryOp::Div,
                BinaryOp::Mod => IrBinaryOp::Mod,
                BinaryOp::BitAnd => IrBinaryOp::And,
                BinaryOp::BitOr => IrBinaryOp::Or,
                BinaryOp::BitXor => IrBinaryOp::Xor,
                _ => unreachable!(),
            }
        };
        self.b_mut()?.build_binary(ir_op, cl, cr, ty).map(Some)
    }

    fn emit_pointer_arith(
        &mut self,
        op: BinaryOp,
        l: Operand,
        r: Operand,
        loc: &SourceLocation,
    ) -> Result<Option<Operand>, CompilerError> {
        let lp = l.ty().is_pointer();
        let rp = r.ty().is_pointer();

        if lp && rp {
            if matches!(op, BinaryOp::Add) {
                self.diag(DiagnosticKind::OperatorMisuse, loc, "cannot add two pointers");
                return Ok(None);
            }
            // p - q: byte difference scaled down by the element size
            let elem_size = l.ty().inner().map(|t| t.size()).unwrap_or(1).max(1);
            let i64t = self.pool_mut().int(64, true);
            let li = self.b_mut()?.build_convert(ConvOp::PtrToI, l, i64t.clone())?;
            let ri = self.b_mut()?.build_convert(ConvOp::PtrToI, r, i64t.clone())?;
            let diff = self
                .b_mut()?
                .build_binary(IrBinaryOp::Sub, li, ri, i64t.clone())?;
            let size = Operand::int(elem_size, i64t.clone());
            return self
                .b_mut()?
                .build_binary(IrBinaryOp::Div, diff, size, i64t)
                .map(Some);
        }

        if rp && matches!(op, BinaryOp::Sub) {
            self.diag(
                DiagnosticKind::OperatorMisuse,
                loc,
                "cannot subtract a pointer from an integer",
            );
            return Ok(None);
        }
        let (ptr, idx) = if lp { (l, r) } else { (r, l) };
        if !idx.ty().is_integer() {
            self.diag(
                DiagnosticKind::OperatorMisuse,
                loc,
                "pointer offset must be an integer",
            );
            return Ok(None);
        }
        let i64t = self.pool_mut().int(64, true);
        let idx = self.convert(idx, &i64t)?;
        let idx = if matches!(op, BinaryOp::Sub) {
            match idx {
                Operand::Int(c) => Operand::int(c.as_i64().wrapping_neg() as u64, i64t),
                other => {
                    let zero = Operand::int(0, i64t.clone());
                    self.b_mut()?.build_binary(IrBinaryOp::Sub, zero, other, i64t)?
                }
            }
        } else {
            idx
        };
        self.b_mut()?.build_gep(ptr, idx).map(Some)
    }

    /// Short-circuit `&&` / `||`: each arrival path stores the
    /// immediate constant into a slot; the merge block loads it.
    fn lower_logical(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        loc: &SourceLocation,
    ) -> Result<Option<Operand>, CompilerError> {
        let is_and = matches!(op, BinaryOp::LogicalAnd);
        let Some(l) = self.lower_value(left)? else {
            return Ok(None);
        };

        // a constant left side decides statically whether the right
        // side is evaluated at all
        if l.is_const() {
            let truthy = match &l {
                Operand::Int(c) => !c.is_zero(),
                Operand::Float(c) => c.value != 0.0,
                Operand::Reg(_) => unreachable!(),
            };
            if truthy == is_and {
                let Some(r) = self.lower_value(right)? else {
                    return Ok(None);
                };
                return self.to_cond(r, loc);
            }
            let b = self.pool_mut().bool();
            return Ok(Some(Operand::int(!is_and as u64, b)));
        }

        let bool_ty = self.pool_mut().bool();
        let slot = self.b_mut()?.build_alloca(bool_ty.clone())?;

        let Some(c1) = self.to_cond(l, loc)? else {
            return Ok(None);
        };

        let rhs_blk = self.b_mut()?.new_block();
        let true_blk = self.b_mut()?.new_block();
        let false_blk = self.b_mut()?.new_block();
        let merge_blk = self.b_mut()?.new_block();

        if is_and {
            self.b_mut()?.build_condbr(c1, rhs_blk, false_blk)?;
        } else {
            self.b_mut()?.build_condbr(c1, true_blk, rhs_blk)?;
        }

        self.b_mut()?.switch_to(rhs_blk);
        match self.lower_value(right)? {
            Some(r) => {
                if let Some(c2) = self.to_cond(r, loc)? {
                    self.b_mut()?.build_condbr(c2, true_blk, false_blk)?;
                }
            }
            None => {
                // already diagnosed; keep the graph well-formed
                self.b_mut()?.build_br(false_blk)?;
            }
        }

        self.b_mut()?.switch_to(true_blk);
        self.b_mut()?
            .build_store(Operand::int(1, bool_ty.clone()), Operand::Reg(slot.clone()))?;
        self.b_mut()?.build_br(merge_blk)?;

        self.b_mut()?.switch_to(false_blk);
        self.b_mut()?
            .build_store(Operand::int(0, bool_ty), Operand::Reg(slot.clone()))?;
        self.b_mut()?.build_br(merge_blk)?;

        self.b_mut()?.switch_to(merge_blk);
        self.b_mut()?.build_load(Operand::Reg(slot)).map(Some)
    }

    fn lower_conditional(
        &mut self,
        cond: &Expression,
        then_expr: &Expression,
        else_expr: &Expression,
        loc: &SourceLocation,
    ) -> Result<Option<Operand>, CompilerError> {
        let Some(c) = self.lower_value(cond)? else {
            return Ok(None);
        };
        let Some(c) = self.to_cond(c, loc)? else {
            return Ok(None);
        };
        let Some(t) = self.lower_value(then_expr)? else {
            return Ok(None);
        };
        let Some(f) = self.lower_value(else_expr)? else {
            return Ok(None);
        };

        let ty = if t.ty().is_pointer() || f.ty().is_pointer() {
            if t.ty().is_pointer() {
                t.ty().clone()
            } else {
                f.ty().clone()
            }
        } else {
            eval::common_type(self.pool_mut(), t.ty(), f.ty())
        };
        let t = self.convert(t, &ty)?;
        let f = self.convert(f, &ty)?;

        // both arms are already evaluated, so even a constant
        // condition goes through select: dropping the untaken operand
        // would leave a register without its one use
        self.b_mut()?.build_select(c, t, f, ty).map(Some)
    }

    /// Lower a call. Outer `Option` is the error path; inner is the
    /// call's value (`None` for void or discarded results).
    pub(crate) fn lower_call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
        loc: &SourceLocation,
        want_value: bool,
    ) -> Result<Option<Option<Operand>>, CompilerError> {
        let Some(callee_v) = self.lower_value(callee)? else {
            return Ok(None);
        };
        let (ret, params, variadic) = match &**callee_v.ty() {
            IrType::Ptr { pointee } => match &**pointee {
                IrType::Func {
                    ret,
                    params,
                    variadic,
                } => (ret.clone(), params.clone(), *variadic),
                _ => {
                    self.diag(
                        DiagnosticKind::TypeMismatch,
                        loc,
                        "called object is not a function",
                    );
                    return Ok(None);
                }
            },
            _ => {
                self.diag(
                    DiagnosticKind::TypeMismatch,
                    loc,
                    "called object is not a function",
                );
                return Ok(None);
            }
        };

        if args.len() < params.len() || (args.len() > params.len() && !variadic) {
            self.diag(
                DiagnosticKind::TypeMismatch,
                loc,
                format!(
                    "call supplies {} argument(s), callee takes {}{}",
                    args.len(),
                    params.len(),
                    if variadic { " or more" } else { "" }
                ),
            );
            return Ok(None);
        }

        let mut lowered = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let Some(v) = self.lower_value(arg)? else {
                return Ok(None);
            };
            let v = if let Some(pty) = params.get(i) {
                let pty = pty.clone();
                self.convert(v, &pty)?
            } else {
                self.promote_vararg(v)?
            };
            lowered.push(v);
        }

        let result = self
            .b_mut()?
            .build_call(callee_v, lowered, ret, want_value)?;
        Ok(Some(result))
    }

    /// Default argument promotions for variadic extras
    fn promote_vararg(&mut self, v: Operand) -> Result<Operand, CompilerError> {
        match &**v.ty() {
            IrType::Float { width: 32 } => {
                let f64t = self.pool_mut().float(64);
                self.convert(v, &f64t)
            }
            IrType::Int { width, .. } if *width < 32 => {
                let i32t = self.pool_mut().int(32, true);
                self.convert(v, &i32t)
            }
            _ => Ok(v),
        }
    }

    pub(crate) fn lower_assign(
        &mut self,
        op: Option<BinaryOp>,
        target: &Expression,
        value: &Expression,
        loc: &SourceLocation,
        want_value: bool,
    ) -> Result<Option<Operand>, CompilerError> {
        let stored = match op {
            None => {
                let Some(v) = self.lower_value(value)? else {
                    return Ok(None);
                };
                let Some(addr) = self.lower_addr(target)? else {
                    return Ok(None);
                };
                self.store_converted(v, addr, loc)?
            }
            Some(op) => {
                let Some(addr) = self.lower_addr(target)? else {
                    return Ok(None);
                };
                let pointee = addr.ty().inner().cloned().ok_or_else(|| {
                    CompilerError::internal("assignment target address is not a pointer")
                })?;
                if pointee.is_array() {
                    self.diag(DiagnosticKind::TypeMismatch, loc, "cannot assign to an array");
                    return Ok(None);
                }
                let cur = self.b_mut()?.build_load(addr)?;
                let Some(r) = self.lower_value(value)? else {
                    return Ok(None);
                };
                let Some(combined) = self.emit_binary(op, cur, r, loc)? else {
                    return Ok(None);
                };
                let Some(addr) = self.lower_addr(target)? else {
                    return Ok(None);
                };
                self.store_converted(combined, addr, loc)?
            }
        };
        if !stored {
            return Ok(None);
        }

        if !want_value {
            return Ok(None);
        }
        let Some(addr) = self.lower_addr(target)? else {
            return Ok(None);
        };
        self.b_mut()?.build_load(addr).map(Some)
    }

    /// Convert and store a value through an address; false when the
    /// types cannot be reconciled
    pub(crate) fn store_converted(
        &mut self,
        v: Operand,
        addr: Operand,
        loc: &SourceLocation,
    ) -> Result<bool, CompilerError> {
        let target_ty = addr.ty().inner().cloned().ok_or_else(|| {
            CompilerError::internal("assignment target address is not a pointer")
        })?;
        if target_ty.is_array() || target_ty.is_function() || target_ty.is_void() {
            self.diag(DiagnosticKind::TypeMismatch, loc, "cannot assign to this type");
            return Ok(false);
        }
        let compatible = (target_ty.is_integer() || target_ty.is_float())
            && (v.ty().is_integer() || v.ty().is_float())
            || target_ty.is_pointer() && (v.ty().is_pointer() || v.ty().is_integer())
            || (target_ty.is_integer() && v.ty().is_pointer());
        if !compatible {
            self.diag(
                DiagnosticKind::TypeMismatch,
                loc,
                format!("cannot assign {} to {}", v.ty(), target_ty),
            );
            return Ok(false);
        }
        let v = self.convert(v, &target_ty)?;
        self.b_mut()?.build_store(v, addr)?;
        Ok(true)
    }

    /// Convert a value to a target type, folding constants and
    /// choosing the conversion op by the type shapes
    pub(crate) fn convert(
        &mut self,
        v: Operand,
        target: &TypeRef,
    ) -> Result<Operand, CompilerError> {
        if v.ty() == target {
            return Ok(v);
        }

        // constants convert at build time
        match (&v, &**target) {
            (Operand::Int(c), IrType::Int { .. }) => {
                let bits = if c.ty.is_signed() { c.as_i64() as u64 } else { c.value };
                return Ok(Operand::int(bits, target.clone()));
            }
            (Operand::Int(c), IrType::Float { .. }) => {
                let value = if c.ty.is_signed() {
                    c.as_i64() as f64
                } else {
                    c.value as f64
                };
                return Ok(Operand::float(value, target.clone()));
            }
            (Operand::Float(c), IrType::Int { signed, .. }) => {
                let bits = if *signed {
                    c.value as i64 as u64
                } else {
                    c.value as u64
                };
                return Ok(Operand::int(bits, target.clone()));
            }
            (Operand::Float(c), IrType::Float { .. }) => {
                return Ok(Operand::float(c.value, target.clone()));
            }
            _ => {}
        }

        let op = match (&**v.ty(), &**target) {
            (IrType::Int { width: ws, signed }, IrType::Int { width: wd, .. }) => {
                if wd < ws {
                    ConvOp::Trunc
                } else if wd > ws {
                    if *signed {
                        ConvOp::Sext
                    } else {
                        ConvOp::Zext
                    }
                } else {
                    ConvOp::Bitcast
                }
            }
            (IrType::Int { signed, .. }, IrType::Float { .. }) => {
                if *signed {
                    ConvOp::StoF
                } else {
                    ConvOp::UtoF
                }
            }
            (IrType::Float { .. }, IrType::Int { signed, .. }) => {
                if *signed {
                    ConvOp::FtoS
                } else {
                    ConvOp::FtoU
                }
            }
            (IrType::Float { width: 32 }, IrType::Float { width: 64 }) => ConvOp::Fext,
            (IrType::Float { width: 64 }, IrType::Float { width: 32 }) => ConvOp::Ftrunc,
            (IrType::Ptr { .. }, IrType::Int { .. }) => ConvOp::PtrToI,
            (IrType::Int { .. }, IrType::Ptr { .. }) => ConvOp::IToPtr,
            (IrType::Ptr { .. }, IrType::Ptr { .. }) => ConvOp::Bitcast,
            (from, to) => {
                return Err(CompilerError::internal(format!(
                    "no conversion from {from} to {to}"
                )));
            }
        };
        self.b_mut()?.build_convert(op, v, target.clone())
    }

    pub(crate) fn report_eval_error(&mut self, err: EvalError, loc: &SourceLocation) {
        let kind = match err {
            EvalError::ZeroDivide => DiagnosticKind::ZeroDivide,
            EvalError::OperatorMisuse => DiagnosticKind::OperatorMisuse,
        };
        self.diag(kind, loc, err.to_string());
    }

    /// Evaluate an expression only for its side effects. Operators
    /// whose results are unused are not emitted, so no register is
    /// ever left without a use.
    pub(crate) fn lower_for_effect(&mut self, e: &Expression) -> Result<(), CompilerError> {
        match &e.kind {
            ExpressionKind::Assign { op, target, value } => {
                self.lower_assign(*op, target, value, &e.loc, false)?;
                Ok(())
            }
            ExpressionKind::Call { callee, args } => {
                self.lower_call(callee, args, &e.loc, false)?;
                Ok(())
            }
            ExpressionKind::Unary {
                op: op @ (UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec),
                operand,
            } => self.inc_dec_effect(operand, *op, &e.loc),
            ExpressionKind::Unary { operand, .. } => self.lower_for_effect(operand),
            ExpressionKind::Binary { op, left, right } if op.is_logical() => {
                self.logical_for_effect(*op, left, right, &e.loc)
            }
            ExpressionKind::Binary { left, right, .. } => {
                self.lower_for_effect(left)?;
                self.lower_for_effect(right)
            }
            ExpressionKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                // the value form evaluates all three through `select`
                self.lower_for_effect(cond)?;
                self.lower_for_effect(then_expr)?;
                self.lower_for_effect(else_expr)
            }
            ExpressionKind::Comma { lhs, rhs } => {
                self.lower_for_effect(lhs)?;
                self.lower_for_effect(rhs)
            }
            ExpressionKind::Index { base, index } => {
                self.lower_for_effect(base)?;
                self.lower_for_effect(index)
            }
            ExpressionKind::Cast { operand, .. } => self.lower_for_effect(operand),
            ExpressionKind::IntLiteral { .. }
            | ExpressionKind::FloatLiteral { .. }
            | ExpressionKind::CharLiteral(_)
            | ExpressionKind::Identifier(_)
            | ExpressionKind::SizeofExpr(_)
            | ExpressionKind::SizeofType(_) => Ok(()),
        }
    }

    /// `&&`/`||` for effect only: the right side still runs
    /// conditionally, but no slot or result is materialized
    fn logical_for_effect(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        loc: &SourceLocation,
    ) -> Result<(), CompilerError> {
        let is_and = matches!(op, BinaryOp::LogicalAnd);
        let Some(l) = self.lower_value(left)? else {
            return Ok(());
        };
        if l.is_const() {
            let truthy = match &l {
                Operand::Int(c) => !c.is_zero(),
                Operand::Float(c) => c.value != 0.0,
                Operand::Reg(_) => unreachable!(),
            };
            if truthy == is_and {
                self.lower_for_effect(right)?;
            }
            return Ok(());
        }
        let Some(c1) = self.to_cond(l, loc)? else {
            return Ok(());
        };
        let eval_blk = self.b_mut()?.new_block();
        let skip_blk = self.b_mut()?.new_block();
        if is_and {
            self.b_mut()?.build_condbr(c1, eval_blk, skip_blk)?;
        } else {
            self.b_mut()?.build_condbr(c1, skip_blk, eval_blk)?;
        }
        self.b_mut()?.switch_to(eval_blk);
        self.lower_for_effect(right)?;
        if !self.b_mut()?.current_has_terminator() {
            self.b_mut()?.build_br(skip_blk)?;
        }
        self.b_mut()?.switch_to(skip_blk);
        Ok(())
    }

    /// Static type of an expression, used by `sizeof`
    pub(crate) fn type_of_expr(
        &mut self,
        e: &Expression,
    ) -> Result<Option<TypeRef>, CompilerError> {
        let ty = match &e.kind {
            ExpressionKind::IntLiteral {
                value,
                base,
                suffix,
            } => {
                let cty = Type::for_int_literal(*value, *base, suffix);
                super::ctype_to_ir(self.pool_mut(), &cty)
            }
            ExpressionKind::FloatLiteral { value, suffix } => {
                let cty = Type::for_float_literal(*value, *suffix);
                super::ctype_to_ir(self.pool_mut(), &cty)
            }
            ExpressionKind::CharLiteral(_) => self.pool_mut().int(32, true),
            ExpressionKind::Identifier(name) => match self.scopes.lookup(name).cloned() {
                None => {
                    self.diag(
                        DiagnosticKind::TypeMismatch,
                        &e.loc,
                        format!("use of undeclared identifier '{name}'"),
                    );
                    return Ok(None);
                }
                Some(Binding::Local { addr }) => match addr.ty.inner() {
                    Some(t) => t.clone(),
                    None => return Err(CompilerError::internal("local address is not a pointer")),
                },
                Some(Binding::Global { ty, .. }) => ty,
                Some(Binding::Func { ty, .. }) => self.pool_mut().ptr_to(ty),
            },
            ExpressionKind::Unary { op, operand } => {
                let Some(inner) = self.type_of_expr(operand)? else {
                    return Ok(None);
                };
                match op {
                    UnaryOp::Deref => match inner.inner() {
                        Some(t) => t.clone(),
                        None => {
                            self.diag(
                                DiagnosticKind::OperatorMisuse,
                                &e.loc,
                                "cannot dereference a non-pointer value",
                            );
                            return Ok(None);
                        }
                    },
                    UnaryOp::AddrOf => self.pool_mut().ptr_to(inner),
                    UnaryOp::LogicalNot => self.pool_mut().bool(),
                    UnaryOp::Minus | UnaryOp::Plus | UnaryOp::BitNot => {
                        if inner.is_float() {
                            inner
                        } else {
                            eval::promote_type(self.pool_mut(), &inner)
                        }
                    }
                    _ => inner,
                }
            }
            ExpressionKind::Binary { op, left, right } => {
                if op.is_comparison() || op.is_logical() {
                    self.pool_mut().bool()
                } else {
                    let Some(lt) = self.type_of_expr(left)? else {
                        return Ok(None);
                    };
                    let Some(rt) = self.type_of_expr(right)? else {
                        return Ok(None);
                    };
                    if lt.is_pointer() {
                        if rt.is_pointer() {
                            self.pool_mut().int(64, true)
                        } else {
                            lt
                        }
                    } else if rt.is_pointer() {
                        rt
                    } else if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
                        eval::promote_type(self.pool_mut(), &lt)
                    } else {
                        eval::common_type(self.pool_mut(), &lt, &rt)
                    }
                }
            }
            ExpressionKind::Assign { target, .. } => {
                let Some(t) = self.type_of_expr(target)? else {
                    return Ok(None);
                };
                t
            }
            ExpressionKind::Conditional {
                then_expr,
                else_expr,
                ..
            } => {
                let Some(t) = self.type_of_expr(then_expr)? else {
                    return Ok(None);
                };
                let Some(f) = self.type_of_expr(else_expr)? else {
                    return Ok(None);
                };
                if t.is_pointer() {
                    t
                } else if f.is_pointer() {
                    f
                } else {
                    eval::common_type(self.pool_mut(), &t, &f)
                }
            }
            ExpressionKind::Call { callee, .. } => {
                let Some(cty) = self.type_of_expr(callee)? else {
                    return Ok(None);
                };
                let fty = match &*cty {
                    IrType::Ptr { pointee } => pointee.clone(),
                    _ => cty,
                };
                match fty.return_type() {
                    Some(t) => t.clone(),
                    None => {
                        self.diag(
                            DiagnosticKind::TypeMismatch,
                            &e.loc,
                            "called object is not a function",
                        );
                        return Ok(None);
                    }
                }
            }
            ExpressionKind::Index { base, .. } => {
                let Some(bt) = self.type_of_expr(base)? else {
                    return Ok(None);
                };
                match bt.inner() {
                    Some(t) => t.clone(),
                    None => {
                        self.diag(
                            DiagnosticKind::TypeMismatch,
                            &e.loc,
                            "subscripted value is neither array nor pointer",
                        );
                        return Ok(None);
                    }
                }
            }
            ExpressionKind::Cast { target, .. } => super::ctype_to_ir(self.pool_mut(), target),
            ExpressionKind::SizeofExpr(_) | ExpressionKind::SizeofType(_) => {
                self.pool_mut().int(64, false)
            }
            ExpressionKind::Comma { rhs, .. } => {
                let Some(t) = self.type_of_expr(rhs)? else {
                    return Ok(None);
                };
                t
            }
        };
        Ok(Some(ty))
    }
}

fn comparison_condition(op: BinaryOp) -> Condition {
    match op {
        BinaryOp::Lt => Condition::Lt,
        BinaryOp::Gt => Condition::Gt,
        BinaryOp::Le => Condition::Le,
        BinaryOp::Ge => Condition::Ge,
        BinaryOp::Eq => Condition::Eq,
        BinaryOp::Ne => Condition::Ne,
        other => unreachable!("'{other}' is not a comparison"),
    }
}
