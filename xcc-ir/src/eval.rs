//! Compile-time evaluation of constant operands
//!
//! Binary and unary operations on two constants fold at build time.
//! Integer arithmetic is two's-complement at the result's declared
//! width; mixing an integer with a float promotes the integer and
//! yields a float; comparisons and logical connectives yield `i1`.

use crate::types::{IrType, TypePool, TypeRef};
use crate::values::{IntConst, Operand};
use thiserror::Error;
use xcc_frontend::{BinaryOp, UnaryOp};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    #[error("division by zero in constant expression")]
    ZeroDivide,

    #[error("operator cannot be applied to these operands")]
    OperatorMisuse,
}

/// Integer promotion: everything narrower than `int` widens to `int`
pub fn promote_type(pool: &mut TypePool, ty: &TypeRef) -> TypeRef {
    match **ty {
        IrType::Int { width, .. } if width < 32 => pool.int(32, true),
        _ => ty.clone(),
    }
}

/// Usual arithmetic conversions over two arithmetic types
pub fn common_type(pool: &mut TypePool, a: &TypeRef, b: &TypeRef) -> TypeRef {
    match (&**a, &**b) {
        (IrType::Float { width: wa }, IrType::Float { width: wb }) => {
            pool.float((*wa).max(*wb))
        }
        (IrType::Float { width }, _) | (_, IrType::Float { width }) => pool.float(*width),
        _ => {
            let pa = promote_type(pool, a);
            let pb = promote_type(pool, b);
            match (&*pa, &*pb) {
                (
                    IrType::Int {
                        width: wa,
                        signed: sa,
                    },
                    IrType::Int {
                        width: wb,
                        signed: sb,
                    },
                ) => {
                    if wa > wb {
                        pa.clone()
                    } else if wb > wa {
                        pb.clone()
                    } else {
                        pool.int(*wa, *sa && *sb)
                    }
                }
                _ => pa.clone(),
            }
        }
    }
}

fn as_f64(op: &Operand) -> f64 {
    match op {
        Operand::Int(c) if c.ty.is_signed() => c.as_i64() as f64,
        Operand::Int(c) => c.value as f64,
        Operand::Float(c) => c.value,
        Operand::Reg(_) => unreachable!("constant expected"),
    }
}

/// The operand's value widened to 64 bits per its own signedness
fn as_bits(op: &Operand) -> u64 {
    match op {
        Operand::Int(c) if c.ty.is_signed() => c.as_i64() as u64,
        Operand::Int(c) => c.value,
        _ => unreachable!("integer constant expected"),
    }
}

fn is_truthy(op: &Operand) -> bool {
    match op {
        Operand::Int(c) => !c.is_zero(),
        Operand::Float(c) => c.value != 0.0,
        Operand::Reg(_) => unreachable!("constant expected"),
    }
}

/// Fold a binary operation over two constants
pub fn eval_binary(
    pool: &mut TypePool,
    op: BinaryOp,
    lhs: &Operand,
    rhs: &Operand,
) -> Result<Operand, EvalError> {
    let lf = lhs.ty().is_float();
    let rf = rhs.ty().is_float();
    let any_float = lf || rf;

    if op.is_integer_only() && any_float {
        return Err(EvalError::OperatorMisuse);
    }

    if op.is_logical() {
        let l = is_truthy(lhs);
        let r = is_truthy(rhs);
        let v = match op {
            BinaryOp::LogicalAnd => l && r,
            _ => l || r,
        };
        return Ok(Operand::int(v as u64, pool.bool()));
    }

    if op.is_comparison() {
        let v = if any_float {
            let l = as_f64(lhs);
            let r = as_f64(rhs);
            match op {
                BinaryOp::Lt => l < r,
                BinaryOp::Gt => l > r,
                BinaryOp::Le => l <= r,
                BinaryOp::Ge => l >= r,
                BinaryOp::Eq => l == r,
                _ => l != r,
            }
        } else {
            let ty = common_type(pool, lhs.ty(), rhs.ty());
            if ty.is_signed() {
                let l = as_bits(lhs) as i64;
                let r = as_bits(rhs) as i64;
                compare(op, l, r)
            } else {
                compare(op, as_bits(lhs), as_bits(rhs))
            }
        };
        return Ok(Operand::int(v as u64, pool.bool()));
    }

    if any_float {
        let ty = common_type(pool, lhs.ty(), rhs.ty());
        let l = as_f64(lhs);
        let r = as_f64(rhs);
        let v = match op {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
            _ => return Err(EvalError::OperatorMisuse),
        };
        return Ok(Operand::float(v, ty));
    }

    // shifts keep the promoted type of the left operand
    if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
        let ty = promote_type(pool, lhs.ty());
        let width = match *ty {
            IrType::Int { width, .. } => width as u32,
            _ => return Err(EvalError::OperatorMisuse),
        };
        let amount = (as_bits(rhs) as u32) % width.max(1);
        let v = match op {
            BinaryOp::Shl => as_bits(lhs) << amount,
            _ if ty.is_signed() => ((as_bits(lhs) as i64) >> amount) as u64,
            _ => {
                // shift within the value's own width, not 64 bits
                let masked = IntConst::new(as_bits(lhs), ty.clone()).value;
                masked >> amount
            }
        };
        return Ok(Operand::int(v, ty));
    }

    let ty = common_type(pool, lhs.ty(), rhs.ty());
    let l = as_bits(lhs);
    let r = as_bits(rhs);
    let v = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div | BinaryOp::Mod => {
            if r == 0 {
                return Err(EvalError::ZeroDivide);
            }
            if ty.is_signed() {
                let (l, r) = (l as i64, r as i64);
                let v = if matches!(op, BinaryOp::Div) {
                    l.wrapping_div(r)
                } else {
                    l.wrapping_rem(r)
                };
                v as u64
            } else if matches!(op, BinaryOp::Div) {
                l / r
            } else {
                l % r
            }
        }
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        _ => unreachable!("handled above"),
    };
    Ok(Operand::int(v, ty))
}

fn compare<T: PartialOrd + PartialEq>(op: BinaryOp, l: T, r: T) -> bool {
    match op {
        BinaryOp::Lt => l < r,
        BinaryOp::Gt => l > r,
        BinaryOp::Le => l <= r,
        BinaryOp::Ge => l >= r,
        BinaryOp::Eq => l == r,
        _ => l != r,
    }
}

/// Fold a unary operation over a constant
pub fn eval_unary(pool: &mut TypePool, op: UnaryOp, v: &Operand) -> Result<Operand, EvalError> {
    match op {
        UnaryOp::Plus => Ok(v.clone()),
        UnaryOp::Minus => {
            if v.ty().is_float() {
                Ok(Operand::float(-as_f64(v), v.ty().clone()))
            } else {
                let ty = promote_type(pool, v.ty());
                Ok(Operand::int((as_bits(v) as i64).wrapping_neg() as u64, ty))
            }
        }
        UnaryOp::BitNot => {
            if v.ty().is_float() {
                return Err(EvalError::OperatorMisuse);
            }
            let ty = promote_type(pool, v.ty());
            Ok(Operand::int(!as_bits(v), ty))
        }
        UnaryOp::LogicalNot => Ok(Operand::int(!is_truthy(v) as u64, pool.bool())),
        _ => Err(EvalError::OperatorMisuse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn i32_op(pool: &mut TypePool, v: i64) -> Operand {
        let ty = pool.int(32, true);
        Operand::int(v as u64, ty)
    }

    #[test]
    fn test_fold_arithmetic() {
        let mut pool = TypePool::new();
        let two = i32_op(&mut pool, 2);
        let three = i32_op(&mut pool, 3);
        let five = eval_binary(&mut pool, BinaryOp::Add, &two, &three).unwrap();
        let four = i32_op(&mut pool, 4);
        let twenty = eval_binary(&mut pool, BinaryOp::Mul, &five, &four).unwrap();

        let i32t = pool.int(32, true);
        assert_eq!(twenty, Operand::int(20, i32t));
    }

    #[test]
    fn test_zero_divide_reported() {
        let mut pool = TypePool::new();
        let one = i32_op(&mut pool, 1);
        let zero = i32_op(&mut pool, 0);
        assert_eq!(
            eval_binary(&mut pool, BinaryOp::Div, &one, &zero),
            Err(EvalError::ZeroDivide)
        );
        assert_eq!(
            eval_binary(&mut pool, BinaryOp::Mod, &one, &zero),
            Err(EvalError::ZeroDivide)
        );
    }

    #[test]
    fn test_mixed_promotes_to_float() {
        let mut pool = TypePool::new();
        let two = i32_op(&mut pool, 2);
        let f64t = pool.float(64);
        let half = Operand::float(0.5, f64t.clone());
        let v = eval_binary(&mut pool, BinaryOp::Add, &two, &half).unwrap();
        assert_eq!(v, Operand::float(2.5, f64t));
    }

    #[test]
    fn test_bitnot_rejects_float() {
        let mut pool = TypePool::new();
        let f = Operand::float(1.0, pool.float(64));
        assert_eq!(
            eval_unary(&mut pool, UnaryOp::BitNot, &f),
            Err(EvalError::OperatorMisuse)
        );
    }

    #[test]
    fn test_logical_not_is_compare_with_zero() {
        let mut pool = TypePool::new();
        let zero = i32_op(&mut pool, 0);
        let v = eval_unary(&mut pool, UnaryOp::LogicalNot, &zero).unwrap();
        let b = pool.bool();
        assert_eq!(v, Operand::int(1, b));
    }

    #[test]
    fn test_comparison_signedness() {
        let mut pool = TypePool::new();
        let u32t = pool.int(32, false);
        let minus_one = i32_op(&mut pool, -1);
        let one_unsigned = Operand::int(1, u32t);
        // at common type u32, -1 becomes a large value
        let v = eval_binary(&mut pool, BinaryOp::Lt, &minus_one, &one_unsigned).unwrap();
        let b = pool.bool();
        assert_eq!(v, Operand::int(0, b));
    }

    #[test]
    fn test_wrapping_at_width() {
        let mut pool = TypePool::new();
        let max = i32_op(&mut pool, i32::MAX as i64);
        let one = i32_op(&mut pool, 1);
        let v = eval_binary(&mut pool, BinaryOp::Add, &max, &one).unwrap();
        match v {
            Operand::Int(c) => assert_eq!(c.as_i64(), i32::MIN as i64),
            other => panic!("expected int, got {other}"),
        }
    }
}
