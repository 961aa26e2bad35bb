//! Global initializer folding
//!
//! A global's initializer must reduce to a single constant or to an
//! address expression over exactly one global symbol. Partial results
//! live on the builder's local stack while the expression tree is
//! folded bottom-up; the stack must be drained before a global is
//! finalized and is verified empty at module completion.

use crate::types::{IrType, TypeRef};
use crate::values::{FloatConst, IntConst, Operand};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitError {
    #[error("initializer does not reduce to a constant")]
    NotConstant,

    #[error("initializer combines two relocatable addresses")]
    TwoAddresses,

    #[error("initializer stack not drained ({0} nodes left)")]
    StackNotEmpty(usize),
}

/// A folded initializer: a constant, or base-symbol plus byte offset
#[derive(Debug, Clone, PartialEq)]
pub enum InitTree {
    Const(Operand),
    Addr { base: String, offset: i64 },
}

impl fmt::Display for InitTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitTree::Const(op) => write!(f, "{op}"),
            InitTree::Addr { base, offset } if *offset == 0 => write!(f, "@{base}"),
            InitTree::Addr { base, offset } if *offset > 0 => write!(f, "@{base} + {offset}"),
            InitTree::Addr { base, offset } => write!(f, "@{base} - {}", -offset),
        }
    }
}

/// Builder with a local node stack, threaded through the folding walk
#[derive(Debug, Default)]
pub struct InitBuilder {
    stack: Vec<InitTree>,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_const(&mut self, op: Operand) {
        debug_assert!(op.is_const());
        self.stack.push(InitTree::Const(op));
    }

    pub fn push_addr(&mut self, symbol: impl Into<String>) {
        self.stack.push(InitTree::Addr {
            base: symbol.into(),
            offset: 0,
        });
    }

    /// Fold the top two nodes with `+` or `-` (`negate` selects `-`).
    /// Exactly one side may be an address.
    pub fn merge_offset(&mut self, negate: bool, elem_size: u64) -> Result<(), InitError> {
        let right = self.stack.pop().ok_or(InitError::NotConstant)?;
        let left = self.stack.pop().ok_or(InitError::NotConstant)?;

        let node = match (left, right) {
            (InitTree::Addr { .. }, InitTree::Addr { .. }) => {
                return Err(InitError::TwoAddresses);
            }
            (InitTree::Addr { base, offset }, InitTree::Const(c)) => {
                let delta = const_as_i64(&c)? * elem_size as i64;
                InitTree::Addr {
                    base,
                    offset: if negate { offset - delta } else { offset + delta },
                }
            }
            (InitTree::Const(c), InitTree::Addr { base, offset }) => {
                if negate {
                    // constant minus address has no relocatable form
                    return Err(InitError::NotConstant);
                }
                let delta = const_as_i64(&c)? * elem_size as i64;
                InitTree::Addr {
                    base,
                    offset: offset + delta,
                }
            }
            (InitTree::Const(_), InitTree::Const(_)) => {
                // constant folding happened upstream; reaching here
                // means a fold was missed
                return Err(InitError::NotConstant);
            }
        };
        self.stack.push(node);
        Ok(())
    }

    /// Pop the finished tree, coercing a constant to the declared
    /// type of the global when the value kinds differ.
    pub fn finalize(&mut self, ty: &TypeRef) -> Result<InitTree, InitError> {
        let tree = self.stack.pop().ok_or(InitError::NotConstant)?;
        if !self.stack.is_empty() {
            return Err(InitError::StackNotEmpty(self.stack.len()));
        }
        Ok(match tree {
            InitTree::Const(op) => InitTree::Const(coerce_const(op, ty)),
            addr => addr,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

fn const_as_i64(op: &Operand) -> Result<i64, InitError> {
    match op {
        Operand::Int(c) => Ok(c.as_i64()),
        _ => Err(InitError::NotConstant),
    }
}

/// Convert a folded constant to the global's declared type
fn coerce_const(op: Operand, ty: &TypeRef) -> Operand {
    match (&op, &**ty) {
        (Operand::Int(c), IrType::Int { .. }) => Operand::Int(IntConst::new(c.value, ty.clone())),
        (Operand::Int(c), IrType::Float { .. }) => {
            Operand::Float(FloatConst::new(c.as_i64() as f64, ty.clone()))
        }
        (Operand::Float(c), IrType::Int { .. }) => {
            Operand::Int(IntConst::new(c.value as i64 as u64, ty.clone()))
        }
        (Operand::Float(c), IrType::Float { .. }) => {
            Operand::Float(FloatConst::new(c.value, ty.clone()))
        }
        _ => op,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypePool;

    #[test]
    fn test_constant_coercion() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let f64t = pool.float(64);

        let mut b = InitBuilder::new();
        b.push_const(Operand::int(20, i32t));
        let tree = b.finalize(&f64t).unwrap();
        assert_eq!(tree, InitTree::Const(Operand::float(20.0, f64t)));
        assert!(b.is_empty());
    }

    #[test]
    fn test_address_plus_offset() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let i32p = pool.ptr_to(i32t.clone());

        let mut b = InitBuilder::new();
        b.push_addr("table");
        b.push_const(Operand::int(3, i32t));
        b.merge_offset(false, 4).unwrap();

        let tree = b.finalize(&i32p).unwrap();
        assert_eq!(
            tree,
            InitTree::Addr {
                base: "table".to_string(),
                offset: 12
            }
        );
        assert_eq!(tree.to_string(), "@table + 12");
    }

    #[test]
    fn test_two_addresses_rejected() {
        let mut b = InitBuilder::new();
        b.push_addr("a");
        b.push_addr("b");
        assert_eq!(b.merge_offset(false, 1), Err(InitError::TwoAddresses));
    }
}
