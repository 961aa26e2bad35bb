//! IR functions
//!
//! A function owns its blocks and its own type pool; its function
//! type is borrowed from the module pool. Functions without blocks
//! are external declarations.

use crate::blocks::BasicBlock;
use crate::instructions::BlockLabel;
use crate::types::{IrType, TypePool, TypeRef};
use crate::values::Register;
use std::fmt;

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// The `Func` type, interned in the owning module's pool
    pub ty: TypeRef,
    /// Incoming parameter registers, in declaration order
    pub params: Vec<Register>,
    pub blocks: Vec<BasicBlock>,
    pub is_inline: bool,
    pub is_noreturn: bool,
    /// The alloca holding the return value; all `return` statements
    /// store here and branch to the single terminal block
    pub return_slot: Option<Register>,
    /// Function-local type pool
    pub types: TypePool,
}

impl Function {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        debug_assert!(ty.is_function());
        Self {
            name: name.into(),
            ty,
            params: Vec::new(),
            blocks: Vec::new(),
            is_inline: false,
            is_noreturn: false,
            return_slot: None,
            types: TypePool::new(),
        }
    }

    pub fn is_external(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn return_type(&self) -> &TypeRef {
        match &*self.ty {
            IrType::Func { ret, .. } => ret,
            _ => unreachable!("function carries a non-function type"),
        }
    }

    pub fn param_types(&self) -> &[TypeRef] {
        match &*self.ty {
            IrType::Func { params, .. } => params,
            _ => unreachable!("function carries a non-function type"),
        }
    }

    pub fn is_variadic(&self) -> bool {
        matches!(&*self.ty, IrType::Func { variadic: true, .. })
    }

    pub fn add_block(&mut self, block: BasicBlock) {
        self.blocks.push(block);
    }

    pub fn get_block(&self, label: BlockLabel) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    pub fn get_block_mut(&mut self, label: BlockLabel) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {} ", self.return_type())?;
        if self.is_inline {
            write!(f, "inline ")?;
        }
        if self.is_noreturn {
            write!(f, "noreturn ")?;
        }
        write!(f, "{}(", self.name)?;

        if self.is_external() {
            for (i, ty) in self.param_types().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{ty}")?;
            }
        } else {
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} {}", param.ty, param.name)?;
            }
        }
        if self.is_variadic() {
            write!(f, ", ...")?;
        }
        write!(f, ")")?;

        if self.is_external() {
            return write!(f, ";");
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::Instruction;
    use crate::values::Operand;

    #[test]
    fn test_external_declaration_dump() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let i8p = {
            let i8t = pool.int(8, true);
            pool.ptr_to(i8t)
        };
        let fty = pool.func_of(i32t, vec![i8p], true);
        let func = Function::new("printf", fty);

        assert!(func.is_external());
        assert_eq!(func.to_string(), "def i32 printf(i8*, ...);");
    }

    #[test]
    fn test_defined_function_dump() {
        let mut pool = TypePool::new();
        let i32t = pool.int(32, true);
        let fty = pool.func_of(i32t.clone(), vec![], false);
        let mut func = Function::new("main", fty);

        let mut entry = BasicBlock::new(0);
        entry.push(Instruction::Ret {
            value: Some(Operand::int(0, i32t)),
        });
        func.add_block(entry);

        assert_eq!(func.to_string(), "def i32 main() {\n  L0:\n    ret i32 0;\n}");
    }
}
