//! xcc - Code Generation Backend
//!
//! The final phase of compilation: binding virtual registers to
//! x86-64 locations and printing AT&T assembly. It includes:
//!
//! - the x86-64 operand model (`x64`)
//! - System V argument classification (`sysv`)
//! - the 3-TOSCA register allocator and frame layout (`alloc`)
//! - the assembly emitter (`emit`)

pub mod alloc;
pub mod emit;
pub mod sysv;
pub mod x64;

pub use alloc::{Allocation, SimpleAlloc};
pub use emit::emit_module;
pub use sysv::{ArgLoc, SysVConv};
pub use x64::{RegTag, X64};

use thiserror::Error;
use xcc_common::CompilerError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    /// The input broke an invariant the backend relies on. This is a
    /// compiler bug, not a source error.
    #[error("allocator precondition violated: {0}")]
    Precondition(String),

    #[error("virtual register {0} has no binding")]
    Unbound(String),

    #[error("internal code generation error: {0}")]
    Internal(String),
}

impl From<CodegenError> for CompilerError {
    fn from(err: CodegenError) -> Self {
        CompilerError::internal(err.to_string())
    }
}

/// Compile a finished IR module to assembly text
pub fn generate_assembly(module: &xcc_ir::Module) -> Result<String, CompilerError> {
    Ok(emit_module(module)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcc_common::ErrorReporter;
    use xcc_frontend::Frontend;
    use xcc_ir::lower_to_ir;

    #[test]
    fn test_end_to_end_assembly() {
        let src = r#"
int counter = 20;

int next(void) {
    counter = counter + 1;
    return counter;
}
"#;
        let unit = Frontend::parse_source(src, "test.c").unwrap();
        let mut reporter = ErrorReporter::new();
        let module = lower_to_ir(&unit, "test", &mut reporter).unwrap();
        assert!(!reporter.has_errors());

        let asm = generate_assembly(&module).unwrap();
        assert!(asm.contains(".globl next"));
        assert!(asm.contains("counter(%rip)"));
        assert!(asm.contains(".long 20"));
    }
}
