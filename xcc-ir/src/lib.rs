//! xcc - Intermediate Representation
//!
//! A typed, block-structured, value-producing three-address IR, plus
//! the AST-walking builder that produces it and the analysis passes
//! that consume it.
//!
//! ## Architecture
//!
//! - `types` - interned IR types ([`TypePool`], [`TypeRef`])
//! - `values` - operands: constants, registers, global references
//! - `ops` - operation tags
//! - `instructions` - the instruction set
//! - `blocks` / `function` / `module` - the ownership hierarchy
//! - `builder` - function-level construction with backpatching
//! - `irgen` - AST-to-IR translation with constant folding
//! - `inittree` - global initializer folding
//! - `pass` - CFG, dominators (Cooper-Harvey-Kennedy), def-use
//!
//! The builder guarantees that every non-alloca local register has
//! exactly one definition and one use. That invariant is load-bearing
//! for the register allocator and is checked by the def-use pass.

pub mod blocks;
pub mod builder;
pub mod eval;
pub mod function;
pub mod inittree;
pub mod instructions;
pub mod irgen;
pub mod module;
pub mod ops;
pub mod pass;
pub mod types;
pub mod values;

pub use blocks::BasicBlock;
pub use builder::FuncBuilder;
pub use function::Function;
pub use inittree::{InitBuilder, InitTree};
pub use instructions::{BlockLabel, Instruction};
pub use irgen::IrGen;
pub use module::{GlobalVar, Module, Symbol};
pub use ops::{Condition, ConvOp, IrBinaryOp};
pub use types::{IrType, TypePool, TypeRef};
pub use values::{FloatConst, IntConst, Operand, Register};

use xcc_common::{CompilerError, ErrorReporter};
use xcc_frontend::TranslationUnit;

/// Translate a parsed unit into IR. Static errors land in the
/// reporter; the caller decides whether to proceed.
pub fn lower_to_ir(
    unit: &TranslationUnit,
    module_name: &str,
    reporter: &mut ErrorReporter,
) -> Result<Module, CompilerError> {
    log::debug!("lowering translation unit '{module_name}' to IR");
    IrGen::new(module_name, reporter).generate(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcc_frontend::Frontend;

    fn lower(src: &str) -> (Module, ErrorReporter) {
        let unit = Frontend::parse_source(src, "test.c").unwrap();
        let mut reporter = ErrorReporter::new();
        let module = lower_to_ir(&unit, "test", &mut reporter).unwrap();
        (module, reporter)
    }

    fn lower_ok(src: &str) -> Module {
        let (module, reporter) = lower(src);
        assert!(
            !reporter.has_errors(),
            "unexpected diagnostics: {:?}",
            reporter.diagnostics()
        );
        module
    }

    #[test]
    fn test_constant_folded_global() {
        let module = lower_ok("int g = (2 + 3) * 4;");
        let g = module.get_global("g").unwrap();
        match &g.init {
            Some(InitTree::Const(Operand::Int(c))) => {
                assert_eq!(c.as_i64(), 20);
                assert_eq!(c.ty.to_string(), "i32");
            }
            other => panic!("expected folded constant, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_divide_in_initializer() {
        let (_, reporter) = lower("int g = 1 / 0;");
        assert!(reporter.has_errors());
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.kind == xcc_common::DiagnosticKind::ZeroDivide));
    }

    #[test]
    fn test_every_block_terminated() {
        let module = lower_ok(
            "int f(int x) { if (x > 0) { return 1; } while (x) { x = x - 1; } return 0; }",
        );
        let f = module.get_function("f").unwrap();
        assert!(!f.is_external());
        for block in &f.blocks {
            assert!(
                block.terminator().is_some(),
                "block L{} lacks a terminator",
                block.label
            );
            let terminators = block
                .instrs
                .iter()
                .filter(|i| i.is_terminator())
                .count();
            assert_eq!(terminators, 1, "block L{} has {terminators} terminators", block.label);
        }
    }

    #[test]
    fn test_def_use_discipline_holds() {
        let module = lower_ok(
            r#"
int g;
int compute(int a, int b) {
    int t = a * b + 3;
    g = t;
    for (int i = 0; i < 4; i++) {
        t += i;
    }
    return t;
}
"#,
        );
        let f = module.get_function("compute").unwrap();
        pass::DefUse::compute(f).unwrap();
    }

    #[test]
    fn test_single_exit_through_return_slot() {
        let module = lower_ok("int f(int x) { if (x) return 1; return 2; }");
        let f = module.get_function("f").unwrap();
        let rets = f
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .filter(|i| matches!(i, Instruction::Ret { .. }))
            .count();
        assert_eq!(rets, 1);
        assert!(f.return_slot.is_some());
    }

    #[test]
    fn test_switch_cases_in_source_order() {
        let module = lower_ok(
            "int f(int x) { switch (x) { case 1: x = 10; case 2: x = 20; default: x = 30; } return x; }",
        );
        let f = module.get_function("f").unwrap();
        let switch = f
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .find_map(|i| match i {
                Instruction::Switch { cases, default, .. } => Some((cases.clone(), *default)),
                _ => None,
            })
            .expect("switch instruction");
        let (cases, _) = switch;
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].0.as_i64(), 1);
        assert_eq!(cases[1].0.as_i64(), 2);
        // fall-through: case 1's block flows into case 2's block
        assert!(cases[0].1 < cases[1].1);
    }

    #[test]
    fn test_duplicate_case_reported() {
        let (_, reporter) =
            lower("int f(int x) { switch (x) { case 1: x = 1; case 1: x = 2; } return x; }");
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.kind == xcc_common::DiagnosticKind::DuplicateCase));
    }

    #[test]
    fn test_unresolved_goto_reported() {
        let (_, reporter) = lower("int f(void) { goto missing; return 0; }");
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.kind == xcc_common::DiagnosticKind::UnresolvedLabel));
    }

    #[test]
    fn test_forward_goto_resolves() {
        let module = lower_ok("int f(int x) { goto out; x = 1; out: return x; }");
        let f = module.get_function("f").unwrap();
        pass::DefUse::compute(f).unwrap();
        // the goto branch targets the bound label's block
        let cfg = pass::FlowGraph::compute(f).unwrap();
        let entry = f.entry_block().unwrap().label;
        assert_eq!(cfg.successors(entry).len(), 1);
    }

    #[test]
    fn test_short_circuit_shape() {
        let module = lower_ok("int f(int a, int b) { return a && b; }");
        let f = module.get_function("f").unwrap();
        // the result merges through a slot, not a phi
        assert!(f
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .all(|i| !matches!(i, Instruction::Phi { .. })));
        // conditional evaluation: more than one block
        assert!(f.blocks.len() >= 4);
        pass::DefUse::compute(f).unwrap();
    }

    #[test]
    fn test_lvalue_required_reported() {
        let (_, reporter) = lower("int f(void) { 3 = 4; return 0; }");
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.kind == xcc_common::DiagnosticKind::LvalueRequired));
    }

    #[test]
    fn test_dump_format() {
        let module = lower_ok("int g = 20;\nint main(void) { return g; }");
        let text = module.to_string();
        assert!(text.starts_with("module test:"), "{text}");
        assert!(text.contains("i32 @g = 20;"), "{text}");
        assert!(text.contains("def i32 main() {"), "{text}");
        assert!(text.contains("ret i32"), "{text}");
    }

    #[test]
    fn test_pointer_arithmetic_becomes_gep() {
        let module = lower_ok("long f(int *p, long i) { return *(p + i); }");
        let f = module.get_function("f").unwrap();
        assert!(f
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .any(|i| matches!(i, Instruction::GetElePtr { .. })));
        pass::DefUse::compute(f).unwrap();
    }

    #[test]
    fn test_global_address_initializer() {
        let module = lower_ok("int table[8];\nint *third = &table[3];");
        let third = module.get_global("third").unwrap();
        match &third.init {
            Some(InitTree::Addr { base, offset }) => {
                assert_eq!(base, "table");
                assert_eq!(*offset, 12);
            }
            other => panic!("expected address tree, got {other:?}"),
        }
    }

    #[test]
    fn test_variadic_declaration_lowered() {
        let module = lower_ok("extern int printf(char *fmt, ...);\nint main(void) { return 0; }");
        let printf = module.get_function("printf").unwrap();
        assert!(printf.is_external());
        assert!(printf.is_variadic());
    }
}
