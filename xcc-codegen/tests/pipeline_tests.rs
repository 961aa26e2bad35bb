//! End-to-end pipeline tests
//!
//! Each test drives source text through the full pipeline (parse,
//! IR generation, analysis, allocation, emission) and checks the
//! observable contract of one stage.

use xcc_codegen::generate_assembly;
use xcc_common::{DiagnosticKind, ErrorReporter};
use xcc_frontend::Frontend;
use xcc_ir::pass::{DefUse, Dominators, FlowGraph};
use xcc_ir::{lower_to_ir, InitTree, Instruction, Module, Operand};

fn compile_to_ir(src: &str) -> (Module, ErrorReporter) {
    let unit = Frontend::parse_source(src, "test.c").expect("parse");
    let mut reporter = ErrorReporter::new();
    let module = lower_to_ir(&unit, "test", &mut reporter).expect("lowering");
    (module, reporter)
}

fn compile_clean(src: &str) -> Module {
    let (module, reporter) = compile_to_ir(src);
    assert!(
        !reporter.has_errors(),
        "unexpected diagnostics: {:?}",
        reporter.diagnostics()
    );
    module
}

#[test]
fn constant_fold_produces_no_instructions() {
    let module = compile_clean("int g = (2 + 3) * 4;");
    let g = module.get_global("g").unwrap();
    match &g.init {
        Some(InitTree::Const(Operand::Int(c))) => {
            assert_eq!(c.as_i64(), 20);
            assert_eq!(c.ty.to_string(), "i32");
        }
        other => panic!("expected a folded constant, got {other:?}"),
    }
}

#[test]
fn short_circuit_guards_the_right_operand() {
    let module = compile_clean(
        r#"
extern int side_effect(void);
int f(int a) {
    return a && side_effect();
}
"#,
    );
    let f = module.get_function("f").unwrap();
    let cfg = FlowGraph::compute(f).unwrap();

    // the call lives in its own block, guarded by a conditional
    // branch on `a`
    let call_block = f
        .blocks
        .iter()
        .find(|b| {
            b.instrs
                .iter()
                .any(|i| matches!(i, Instruction::Call { .. }))
        })
        .expect("call block");
    let preds = cfg.predecessors(call_block.label);
    assert_eq!(preds.len(), 1);
    let guard = f.get_block(preds[0]).unwrap();
    assert!(matches!(
        guard.terminator(),
        Some(Instruction::CondBr { .. })
    ));

    // the expression result is i1, loaded from the merge slot
    assert!(f
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .all(|i| !matches!(i, Instruction::Phi { .. })));
}

#[test]
fn diamond_dominators() {
    let module = compile_clean(
        r#"
int f(int c) {
    int r;
    if (c) { r = 1; } else { r = 2; }
    return r;
}
"#,
    );
    let f = module.get_function("f").unwrap();
    let cfg = FlowGraph::compute(f).unwrap();
    let doms = Dominators::compute(f, &cfg).unwrap();

    let entry = f.entry_block().unwrap().label;
    assert_eq!(doms.idom(entry), Some(entry));

    // both arms and the join are immediately dominated by the fork
    let (then_blk, else_blk) = match f.entry_block().unwrap().terminator() {
        Some(Instruction::CondBr {
            then_blk, else_blk, ..
        }) => (*then_blk, *else_blk),
        other => panic!("expected a conditional branch, got {other:?}"),
    };
    assert_eq!(doms.idom(then_blk), Some(entry));
    assert_eq!(doms.idom(else_blk), Some(entry));

    let join = cfg.successors(then_blk)[0];
    assert_eq!(cfg.successors(else_blk), &[join]);
    assert_eq!(doms.idom(join), Some(entry));
    assert!(doms.dominates(entry, join));
    assert!(!doms.dominates(then_blk, join));
}

#[test]
fn switch_falls_through_in_layout_order() {
    let module = compile_clean(
        r#"
extern void f(void);
extern void g(void);
extern void h(void);
int main(int argc) {
    switch (argc) {
    case 1: f();
    case 2: g();
    default: h();
    }
    return 0;
}
"#,
    );
    let main = module.get_function("main").unwrap();
    let (cases, default) = main
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .find_map(|i| match i {
            Instruction::Switch { cases, default, .. } => Some((cases.clone(), *default)),
            _ => None,
        })
        .expect("switch instruction");

    assert_eq!(cases.len(), 2);
    let case1 = cases[0].1;
    let case2 = cases[1].1;

    // case 1 falls through into case 2, case 2 into default
    let cfg = FlowGraph::compute(main).unwrap();
    assert!(cfg.successors(case1).contains(&case2));
    assert!(cfg.successors(case2).contains(&default));
}

#[test]
fn goto_forward_reference_resolves() {
    let module = compile_clean(
        r#"
int f(int x) {
    if (x) goto done;
    x = x + 1;
done:
    return x;
}
"#,
    );
    let f = module.get_function("f").unwrap();
    DefUse::compute(f).unwrap();
    FlowGraph::compute(f).unwrap();
}

#[test]
fn unresolved_goto_suppresses_emission() {
    let (_, reporter) = compile_to_ir("int f(void) { goto nowhere; return 0; }");
    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::UnresolvedLabel));
}

#[test]
fn allocator_invariants_hold_on_a_larger_program() {
    let module = compile_clean(
        r#"
int fib(int n) {
    if (n < 2) return n;
    return fib(n - 1) + fib(n - 2);
}

int sum(int *xs, int n) {
    int total = 0;
    for (int i = 0; i < n; i++) {
        total += xs[i];
    }
    return total;
}

int main(void) {
    int data[4];
    int i = 0;
    while (i < 4) {
        data[i] = fib(i);
        i++;
    }
    return sum(data, 4);
}
"#,
    );
    for func in module.functions().filter(|f| !f.is_external()) {
        DefUse::compute(func).unwrap();
    }
    let asm = generate_assembly(&module).unwrap();
    assert!(asm.contains(".globl fib"));
    assert!(asm.contains(".globl sum"));
    assert!(asm.contains(".globl main"));
    assert!(asm.contains("call fib"));
}

#[test]
fn float_pipeline_end_to_end() {
    let module = compile_clean(
        r#"
double scale = 2.5;
double apply(double x) {
    return x * scale + 1.0;
}
"#,
    );
    let asm = generate_assembly(&module).unwrap();
    assert!(asm.contains("mulsd"));
    assert!(asm.contains("addsd"));
    // the initializer is the raw bit pattern of 2.5
    assert!(asm.contains(&format!(".quad {}", 2.5f64.to_bits())));
}

#[test]
fn duplicate_case_is_a_static_error() {
    let (_, reporter) = compile_to_ir(
        "int f(int x) { switch (x) { case 3: return 1; case 3: return 2; } return 0; }",
    );
    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::DuplicateCase));
}

#[test]
fn pointer_chain_compiles() {
    let module = compile_clean(
        r#"
long strlen_ish(char *s) {
    long n = 0;
    while (*s) {
        s = s + 1;
        n++;
    }
    return n;
}
"#,
    );
    let f = module.get_function("strlen_ish").unwrap();
    DefUse::compute(f).unwrap();
    let asm = generate_assembly(&module).unwrap();
    assert!(asm.contains(".globl strlen_ish"));
}
