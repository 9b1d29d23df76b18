// ABOUTME: invariant-style tests against the library API directly, without spawning the binary

use ekcc::ast::Expr;
use ekcc::driver;
use ekcc::error::CompileError;
use inkwell::context::Context;

#[test]
fn missing_run_is_rejected_before_ir_generation() {
    let result = driver::analyze_source("def int helper() { return 0; }");
    assert_eq!(result.unwrap_err(), CompileError::MissingOrBadRun);
}

#[test]
fn run_with_parameters_is_rejected() {
    let result = driver::analyze_source("def int run(int $x) { return $x; }");
    assert_eq!(result.unwrap_err(), CompileError::MissingOrBadRun);
}

#[test]
fn binop_type_mismatch_is_rejected_before_ir_generation() {
    let result = driver::analyze_source("def int run() { return 1 + 2.0; }");
    assert_eq!(result.unwrap_err(), CompileError::TypeMismatch);
}

#[test]
fn every_expression_in_an_accepted_program_carries_a_resolved_type() {
    let analyzed = driver::analyze_source(
        "def int run() { int $i = 1; int $j = $i + 2; return $j; }",
    )
    .expect("well-typed program compiles");

    let run = analyzed
        .ast
        .functions
        .iter()
        .find(|f| f.name == "run")
        .expect("run is present");

    fn check_stmt(stmt: &ekcc::ast::Stmt) {
        use ekcc::ast::Stmt;
        match stmt {
            Stmt::Block(b) => b.stmts.iter().for_each(check_stmt),
            Stmt::Return { expr: Some(e), .. } => assert_resolved(e),
            Stmt::Return { expr: None, .. } => {}
            Stmt::ExprStmt(e) => assert_resolved(e),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                assert_resolved(cond);
                check_stmt(then_branch);
                if let Some(e) = else_branch {
                    check_stmt(e);
                }
            }
            Stmt::While { cond, body } => {
                assert_resolved(cond);
                check_stmt(body);
            }
            Stmt::PrintValue(e) => assert_resolved(e),
            Stmt::PrintString(_) => {}
            Stmt::VarDecl { init, .. } => assert_resolved(init),
        }
    }

    fn assert_resolved(expr: &Expr) {
        // Panics (via resolved_type's .expect calls) if any node was left
        // un-annotated by the type-annotation pass.
        let _ = expr.resolved_type();
    }

    run.body.stmts.iter().for_each(check_stmt);
}

#[test]
fn cint_binop_lowers_to_an_overflow_intrinsic() {
    let analyzed = driver::analyze_source(
        "def int run() { cint $x = 2147483647; $x = $x + 1; return 0; }",
    )
    .expect("well-typed cint program compiles");

    let context = Context::create();
    let module = driver::generate(&context, &analyzed, &[]).expect("IR generation succeeds");
    let ir_text = module.print_to_string().to_string();
    assert!(ir_text.contains("llvm.sadd.with.overflow"));
}

#[test]
fn entry_block_opens_with_a_parameter_alloca_and_store_per_parameter() {
    use inkwell::values::InstructionOpcode;

    let analyzed = driver::analyze_source("def int add(int $a, int $b) { return $a + $b; }")
        .expect("well-typed program compiles");

    let context = Context::create();
    let module = driver::generate(&context, &analyzed, &[]).expect("IR generation succeeds");
    let function = module.get_function("add").expect("add is defined");
    let entry = function.get_first_basic_block().expect("entry block exists");

    let leading_opcodes: Vec<_> = entry
        .get_instructions()
        .take(4)
        .map(|inst| inst.get_opcode())
        .collect();
    assert_eq!(
        leading_opcodes,
        vec![
            InstructionOpcode::Alloca,
            InstructionOpcode::Store,
            InstructionOpcode::Alloca,
            InstructionOpcode::Store,
        ]
    );
}
