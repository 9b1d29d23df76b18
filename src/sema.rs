// ABOUTME: The seven ordered semantic-analysis passes, plus the call-site reference-shape pass

use std::collections::HashMap;

use crate::ast::*;
use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone)]
pub struct FuncSig {
    pub ret_type: Type,
    pub params: Vec<Type>,
}

pub type FunctionTable = HashMap<String, FuncSig>;

/// Runs all passes in the fixed order the IR generator depends on. Later
/// passes assume earlier ones succeeded; the first failing pass aborts the
/// whole analysis.
pub fn analyze(program: &mut Program) -> CompileResult<FunctionTable> {
    check_vdecl_void(program)?;
    check_ref_well_formed(program)?;
    let functions = build_function_table(program)?;
    check_no_ref_returns(program)?;
    check_ref_init_shape(program)?;
    check_run_exists(program)?;
    annotate_types(program, &functions)?;
    Ok(functions)
}

// ---- pass 1: no void in any vdecl (parameter or local) ----

fn check_vdecl_void(program: &Program) -> CompileResult<()> {
    for func in &program.functions {
        for p in &func.params {
            if p.ty == Type::Void {
                return Err(CompileError::BadDeclarationType);
            }
        }
        for stmt in &func.body.stmts {
            check_vdecl_void_stmt(stmt)?;
        }
    }
    Ok(())
}

fn check_vdecl_void_stmt(stmt: &Stmt) -> CompileResult<()> {
    match stmt {
        Stmt::VarDecl { decl, .. } => {
            if decl.ty == Type::Void {
                return Err(CompileError::BadDeclarationType);
            }
            Ok(())
        }
        Stmt::Block(b) => {
            for s in &b.stmts {
                check_vdecl_void_stmt(s)?;
            }
            Ok(())
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            check_vdecl_void_stmt(then_branch)?;
            if let Some(e) = else_branch {
                check_vdecl_void_stmt(e)?;
            }
            Ok(())
        }
        Stmt::While { body, .. } => check_vdecl_void_stmt(body),
        _ => Ok(()),
    }
}

// ---- pass 2: no type contains `ref void` or nested `ref` ----

fn check_ref_well_formed(program: &Program) -> CompileResult<()> {
    for e in &program.externs {
        check_type_well_formed(&e.ret_type)?;
        for t in &e.param_types {
            check_type_well_formed(t)?;
        }
    }
    for func in &program.functions {
        check_type_well_formed(&func.ret_type)?;
        for p in &func.params {
            check_type_well_formed(&p.ty)?;
        }
        for stmt in &func.body.stmts {
            check_ref_well_formed_stmt(stmt)?;
        }
    }
    Ok(())
}

fn check_type_well_formed(ty: &Type) -> CompileResult<()> {
    if ty.is_malformed_reference() {
        return Err(CompileError::BadReferenceType);
    }
    Ok(())
}

fn check_ref_well_formed_stmt(stmt: &Stmt) -> CompileResult<()> {
    match stmt {
        Stmt::VarDecl { decl, .. } => check_type_well_formed(&decl.ty),
        Stmt::Block(b) => {
            for s in &b.stmts {
                check_ref_well_formed_stmt(s)?;
            }
            Ok(())
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            check_ref_well_formed_stmt(then_branch)?;
            if let Some(e) = else_branch {
                check_ref_well_formed_stmt(e)?;
            }
            Ok(())
        }
        Stmt::While { body, .. } => check_ref_well_formed_stmt(body),
        _ => Ok(()),
    }
}

// ---- pass 3: function table construction and use-before-declaration ----

fn build_function_table(program: &Program) -> CompileResult<FunctionTable> {
    let mut table = FunctionTable::new();
    for e in &program.externs {
        table.insert(
            e.name.clone(),
            FuncSig {
                ret_type: e.ret_type.clone(),
                params: e.param_types.clone(),
            },
        );
    }
    for func in &program.functions {
        // inserted before checking this function's own calls, so
        // self-recursion is permitted; later functions are not yet visible.
        table.insert(
            func.name.clone(),
            FuncSig {
                ret_type: func.ret_type.clone(),
                params: func.params.iter().map(|p| p.ty.clone()).collect(),
            },
        );
        for stmt in &func.body.stmts {
            check_calls_declared_stmt(stmt, &table)?;
        }
    }
    Ok(table)
}

fn check_calls_declared_stmt(stmt: &Stmt, table: &FunctionTable) -> CompileResult<()> {
    for expr in stmt_exprs(stmt) {
        check_calls_declared_expr(expr, table)?;
    }
    match stmt {
        Stmt::Block(b) => {
            for s in &b.stmts {
                check_calls_declared_stmt(s, table)?;
            }
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            check_calls_declared_stmt(then_branch, table)?;
            if let Some(e) = else_branch {
                check_calls_declared_stmt(e, table)?;
            }
        }
        Stmt::While { body, .. } => check_calls_declared_stmt(body, table)?,
        _ => {}
    }
    Ok(())
}

fn check_calls_declared_expr(expr: &Expr, table: &FunctionTable) -> CompileResult<()> {
    match expr {
        Expr::Call { callee, args, .. } => {
            if !table.contains_key(callee) {
                return Err(CompileError::UndeclaredFunction {
                    name: callee.clone(),
                });
            }
            for a in args {
                check_calls_declared_expr(a, table)?;
            }
        }
        Expr::BinOp { lhs, rhs, .. } => {
            check_calls_declared_expr(lhs, table)?;
            check_calls_declared_expr(rhs, table)?;
        }
        Expr::UnOp { expr: inner, .. } => check_calls_declared_expr(inner, table)?,
        Expr::Assign { expr: inner, .. } => check_calls_declared_expr(inner, table)?,
        Expr::Cast { expr: inner, .. } => check_calls_declared_expr(inner, table)?,
        _ => {}
    }
    Ok(())
}

fn stmt_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match stmt {
        Stmt::Return { expr: Some(e), .. } => vec![e],
        Stmt::Return { expr: None, .. } => vec![],
        Stmt::ExprStmt(e) => vec![e],
        Stmt::If { cond, .. } => vec![cond],
        Stmt::While { cond, .. } => vec![cond],
        Stmt::PrintValue(e) => vec![e],
        Stmt::PrintString(_) => vec![],
        Stmt::VarDecl { init, .. } => vec![init],
        Stmt::Block(_) => vec![],
    }
}

// ---- pass 4: no function may return a ref type ----

fn check_no_ref_returns(program: &Program) -> CompileResult<()> {
    for func in &program.functions {
        if func.ret_type.is_ref() {
            return Err(CompileError::ReferenceReturn);
        }
    }
    Ok(())
}

// ---- pass 5: reference variable initializers must be a bare variable ----

fn check_ref_init_shape(program: &Program) -> CompileResult<()> {
    for func in &program.functions {
        for stmt in &func.body.stmts {
            check_ref_init_shape_stmt(stmt)?;
        }
    }
    Ok(())
}

fn check_ref_init_shape_stmt(stmt: &Stmt) -> CompileResult<()> {
    match stmt {
        Stmt::VarDecl { decl, init, .. } => {
            if decl.ty.is_ref() && !init.is_bare_var() {
                return Err(CompileError::BadReferenceInit);
            }
            Ok(())
        }
        Stmt::Block(b) => {
            for s in &b.stmts {
                check_ref_init_shape_stmt(s)?;
            }
            Ok(())
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            check_ref_init_shape_stmt(then_branch)?;
            if let Some(e) = else_branch {
                check_ref_init_shape_stmt(e)?;
            }
            Ok(())
        }
        Stmt::While { body, .. } => check_ref_init_shape_stmt(body),
        _ => Ok(()),
    }
}

// ---- pass 6: exactly one `run`, returning int, no parameters ----

fn check_run_exists(program: &Program) -> CompileResult<()> {
    let runs: Vec<&Function> = program
        .functions
        .iter()
        .filter(|f| f.name == "run")
        .collect();
    if runs.len() != 1 {
        return Err(CompileError::MissingOrBadRun);
    }
    let run = runs[0];
    if run.ret_type != Type::Int || !run.params.is_empty() {
        return Err(CompileError::MissingOrBadRun);
    }
    Ok(())
}

// ---- pass 7 (+ 8): type annotation, with call-site reference-shape check ----

/// A stack of lexical scope frames; lookups search innermost-first and a
/// fresh frame is pushed on block/if-arm/while-body entry and popped on
/// exit, so additions inside never escape to the enclosing scope.
struct Scopes(Vec<HashMap<String, Type>>);

impl Scopes {
    fn new(seed: HashMap<String, Type>) -> Self {
        Scopes(vec![seed])
    }

    fn push(&mut self) {
        self.0.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.0.pop();
    }

    fn insert(&mut self, name: String, ty: Type) {
        self.0.last_mut().expect("scope stack never empty").insert(name, ty);
    }

    fn get(&self, name: &str) -> Option<Type> {
        self.0.iter().rev().find_map(|scope| scope.get(name).cloned())
    }
}

fn annotate_types(program: &mut Program, funcs: &FunctionTable) -> CompileResult<()> {
    for func in &mut program.functions {
        let mut scopes = Scopes::new(HashMap::new());
        for p in &func.params {
            scopes.insert(p.var.clone(), p.ty.base());
        }
        annotate_stmts(&mut func.body.stmts, &mut scopes, funcs)?;
    }
    Ok(())
}

fn annotate_stmts(
    stmts: &mut [Stmt],
    scopes: &mut Scopes,
    funcs: &FunctionTable,
) -> CompileResult<()> {
    for stmt in stmts.iter_mut() {
        annotate_stmt(stmt, scopes, funcs)?;
    }
    Ok(())
}

fn annotate_stmt(stmt: &mut Stmt, scopes: &mut Scopes, funcs: &FunctionTable) -> CompileResult<()> {
    match stmt {
        Stmt::Block(b) => {
            scopes.push();
            annotate_stmts(&mut b.stmts, scopes, funcs)?;
            scopes.pop();
        }
        Stmt::Return { expr: Some(e), .. } => {
            annotate_expr(e, scopes, funcs)?;
        }
        Stmt::Return { expr: None, .. } => {}
        Stmt::ExprStmt(e) => {
            annotate_expr(e, scopes, funcs)?;
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            // the condition of a while/if is typed in the outer scope
            annotate_expr(cond, scopes, funcs)?;
            scopes.push();
            annotate_stmt(then_branch, scopes, funcs)?;
            scopes.pop();
            if let Some(e) = else_branch {
                scopes.push();
                annotate_stmt(e, scopes, funcs)?;
                scopes.pop();
            }
        }
        Stmt::While { cond, body } => {
            annotate_expr(cond, scopes, funcs)?;
            scopes.push();
            annotate_stmt(body, scopes, funcs)?;
            scopes.pop();
        }
        Stmt::PrintValue(e) => {
            annotate_expr(e, scopes, funcs)?;
        }
        Stmt::PrintString(_) => {}
        Stmt::VarDecl { decl, init, .. } => {
            annotate_expr(init, scopes, funcs)?;
            scopes.insert(decl.var.clone(), decl.ty.base());
        }
    }
    Ok(())
}

fn annotate_expr(expr: &mut Expr, scopes: &mut Scopes, funcs: &FunctionTable) -> CompileResult<Type> {
    match expr {
        Expr::IntLit { ty, .. } | Expr::FloatLit { ty, .. } | Expr::BoolLit { ty, .. } => {
            Ok(ty.clone())
        }
        Expr::VarRef { name, ty, .. } => {
            let t = scopes
                .get(name)
                .ok_or_else(|| CompileError::UndefinedVariable { name: name.clone() })?;
            *ty = Some(t.clone());
            Ok(t)
        }
        Expr::Call {
            callee, args, ty, ..
        } => {
            let sig = funcs
                .get(callee)
                .cloned()
                .ok_or_else(|| CompileError::UndeclaredFunction {
                    name: callee.clone(),
                })?;
            // call-site reference-argument shape: every argument bound to a
            // ref parameter must itself be a bare variable reference.
            for (arg, param_ty) in args.iter().zip(sig.params.iter()) {
                if param_ty.is_ref() && !arg.is_bare_var() {
                    return Err(CompileError::BadReferenceInit);
                }
            }
            for a in args.iter_mut() {
                annotate_expr(a, scopes, funcs)?;
            }
            let t = sig.ret_type.base();
            *ty = Some(t.clone());
            Ok(t)
        }
        Expr::UnOp {
            expr: inner, ty, ..
        } => {
            let t = annotate_expr(inner, scopes, funcs)?;
            *ty = Some(t.clone());
            Ok(t)
        }
        Expr::BinOp {
            op, lhs, rhs, ty, ..
        } => {
            let lt = annotate_expr(lhs, scopes, funcs)?;
            let rt = annotate_expr(rhs, scopes, funcs)?;
            if lt != rt {
                return Err(CompileError::TypeMismatch);
            }
            let t = match op {
                BinOp::Eq | BinOp::Lt | BinOp::Gt | BinOp::And | BinOp::Or => Type::Bool,
                _ => lt,
            };
            *ty = Some(t.clone());
            Ok(t)
        }
        Expr::Assign {
            var, expr: rhs, ty, ..
        } => {
            scopes
                .get(var)
                .ok_or_else(|| CompileError::UndefinedVariable { name: var.clone() })?;
            let t = annotate_expr(rhs, scopes, funcs)?;
            *ty = Some(t.clone());
            scopes.insert(var.clone(), t.clone());
            Ok(t)
        }
        Expr::Cast { target, expr: inner } => {
            annotate_expr(inner, scopes, funcs)?;
            Ok(target.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::parse_program;

    fn analyze_src(src: &str) -> CompileResult<FunctionTable> {
        let (tokens, errs) = Lexer::new(src).tokenize();
        assert!(errs.is_empty());
        let mut program = parse_program(tokens).unwrap();
        analyze(&mut program)
    }

    #[test]
    fn accepts_well_formed_program() {
        assert!(analyze_src("def int run() { return 2 + 3; }").is_ok());
    }

    #[test]
    fn rejects_void_vdecl() {
        let result = analyze_src("def int run() { void $x = 0; return 0; }");
        assert_eq!(result.unwrap_err(), CompileError::BadDeclarationType);
    }

    #[test]
    fn rejects_ref_void() {
        let result =
            analyze_src("extern void helper(ref void); def int run() { return 0; }");
        assert_eq!(result.unwrap_err(), CompileError::BadReferenceType);
    }

    #[test]
    fn rejects_nested_ref() {
        let result =
            analyze_src("extern void helper(ref ref int); def int run() { return 0; }");
        assert_eq!(result.unwrap_err(), CompileError::BadReferenceType);
    }

    #[test]
    fn rejects_undeclared_function_call() {
        let result = analyze_src("def int run() { return missing(); }");
        assert_eq!(
            result.unwrap_err(),
            CompileError::UndeclaredFunction {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn allows_self_recursion() {
        assert!(analyze_src("def int run() { return run(); }").is_ok());
    }

    #[test]
    fn rejects_forward_reference_to_later_function() {
        let result = analyze_src(
            "def int run() { return helper(); } def int helper() { return 1; }",
        );
        assert_eq!(
            result.unwrap_err(),
            CompileError::UndeclaredFunction {
                name: "helper".into()
            }
        );
    }

    #[test]
    fn rejects_ref_return_type() {
        let result = analyze_src("def ref int run() { return 0; }");
        assert_eq!(result.unwrap_err(), CompileError::ReferenceReturn);
    }

    #[test]
    fn rejects_non_variable_ref_initializer() {
        let result = analyze_src(
            "def int helper(ref int $p) { return 0; } def int run() { ref int $r = 3; return 0; }",
        );
        assert_eq!(result.unwrap_err(), CompileError::BadReferenceInit);
    }

    #[test]
    fn rejects_non_variable_argument_at_ref_call_site() {
        let result = analyze_src(
            "def int helper(ref int $p) { return 0; } def int run() { int $x = 0; return helper($x + 1); }",
        );
        assert_eq!(result.unwrap_err(), CompileError::BadReferenceInit);
    }

    #[test]
    fn allows_bare_variable_argument_at_ref_call_site() {
        let result = analyze_src(
            "def int helper(ref int $p) { return 0; } def int run() { int $x = 0; return helper($x); }",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_missing_run() {
        let result = analyze_src("def int other() { return 0; }");
        assert_eq!(result.unwrap_err(), CompileError::MissingOrBadRun);
    }

    #[test]
    fn rejects_mismatched_binop_types() {
        let result = analyze_src("def int run() { return 1 + 2.0; }");
        assert_eq!(result.unwrap_err(), CompileError::TypeMismatch);
    }

    #[test]
    fn cint_variable_normalizes_to_int_for_binop_equality() {
        let result = analyze_src("def int run() { cint $x = 2147483647; return $x + 1; }");
        assert!(result.is_ok());
    }

    #[test]
    fn inner_block_additions_do_not_escape_upward() {
        let result =
            analyze_src("def int run() { { int $y = 1; } return $y; }");
        assert_eq!(
            result.unwrap_err(),
            CompileError::UndefinedVariable { name: "$y".into() }
        );
    }
}
