// ABOUTME: statement and expression lowering, the checked-arithmetic traps, and the
// ABOUTME: opaque-pointer plumbing for string/format-string constants

use std::collections::HashMap;

use inkwell::attributes::AttributeLoc;
use inkwell::context::Context;
use inkwell::intrinsics::Intrinsic;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, FloatValue, FunctionValue, GlobalValue, IntValue,
    PointerValue,
};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};

use crate::ast::{BinOp, Block, Expr, Extern, Function, ParamDecl, Program, Stmt, Type, UnOp};
use crate::error::{CompileError, CompileResult};
use crate::sema::FunctionTable;

use super::builtins;

fn ir_err<E: std::fmt::Debug>(e: E) -> CompileError {
    CompileError::JitError {
        message: format!("{:?}", e),
    }
}

pub fn generate<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    program: &Program,
    functions: &FunctionTable,
    sysargs: &[String],
) -> CompileResult<()> {
    let mut gen = Codegen {
        context,
        module,
        builder: context.create_builder(),
        functions,
        current_function: None,
        string_globals: HashMap::new(),
    };

    builtins::declare_printf(context, module);
    gen.declare_externs(&program.externs, sysargs)?;
    gen.declare_functions(&program.functions);

    for func in &program.functions {
        gen.lower_function(func)?;
    }
    Ok(())
}

/// Evaluation carries whether the enclosing destination (a `cint` variable,
/// or a `cint` call parameter) wants overflow-checked arithmetic. This is
/// threaded explicitly through the expression lowerers rather than recovered
/// from a separate side-table: the only record of "this binding is cint" is
/// the variable's own declared [`Type`] in [`Scopes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvalMode {
    Plain,
    Checked,
}

#[derive(Clone)]
struct VarBinding<'ctx> {
    ptr: PointerValue<'ctx>,
    declared_ty: Type,
}

struct Scopes<'ctx>(Vec<HashMap<String, VarBinding<'ctx>>>);

impl<'ctx> Scopes<'ctx> {
    fn new() -> Self {
        Scopes(Vec::new())
    }

    fn push(&mut self) {
        self.0.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.0.pop();
    }

    fn insert(&mut self, name: String, binding: VarBinding<'ctx>) {
        self.0
            .last_mut()
            .expect("scope stack never empty while lowering a function body")
            .insert(name, binding);
    }

    fn get(&self, name: &str) -> Option<VarBinding<'ctx>> {
        self.0.iter().rev().find_map(|frame| frame.get(name).cloned())
    }
}

/// The result of lowering an expression. A variable reference yields a
/// pointer to its storage slot rather than an immediately loaded value, so
/// that call sites passing it to a `ref` parameter can forward the pointer
/// directly instead of loading through it first.
enum Eval<'ctx> {
    Value(BasicValueEnum<'ctx>),
    Pointer(PointerValue<'ctx>, BasicTypeEnum<'ctx>),
}

struct Codegen<'a, 'ctx> {
    context: &'ctx Context,
    module: &'a Module<'ctx>,
    builder: inkwell::builder::Builder<'ctx>,
    functions: &'a FunctionTable,
    current_function: Option<FunctionValue<'ctx>>,
    string_globals: HashMap<String, (GlobalValue<'ctx>, u32)>,
}

impl<'a, 'ctx> Codegen<'a, 'ctx> {
    fn current_function(&self) -> FunctionValue<'ctx> {
        self.current_function
            .expect("current_function set for the duration of lower_function")
    }

    fn lower_type(&self, ty: &Type) -> BasicTypeEnum<'ctx> {
        match ty {
            Type::Int | Type::Cint => self.context.i32_type().into(),
            Type::Bool => self.context.bool_type().into(),
            Type::Float => self.context.f32_type().into(),
            Type::Void => unreachable!("void only ever appears as a function return type"),
            Type::Ref(inner, _) => self
                .lower_type(inner)
                .ptr_type(AddressSpace::default())
                .into(),
        }
    }

    /// The scalar type this binding's storage slot actually holds: the
    /// referenced type's scalar for a `ref` binding, or its own scalar
    /// otherwise.
    fn scalar_lowered_type(&self, declared_ty: &Type) -> BasicTypeEnum<'ctx> {
        match declared_ty {
            Type::Ref(inner, _) => self.lower_type(inner),
            other => self.lower_type(other),
        }
    }

    fn build_fn_type(&self, ret: &Type, params: &[Type]) -> inkwell::types::FunctionType<'ctx> {
        let param_types: Vec<BasicMetadataTypeEnum> =
            params.iter().map(|t| self.lower_type(t).into()).collect();
        match ret {
            Type::Void => self.context.void_type().fn_type(&param_types, false),
            other => self.lower_type(other).fn_type(&param_types, false),
        }
    }

    fn declare_externs(&mut self, externs: &[Extern], sysargs: &[String]) -> CompileResult<()> {
        for ext in externs {
            match ext.name.as_str() {
                "getarg" => {
                    builtins::synthesize_argv_accessor(
                        self.context,
                        self.module,
                        "getarg",
                        sysargs,
                        false,
                    )?;
                }
                "getargf" => {
                    builtins::synthesize_argv_accessor(
                        self.context,
                        self.module,
                        "getargf",
                        sysargs,
                        true,
                    )?;
                }
                _ => {
                    let fn_type = self.build_fn_type(&ext.ret_type, &ext.param_types);
                    self.module
                        .add_function(&ext.name, fn_type, Some(Linkage::External));
                }
            }
        }
        Ok(())
    }

    fn declare_functions(&mut self, funcs: &[Function]) {
        for func in funcs {
            let param_types: Vec<Type> = func.params.iter().map(|p| p.ty.clone()).collect();
            let fn_type = self.build_fn_type(&func.ret_type, &param_types);
            self.module.add_function(&func.name, fn_type, None);
        }
    }

    fn lower_function(&mut self, func: &Function) -> CompileResult<()> {
        let fn_value = self
            .module
            .get_function(&func.name)
            .expect("function predeclared before any body is lowered");
        self.current_function = Some(fn_value);

        let entry = self.context.append_basic_block(fn_value, "entry");
        self.builder.position_at_end(entry);

        let mut scopes = Scopes::new();
        scopes.push();

        for (i, param) in func.params.iter().enumerate() {
            let arg_val = fn_value.get_nth_param(i as u32).unwrap();
            if param.ty.is_ref() {
                let ptr = arg_val.into_pointer_value();
                if let Type::Ref(_, true) = param.ty {
                    let kind_id = noalias_kind_id();
                    let attr = self.context.create_enum_attribute(kind_id, 0);
                    fn_value.add_attribute(AttributeLoc::Param(i as u32), attr);
                }
                scopes.insert(
                    param.var.clone(),
                    VarBinding {
                        ptr,
                        declared_ty: param.ty.clone(),
                    },
                );
            } else {
                let lowered = self.lower_type(&param.ty);
                let ptr = self
                    .builder
                    .build_alloca(lowered, &param.var)
                    .map_err(ir_err)?;
                self.builder.build_store(ptr, arg_val).map_err(ir_err)?;
                scopes.insert(
                    param.var.clone(),
                    VarBinding {
                        ptr,
                        declared_ty: param.ty.clone(),
                    },
                );
            }
        }

        let terminated = self.lower_block(&func.body, &mut scopes)?;
        scopes.pop();

        if func.ret_type == Type::Void {
            if !terminated {
                self.builder.build_return(None).map_err(ir_err)?;
            }
        } else if !terminated {
            return Err(CompileError::MissingReturn {
                name: func.name.clone(),
            });
        }
        Ok(())
    }

    fn lower_block(&mut self, block: &Block, scopes: &mut Scopes<'ctx>) -> CompileResult<bool> {
        scopes.push();
        let mut terminated = false;
        for stmt in &block.stmts {
            if terminated {
                break;
            }
            terminated = self.lower_stmt(stmt, scopes)?;
        }
        scopes.pop();
        Ok(terminated)
    }

    fn lower_stmt(&mut self, stmt: &Stmt, scopes: &mut Scopes<'ctx>) -> CompileResult<bool> {
        match stmt {
            Stmt::Block(b) => self.lower_block(b, scopes),
            Stmt::Return { expr, .. } => {
                match expr {
                    None => {
                        self.builder.build_return(None).map_err(ir_err)?;
                    }
                    Some(e) => {
                        let val = self.lower_expr(e, scopes, EvalMode::Plain)?;
                        let val = self.load_if_pointer(val)?;
                        self.builder.build_return(Some(&val)).map_err(ir_err)?;
                    }
                }
                Ok(true)
            }
            Stmt::ExprStmt(e) => {
                self.lower_expr(e, scopes, EvalMode::Plain)?;
                Ok(false)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref(), scopes),
            Stmt::While { cond, body } => {
                self.lower_while(cond, body, scopes)?;
                Ok(false)
            }
            Stmt::PrintValue(e) => {
                self.lower_print_value(e, scopes)?;
                Ok(false)
            }
            Stmt::PrintString(s) => {
                self.lower_print_string(s)?;
                Ok(false)
            }
            Stmt::VarDecl { decl, init, .. } => {
                self.lower_vardecl(decl, init, scopes)?;
                Ok(false)
            }
        }
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
        scopes: &mut Scopes<'ctx>,
    ) -> CompileResult<bool> {
        let function = self.current_function();
        let cond_val = self.lower_expr(cond, scopes, EvalMode::Plain)?;
        let cond_val = self.load_if_pointer(cond_val)?.into_int_value();

        let then_bb = self.context.append_basic_block(function, "if_then");
        let else_bb = self.context.append_basic_block(function, "if_else");
        let merge_bb = self.context.append_basic_block(function, "if_merge");
        self.builder
            .build_conditional_branch(cond_val, then_bb, else_bb)
            .map_err(ir_err)?;

        self.builder.position_at_end(then_bb);
        let then_terminated = self.lower_stmt(then_branch, scopes)?;
        if !then_terminated {
            self.builder
                .build_unconditional_branch(merge_bb)
                .map_err(ir_err)?;
        }

        self.builder.position_at_end(else_bb);
        let else_terminated = match else_branch {
            Some(stmt) => self.lower_stmt(stmt, scopes)?,
            None => false,
        };
        if !else_terminated {
            self.builder
                .build_unconditional_branch(merge_bb)
                .map_err(ir_err)?;
        }

        let both_terminated = then_terminated && else_terminated;
        if both_terminated {
            unsafe {
                merge_bb.delete().map_err(ir_err)?;
            }
        } else {
            self.builder.position_at_end(merge_bb);
        }
        Ok(both_terminated)
    }

    fn lower_while(
        &mut self,
        cond: &Expr,
        body: &Stmt,
        scopes: &mut Scopes<'ctx>,
    ) -> CompileResult<()> {
        let function = self.current_function();
        let body_bb = self.context.append_basic_block(function, "while_body");
        let after_bb = self.context.append_basic_block(function, "while_end");

        let cond_val = self.lower_expr(cond, scopes, EvalMode::Plain)?;
        let cond_val = self.load_if_pointer(cond_val)?.into_int_value();
        self.builder
            .build_conditional_branch(cond_val, body_bb, after_bb)
            .map_err(ir_err)?;

        self.builder.position_at_end(body_bb);
        let terminated = self.lower_stmt(body, scopes)?;
        // Unlike the reference tool, which re-emits the loop branch
        // unconditionally even when the body already terminated (producing
        // a block with two terminators), this only re-tests the condition
        // when control can actually fall off the end of the body.
        if !terminated {
            let cond_val2 = self.lower_expr(cond, scopes, EvalMode::Plain)?;
            let cond_val2 = self.load_if_pointer(cond_val2)?.into_int_value();
            self.builder
                .build_conditional_branch(cond_val2, body_bb, after_bb)
                .map_err(ir_err)?;
        }

        self.builder.position_at_end(after_bb);
        Ok(())
    }

    fn lower_vardecl(
        &mut self,
        decl: &ParamDecl,
        init: &Expr,
        scopes: &mut Scopes<'ctx>,
    ) -> CompileResult<()> {
        if decl.ty.is_ref() {
            let name = init
                .var_name()
                .expect("sema enforces a bare variable reference initializer");
            let target = scopes
                .get(name)
                .expect("sema guarantees the initializer variable is declared");
            scopes.insert(
                decl.var.clone(),
                VarBinding {
                    ptr: target.ptr,
                    declared_ty: decl.ty.clone(),
                },
            );
            return Ok(());
        }

        let mode = if decl.ty.is_cint() {
            EvalMode::Checked
        } else {
            EvalMode::Plain
        };
        let value = self.lower_expr(init, scopes, mode)?;
        let value = self.load_if_pointer(value)?;
        let lowered_ty = self.lower_type(&decl.ty);
        let ptr = self
            .builder
            .build_alloca(lowered_ty, &decl.var)
            .map_err(ir_err)?;
        let coerced = self.coerce_to(lowered_ty, value)?;
        self.builder.build_store(ptr, coerced).map_err(ir_err)?;
        scopes.insert(
            decl.var.clone(),
            VarBinding {
                ptr,
                declared_ty: decl.ty.clone(),
            },
        );
        Ok(())
    }

    fn lower_expr(
        &mut self,
        expr: &Expr,
        scopes: &Scopes<'ctx>,
        mode: EvalMode,
    ) -> CompileResult<Eval<'ctx>> {
        match expr {
            Expr::IntLit { value, .. } => Ok(Eval::Value(
                self.context
                    .i32_type()
                    .const_int(*value as i64 as u64, true)
                    .into(),
            )),
            Expr::FloatLit { value, .. } => Ok(Eval::Value(
                self.context.f32_type().const_float(*value as f64).into(),
            )),
            Expr::BoolLit { value, .. } => Ok(Eval::Value(
                self.context.bool_type().const_int(*value as u64, false).into(),
            )),
            Expr::VarRef { name, .. } => {
                let binding = scopes
                    .get(name)
                    .expect("sema guarantees every variable reference is declared");
                let scalar_ty = self.scalar_lowered_type(&binding.declared_ty);
                Ok(Eval::Pointer(binding.ptr, scalar_ty))
            }
            Expr::Call { callee, args, .. } => {
                self.lower_call(callee, args, scopes).map(Eval::Value)
            }
            Expr::BinOp { op, lhs, rhs, .. } => {
                self.lower_binop(*op, lhs, rhs, scopes, mode).map(Eval::Value)
            }
            Expr::UnOp { op, expr, .. } => {
                self.lower_unop(*op, expr, scopes, mode).map(Eval::Value)
            }
            Expr::Assign { var, expr, .. } => {
                self.lower_assign(var, expr, scopes).map(Eval::Value)
            }
            Expr::Cast { target, expr } => self.lower_cast(target, expr, scopes).map(Eval::Value),
        }
    }

    fn load_if_pointer(&mut self, eval: Eval<'ctx>) -> CompileResult<BasicValueEnum<'ctx>> {
        match eval {
            Eval::Value(v) => Ok(v),
            Eval::Pointer(ptr, ty) => self.builder.build_load(ty, ptr, "load").map_err(ir_err),
        }
    }

    fn lower_call(
        &mut self,
        callee: &str,
        args: &[Expr],
        scopes: &Scopes<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let sig = self
            .functions
            .get(callee)
            .expect("sema validated the callee exists")
            .clone();
        let fn_value = self
            .module
            .get_function(callee)
            .expect("function predeclared before any call site is lowered");

        let mut arg_values: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
        for (arg, param_ty) in args.iter().zip(sig.params.iter()) {
            if param_ty.is_ref() {
                let name = arg
                    .var_name()
                    .expect("sema enforces bare variables at ref call-site arguments");
                let binding = scopes
                    .get(name)
                    .expect("sema guarantees the argument variable is declared");
                arg_values.push(binding.ptr.into());
            } else {
                let mode = if param_ty.is_cint() {
                    EvalMode::Checked
                } else {
                    EvalMode::Plain
                };
                let value = self.lower_expr(arg, scopes, mode)?;
                let value = self.load_if_pointer(value)?;
                arg_values.push(value.into());
            }
        }

        let call = self
            .builder
            .build_call(fn_value, &arg_values, "call")
            .map_err(ir_err)?;
        match call.try_as_basic_value().left() {
            Some(v) => Ok(v),
            None => Ok(self.context.i32_type().const_int(0, false).into()),
        }
    }

    fn lower_assign(
        &mut self,
        var: &str,
        rhs: &Expr,
        scopes: &Scopes<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let binding = scopes
            .get(var)
            .expect("sema guarantees the assignment target is declared");
        let mode = if binding.declared_ty.is_cint() {
            EvalMode::Checked
        } else {
            EvalMode::Plain
        };
        let value = self.lower_expr(rhs, scopes, mode)?;
        let value = self.load_if_pointer(value)?;
        let dest_ty = self.scalar_lowered_type(&binding.declared_ty);
        let coerced = self.coerce_to(dest_ty, value)?;
        self.builder
            .build_store(binding.ptr, coerced)
            .map_err(ir_err)?;
        Ok(coerced)
    }

    fn lower_cast(
        &mut self,
        target: &Type,
        inner: &Expr,
        scopes: &Scopes<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let value = self.lower_expr(inner, scopes, EvalMode::Plain)?;
        let value = self.load_if_pointer(value)?;
        let target_ty = self.lower_type(target);
        if value.get_type() == target_ty {
            return Ok(value);
        }
        match (target_ty, value) {
            (BasicTypeEnum::IntType(it), BasicValueEnum::FloatValue(fv)) => Ok(self
                .builder
                .build_float_to_signed_int(fv, it, "fptosi")
                .map_err(ir_err)?
                .into()),
            (BasicTypeEnum::FloatType(ft), BasicValueEnum::IntValue(iv)) => Ok(self
                .builder
                .build_signed_int_to_float(iv, ft, "sitofp")
                .map_err(ir_err)?
                .into()),
            _ => Ok(value),
        }
    }

    /// Widens/narrows a value to `dest_ty` when they don't already match,
    /// covering the implicit int/float/bool coercions the grammar allows
    /// at variable initialization and assignment.
    fn coerce_to(
        &mut self,
        dest_ty: BasicTypeEnum<'ctx>,
        value: BasicValueEnum<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        if value.get_type() == dest_ty {
            return Ok(value);
        }
        match (dest_ty, value) {
            (BasicTypeEnum::IntType(it), BasicValueEnum::IntValue(iv)) => Ok(self
                .builder
                .build_int_z_extend(iv, it, "zext")
                .map_err(ir_err)?
                .into()),
            (BasicTypeEnum::IntType(it), BasicValueEnum::FloatValue(fv)) => Ok(self
                .builder
                .build_float_to_signed_int(fv, it, "fptosi")
                .map_err(ir_err)?
                .into()),
            (BasicTypeEnum::FloatType(ft), BasicValueEnum::IntValue(iv)) => Ok(self
                .builder
                .build_unsigned_int_to_float(iv, ft, "uitofp")
                .map_err(ir_err)?
                .into()),
            _ => Ok(value),
        }
    }

    fn lower_unop(
        &mut self,
        op: UnOp,
        operand: &Expr,
        scopes: &Scopes<'ctx>,
        mode: EvalMode,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let val = self.lower_expr(operand, scopes, mode)?;
        let val = self.load_if_pointer(val)?;
        match op {
            UnOp::Minus => {
                if val.is_int_value() {
                    let iv = val.into_int_value();
                    if mode == EvalMode::Checked {
                        let i32_t = self.context.i32_type();
                        let int_min = i32_t.const_int(i32::MIN as u64, true);
                        let is_min = self
                            .builder
                            .build_int_compare(IntPredicate::EQ, iv, int_min, "neg_is_min")
                            .map_err(ir_err)?;
                        self.guard_trap(is_min)?;
                    }
                    Ok(self.builder.build_int_neg(iv, "neg").map_err(ir_err)?.into())
                } else {
                    let fv = val.into_float_value();
                    let zero = self.context.f32_type().const_float(0.0);
                    Ok(fast_float(
                        self.builder
                            .build_float_sub(zero, fv, "fneg")
                            .map_err(ir_err)?,
                    )
                    .into())
                }
            }
            UnOp::Not => Ok(self
                .builder
                .build_not(val.into_int_value(), "lognot")
                .map_err(ir_err)?
                .into()),
        }
    }

    fn lower_binop(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        scopes: &Scopes<'ctx>,
        mode: EvalMode,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let operand_ty = lhs.resolved_type();
        let lv = self.lower_expr(lhs, scopes, mode)?;
        let lv = self.load_if_pointer(lv)?;
        let rv = self.lower_expr(rhs, scopes, mode)?;
        let rv = self.load_if_pointer(rv)?;

        if mode == EvalMode::Checked
            && operand_ty == Type::Int
            && !matches!(op, BinOp::And | BinOp::Or)
        {
            return self.checked_int_binop(op, lv.into_int_value(), rv.into_int_value());
        }
        self.plain_binop(op, operand_ty, lv, rv)
    }

    fn plain_binop(
        &mut self,
        op: BinOp,
        operand_ty: Type,
        lv: BasicValueEnum<'ctx>,
        rv: BasicValueEnum<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        match op {
            BinOp::And => Ok(self
                .builder
                .build_and(lv.into_int_value(), rv.into_int_value(), "and")
                .map_err(ir_err)?
                .into()),
            BinOp::Or => Ok(self
                .builder
                .build_or(lv.into_int_value(), rv.into_int_value(), "or")
                .map_err(ir_err)?
                .into()),
            _ if operand_ty == Type::Float => {
                let l = lv.into_float_value();
                let r = rv.into_float_value();
                match op {
                    BinOp::Add => Ok(fast_float(self.builder.build_float_add(l, r, "fadd").map_err(ir_err)?).into()),
                    BinOp::Sub => Ok(fast_float(self.builder.build_float_sub(l, r, "fsub").map_err(ir_err)?).into()),
                    BinOp::Mul => Ok(fast_float(self.builder.build_float_mul(l, r, "fmul").map_err(ir_err)?).into()),
                    BinOp::Div => Ok(fast_float(self.builder.build_float_div(l, r, "fdiv").map_err(ir_err)?).into()),
                    BinOp::Eq => Ok(fast_bool(
                        self.builder
                            .build_float_compare(FloatPredicate::OEQ, l, r, "feq")
                            .map_err(ir_err)?,
                    )
                    .into()),
                    BinOp::Lt => Ok(fast_bool(
                        self.builder
                            .build_float_compare(FloatPredicate::OLT, l, r, "flt")
                            .map_err(ir_err)?,
                    )
                    .into()),
                    BinOp::Gt => Ok(fast_bool(
                        self.builder
                            .build_float_compare(FloatPredicate::OGT, l, r, "fgt")
                            .map_err(ir_err)?,
                    )
                    .into()),
                    BinOp::And | BinOp::Or => unreachable!(),
                }
            }
            _ => {
                let l = lv.into_int_value();
                let r = rv.into_int_value();
                match op {
                    BinOp::Add => Ok(self.builder.build_int_add(l, r, "add").map_err(ir_err)?.into()),
                    BinOp::Sub => Ok(self.builder.build_int_sub(l, r, "sub").map_err(ir_err)?.into()),
                    BinOp::Mul => Ok(self.builder.build_int_mul(l, r, "mul").map_err(ir_err)?.into()),
                    BinOp::Div => Ok(self
                        .builder
                        .build_int_signed_div(l, r, "div")
                        .map_err(ir_err)?
                        .into()),
                    BinOp::Eq => Ok(self
                        .builder
                        .build_int_compare(IntPredicate::EQ, l, r, "eq")
                        .map_err(ir_err)?
                        .into()),
                    BinOp::Lt => Ok(self
                        .builder
                        .build_int_compare(IntPredicate::SLT, l, r, "lt")
                        .map_err(ir_err)?
                        .into()),
                    BinOp::Gt => Ok(self
                        .builder
                        .build_int_compare(IntPredicate::SGT, l, r, "gt")
                        .map_err(ir_err)?
                        .into()),
                    BinOp::And | BinOp::Or => unreachable!(),
                }
            }
        }
    }

    fn checked_int_binop(
        &mut self,
        op: BinOp,
        lv: IntValue<'ctx>,
        rv: IntValue<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        match op {
            BinOp::Add => self.intrinsic_with_overflow("llvm.sadd.with.overflow", lv, rv, "add"),
            BinOp::Sub => self.intrinsic_with_overflow("llvm.ssub.with.overflow", lv, rv, "sub"),
            BinOp::Mul => self.intrinsic_with_overflow("llvm.smul.with.overflow", lv, rv, "mul"),
            BinOp::Div => self.checked_div(lv, rv),
            BinOp::Eq => Ok(self
                .builder
                .build_int_compare(IntPredicate::EQ, lv, rv, "eq")
                .map_err(ir_err)?
                .into()),
            BinOp::Lt => Ok(self
                .builder
                .build_int_compare(IntPredicate::SLT, lv, rv, "lt")
                .map_err(ir_err)?
                .into()),
            BinOp::Gt => Ok(self
                .builder
                .build_int_compare(IntPredicate::SGT, lv, rv, "gt")
                .map_err(ir_err)?
                .into()),
            BinOp::And | BinOp::Or => unreachable!("cint never applies to bool operands"),
        }
    }

    fn intrinsic_with_overflow(
        &mut self,
        name: &str,
        lv: IntValue<'ctx>,
        rv: IntValue<'ctx>,
        label: &str,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let i32_t = self.context.i32_type();
        let intrinsic = Intrinsic::find(name).ok_or_else(|| CompileError::JitError {
            message: format!("missing LLVM intrinsic {name}"),
        })?;
        let decl = intrinsic
            .get_declaration(self.module, &[i32_t.into()])
            .ok_or_else(|| CompileError::JitError {
                message: format!("could not declare intrinsic {name}"),
            })?;
        let call = self
            .builder
            .build_call(decl, &[lv.into(), rv.into()], label)
            .map_err(ir_err)?;
        let result = call
            .try_as_basic_value()
            .left()
            .expect("overflow intrinsics return a struct value")
            .into_struct_value();
        let value = self
            .builder
            .build_extract_value(result, 0, &format!("{label}_result"))
            .map_err(ir_err)?;
        let overflowed = self
            .builder
            .build_extract_value(result, 1, &format!("{label}_overflow"))
            .map_err(ir_err)?
            .into_int_value();
        self.guard_trap(overflowed)?;
        Ok(value)
    }

    fn checked_div(
        &mut self,
        lv: IntValue<'ctx>,
        rv: IntValue<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let i32_t = self.context.i32_type();
        let int_min = i32_t.const_int(i32::MIN as u64, true);
        let neg_one = i32_t.const_int((-1i32) as u32 as u64, true);
        let zero = i32_t.const_int(0, false);

        let l_is_min = self
            .builder
            .build_int_compare(IntPredicate::EQ, lv, int_min, "l_is_min")
            .map_err(ir_err)?;
        let r_is_neg1 = self
            .builder
            .build_int_compare(IntPredicate::EQ, rv, neg_one, "r_is_neg1")
            .map_err(ir_err)?;
        let r_is_zero = self
            .builder
            .build_int_compare(IntPredicate::EQ, rv, zero, "r_is_zero")
            .map_err(ir_err)?;
        let min_over_neg1 = self
            .builder
            .build_and(l_is_min, r_is_neg1, "min_over_neg1")
            .map_err(ir_err)?;
        let bad = self
            .builder
            .build_or(min_over_neg1, r_is_zero, "div_guard")
            .map_err(ir_err)?;
        self.guard_trap(bad)?;

        Ok(self
            .builder
            .build_int_signed_div(lv, rv, "div")
            .map_err(ir_err)?
            .into())
    }

    /// Branches around a fresh block that prints the overflow message
    /// whenever `is_bad` holds, then falls back through to the continuation.
    fn guard_trap(&mut self, is_bad: IntValue<'ctx>) -> CompileResult<()> {
        let function = self.current_function();
        let trap_bb = self.context.append_basic_block(function, "overflow_trap");
        let cont_bb = self.context.append_basic_block(function, "overflow_cont");
        self.builder
            .build_conditional_branch(is_bad, trap_bb, cont_bb)
            .map_err(ir_err)?;

        self.builder.position_at_end(trap_bb);
        self.lower_print_string("Error: cint value overflowed")?;
        self.builder
            .build_unconditional_branch(cont_bb)
            .map_err(ir_err)?;

        self.builder.position_at_end(cont_bb);
        Ok(())
    }

    fn intern_string(&mut self, key: String, text: &str) -> CompileResult<(PointerValue<'ctx>, u32)> {
        if let Some((global, len)) = self.string_globals.get(&key).cloned() {
            return Ok((global.as_pointer_value(), len));
        }
        let bytes = text.as_bytes();
        let i8_t = self.context.i8_type();
        let const_str = self.context.const_string(bytes, true);
        let len = bytes.len() as u32 + 1;
        let global = self.module.add_global(i8_t.array_type(len), None, &key);
        global.set_linkage(Linkage::Private);
        global.set_constant(true);
        global.set_initializer(&const_str);
        self.string_globals.insert(key, (global, len));
        Ok((global.as_pointer_value(), len))
    }

    fn string_ptr(&mut self, global_ptr: PointerValue<'ctx>, len: u32) -> CompileResult<PointerValue<'ctx>> {
        let i8_t = self.context.i8_type();
        let array_ty = i8_t.array_type(len);
        let zero = self.context.i32_type().const_int(0, false);
        unsafe {
            self.builder
                .build_in_bounds_gep(array_ty, global_ptr, &[zero, zero], "str_ptr")
                .map_err(ir_err)
        }
    }

    fn lower_print_string(&mut self, text: &str) -> CompileResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let fmt = format!("{text} \n");
        let key = format!("str.{text}");
        let (global_ptr, len) = self.intern_string(key, &fmt)?;
        let arg_ptr = self.string_ptr(global_ptr, len)?;
        let printf_fn = self
            .module
            .get_function("printf")
            .expect("printf declared before any print statement is lowered");
        self.builder
            .build_call(printf_fn, &[arg_ptr.into()], "printf_call")
            .map_err(ir_err)?;
        Ok(())
    }

    fn lower_print_value(&mut self, expr: &Expr, scopes: &Scopes<'ctx>) -> CompileResult<()> {
        let value = self.lower_expr(expr, scopes, EvalMode::Plain)?;
        let mut value = self.load_if_pointer(value)?;

        if value.is_int_value() && value.into_int_value().get_type() == self.context.bool_type() {
            value = self
                .builder
                .build_int_z_extend(value.into_int_value(), self.context.i32_type(), "bool_to_i32")
                .map_err(ir_err)?
                .into();
        }

        let (fmt_text, key) = if value.is_float_value() {
            value = self
                .builder
                .build_float_ext(value.into_float_value(), self.context.f64_type(), "to_double")
                .map_err(ir_err)?
                .into();
            ("%f \n".to_string(), "fmt.float")
        } else {
            ("%i \n".to_string(), "fmt.int")
        };

        let (global_ptr, len) = self.intern_string(key.to_string(), &fmt_text)?;
        let arg_ptr = self.string_ptr(global_ptr, len)?;
        let printf_fn = self
            .module
            .get_function("printf")
            .expect("printf declared before any print statement is lowered");
        let call_args: Vec<BasicMetadataValueEnum> = vec![arg_ptr.into(), value.into()];
        self.builder
            .build_call(printf_fn, &call_args, "printf_call")
            .map_err(ir_err)?;
        Ok(())
    }
}

fn noalias_kind_id() -> u32 {
    inkwell::attributes::Attribute::get_named_enum_kind_id("noalias")
}

/// Marks a float instruction with every fast-math flag, matching the
/// reference tool's `flags=["fast"]` on its float arithmetic builders.
fn fast_float<'ctx>(value: FloatValue<'ctx>) -> FloatValue<'ctx> {
    if let Some(inst) = value.as_instruction_value() {
        inst.set_fast_math_all();
    }
    value
}

/// Same as [`fast_float`] for the `i1` result of a fast float comparison.
fn fast_bool<'ctx>(value: IntValue<'ctx>) -> IntValue<'ctx> {
    if let Some(inst) = value.as_instruction_value() {
        inst.set_fast_math_all();
    }
    value
}
