// ABOUTME: SSA IR generator lowering the decorated AST into an inkwell module

mod builtins;
mod codegen;

use inkwell::context::Context;
use inkwell::module::Module;

use crate::ast::Program;
use crate::error::CompileResult;
use crate::sema::FunctionTable;

/// Lowers `program` into a freshly created LLVM module named "prog", the
/// same module name the pre-distillation reference tool used.
pub fn generate_ir<'ctx>(
    context: &'ctx Context,
    program: &Program,
    functions: &FunctionTable,
    sysargs: &[String],
) -> CompileResult<Module<'ctx>> {
    let module = context.create_module("prog");
    module.set_triple(&inkwell::targets::TargetMachine::get_default_triple());
    codegen::generate(context, &module, program, functions, sysargs)?;
    Ok(module)
}
