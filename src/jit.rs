// ABOUTME: the managed LLVM pass pipeline and the MCJIT invocation of `run`

use inkwell::execution_engine::JitFunction;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::OptimizationLevel;

use crate::error::{CompileError, CompileResult};

fn jit_err<E: std::fmt::Display>(e: E) -> CompileError {
    CompileError::JitError {
        message: e.to_string(),
    }
}

/// Runs `module` through the target machine's new pass-builder pipeline at
/// the given level. A level of `0` is a no-op: the caller should skip
/// calling this at all in that case, but it is harmless to call regardless.
pub fn optimize(module: &Module, level: u8) -> CompileResult<()> {
    if level == 0 {
        return Ok(());
    }

    Target::initialize_native(&InitializationConfig::default()).map_err(jit_err)?;
    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple).map_err(jit_err)?;
    let target_machine = target
        .create_target_machine(
            &triple,
            "generic",
            "",
            OptimizationLevel::Default,
            RelocMode::Default,
            CodeModel::Default,
        )
        .ok_or_else(|| CompileError::JitError {
            message: "could not create a target machine for the host triple".to_string(),
        })?;

    let passes = match level {
        1 => "default<O1>",
        2 => "default<O2>",
        _ => "default<O3>",
    };
    module
        .run_passes(passes, &target_machine, PassBuilderOptions::create())
        .map_err(jit_err)
}

type RunFn = unsafe extern "C" fn() -> i32;

/// JIT-compiles `module` and invokes its `run` entry point, returning the
/// value `run` returned (the process's eventual exit code). Callers that
/// also want the optimizer pipeline applied should call [`optimize`] on
/// the module before this.
pub fn run(module: &Module) -> CompileResult<i32> {
    let engine = module
        .create_jit_execution_engine(OptimizationLevel::None)
        .map_err(jit_err)?;

    let run_fn: JitFunction<RunFn> = unsafe { engine.get_function("run").map_err(jit_err)? };

    let result = unsafe { run_fn.call() };
    Ok(result)
}
