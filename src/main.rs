// ABOUTME: CLI entry point: argument parsing and dispatch to emit-ast / emit-llvm / jit

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use inkwell::context::Context;

use ekcc::driver;
use ekcc::error::{CompileError, CompileResult};
use ekcc::jit;

/// A compiler and JIT runner for a small statically typed imperative language.
#[derive(Parser, Debug)]
#[command(name = "ekcc", version, about)]
struct CliArgs {
    /// Source file to compile.
    input: PathBuf,

    /// Base path for derived output files; defaults to the input file's stem.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the decorated AST as YAML to `<output>.yaml`.
    #[arg(long)]
    emit_ast: bool,

    /// Write the generated IR as textual LLVM assembly to `<output>.ll`.
    #[arg(long)]
    emit_llvm: bool,

    /// JIT-compile the module and invoke its `run` entry point.
    #[arg(short, long)]
    jit: bool,

    /// Optimization level passed to the LLVM pass-manager builder.
    #[arg(short = 'O', long = "opt-level", default_value_t = 0)]
    opt_level: u8,

    /// Arguments forwarded to the compiled program's `getarg`/`getargf`.
    #[arg(last = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = CliArgs::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: CliArgs) -> CompileResult<i32> {
    let source = driver::read_source(&cli.input)?;
    let output_base = cli.output.clone().unwrap_or_else(|| {
        let stem = cli.input.file_stem().unwrap_or_default();
        PathBuf::from(stem)
    });

    let analyzed = driver::analyze_source(&source)?;

    if cli.emit_ast {
        let yaml = serde_yaml::to_string(&analyzed.ast).map_err(|e| CompileError::IoError {
            path: output_base.with_extension("yaml").display().to_string(),
            message: e.to_string(),
        })?;
        driver::write_output(&output_base.with_extension("yaml"), &yaml)?;
    }

    if !cli.emit_llvm && !cli.jit {
        return Ok(0);
    }

    let context = Context::create();
    let module = driver::generate(&context, &analyzed, &cli.args)?;

    if cli.opt_level > 0 {
        jit::optimize(&module, cli.opt_level)?;
    }

    if cli.emit_llvm {
        let ll_path = output_base.with_extension("ll");
        module.print_to_file(&ll_path).map_err(|e| CompileError::IoError {
            path: ll_path.display().to_string(),
            message: e.to_string(),
        })?;
    }

    if cli.jit {
        return jit::run(&module);
    }

    Ok(0)
}
