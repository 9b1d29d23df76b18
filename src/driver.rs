// ABOUTME: thin orchestration from source text through lexing, parsing, semantic
// ABOUTME: analysis, and (on demand) IR generation, independent of the CLI's flag dispatch

use std::fs;
use std::path::Path;

use inkwell::context::Context;
use inkwell::module::Module;

use crate::ast::Program;
use crate::error::{CompileError, CompileResult};
use crate::ir;
use crate::lexer::Lexer;
use crate::parser;
use crate::sema::{self, FunctionTable};

pub fn read_source(path: &Path) -> CompileResult<String> {
    fs::read_to_string(path).map_err(|e| CompileError::IoError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

pub fn write_output(path: &Path, contents: &str) -> CompileResult<()> {
    fs::write(path, contents).map_err(|e| CompileError::IoError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Front-end output: the decorated AST and the function signature table the
/// IR generator needs. Kept separate from IR generation so the CLI can emit
/// the AST without paying for code generation when only `--emit-ast` was
/// requested.
pub struct Analyzed {
    pub ast: Program,
    pub functions: FunctionTable,
}

pub fn analyze_source(source: &str) -> CompileResult<Analyzed> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if let Some(err) = lex_errors.into_iter().next() {
        return Err(err);
    }

    let mut ast = parser::parse_program(tokens)?;
    let functions = sema::analyze(&mut ast)?;
    Ok(Analyzed { ast, functions })
}

/// Lowers an already-analyzed program into a fresh LLVM module. `sysargs`
/// are the raw trailing command-line arguments forwarded to
/// `getarg`/`getargf`.
pub fn generate<'ctx>(
    context: &'ctx Context,
    analyzed: &Analyzed,
    sysargs: &[String],
) -> CompileResult<Module<'ctx>> {
    ir::generate_ir(context, &analyzed.ast, &analyzed.functions, sysargs)
}
