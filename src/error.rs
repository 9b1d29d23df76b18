// ABOUTME: Error types spanning lexing, parsing, semantic analysis, IR generation, and the driver

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("error: illegal character '{ch}' at line {line}")]
    LexError { ch: char, line: u32 },

    #[error("error: Syntax error in input!")]
    SyntaxError,

    #[error("error: In <vdecl>, the type may not be void")]
    BadDeclarationType,

    #[error("error: In <ref type> the type may not be void or itself a reference type")]
    BadReferenceType,

    #[error("error: Cannot find function {name}")]
    UndeclaredFunction { name: String },

    #[error("error: A function may not return a ref type")]
    ReferenceReturn,

    #[error(
        "error: The initialization expression for a reference variable (including function arguments) must be a variable"
    )]
    BadReferenceInit,

    #[error(
        "error: All programs must define exactly one function named \"run\" which returns an integer and takes no arguments"
    )]
    MissingOrBadRun,

    #[error("error: {name} is not defined")]
    UndefinedVariable { name: String },

    #[error("error: The types of a binary operator don't match")]
    TypeMismatch,

    #[error("error: function {name} is missing a return statement")]
    MissingReturn { name: String },

    #[error("error: cannot read source file {path}: {message}")]
    IoError { path: String, message: String },

    #[error("error: JIT failed: {message}")]
    JitError { message: String },
}

pub type CompileResult<T> = Result<T, CompileError>;
