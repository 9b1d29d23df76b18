// ABOUTME: AST node types decorated by the semantic analyzer with resolved types

use serde::{Deserialize, Serialize};

/// Parsing is deliberately permissive: `ref ref int` and `ref void` both
/// parse successfully as `Type::Ref(..)` with an arbitrary inner type. The
/// reference well-formedness semantic pass is what rejects them; keeping the
/// parser permissive here mirrors the original grammar/checker split, where
/// the grammar accepts any `("noalias")? "ref" type` and a later pass
/// inspects the resulting string for nested/void refs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Int,
    Cint,
    Float,
    Bool,
    Void,
    Ref(Box<Type>, bool /* noalias */),
}

impl Type {
    pub fn ref_of(inner: Type, noalias: bool) -> Type {
        Type::Ref(Box::new(inner), noalias)
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Type::Ref(..))
    }

    /// True if this type is `ref void` or contains more than one `ref`
    /// nesting level — the two shapes the reference well-formedness pass
    /// rejects.
    pub fn is_malformed_reference(&self) -> bool {
        match self {
            Type::Ref(inner, _) => matches!(inner.as_ref(), Type::Void) || inner.is_ref(),
            _ => false,
        }
    }

    /// The resolved type an expression of this declared type carries for
    /// binop/assign type-equality purposes: `cint` normalizes to `int`,
    /// reference modifiers are stripped to their scalar.
    pub fn base(&self) -> Type {
        match self {
            Type::Cint => Type::Int,
            Type::Ref(inner, _) => inner.base(),
            other => other.clone(),
        }
    }

    pub fn is_cint(&self) -> bool {
        matches!(self, Type::Cint)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub externs: Vec<Extern>,
    pub functions: Vec<Function>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extern {
    pub ret_type: Type,
    pub name: String,
    pub param_types: Vec<Type>,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub ret_type: Type,
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub body: Block,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDecl {
    pub ty: Type,
    pub var: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Block(Block),
    Return {
        expr: Option<Expr>,
        line: u32,
    },
    ExprStmt(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    PrintValue(Expr),
    PrintString(String),
    VarDecl {
        decl: ParamDecl,
        init: Expr,
        line: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
    Gt,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Minus,
    Not,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    IntLit {
        value: i32,
        ty: Type,
    },
    FloatLit {
        value: f32,
        ty: Type,
    },
    BoolLit {
        value: bool,
        ty: Type,
    },
    VarRef {
        name: String,
        ty: Option<Type>,
        line: u32,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
        ty: Option<Type>,
        line: u32,
    },
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: Option<Type>,
        line: u32,
    },
    UnOp {
        op: UnOp,
        expr: Box<Expr>,
        ty: Option<Type>,
    },
    Assign {
        var: String,
        expr: Box<Expr>,
        ty: Option<Type>,
        line: u32,
    },
    Cast {
        target: Type,
        expr: Box<Expr>,
    },
}

impl Expr {
    /// The resolved type attribute every expression carries after semantic
    /// analysis. Panics if called before the type-annotation pass — callers
    /// in the IR generator only ever see post-semantic-analysis ASTs.
    pub fn resolved_type(&self) -> Type {
        match self {
            Expr::IntLit { ty, .. } | Expr::FloatLit { ty, .. } | Expr::BoolLit { ty, .. } => {
                ty.clone()
            }
            Expr::VarRef { ty, .. } => ty.clone().expect("var-ref missing resolved type"),
            Expr::Call { ty, .. } => ty.clone().expect("call missing resolved type"),
            Expr::BinOp { ty, .. } => ty.clone().expect("binop missing resolved type"),
            Expr::UnOp { ty, .. } => ty.clone().expect("uop missing resolved type"),
            Expr::Assign { ty, .. } => ty.clone().expect("assign missing resolved type"),
            Expr::Cast { target, .. } => target.clone(),
        }
    }

    /// True only for a bare variable reference; used to enforce the
    /// bare-variable-only rule for ref initializers and ref call arguments.
    pub fn is_bare_var(&self) -> bool {
        matches!(self, Expr::VarRef { .. })
    }

    pub fn var_name(&self) -> Option<&str> {
        match self {
            Expr::VarRef { name, .. } => Some(name),
            _ => None,
        }
    }
}
