// ABOUTME: Recursive-descent, precedence-climbing parser building the AST from the token stream

use crate::ast::*;
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Spanned, Token};

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

pub fn parse_program(tokens: Vec<Spanned>) -> CompileResult<Program> {
    Parser::new(tokens).parse_program()
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn check(&self, t: &Token) -> bool {
        self.peek() == t
    }

    fn eat(&mut self, t: &Token) -> CompileResult<()> {
        if self.check(t) {
            self.advance();
            Ok(())
        } else {
            Err(CompileError::SyntaxError)
        }
    }

    fn eat_id(&mut self) -> CompileResult<String> {
        match self.advance() {
            Token::Id(name) => Ok(name),
            _ => Err(CompileError::SyntaxError),
        }
    }

    fn eat_varid(&mut self) -> CompileResult<String> {
        match self.advance() {
            Token::VarId(name) => Ok(name),
            _ => Err(CompileError::SyntaxError),
        }
    }

    // program := extern* function+
    fn parse_program(&mut self) -> CompileResult<Program> {
        let mut externs = Vec::new();
        while self.check(&Token::Extern) {
            externs.push(self.parse_extern()?);
        }
        let mut functions = Vec::new();
        while self.check(&Token::Def) {
            functions.push(self.parse_function()?);
        }
        if !self.check(&Token::Eof) {
            return Err(CompileError::SyntaxError);
        }
        Ok(Program { externs, functions })
    }

    // extern := "extern" type ID "(" typelist? ")" ";"
    fn parse_extern(&mut self) -> CompileResult<Extern> {
        let line = self.line();
        self.eat(&Token::Extern)?;
        let ret_type = self.parse_type()?;
        let name = self.eat_id()?;
        self.eat(&Token::LParen)?;
        let mut param_types = Vec::new();
        if !self.check(&Token::RParen) {
            param_types.push(self.parse_type()?);
            while self.check(&Token::Comma) {
                self.advance();
                param_types.push(self.parse_type()?);
            }
        }
        self.eat(&Token::RParen)?;
        self.eat(&Token::Semicolon)?;
        Ok(Extern {
            ret_type,
            name,
            param_types,
            line,
        })
    }

    // function := "def" type ID "(" paramlist? ")" block
    fn parse_function(&mut self) -> CompileResult<Function> {
        let line = self.line();
        self.eat(&Token::Def)?;
        let ret_type = self.parse_type()?;
        let name = self.eat_id()?;
        self.eat(&Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            params.push(self.parse_param_decl()?);
            while self.check(&Token::Comma) {
                self.advance();
                params.push(self.parse_param_decl()?);
            }
        }
        self.eat(&Token::RParen)?;
        let body = self.parse_block()?;
        Ok(Function {
            ret_type,
            name,
            params,
            body,
            line,
        })
    }

    fn parse_param_decl(&mut self) -> CompileResult<ParamDecl> {
        let ty = self.parse_type()?;
        let var = self.eat_varid()?;
        Ok(ParamDecl { ty, var })
    }

    // type := "int"|"cint"|"float"|"bool"|"void" | "ref" type | "noalias" "ref" type
    fn parse_type(&mut self) -> CompileResult<Type> {
        if self.check(&Token::Noalias) {
            self.advance();
            self.eat(&Token::Ref)?;
            let inner = self.parse_type()?;
            return Ok(Type::ref_of(inner, true));
        }
        if self.check(&Token::Ref) {
            self.advance();
            let inner = self.parse_type()?;
            return Ok(Type::ref_of(inner, false));
        }
        match self.advance() {
            Token::TypeInt => Ok(Type::Int),
            Token::TypeCint => Ok(Type::Cint),
            Token::TypeFloat => Ok(Type::Float),
            Token::TypeBool => Ok(Type::Bool),
            Token::TypeVoid => Ok(Type::Void),
            _ => Err(CompileError::SyntaxError),
        }
    }

    // block := "{" stmt* "}"
    fn parse_block(&mut self) -> CompileResult<Block> {
        self.eat(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.eat(&Token::RBrace)?;
        Ok(Block { stmts })
    }

    fn parse_stmt(&mut self) -> CompileResult<Stmt> {
        let line = self.line();
        match self.peek().clone() {
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::Return => {
                self.advance();
                if self.check(&Token::Semicolon) {
                    self.advance();
                    return Ok(Stmt::Return { expr: None, line });
                }
                let expr = self.parse_expr()?;
                self.eat(&Token::Semicolon)?;
                Ok(Stmt::Return {
                    expr: Some(expr),
                    line,
                })
            }
            Token::While => {
                self.advance();
                self.eat(&Token::LParen)?;
                let cond = self.parse_expr()?;
                self.eat(&Token::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body })
            }
            Token::If => {
                self.advance();
                self.eat(&Token::LParen)?;
                let cond = self.parse_expr()?;
                self.eat(&Token::RParen)?;
                let then_branch = Box::new(self.parse_stmt()?);
                // binds to the nearest enclosing `if`, resolving dangling-else
                let else_branch = if self.check(&Token::Else) {
                    self.advance();
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            Token::Print => {
                self.advance();
                if let Token::StrLit(text) = self.peek().clone() {
                    self.advance();
                    self.eat(&Token::Semicolon)?;
                    return Ok(Stmt::PrintString(text));
                }
                let expr = self.parse_expr()?;
                self.eat(&Token::Semicolon)?;
                Ok(Stmt::PrintValue(expr))
            }
            Token::TypeInt
            | Token::TypeCint
            | Token::TypeFloat
            | Token::TypeBool
            | Token::TypeVoid
            | Token::Ref
            | Token::Noalias => {
                let decl = self.parse_param_decl()?;
                self.eat(&Token::Assign)?;
                let init = self.parse_expr()?;
                self.eat(&Token::Semicolon)?;
                Ok(Stmt::VarDecl { decl, init, line })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.eat(&Token::Semicolon)?;
                Ok(Stmt::ExprStmt(expr))
            }
        }
    }

    // Precedence ladder, lowest to highest:
    // ASSIGN < OR < AND < EQUAL < {LT,GT} < {PLUS,MINUS} < {TIMES,DIVIDE} < {UOP,TYPECAST}
    fn parse_expr(&mut self) -> CompileResult<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> CompileResult<Expr> {
        if let Token::VarId(name) = self.peek().clone() {
            if self.tokens.get(self.pos + 1).map(|s| &s.token) == Some(&Token::Assign) {
                let line = self.line();
                self.advance(); // varid
                self.advance(); // =
                let rhs = self.parse_assign()?; // right-associative
                return Ok(Expr::Assign {
                    var: name,
                    expr: Box::new(rhs),
                    ty: None,
                    line,
                });
            }
        }
        self.parse_or()
    }

    fn parse_or(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check(&Token::Or) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = bin(BinOp::Or, lhs, rhs, line);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_equal()?;
        while self.check(&Token::And) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_equal()?;
            lhs = bin(BinOp::And, lhs, rhs, line);
        }
        Ok(lhs)
    }

    fn parse_equal(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_rel()?;
        while self.check(&Token::Equal) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_rel()?;
            lhs = bin(BinOp::Eq, lhs, rhs, line);
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_add()?;
            lhs = bin(op, lhs, rhs, line);
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = bin(op, lhs, rhs, line);
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Times => BinOp::Mul,
                Token::Divide => BinOp::Div,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = bin(op, lhs, rhs, line);
        }
        Ok(lhs)
    }

    // UOP and TYPECAST share the same highest-precedence right-associative
    // prefix tier: `-[int] $x` parses as Minus(Cast(int, $x)) because `-` is
    // seen first and recurses into another prefix position.
    fn parse_unary(&mut self) -> CompileResult<Expr> {
        if self.check(&Token::Minus) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::UnOp {
                op: UnOp::Minus,
                expr: Box::new(inner),
                ty: None,
            });
        }
        if self.check(&Token::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::UnOp {
                op: UnOp::Not,
                expr: Box::new(inner),
                ty: None,
            });
        }
        if self.check(&Token::LBracket) {
            self.advance();
            let target = self.parse_type()?;
            self.eat(&Token::RBracket)?;
            let inner = self.parse_unary()?;
            return Ok(Expr::Cast {
                target,
                expr: Box::new(inner),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let line = self.line();
        match self.peek().clone() {
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.eat(&Token::RParen)?;
                Ok(inner)
            }
            Token::True => {
                self.advance();
                Ok(Expr::BoolLit {
                    value: true,
                    ty: Type::Bool,
                })
            }
            Token::False => {
                self.advance();
                Ok(Expr::BoolLit {
                    value: false,
                    ty: Type::Bool,
                })
            }
            Token::IntLit(v) => {
                self.advance();
                Ok(Expr::IntLit {
                    value: v,
                    ty: Type::Int,
                })
            }
            Token::FloatLit(v) => {
                self.advance();
                Ok(Expr::FloatLit {
                    value: v,
                    ty: Type::Float,
                })
            }
            Token::VarId(name) => {
                self.advance();
                Ok(Expr::VarRef {
                    name,
                    ty: None,
                    line,
                })
            }
            Token::Id(name) => {
                self.advance();
                self.eat(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.check(&Token::RParen) {
                    args.push(self.parse_expr()?);
                    while self.check(&Token::Comma) {
                        self.advance();
                        args.push(self.parse_expr()?);
                    }
                }
                self.eat(&Token::RParen)?;
                Ok(Expr::Call {
                    callee: name,
                    args,
                    ty: None,
                    line,
                })
            }
            _ => Err(CompileError::SyntaxError),
        }
    }
}

fn bin(op: BinOp, lhs: Expr, rhs: Expr, line: u32) -> Expr {
    Expr::BinOp {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        ty: None,
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> CompileResult<Program> {
        let (tokens, errs) = Lexer::new(src).tokenize();
        assert!(errs.is_empty());
        parse_program(tokens)
    }

    #[test]
    fn parses_minimal_run_function() {
        let prog = parse("def int run() { return 2 + 3; }").unwrap();
        assert_eq!(prog.functions.len(), 1);
        assert_eq!(prog.functions[0].name, "run");
    }

    #[test]
    fn parses_extern_with_typelist() {
        let prog = parse("extern int getarg(int); def int run() { return getarg(0); }").unwrap();
        assert_eq!(prog.externs.len(), 1);
        assert_eq!(prog.externs[0].param_types, vec![Type::Int]);
    }

    #[test]
    fn dangling_else_binds_to_nearest_if() {
        let prog = parse(
            "def int run() { if (true) if (false) return 1; else return 2; return 0; }",
        )
        .unwrap();
        match &prog.functions[0].body.stmts[0] {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert!(else_branch.is_none());
                match then_branch.as_ref() {
                    Stmt::If { else_branch, .. } => assert!(else_branch.is_some()),
                    other => panic!("expected nested if, got {:?}", other),
                }
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn unary_minus_of_cast_precedence() {
        let prog = parse("def int run() { int $x = 0; return -[int] $x; }").unwrap();
        match &prog.functions[0].body.stmts[1] {
            Stmt::Return {
                expr: Some(Expr::UnOp { op, expr, .. }),
                ..
            } => {
                assert_eq!(*op, UnOp::Minus);
                assert!(matches!(expr.as_ref(), Expr::Cast { .. }));
            }
            other => panic!("expected unop(cast), got {:?}", other),
        }
    }

    #[test]
    fn assign_is_right_associative() {
        // parses without error: $a = $b = 1 is legal even if semantically
        // odd for mismatched types, since parsing precedes type checking
        let prog = parse("def int run() { int $a = 0; int $b = 0; $a = $b = 1; return 0; }");
        assert!(prog.is_ok());
    }

    #[test]
    fn syntax_error_on_missing_semicolon() {
        let result = parse("def int run() { return 1 }");
        assert!(matches!(result, Err(CompileError::SyntaxError)));
    }
}
