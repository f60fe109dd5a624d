mod parser;

#[cfg(test)]
mod parser_test;

use std::rc::Rc;

use crate::op::{BinOp, UnOp};

pub use parser::Parser;

pub type Name = Rc<str>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Vararg,
    Function(Rc<FuncBody>),
    Name(Name),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Method(Box<Expr>, Name, Vec<Expr>),
    /// Parenthesized expression, truncated to a single value.
    Paren(Box<Expr>),
    Table(Vec<Field>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
}

impl Expr {
    /// Calls and `...` can expand to several values at the end of a list.
    pub fn is_multi(&self) -> bool {
        matches!(self, Expr::Call(..) | Expr::Method(..) | Expr::Vararg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Positional(Expr),
    Named(Name, Expr),
    Keyed(Expr, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    pub params: Vec<Name>,
    pub is_vararg: bool,
    pub body: Block,
    pub name: Option<String>,
    pub line: u32,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Local {
        names: Vec<Name>,
        values: Vec<Expr>,
    },
    LocalFunction {
        name: Name,
        func: Rc<FuncBody>,
    },
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
    },
    Call(Expr),
    Do(Block),
    While {
        cond: Expr,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: Expr,
    },
    If {
        branches: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    NumericFor {
        var: Name,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor {
        names: Vec<Name>,
        exprs: Vec<Expr>,
        body: Block,
    },
    Return(Vec<Expr>),
    Break,
}
