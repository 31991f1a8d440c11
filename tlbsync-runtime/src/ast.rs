//! Syntax tree produced by the parser, before name resolution.

use std::fmt;

use crate::lexer::RawTag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaAst {
    pub declarations: Vec<Declaration>,
}

/// `ctor#tag {params} fields = Result args;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub constructor: String,
    pub tag: Option<RawTag>,
    pub items: Vec<Item>,
    pub result: String,
    pub result_args: Vec<TypeExpr>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `{n:#}`
    Nat,
    /// `{X:Type}`
    Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Param { name: String, kind: ParamKind },
    Constraint(Constraint),
    /// `name:Type`, `_:Type` or a bare type (`name` is `None` for the last two).
    Field { name: Option<String>, ty: TypeExpr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// Bare identifier: type name, type parameter or nat variable.
    Name(String),
    Number(u64),
    /// `(Head arg arg …)`
    Apply { head: String, args: Vec<TypeExpr> },
    /// `#`
    Nat32,
    /// `## n`
    UintN(Box<TypeExpr>),
    /// `#< n`
    UintLess(Box<TypeExpr>),
    /// `#<= n`
    UintLessEq(Box<TypeExpr>),
    /// `^T`
    Ref(Box<TypeExpr>),
    /// `flag?T` / `flag.bit?T`
    Cond {
        flag: String,
        bit: Option<u32>,
        inner: Box<TypeExpr>,
    },
    /// `[ fields ]`, an anonymous cell
    Cell(Vec<Item>),
    /// Arithmetic over nat variables
    Expr(NatExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatExpr {
    Const(u64),
    Var(String),
    Binary {
        op: ArithOp,
        lhs: Box<NatExpr>,
        rhs: Box<NatExpr>,
    },
}

impl fmt::Display for NatExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NatExpr::Const(v) => write!(f, "{v}"),
            NatExpr::Var(name) => f.write_str(name),
            NatExpr::Binary { op, lhs, rhs } => {
                let op = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                };
                write!(f, "({lhs} {op} {rhs})")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl CmpOp {
    pub fn holds(self, lhs: u64, rhs: u64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::NotEq => lhs != rhs,
            CmpOp::Less => lhs < rhs,
            CmpOp::LessEq => lhs <= rhs,
            CmpOp::Greater => lhs > rhs,
            CmpOp::GreaterEq => lhs >= rhs,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "!=",
            CmpOp::Less => "<",
            CmpOp::LessEq => "<=",
            CmpOp::Greater => ">",
            CmpOp::GreaterEq => ">=",
        })
    }
}

/// `{ lhs op rhs }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub lhs: NatExpr,
    pub op: CmpOp,
    pub rhs: NatExpr,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}
