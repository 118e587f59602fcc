//! Expression syntax tree

use std::fmt;

use fieldmap_model::Value;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
        };
        f.write_str(symbol)
    }
}

/// Right-hand side of a `matches` operator
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Literal pattern compiled when the expression was parsed
    Compiled(Regex),
    /// Pattern computed at evaluation time
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    /// Identifier resolved against the root object
    Property(String),
    /// `#name`
    Variable(String),
    Member {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Matches {
        subject: Box<Expr>,
        pattern: Pattern,
    },
}
