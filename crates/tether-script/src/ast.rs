//! Syntax tree produced by the parser.
//!
//! Function nodes are reference counted so closures can share them with the
//! program that defined them.

use crate::token::Span;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: Arc<str>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Declaration {
        kind: DeclKind,
        declarators: Vec<Declarator>,
    },
    Function(Arc<FunctionNode>),
    Return {
        value: Option<Expr>,
        span: Span,
    },
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Break(Span),
    Continue(Span),
    Block(Vec<Stmt>),
    Throw {
        value: Expr,
        span: Span,
    },
    Try {
        block: Vec<Stmt>,
        param: Option<Arc<str>>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Empty,
}

#[derive(Debug)]
pub struct FunctionNode {
    pub name: Option<Arc<str>>,
    pub params: Vec<Arc<str>>,
    pub body: FunctionBody,
    pub is_arrow: bool,
    pub span: Span,
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

/// `=` or a compound assignment carrying its arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

#[derive(Debug, Clone)]
pub enum TemplateSegment {
    Text(Arc<str>),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Named(Arc<str>),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64, Span),
    String(Arc<str>, Span),
    Bool(bool, Span),
    Null(Span),
    Undefined(Span),
    Template(Vec<TemplateSegment>, Span),
    Ident(Arc<str>, Span),
    This(Span),
    Array(Vec<Expr>, Span),
    Object(Vec<(Arc<str>, Expr)>, Span),
    Function(Arc<FunctionNode>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
        span: Span,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: PropertyKey,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(_, span)
            | Expr::String(_, span)
            | Expr::Bool(_, span)
            | Expr::Null(span)
            | Expr::Undefined(span)
            | Expr::Template(_, span)
            | Expr::Ident(_, span)
            | Expr::This(span)
            | Expr::Array(_, span)
            | Expr::Object(_, span) => *span,
            Expr::Function(node) => node.span,
            Expr::Unary { span, .. }
            | Expr::Update { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Member { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. } => *span,
        }
    }

    /// Short source-like rendering used in error messages (`obj.method`).
    pub fn describe(&self) -> String {
        match self {
            Expr::Ident(name, _) => name.to_string(),
            Expr::This(_) => "this".to_string(),
            Expr::Member {
                object,
                property: PropertyKey::Named(name),
                ..
            } => format!("{}.{}", object.describe(), name),
            Expr::Member { object, .. } => format!("{}[...]", object.describe()),
            Expr::Call { callee, .. } => format!("{}(...)", callee.describe()),
            Expr::String(s, _) => format!("\"{}\"", s),
            Expr::Number(n, _) => n.to_string(),
            _ => "expression".to_string(),
        }
    }
}
