//! Syntax tree for compiled templates.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Eq,
    Ne,
    Identical,
    NotIdentical,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Concat => ".",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Identical => "===",
            BinOp::NotIdentical => "!==",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

/// Short-circuiting operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `expr` as found on a given source line; faults inside it report that line
    At(usize, Box<Expr>),
    Literal(Value),
    Array(Vec<Expr>),
    /// `['key' => value, ...]`
    Object(Vec<(Expr, Expr)>),
    Var(String),
    Index(Box<Expr>, Box<Expr>),
    /// `$list[]`; only valid as an assignment target
    Append(Box<Expr>),
    Member(Box<Expr>, String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        target: Place,
        op: Option<BinOp>,
        value: Box<Expr>,
    },
    IncDec {
        target: Place,
        delta: i64,
        prefix: bool,
    },
    Call(String, Vec<Expr>),
}

/// An assignable location: a variable plus an access path into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub path: Vec<PathSeg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    Index(Expr),
    Member(String),
    Append,
}

impl Place {
    /// Convert an expression into an assignment target, if it is one.
    pub fn from_expr(expr: Expr) -> Option<Place> {
        match expr {
            Expr::At(_, inner) => Place::from_expr(*inner),
            Expr::Var(name) => Some(Place {
                name,
                path: Vec::new(),
            }),
            Expr::Index(base, key) => {
                let mut place = Place::from_expr(*base)?;
                place.path.push(PathSeg::Index(*key));
                Some(place)
            }
            Expr::Member(base, field) => {
                let mut place = Place::from_expr(*base)?;
                place.path.push(PathSeg::Member(field));
                Some(place)
            }
            Expr::Append(base) => {
                let mut place = Place::from_expr(*base)?;
                place.path.push(PathSeg::Append);
                Some(place)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    /// Line the statement starts on
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Literal template text
    Text(String),
    Echo(Vec<Expr>),
    Expr(Expr),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    For {
        init: Vec<Expr>,
        cond: Vec<Expr>,
        step: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Foreach {
        subject: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}
