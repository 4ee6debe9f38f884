// AST node types for lfc chain definition files.
//
// Every node carries a `SimpleSpan` for error reporting in the binder.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete lfc file: a sequence of chain definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub chains: Vec<ChainDef>,
    pub span: Span,
}

// ── chain_def: 'pub'? 'chain' IDENT ('(' params ')')? '=' expr ──

#[derive(Debug, Clone, PartialEq)]
pub struct ChainDef {
    pub public: bool,
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Expr,
    pub span: Span,
}

/// `name: type`
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
}

/// `int`, `list<int>`, `seq<list<double>>` ...
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub name: Ident,
    pub args: Vec<TypeExpr>,
    pub span: Span,
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    /// `[a, b, c]`
    List(Vec<Expr>),
    /// Bare name: lambda parameter or chain parameter.
    Name(Ident),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `Name<T>(args)`: a source constructor or a builtin function.
    Call(Call),
    /// `receiver.Name<T>(args)`
    Method(Box<Expr>, Call),
    /// `x => body`, `(a, b) => body`
    Lambda(Vec<Ident>, Box<Expr>),
}

/// The name/type-arguments/arguments part shared by calls and method calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: Ident,
    pub type_args: Vec<TypeExpr>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

// ── Identifier ──

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}
