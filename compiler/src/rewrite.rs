// rewrite.rs — Identifier rewriting over IR trees
//
// One generic transformer, parameterized by a substitution from placeholder
// variable to replacement expression. The renderer uses three maps:
//
//   - `ParamMap`    binds a lambda's parameters to argument expressions.
//   - `SpliceMap`   binds one stage's fragment into the fused body: the
//                   `Current` placeholder becomes the nearest upstream
//                   stage's element, and stage-scoped names are mangled with
//                   the stage id.
//   - `ReceiverMap` resolves mangled field names and chain arguments to the
//                   concrete access path for the method being generated.
//
// Preconditions: assignment targets are only ever mapped to variables.
// Postconditions: the input tree is not modified; a rewritten copy is returned.
// Failure modes: none. A target whose replacement is not a variable is left
//   untouched.
// Side effects: none.

use std::collections::HashMap;

use crate::id::StageId;
use crate::ir::{Block, Expr, Lambda, Receiver, Stmt, Var};

/// A placeholder substitution.
pub trait Substitute {
    /// Replacement for `var`, or `None` to keep it.
    fn substitute(&self, var: &Var) -> Option<Expr>;
}

// ── Transformer ──

pub fn rewrite_expr(expr: &Expr, map: &impl Substitute) -> Expr {
    match expr {
        Expr::Const(v) => Expr::Const(v.clone()),
        Expr::Var(v) => map.substitute(v).unwrap_or_else(|| Expr::Var(v.clone())),
        Expr::List(items) => Expr::List(items.iter().map(|e| rewrite_expr(e, map)).collect()),
        Expr::Unary(op, e) => Expr::Unary(*op, Box::new(rewrite_expr(e, map))),
        Expr::Binary(op, a, b) => Expr::Binary(
            *op,
            Box::new(rewrite_expr(a, map)),
            Box::new(rewrite_expr(b, map)),
        ),
        Expr::PreInc(v) => Expr::PreInc(rewrite_target(v, map)),
        Expr::Call(f, args) => Expr::Call(*f, args.iter().map(|e| rewrite_expr(e, map)).collect()),
        Expr::Is(e, t) => Expr::Is(Box::new(rewrite_expr(e, map)), t.clone()),
        Expr::Cast(e, t) => Expr::Cast(Box::new(rewrite_expr(e, map)), t.clone()),
        Expr::Convert(e, t) => Expr::Convert(Box::new(rewrite_expr(e, map)), t.clone()),
    }
}

pub fn rewrite_block(block: &[Stmt], map: &impl Substitute) -> Block {
    block.iter().map(|s| rewrite_stmt(s, map)).collect()
}

fn rewrite_stmt(stmt: &Stmt, map: &impl Substitute) -> Stmt {
    match stmt {
        Stmt::Let(v, t, e) => Stmt::Let(rewrite_target(v, map), t.clone(), rewrite_expr(e, map)),
        Stmt::Assign(v, e) => Stmt::Assign(rewrite_target(v, map), rewrite_expr(e, map)),
        Stmt::Eval(e) => Stmt::Eval(rewrite_expr(e, map)),
        Stmt::If(c, t, f) => Stmt::If(
            rewrite_expr(c, map),
            rewrite_block(t, map),
            rewrite_block(f, map),
        ),
        Stmt::While(c, body) => Stmt::While(rewrite_expr(c, map), rewrite_block(body, map)),
        Stmt::Continue => Stmt::Continue,
        Stmt::Break => Stmt::Break,
        Stmt::Return(e) => Stmt::Return(rewrite_expr(e, map)),
        Stmt::Yield(e) => Stmt::Yield(rewrite_expr(e, map)),
        Stmt::Fail(k) => Stmt::Fail(*k),
        Stmt::Guarded { body, finally } => Stmt::Guarded {
            body: rewrite_block(body, map),
            finally: rewrite_block(finally, map),
        },
    }
}

fn rewrite_target(var: &Var, map: &impl Substitute) -> Var {
    match map.substitute(var) {
        Some(Expr::Var(v)) => v,
        _ => var.clone(),
    }
}

// ── Lambda application ──

/// Binds lambda parameter names to argument expressions.
pub struct ParamMap<'a> {
    bindings: HashMap<&'a str, &'a Expr>,
}

impl Substitute for ParamMap<'_> {
    fn substitute(&self, var: &Var) -> Option<Expr> {
        match var {
            Var::Param(name) => self.bindings.get(name.as_str()).map(|e| (*e).clone()),
            _ => None,
        }
    }
}

impl Lambda {
    /// Inline the lambda body with `args` bound to its parameters.
    /// Extra parameters stay unbound; the assembler checks arity.
    pub fn apply(&self, args: &[Expr]) -> Expr {
        let map = ParamMap {
            bindings: self
                .params
                .iter()
                .map(String::as_str)
                .zip(args.iter())
                .collect(),
        };
        rewrite_expr(&self.body, &map)
    }
}

// ── Stage splicing ──

/// Binds one stage fragment into the fused body.
pub struct SpliceMap {
    pub id: StageId,
    /// Element produced by the nearest upstream stage.
    pub current: Expr,
}

impl Substitute for SpliceMap {
    fn substitute(&self, var: &Var) -> Option<Expr> {
        match var {
            Var::Current => Some(self.current.clone()),
            Var::Stage(name) => Some(Expr::Var(Var::Local(self.id.mangle(name)))),
            _ => None,
        }
    }
}

// ── Receiver resolution ──

/// Lifetime class of a generated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldScope {
    /// Set once by the constructor; survives re-iteration.
    Instance,
    /// Reset by `init_state` at the start of every iteration.
    Iterator,
}

/// Which generated method a body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Constructor of the chain value.
    Constructor,
    /// `init_state`/`advance`/`dispose` of the iterator.
    Iterator,
    /// Evaluation method on the chain value; iterator fields are locals.
    Evaluation,
}

/// Resolves mangled field names and chain arguments to access paths.
pub struct ReceiverMap<'a> {
    pub fields: &'a HashMap<String, FieldScope>,
    pub method: Method,
}

/// Instance field holding chain parameter `name`.
pub fn arg_field(name: &str) -> String {
    format!("arg_{name}")
}

impl ReceiverMap<'_> {
    fn instance_receiver(&self) -> Receiver {
        match self.method {
            Method::Iterator => Receiver::Parent,
            Method::Constructor | Method::Evaluation => Receiver::Source,
        }
    }
}

impl Substitute for ReceiverMap<'_> {
    fn substitute(&self, var: &Var) -> Option<Expr> {
        let resolved = match var {
            Var::Arg(name) => Var::Field(self.instance_receiver(), arg_field(name)),
            Var::Local(name) => match (self.fields.get(name)?, self.method) {
                (FieldScope::Instance, _) => Var::Field(self.instance_receiver(), name.clone()),
                (FieldScope::Iterator, Method::Evaluation) => return None,
                (FieldScope::Iterator, _) => Var::Field(Receiver::State, name.clone()),
            },
            _ => return None,
        };
        Some(Expr::Var(resolved))
    }
}
