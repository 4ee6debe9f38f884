// ir.rs — Statement/expression trees spliced together by the renderer
//
// Every stage fragment, every captured lambda body, and the final fused
// method bodies are values of these types. Placeholders (`Var::Current`,
// `Var::Param`, `Var::Stage`, `Var::Arg`) only exist before rewriting; after
// the renderer's receiver pass a body references nothing but `Var::Local`
// and `Var::Field`.
//
// Preconditions: none (data-only module plus constructors).
// Postconditions: none.
// Failure modes: none.
// Side effects: none.

use serde::{Deserialize, Serialize};

use crate::types::Type;
use crate::value::Value;

// ── Names ───────────────────────────────────────────────────────────────────

/// A name appearing in a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Var {
    /// The element produced by the nearest upstream stage.
    Current,
    /// A lambda parameter.
    Param(String),
    /// A chain (entry point) parameter.
    Arg(String),
    /// A stage-scoped name, mangled with the stage id when spliced.
    Stage(String),
    /// A concrete local variable.
    Local(String),
    /// A concrete field access through a receiver.
    Field(Receiver, String),
}

/// How a field is reached from the method body it is referenced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Receiver {
    /// Iterator's own state (`self.x` inside the iterator).
    State,
    /// Chain value seen from the iterator (`self.parent.x`).
    Parent,
    /// Chain value seen from an evaluation method (`self.x`).
    Source,
}

// ── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Unsigned 32-bit `<`.
    LtU,
    /// Unsigned 32-bit `>=`.
    GeU,
    And,
    Or,
    Min,
    Max,
}

/// Runtime services a fused body may call. Resource intrinsics take the
/// resource variable as their first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intrinsic {
    /// `len(list)`
    Len,
    /// `list[i]`
    Index,
    /// Three-way default comparison, returns -1/0/1.
    Compare,
    SetNew,
    SetInsert,
    SetRelease,
    /// `list_new(capacity_hint)`
    ListNew,
    ListPush,
    ListFinish,
    ListRelease,
    SeqOpen,
    SeqAdvance,
    SeqCurrent,
    SeqClose,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Len => "len",
            Intrinsic::Index => "index",
            Intrinsic::Compare => "compare",
            Intrinsic::SetNew => "set_new",
            Intrinsic::SetInsert => "set_insert",
            Intrinsic::SetRelease => "set_release",
            Intrinsic::ListNew => "list_new",
            Intrinsic::ListPush => "list_push",
            Intrinsic::ListFinish => "list_finish",
            Intrinsic::ListRelease => "list_release",
            Intrinsic::SeqOpen => "seq_open",
            Intrinsic::SeqAdvance => "seq_advance",
            Intrinsic::SeqCurrent => "seq_current",
            Intrinsic::SeqClose => "seq_close",
        }
    }

    /// Intrinsics whose result must be stored in a resource slot.
    pub fn creates_resource(self) -> bool {
        matches!(
            self,
            Intrinsic::SetNew | Intrinsic::ListNew | Intrinsic::SeqOpen
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Value),
    Var(Var),
    /// List literal.
    List(Vec<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `++x`, evaluates to the incremented value.
    PreInc(Var),
    Call(Intrinsic, Vec<Expr>),
    /// Runtime type test.
    Is(Box<Expr>, Type),
    /// Checked cast; faults on mismatch.
    Cast(Box<Expr>, Type),
    /// Numeric widening.
    Convert(Box<Expr>, Type),
}

/// A captured lambda: parameter names plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
}

// ── Statements ──────────────────────────────────────────────────────────────

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Local declaration.
    Let(Var, Type, Expr),
    Assign(Var, Expr),
    /// Expression evaluated for its effect.
    Eval(Expr),
    If(Expr, Block, Block),
    While(Expr, Block),
    Continue,
    Break,
    Return(Expr),
    /// Iterator success: publish `current` and return true from advance.
    Yield(Expr),
    /// Raise a generated-code fault.
    Fail(FailKind),
    /// Run `body`; run `finally` whether body completes, returns, or faults.
    Guarded { body: Block, finally: Block },
}

/// Fault kinds raisable by a `Fail` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailKind {
    NoElements,
    NoMatch,
}

// ── Constructors ────────────────────────────────────────────────────────────

impl Expr {
    pub fn int(n: i32) -> Expr {
        Expr::Const(Value::Int(n))
    }

    pub fn var(v: Var) -> Expr {
        Expr::Var(v)
    }

    pub fn stage(name: &str) -> Expr {
        Expr::Var(Var::Stage(name.to_string()))
    }

    pub fn current() -> Expr {
        Expr::Var(Var::Current)
    }

    pub fn bin(op: BinOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }

    pub fn not(e: Expr) -> Expr {
        Expr::Unary(UnOp::Not, Box::new(e))
    }

    pub fn call(op: Intrinsic, args: Vec<Expr>) -> Expr {
        Expr::Call(op, args)
    }

    /// `a + b`, folding a literal zero on either side.
    pub fn add(a: Expr, b: Expr) -> Expr {
        match (&a, &b) {
            (Expr::Const(Value::Int(0)), _) => b,
            (_, Expr::Const(Value::Int(0))) => a,
            _ => Expr::bin(BinOp::Add, a, b),
        }
    }

    /// `a - b`, folding a literal zero on the right.
    pub fn sub(a: Expr, b: Expr) -> Expr {
        match &b {
            Expr::Const(Value::Int(0)) => a,
            _ => Expr::bin(BinOp::Sub, a, b),
        }
    }

    pub fn min(a: Expr, b: Expr) -> Expr {
        Expr::bin(BinOp::Min, a, b)
    }

    pub fn max(a: Expr, b: Expr) -> Expr {
        Expr::bin(BinOp::Max, a, b)
    }

    /// Visit every variable referenced by this expression.
    pub fn for_each_var(&self, f: &mut impl FnMut(&Var)) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(v) | Expr::PreInc(v) => f(v),
            Expr::List(items) | Expr::Call(_, items) => {
                for item in items {
                    item.for_each_var(f);
                }
            }
            Expr::Unary(_, e) | Expr::Is(e, _) | Expr::Cast(e, _) | Expr::Convert(e, _) => {
                e.for_each_var(f)
            }
            Expr::Binary(_, a, b) => {
                a.for_each_var(f);
                b.for_each_var(f);
            }
        }
    }
}

impl Stmt {
    /// `if !cond { continue; }`
    pub fn continue_unless(cond: Expr) -> Stmt {
        Stmt::If(Expr::not(cond), vec![Stmt::Continue], Vec::new())
    }

    /// `if cond { break; }`
    pub fn break_if(cond: Expr) -> Stmt {
        Stmt::If(cond, vec![Stmt::Break], Vec::new())
    }

    pub fn assign_stage(name: &str, value: Expr) -> Stmt {
        Stmt::Assign(Var::Stage(name.to_string()), value)
    }
}

/// Number of physical loop constructs in a block (nested loops included).
pub fn count_loops(block: &[Stmt]) -> usize {
    block
        .iter()
        .map(|stmt| match stmt {
            Stmt::While(_, body) => 1 + count_loops(body),
            Stmt::If(_, then, els) => count_loops(then) + count_loops(els),
            Stmt::Guarded { body, finally } => count_loops(body) + count_loops(finally),
            _ => 0,
        })
        .sum()
}
