// evaluation.rs — Terminal stage fragments
//
// An evaluation wraps the fused loop: its fields are accumulators (hoisted to
// locals by the renderer), its per-element block runs after every operation,
// and its finish block runs once the loop is exhausted. Short-circuiting
// terminals (First, Any, All) return from inside the loop.
//
// Preconditions: `node.input` is the pipeline's output type; `node.output`
//   is the result type chosen by the binder (widened for Sum).
// Postconditions: `finish` always ends in `Return` or `Fail`.
// Failure modes: none at compile time. Generated code raises `NoElements`
//   for empty Min/Max/First/seedless Aggregate and `NoMatch` for a First
//   whose predicate never matched.
// Side effects: none.

use crate::instr::{Evaluation, Node};
use crate::ir::{BinOp, Expr, FailKind, Intrinsic, Lambda, Stmt};
use crate::render::{FieldSpec, StageParts};
use crate::types::Type;
use crate::value::Value;

/// Per-element and post-loop code of an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub accumulate: Vec<Stmt>,
    pub finish: Vec<Stmt>,
}

fn input(node: &Node<Evaluation>) -> Type {
    node.input.clone().unwrap_or(Type::Object)
}

fn default(ty: &Type) -> Expr {
    Expr::Const(Value::default_for(ty))
}

fn flag(value: bool) -> Expr {
    Expr::Const(Value::Bool(value))
}

/// `hint` is the propagated element count used to pre-size collectors.
pub fn parts(node: &Node<Evaluation>, hint: Expr) -> StageParts {
    let mut parts = StageParts::default();
    let accumulator = |parts: &mut StageParts, name: &'static str, ty: Type, init: Expr| {
        parts.field(FieldSpec::iterator(name, ty));
        parts.init.push(Stmt::assign_stage(name, init));
    };

    match &node.kind {
        Evaluation::Sum(_) => accumulator(&mut parts, "sum", node.output.clone(), default(&node.output)),
        Evaluation::Count(_) => accumulator(&mut parts, "count", Type::Int, Expr::int(0)),
        Evaluation::Min(_) | Evaluation::Max(_) => {
            accumulator(&mut parts, "is_set", Type::Bool, flag(false));
            accumulator(&mut parts, "result", input(node), default(&input(node)));
        }
        Evaluation::ToList | Evaluation::ToArray => {
            let collector = Type::Collector(Box::new(input(node)));
            accumulator(
                &mut parts,
                "list",
                collector,
                Expr::call(Intrinsic::ListNew, vec![hint]),
            );
            parts.dispose.push(Stmt::Eval(Expr::call(
                Intrinsic::ListRelease,
                vec![Expr::stage("list")],
            )));
        }
        Evaluation::Aggregate { seed: Some(seed), .. } => {
            accumulator(&mut parts, "acc", node.output.clone(), seed.clone());
        }
        Evaluation::Aggregate { seed: None, .. } => {
            accumulator(&mut parts, "is_set", Type::Bool, flag(false));
            accumulator(&mut parts, "acc", node.output.clone(), default(&node.output));
        }
        Evaluation::First(_) | Evaluation::Any(_) | Evaluation::All(_) => {}
    }
    parts
}

/// Replace-if-better test for Min/Max: `cmp(result, current)` against zero,
/// where `cmp` is the comparer lambda or the default three-way comparison.
fn improves(comparer: &Option<Lambda>, op: BinOp) -> Expr {
    let args = [Expr::stage("result"), Expr::current()];
    let cmp = match comparer {
        Some(c) => c.apply(&args),
        None => Expr::call(Intrinsic::Compare, args.to_vec()),
    };
    Expr::bin(op, cmp, Expr::int(0))
}

fn fail_unless_set(name: &str) -> Vec<Stmt> {
    vec![
        Stmt::If(
            Expr::not(Expr::stage("is_set")),
            vec![Stmt::Fail(FailKind::NoElements)],
            Vec::new(),
        ),
        Stmt::Return(Expr::stage(name)),
    ]
}

fn test_current(pred: &Option<Lambda>) -> Option<Expr> {
    pred.as_ref().map(|p| p.apply(&[Expr::current()]))
}

pub fn fold(node: &Node<Evaluation>) -> Fold {
    let current = Expr::current;
    match &node.kind {
        Evaluation::Sum(selector) => {
            let value = selector
                .as_ref()
                .map_or_else(current, |s| s.apply(&[current()]));
            Fold {
                accumulate: vec![Stmt::assign_stage(
                    "sum",
                    Expr::bin(
                        BinOp::Add,
                        Expr::stage("sum"),
                        Expr::Convert(Box::new(value), node.output.clone()),
                    ),
                )],
                finish: vec![Stmt::Return(Expr::stage("sum"))],
            }
        }
        Evaluation::Count(pred) => {
            let bump = Stmt::assign_stage(
                "count",
                Expr::bin(BinOp::Add, Expr::stage("count"), Expr::int(1)),
            );
            let accumulate = match test_current(pred) {
                Some(cond) => vec![Stmt::If(cond, vec![bump], Vec::new())],
                None => vec![bump],
            };
            Fold {
                accumulate,
                finish: vec![Stmt::Return(Expr::stage("count"))],
            }
        }
        Evaluation::Min(comparer) | Evaluation::Max(comparer) => {
            let op = match node.kind {
                Evaluation::Min(_) => BinOp::Gt,
                _ => BinOp::Lt,
            };
            Fold {
                accumulate: vec![Stmt::If(
                    Expr::bin(
                        BinOp::Or,
                        Expr::not(Expr::stage("is_set")),
                        improves(comparer, op),
                    ),
                    vec![
                        Stmt::assign_stage("result", current()),
                        Stmt::assign_stage("is_set", flag(true)),
                    ],
                    Vec::new(),
                )],
                finish: fail_unless_set("result"),
            }
        }
        Evaluation::ToList | Evaluation::ToArray => Fold {
            accumulate: vec![Stmt::Eval(Expr::call(
                Intrinsic::ListPush,
                vec![Expr::stage("list"), current()],
            ))],
            finish: vec![Stmt::Return(Expr::call(
                Intrinsic::ListFinish,
                vec![Expr::stage("list")],
            ))],
        },
        Evaluation::Aggregate { seed: Some(_), func } => Fold {
            accumulate: vec![Stmt::assign_stage(
                "acc",
                func.apply(&[Expr::stage("acc"), current()]),
            )],
            finish: vec![Stmt::Return(Expr::stage("acc"))],
        },
        Evaluation::Aggregate { seed: None, func } => Fold {
            accumulate: vec![Stmt::If(
                Expr::stage("is_set"),
                vec![Stmt::assign_stage(
                    "acc",
                    func.apply(&[Expr::stage("acc"), current()]),
                )],
                vec![
                    Stmt::assign_stage("acc", current()),
                    Stmt::assign_stage("is_set", flag(true)),
                ],
            )],
            finish: fail_unless_set("acc"),
        },
        Evaluation::First(pred) => {
            let found = Stmt::Return(current());
            match test_current(pred) {
                Some(cond) => Fold {
                    accumulate: vec![Stmt::If(cond, vec![found], Vec::new())],
                    finish: vec![Stmt::Fail(FailKind::NoMatch)],
                },
                None => Fold {
                    accumulate: vec![found],
                    finish: vec![Stmt::Fail(FailKind::NoElements)],
                },
            }
        }
        Evaluation::Any(pred) => {
            let found = Stmt::Return(flag(true));
            Fold {
                accumulate: match test_current(pred) {
                    Some(cond) => vec![Stmt::If(cond, vec![found], Vec::new())],
                    None => vec![found],
                },
                finish: vec![Stmt::Return(flag(false))],
            }
        }
        Evaluation::All(pred) => Fold {
            accumulate: vec![Stmt::If(
                Expr::not(pred.apply(&[current()])),
                vec![Stmt::Return(flag(false))],
                Vec::new(),
            )],
            finish: vec![Stmt::Return(flag(true))],
        },
    }
}
