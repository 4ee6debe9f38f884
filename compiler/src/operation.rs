// operation.rs — Intermediate stage fragments
//
// Operations never loop. Each contributes fields, setup, teardown, and a run
// of straight-line statements placed between its upstream's element
// computation and the next downstream stage. Early exits are `continue`
// (drop this element) and `break` (stop the loop).
//
// Preconditions: `fused` is true only for Skip/Take stages listed in the
//   pipeline's partition plan.
// Postconditions: `Element::current` is `Some` exactly for stages that
//   rebind the element (Select, SelectIndexed, Cast, OfType).
// Failure modes: none.
// Side effects: none.

use crate::instr::{Node, Operation};
use crate::ir::{BinOp, Expr, Intrinsic, Stmt, Var};
use crate::render::{FieldSpec, StageParts};
use crate::types::Type;

/// Per-element code of one operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub body: Vec<Stmt>,
    /// New element expression for downstream stages, if rebound.
    pub current: Option<Expr>,
}

fn bump_index() -> Expr {
    Expr::PreInc(Var::Stage("index".into()))
}

fn rebind(ty: &Type, value: Expr) -> Stmt {
    Stmt::Let(Var::Stage("current".into()), ty.clone(), value)
}

pub fn parts(node: &Node<Operation>, fused: bool) -> StageParts {
    let mut parts = StageParts::default();
    let counted = |parts: &mut StageParts| {
        parts.field(FieldSpec::iterator("index", Type::Int));
        parts.init.push(Stmt::assign_stage("index", Expr::int(-1)));
    };

    match &node.kind {
        Operation::WhereIndexed(_) | Operation::SelectIndexed(_) => counted(&mut parts),
        Operation::Take(n) | Operation::Skip(n) => {
            let name = bound_name(&node.kind);
            parts.field(FieldSpec::instance(name, Type::Int));
            parts
                .ctor
                .push(Stmt::assign_stage(name, Expr::max(n.clone(), Expr::int(0))));
            if !fused {
                counted(&mut parts);
            }
        }
        Operation::Distinct | Operation::DistinctBy(_) => {
            parts.field(FieldSpec::iterator("set", Type::Set));
            parts
                .init
                .push(Stmt::assign_stage("set", Expr::call(Intrinsic::SetNew, Vec::new())));
            parts.dispose.push(Stmt::Eval(Expr::call(
                Intrinsic::SetRelease,
                vec![Expr::stage("set")],
            )));
        }
        Operation::Concat(_) => {
            parts.field(FieldSpec::iterator("phase", Type::Int));
            parts.init.push(Stmt::assign_stage("phase", Expr::int(0)));
        }
        Operation::Where(_)
        | Operation::Select(_)
        | Operation::Cast(_)
        | Operation::OfType(_) => {}
    }
    parts
}

fn bound_name(kind: &Operation) -> &'static str {
    match kind {
        Operation::Take(_) => "take",
        _ => "skip",
    }
}

pub fn element(node: &Node<Operation>, fused: bool) -> Element {
    let current = Expr::current;
    match &node.kind {
        Operation::Where(pred) => Element {
            body: vec![Stmt::continue_unless(pred.apply(&[current()]))],
            current: None,
        },
        Operation::WhereIndexed(pred) => Element {
            body: vec![
                Stmt::Let(Var::Stage("i".into()), Type::Int, bump_index()),
                Stmt::continue_unless(pred.apply(&[current(), Expr::stage("i")])),
            ],
            current: None,
        },
        Operation::Select(proj) => Element {
            body: vec![rebind(&node.output, proj.apply(&[current()]))],
            current: Some(Expr::stage("current")),
        },
        Operation::SelectIndexed(proj) => Element {
            body: vec![
                Stmt::Let(Var::Stage("i".into()), Type::Int, bump_index()),
                rebind(&node.output, proj.apply(&[current(), Expr::stage("i")])),
            ],
            current: Some(Expr::stage("current")),
        },
        Operation::Take(_) | Operation::Skip(_) if fused => Element::default(),
        // `(uint)++index >= (uint)take`: stop once `take` elements passed.
        Operation::Take(_) => Element {
            body: vec![Stmt::break_if(Expr::bin(
                BinOp::GeU,
                bump_index(),
                Expr::stage("take"),
            ))],
            current: None,
        },
        Operation::Skip(_) => Element {
            body: vec![Stmt::If(
                Expr::bin(BinOp::LtU, bump_index(), Expr::stage("skip")),
                vec![Stmt::Continue],
                Vec::new(),
            )],
            current: None,
        },
        Operation::Distinct => Element {
            body: vec![Stmt::continue_unless(Expr::call(
                Intrinsic::SetInsert,
                vec![Expr::stage("set"), current()],
            ))],
            current: None,
        },
        Operation::DistinctBy(key) => Element {
            body: vec![Stmt::continue_unless(Expr::call(
                Intrinsic::SetInsert,
                vec![Expr::stage("set"), key.apply(&[current()])],
            ))],
            current: None,
        },
        Operation::Cast(ty) => Element {
            body: vec![rebind(ty, Expr::Cast(Box::new(current()), ty.clone()))],
            current: Some(Expr::stage("current")),
        },
        Operation::OfType(ty) => Element {
            body: vec![
                Stmt::continue_unless(Expr::Is(Box::new(current()), ty.clone())),
                rebind(ty, Expr::Cast(Box::new(current()), ty.clone())),
            ],
            current: Some(Expr::stage("current")),
        },
        // The renderer splits the body at Concat; the join rebinds
        // `current` so both inputs feed one downstream block.
        Operation::Concat(_) => Element {
            body: vec![rebind(&node.output, current())],
            current: Some(Expr::stage("current")),
        },
    }
}
