// generation.rs — Source stage fragments
//
// A generation is the only stage that owns a loop. It declares its fields,
// sets them up, and supplies the loop condition plus the statements that
// compute `current` at the top of each pass. Every downstream stage's code is
// appended after those statements by the renderer.
//
// Names used here are stage-scoped (`Var::Stage`) and are mangled with the
// stage id when spliced. Partition bounds arrive already mangled.
//
// Preconditions: `plan` is only passed for a generation that supports
//   partitioning.
// Postconditions: `shape` is `None` only for `Empty`.
// Failure modes: none.
// Side effects: none.

use crate::bound::PartitionPlan;
use crate::instr::{Generation, Node};
use crate::ir::{BinOp, Expr, Intrinsic, Stmt, Var};
use crate::render::{FieldSpec, StageParts};
use crate::types::Type;

/// Loop skeleton of a non-concat generation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopShape {
    pub condition: Expr,
    /// Statements computing `current` for this pass.
    pub element: Vec<Stmt>,
}

fn elem(node: &Node<Generation>) -> Type {
    node.output.clone()
}

fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::assign_stage(name, value)
}

fn let_current(ty: Type, value: Expr) -> Stmt {
    Stmt::Let(Var::Stage("current".into()), ty, value)
}

/// Count of elements the underlying source holds, over stage fields.
fn source_len(node: &Node<Generation>) -> Expr {
    match &node.kind {
        Generation::WrapList { .. } | Generation::WrapSpan { .. } => {
            Expr::call(Intrinsic::Len, vec![Expr::stage("source")])
        }
        _ => Expr::stage("count"),
    }
}

/// Fields and setup/teardown of one generation node (not its children).
pub fn parts(node: &Node<Generation>, plan: Option<&PartitionPlan>) -> StageParts {
    let mut parts = StageParts::default();

    match &node.kind {
        Generation::Range { start, count } => {
            parts.field(FieldSpec::instance("start", Type::Int));
            parts.field(FieldSpec::instance("count", Type::Int));
            parts.ctor.push(assign("start", start.clone()));
            parts.ctor.push(assign("count", Expr::max(count.clone(), Expr::int(0))));
        }
        Generation::Repeat { value, count } => {
            parts.field(FieldSpec::instance("value", elem(node)));
            parts.field(FieldSpec::instance("count", Type::Int));
            parts.ctor.push(assign("value", value.clone()));
            parts.ctor.push(assign("count", Expr::max(count.clone(), Expr::int(0))));
        }
        Generation::WrapList { source } | Generation::WrapSpan { source } => {
            parts.field(FieldSpec::instance("source", Type::List(Box::new(elem(node)))));
            parts.ctor.push(assign("source", source.clone()));
        }
        Generation::WrapArbitrary { source } => {
            parts.field(FieldSpec::instance("source", Type::Seq(Box::new(elem(node)))));
            parts.field(FieldSpec::iterator("iter", Type::Cursor(Box::new(elem(node)))));
            parts.ctor.push(assign("source", source.clone()));
            parts.init.push(assign(
                "iter",
                Expr::call(Intrinsic::SeqOpen, vec![Expr::stage("source")]),
            ));
            parts.dispose.push(Stmt::Eval(Expr::call(
                Intrinsic::SeqClose,
                vec![Expr::stage("iter")],
            )));
            return parts;
        }
        Generation::Empty => return parts,
        Generation::Concat(..) => {
            parts.field(FieldSpec::iterator("phase", Type::Int));
            parts.init.push(assign("phase", Expr::int(0)));
            return parts;
        }
    }

    // Counted sources: Range, Repeat, WrapList, WrapSpan.
    parts.field(FieldSpec::iterator("index", Type::Int));
    match plan {
        None => parts.init.push(assign("index", Expr::int(-1))),
        Some(plan) => {
            parts.field(FieldSpec::iterator("limit", Type::Int));
            parts.init.push(assign(
                "index",
                Expr::sub(plan.offset.clone(), Expr::int(1)),
            ));
            let limit = match &plan.length {
                None => source_len(node),
                Some(length) => {
                    let remaining = Expr::max(
                        Expr::sub(source_len(node), plan.offset.clone()),
                        Expr::int(0),
                    );
                    Expr::add(plan.offset.clone(), Expr::min(length.clone(), remaining))
                }
            };
            parts.init.push(assign("limit", limit));
        }
    }
    parts
}

/// Loop condition and per-pass element computation; `None` for a source
/// that never produces anything.
pub fn shape(node: &Node<Generation>, plan: Option<&PartitionPlan>) -> Option<LoopShape> {
    let next_index = |bound: Expr| {
        Expr::bin(BinOp::Lt, Expr::PreInc(Var::Stage("index".into())), bound)
    };
    let bound = || match plan {
        Some(_) => Expr::stage("limit"),
        None => source_len(node),
    };

    let shape = match &node.kind {
        Generation::Range { .. } => LoopShape {
            condition: next_index(bound()),
            element: vec![let_current(
                Type::Int,
                Expr::add(Expr::stage("start"), Expr::stage("index")),
            )],
        },
        Generation::Repeat { .. } => LoopShape {
            condition: next_index(bound()),
            element: vec![let_current(elem(node), Expr::stage("value"))],
        },
        Generation::WrapList { .. } | Generation::WrapSpan { .. } => LoopShape {
            condition: next_index(bound()),
            element: vec![let_current(
                elem(node),
                Expr::call(
                    Intrinsic::Index,
                    vec![Expr::stage("source"), Expr::stage("index")],
                ),
            )],
        },
        Generation::WrapArbitrary { .. } => LoopShape {
            condition: Expr::call(Intrinsic::SeqAdvance, vec![Expr::stage("iter")]),
            element: vec![let_current(
                elem(node),
                Expr::call(Intrinsic::SeqCurrent, vec![Expr::stage("iter")]),
            )],
        },
        Generation::Empty | Generation::Concat(..) => return None,
    };
    Some(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::StageId;
    use crate::render::FieldScope;

    fn range() -> Node<Generation> {
        Node {
            id: StageId(0),
            input: None,
            output: Type::Int,
            kind: Generation::Range {
                start: Expr::int(1),
                count: Expr::int(4),
            },
        }
    }

    #[test]
    fn range_fields_split_by_scope() {
        let p = parts(&range(), None);
        let scopes: Vec<_> = p.fields.iter().map(|f| (f.name, f.scope)).collect();
        assert_eq!(
            scopes,
            vec![
                ("start", FieldScope::Instance),
                ("count", FieldScope::Instance),
                ("index", FieldScope::Iterator),
            ]
        );
        assert_eq!(p.init, vec![assign("index", Expr::int(-1))]);
        assert!(p.dispose.is_empty());
    }

    #[test]
    fn range_loop_counts_to_count() {
        let s = shape(&range(), None).unwrap();
        assert_eq!(
            s.condition,
            Expr::bin(
                BinOp::Lt,
                Expr::PreInc(Var::Stage("index".into())),
                Expr::stage("count")
            )
        );
    }

    #[test]
    fn partitioned_range_uses_limit() {
        let plan = PartitionPlan {
            fused: vec![StageId(1)],
            offset: Expr::var(Var::Local("skip_1".into())),
            length: None,
        };
        let p = parts(&range(), Some(&plan));
        assert!(p.fields.iter().any(|f| f.name == "limit"));
        assert_eq!(
            p.init[0],
            assign(
                "index",
                Expr::bin(BinOp::Sub, Expr::var(Var::Local("skip_1".into())), Expr::int(1))
            )
        );
        assert_eq!(p.init[1], assign("limit", Expr::stage("count")));
        let s = shape(&range(), Some(&plan)).unwrap();
        assert!(matches!(s.condition, Expr::Binary(BinOp::Lt, _, ref b) if **b == Expr::stage("limit")));
    }

    #[test]
    fn arbitrary_source_opens_and_closes_cursor() {
        let node = Node {
            id: StageId(0),
            input: None,
            output: Type::Int,
            kind: Generation::WrapArbitrary {
                source: Expr::var(Var::Arg("xs".into())),
            },
        };
        let p = parts(&node, None);
        assert_eq!(p.init.len(), 1);
        assert_eq!(p.dispose.len(), 1);
        assert!(shape(&node, None).is_some());
    }

    #[test]
    fn empty_has_no_loop() {
        let node = Node {
            id: StageId(0),
            input: None,
            output: Type::Int,
            kind: Generation::Empty,
        };
        assert!(shape(&node, None).is_none());
        assert!(parts(&node, None).fields.is_empty());
    }
}
