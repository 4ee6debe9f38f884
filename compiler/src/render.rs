// render.rs — Fuses an assembled chain into one iterator body
//
// Walks the chain source-first, collecting every stage's fields and setup,
// per-element, and teardown fragments, then splices them:
//
//   ctor     chain arguments, then each stage's constructor block (id order)
//   init     each stage's reset block (id order)
//   step     the generation's loop with every operation's per-element block
//            inlined, in order, ending in `yield current`
//   dispose  each stage's teardown block (reverse id order)
//
// A Concat (operation or generation) splits the body into two loops sharing
// the downstream block; a per-stage `phase` field remembers which loop is
// live across `advance` calls. The evaluation body inlines the same loops
// with iterator fields hoisted to locals and teardown in a guarded region.
//
// Preconditions: chain produced by `assemble`.
// Postconditions: rendered bodies reference only `Var::Local` and
//   `Var::Field`; loop count is 1 + number of Concat stages (0 for Empty).
// Failure modes: none.
// Side effects: emits a `tracing` debug event per chain.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::bound::{self, PartitionPlan};
use crate::descriptor::ParamDecl;
use crate::evaluation;
use crate::generation;
use crate::id::StageId;
use crate::instr::{Chain, Generation, Node, Operation, Pipeline};
use crate::ir::{count_loops, BinOp, Block, Expr, Receiver, Stmt, Var};
use crate::operation;
use crate::rewrite::{arg_field, rewrite_block, rewrite_expr, Method, ReceiverMap, SpliceMap};
use crate::types::Type;
use crate::value::Value;

pub use crate::rewrite::FieldScope;

// ── Stage fragments ──

/// A field declared by one stage, before mangling.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: Type,
    pub scope: FieldScope,
}

impl FieldSpec {
    pub fn instance(name: &'static str, ty: Type) -> Self {
        FieldSpec {
            name,
            ty,
            scope: FieldScope::Instance,
        }
    }

    pub fn iterator(name: &'static str, ty: Type) -> Self {
        FieldSpec {
            name,
            ty,
            scope: FieldScope::Iterator,
        }
    }
}

/// Everything one stage contributes outside its per-element code.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageParts {
    pub fields: Vec<FieldSpec>,
    pub ctor: Block,
    pub init: Block,
    pub dispose: Block,
}

impl StageParts {
    pub fn field(&mut self, spec: FieldSpec) {
        self.fields.push(spec);
    }
}

// ── Output ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    pub scope: FieldScope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub id: StageId,
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IteratorBody {
    pub init: Block,
    /// One `advance` call; `yield` publishes an element, falling off the end
    /// means exhausted.
    pub step: Block,
    pub dispose: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationBody {
    pub kind: &'static str,
    pub ret: Type,
    pub body: Block,
}

/// Forwarding function for a `pub` chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryPoint {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub ret: Type,
}

/// The fused form of one chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedChain {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub stages: Vec<StageSummary>,
    /// Chain arguments first, then stage fields in id order.
    pub fields: Vec<FieldDecl>,
    pub ctor: Block,
    /// Element type produced by the iterator.
    pub element: Type,
    pub iterator: IteratorBody,
    pub evaluation: Option<EvaluationBody>,
    pub entry_point: Option<EntryPoint>,
    pub static_count: Option<i64>,
    pub loop_count: usize,
}

impl FusedChain {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ── Collection ──

struct Stage {
    id: StageId,
    kind: &'static str,
    parts: StageParts,
}

fn collect_pipeline(pipeline: &Pipeline, out: &mut Vec<Stage>) {
    let plan = bound::partition_plan(pipeline);
    collect_generation(&pipeline.generation, plan.as_ref(), out);
    for op in &pipeline.operations {
        if let Operation::Concat(second) = &op.kind {
            collect_pipeline(second, out);
        }
        out.push(Stage {
            id: op.id,
            kind: op.kind.name(),
            parts: operation::parts(op, is_fused(plan.as_ref(), op.id)),
        });
    }
}

fn collect_generation(node: &Node<Generation>, plan: Option<&PartitionPlan>, out: &mut Vec<Stage>) {
    if let Generation::Concat(a, b) = &node.kind {
        collect_generation(a, None, out);
        collect_generation(b, None, out);
    }
    out.push(Stage {
        id: node.id,
        kind: node.kind.name(),
        parts: generation::parts(node, plan),
    });
}

fn is_fused(plan: Option<&PartitionPlan>, id: StageId) -> bool {
    plan.is_some_and(|p| p.is_fused(id))
}

/// Mangle stage-scoped names of a setup/teardown block.
fn splice(id: StageId, block: &[Stmt]) -> Block {
    rewrite_block(
        block,
        &SpliceMap {
            id,
            current: Expr::current(),
        },
    )
}

fn mangled_fields(id: StageId, parts: &StageParts) -> impl Iterator<Item = FieldDecl> + '_ {
    parts.fields.iter().map(move |f| FieldDecl {
        name: id.mangle(f.name),
        ty: f.ty.clone(),
        scope: f.scope,
    })
}

// ── Loop construction ──

type Tail<'a> = dyn Fn(Expr) -> Block + 'a;

fn current_of(id: StageId) -> Expr {
    Expr::var(Var::Local(id.mangle("current")))
}

/// `if phase == 0 { first; phase = 1 } second`
fn phase_guard(id: StageId, first: Block, second: Block) -> Block {
    let phase = Var::Local(id.mangle("phase"));
    let mut then = first;
    then.push(Stmt::Assign(phase.clone(), Expr::int(1)));
    let mut block = vec![Stmt::If(
        Expr::bin(BinOp::Eq, Expr::var(phase), Expr::int(0)),
        then,
        Vec::new(),
    )];
    block.extend(second);
    block
}

fn source_loops(node: &Node<Generation>, plan: Option<&PartitionPlan>, body: &Tail) -> Block {
    if let Generation::Concat(a, b) = &node.kind {
        return phase_guard(
            node.id,
            source_loops(a, None, body),
            source_loops(b, None, body),
        );
    }
    let Some(shape) = generation::shape(node, plan) else {
        return Vec::new();
    };
    let map = SpliceMap {
        id: node.id,
        current: Expr::current(),
    };
    let mut inner = rewrite_block(&shape.element, &map);
    inner.extend(body(current_of(node.id)));
    vec![Stmt::While(rewrite_expr(&shape.condition, &map), inner)]
}

fn ops_block(
    ops: &[Node<Operation>],
    plan: Option<&PartitionPlan>,
    mut current: Expr,
    tail: &Tail,
) -> Block {
    let mut block = Vec::new();
    for op in ops {
        let element = operation::element(op, is_fused(plan, op.id));
        let map = SpliceMap {
            id: op.id,
            current: current.clone(),
        };
        block.extend(rewrite_block(&element.body, &map));
        if let Some(next) = element.current {
            current = rewrite_expr(&next, &map);
        }
    }
    block.extend(tail(current));
    block
}

/// Loops of `pipeline`, each pass ending in `tail(current)`.
fn pipeline_loops(pipeline: &Pipeline, tail: &Tail) -> Block {
    let last_concat = pipeline
        .operations
        .iter()
        .rposition(|op| matches!(op.kind, Operation::Concat(_)));

    let Some(k) = last_concat else {
        let plan = bound::partition_plan(pipeline);
        let body = |current: Expr| ops_block(&pipeline.operations, plan.as_ref(), current, tail);
        return source_loops(&pipeline.generation, plan.as_ref(), &body);
    };

    let concat = &pipeline.operations[k];
    let Operation::Concat(second) = &concat.kind else {
        return Vec::new();
    };
    let downstream = |current: Expr| {
        let join = operation::element(concat, false);
        let map = SpliceMap {
            id: concat.id,
            current,
        };
        let mut block = rewrite_block(&join.body, &map);
        let joined = join
            .current
            .map_or_else(Expr::current, |c| rewrite_expr(&c, &map));
        block.extend(ops_block(&pipeline.operations[k + 1..], None, joined, tail));
        block
    };
    let upstream = Pipeline {
        generation: pipeline.generation.clone(),
        operations: pipeline.operations[..k].to_vec(),
    };
    phase_guard(
        concat.id,
        pipeline_loops(&upstream, &downstream),
        pipeline_loops(second, &downstream),
    )
}

// ── Render ──

fn hoist(fields: impl Iterator<Item = FieldDecl>) -> Block {
    fields
        .map(|f| {
            let zero = Expr::Const(Value::default_for(&f.ty));
            Stmt::Let(Var::Local(f.name), f.ty, zero)
        })
        .collect()
}

/// Render one assembled chain.
pub fn render(chain: &Chain) -> FusedChain {
    let mut stages = Vec::new();
    collect_pipeline(&chain.pipeline, &mut stages);
    stages.sort_by_key(|s| s.id);

    let mut fields: Vec<FieldDecl> = chain
        .params
        .iter()
        .map(|p| FieldDecl {
            name: arg_field(&p.name),
            ty: p.ty.clone(),
            scope: FieldScope::Instance,
        })
        .collect();
    fields.extend(stages.iter().flat_map(|s| mangled_fields(s.id, &s.parts)));
    let scopes: HashMap<String, FieldScope> =
        fields.iter().map(|f| (f.name.clone(), f.scope)).collect();
    let resolve = |block: &[Stmt], method| rewrite_block(block, &ReceiverMap { fields: &scopes, method });

    // Constructor: copy arguments, then set up instance fields.
    let mut ctor: Block = chain
        .params
        .iter()
        .map(|p| {
            Stmt::Assign(
                Var::Field(Receiver::Source, arg_field(&p.name)),
                Expr::var(Var::Local(p.name.clone())),
            )
        })
        .collect();
    let stage_ctor: Block = stages.iter().flat_map(|s| splice(s.id, &s.parts.ctor)).collect();
    ctor.extend(resolve(&stage_ctor, Method::Constructor));

    let init: Block = stages.iter().flat_map(|s| splice(s.id, &s.parts.init)).collect();
    let dispose: Block = stages
        .iter()
        .rev()
        .flat_map(|s| splice(s.id, &s.parts.dispose))
        .collect();
    let step = pipeline_loops(&chain.pipeline, &|current: Expr| vec![Stmt::Yield(current)]);

    let iterator = IteratorBody {
        init: resolve(&init, Method::Iterator),
        step: resolve(&step, Method::Iterator),
        dispose: resolve(&dispose, Method::Iterator),
    };

    let evaluation = chain.evaluation.as_ref().map(|eval| {
        let hint = bound::count_expr(&chain.pipeline).unwrap_or_else(|| Expr::int(0));
        let parts = evaluation::parts(eval, hint);
        let fold = evaluation::fold(eval);
        let accumulate = |current: Expr| {
            rewrite_block(&fold.accumulate, &SpliceMap { id: eval.id, current })
        };

        let locals = fields
            .iter()
            .filter(|f| f.scope == FieldScope::Iterator)
            .cloned()
            .chain(mangled_fields(eval.id, &parts));
        let mut body = hoist(locals);

        let mut inner = init.clone();
        inner.extend(splice(eval.id, &parts.init));
        inner.extend(pipeline_loops(&chain.pipeline, &accumulate));
        inner.extend(splice(eval.id, &fold.finish));

        let mut teardown = splice(eval.id, &parts.dispose);
        teardown.extend(dispose.iter().cloned());
        if teardown.is_empty() {
            body.extend(inner);
        } else {
            body.push(Stmt::Guarded {
                body: inner,
                finally: teardown,
            });
        }
        EvaluationBody {
            kind: eval.kind.name(),
            ret: eval.output.clone(),
            body: resolve(&body, Method::Evaluation),
        }
    });

    let mut summaries: Vec<StageSummary> = stages
        .iter()
        .map(|s| StageSummary { id: s.id, kind: s.kind })
        .collect();
    if let Some(eval) = &chain.evaluation {
        summaries.push(StageSummary {
            id: eval.id,
            kind: eval.kind.name(),
        });
    }

    let loop_count = count_loops(&iterator.step);
    debug!(
        chain = %chain.name,
        stages = summaries.len(),
        fields = fields.len(),
        loops = loop_count,
        "rendered"
    );

    FusedChain {
        name: chain.name.clone(),
        params: chain.params.clone(),
        stages: summaries,
        fields,
        ctor,
        element: chain.pipeline.output().clone(),
        iterator,
        evaluation,
        entry_point: chain.entry_point.then(|| EntryPoint {
            name: chain.name.clone(),
            params: chain.params.clone(),
            ret: chain.result_type(),
        }),
        static_count: bound::static_count(&chain.pipeline),
        loop_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Evaluation;
    use crate::ir::{Intrinsic, Lambda};

    fn node<K>(id: u32, kind: K) -> Node<K> {
        Node {
            id: StageId(id),
            input: Some(Type::Int),
            output: Type::Int,
            kind,
        }
    }

    fn range(id: u32, count: i32) -> Node<Generation> {
        Node {
            input: None,
            ..node(
                id,
                Generation::Range {
                    start: Expr::int(0),
                    count: Expr::int(count),
                },
            )
        }
    }

    fn chain(pipeline: Pipeline, evaluation: Option<Node<Evaluation>>) -> Chain {
        Chain {
            name: "c".into(),
            params: Vec::new(),
            entry_point: false,
            pipeline,
            evaluation,
        }
    }

    fn even() -> Lambda {
        Lambda {
            params: vec!["x".into()],
            body: Expr::bin(
                BinOp::Eq,
                Expr::bin(BinOp::Rem, Expr::var(Var::Param("x".into())), Expr::int(2)),
                Expr::int(0),
            ),
        }
    }

    fn has_var(block: &[Stmt], pred: &dyn Fn(&Var) -> bool) -> bool {
        let mut found = false;
        let mut visit = |e: &Expr| e.for_each_var(&mut |v| found |= pred(v));
        fn walk(block: &[Stmt], visit: &mut dyn FnMut(&Expr)) {
            for s in block {
                match s {
                    Stmt::Let(_, _, e) | Stmt::Assign(_, e) | Stmt::Eval(e) => visit(e),
                    Stmt::Return(e) | Stmt::Yield(e) => visit(e),
                    Stmt::If(c, t, f) => {
                        visit(c);
                        walk(t, visit);
                        walk(f, visit);
                    }
                    Stmt::While(c, b) => {
                        visit(c);
                        walk(b, visit);
                    }
                    Stmt::Guarded { body, finally } => {
                        walk(body, visit);
                        walk(finally, visit);
                    }
                    Stmt::Continue | Stmt::Break | Stmt::Fail(_) => {}
                }
            }
        }
        walk(block, &mut visit);
        found
    }

    #[test]
    fn single_loop_without_concat() {
        let p = Pipeline {
            generation: range(0, 10),
            operations: vec![
                node(1, Operation::Where(even())),
                node(2, Operation::Take(Expr::int(3))),
            ],
        };
        let fused = render(&chain(p, None));
        assert_eq!(fused.loop_count, 1);
        assert!(!has_var(&fused.iterator.step, &|v| matches!(
            v,
            Var::Current | Var::Param(_) | Var::Stage(_) | Var::Arg(_)
        )));
    }

    #[test]
    fn concat_adds_a_loop() {
        let second = Pipeline {
            generation: range(1, 2),
            operations: Vec::new(),
        };
        let p = Pipeline {
            generation: range(0, 3),
            operations: vec![
                node(2, Operation::Concat(Box::new(second))),
                node(3, Operation::Where(even())),
            ],
        };
        let fused = render(&chain(p, None));
        assert_eq!(fused.loop_count, 2);
        assert!(fused.field("phase_2").is_some());
    }

    #[test]
    fn fields_are_mangled_and_scoped() {
        let p = Pipeline {
            generation: range(0, 10),
            operations: vec![node(1, Operation::Where(even())), node(2, Operation::Skip(Expr::int(1)))],
        };
        let fused = render(&chain(p, None));
        let names: Vec<_> = fused.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["start_0", "count_0", "index_0", "skip_2", "index_2"]);
        assert_eq!(fused.field("skip_2").map(|f| f.scope), Some(FieldScope::Instance));
        assert_eq!(fused.field("index_2").map(|f| f.scope), Some(FieldScope::Iterator));
    }

    #[test]
    fn fused_take_has_no_counter() {
        let p = Pipeline {
            generation: range(0, 10),
            operations: vec![node(1, Operation::Skip(Expr::int(2))), node(2, Operation::Take(Expr::int(3)))],
        };
        let fused = render(&chain(p, None));
        assert!(fused.field("index_2").is_none());
        assert!(fused.field("limit_0").is_some());
        assert_eq!(fused.static_count, Some(3));
    }

    #[test]
    fn dispose_runs_in_reverse_id_order() {
        let p = Pipeline {
            generation: node(
                0,
                Generation::WrapArbitrary {
                    source: Expr::List(vec![Expr::int(1)]),
                },
            ),
            operations: vec![node(1, Operation::Distinct)],
        };
        let fused = render(&chain(p, None));
        let released: Vec<_> = fused
            .iterator
            .dispose
            .iter()
            .filter_map(|s| match s {
                Stmt::Eval(Expr::Call(f, _)) => Some(*f),
                _ => None,
            })
            .collect();
        assert_eq!(released, vec![Intrinsic::SetRelease, Intrinsic::SeqClose]);
        let opened: Vec<_> = fused
            .iterator
            .init
            .iter()
            .filter_map(|s| match s {
                Stmt::Assign(_, Expr::Call(f, _)) => Some(*f),
                _ => None,
            })
            .collect();
        assert_eq!(opened, vec![Intrinsic::SeqOpen, Intrinsic::SetNew]);
    }

    #[test]
    fn evaluation_hoists_iterator_fields() {
        let p = Pipeline {
            generation: range(0, 4),
            operations: Vec::new(),
        };
        let eval = Node {
            output: Type::Long,
            ..node(1, Evaluation::Sum(None))
        };
        let fused = render(&chain(p, Some(eval)));
        let body = &fused.evaluation.as_ref().map(|e| e.body.clone()).unwrap_or_default();
        assert_eq!(
            body[0],
            Stmt::Let(Var::Local("index_0".into()), Type::Int, Expr::int(0))
        );
        assert_eq!(
            body[1],
            Stmt::Let(Var::Local("sum_1".into()), Type::Long, Expr::Const(Value::Long(0)))
        );
        assert!(has_var(body, &|v| *v == Var::Field(Receiver::Source, "count_0".into())));
        assert!(!body.iter().any(|s| matches!(s, Stmt::Guarded { .. })));
    }

    #[test]
    fn arguments_become_instance_fields() {
        let p = Pipeline {
            generation: Node {
                input: None,
                ..node(
                    0,
                    Generation::Range {
                        start: Expr::int(0),
                        count: Expr::var(Var::Arg("n".into())),
                    },
                )
            },
            operations: Vec::new(),
        };
        let mut c = chain(p, None);
        c.params = vec![ParamDecl {
            name: "n".into(),
            ty: Type::Int,
        }];
        c.entry_point = true;
        let fused = render(&c);
        assert_eq!(fused.fields[0].name, "arg_n");
        assert_eq!(
            fused.ctor[0],
            Stmt::Assign(
                Var::Field(Receiver::Source, "arg_n".into()),
                Expr::var(Var::Local("n".into()))
            )
        );
        assert_eq!(
            fused.entry_point.map(|e| e.ret),
            Some(Type::Seq(Box::new(Type::Int)))
        );
    }

    #[test]
    fn empty_source_renders_no_loop() {
        let p = Pipeline {
            generation: Node {
                input: None,
                ..node(0, Generation::Empty)
            },
            operations: vec![node(1, Operation::Where(even()))],
        };
        let fused = render(&chain(p, None));
        assert_eq!(fused.loop_count, 0);
        assert!(fused.iterator.step.is_empty());
    }
}
