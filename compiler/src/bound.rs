// bound.rs — Count and partition propagation
//
// Derives, from source to tip, how many elements a pipeline produces. Two
// forms are computed: a symbolic expression over the generated fields (used
// to pre-size collectors at run time) and a folded constant when every input
// is a literal (reported as the chain's static count). The same walk finds
// the run of Skip/Take stages that can be folded into a partitionable
// source's start offset and limit.
//
// Preconditions: pipeline assembled by `assemble`.
// Postconditions: a `None` count means "unknown", never "zero".
// Failure modes: none.
// Side effects: none.

use crate::id::StageId;
use crate::instr::{Generation, Node, Operation, Pipeline};
use crate::ir::{BinOp, Expr, Intrinsic, UnOp, Var};
use crate::value::Value;

/// Mangled reference to a stage field.
pub fn field(id: StageId, name: &str) -> Expr {
    Expr::Var(Var::Local(id.mangle(name)))
}

// ── Symbolic count ──

/// Element count of `pipeline` as an expression over stage fields, or
/// `None` when a filtering stage or an unbounded source makes it unknown.
pub fn count_expr(pipeline: &Pipeline) -> Option<Expr> {
    let mut count = generation_count(&pipeline.generation)?;
    for op in &pipeline.operations {
        count = match &op.kind {
            Operation::Select(_) | Operation::SelectIndexed(_) | Operation::Cast(_) => count,
            Operation::Take(_) => Expr::min(count, field(op.id, "take")),
            Operation::Skip(_) => Expr::max(Expr::sub(count, field(op.id, "skip")), Expr::int(0)),
            Operation::Concat(second) => Expr::add(count, count_expr(second)?),
            Operation::Where(_)
            | Operation::WhereIndexed(_)
            | Operation::Distinct
            | Operation::DistinctBy(_)
            | Operation::OfType(_) => return None,
        };
    }
    Some(count)
}

fn generation_count(node: &Node<Generation>) -> Option<Expr> {
    match &node.kind {
        Generation::Range { .. } | Generation::Repeat { .. } => Some(field(node.id, "count")),
        Generation::Empty => Some(Expr::int(0)),
        Generation::WrapList { .. } | Generation::WrapSpan { .. } => Some(Expr::call(
            Intrinsic::Len,
            vec![field(node.id, "source")],
        )),
        Generation::WrapArbitrary { .. } => None,
        Generation::Concat(a, b) => Some(Expr::add(generation_count(a)?, generation_count(b)?)),
    }
}

// ── Static count ──

/// Element count when it is a compile-time constant.
pub fn static_count(pipeline: &Pipeline) -> Option<i64> {
    let mut count = generation_static(&pipeline.generation)?;
    for op in &pipeline.operations {
        count = match &op.kind {
            Operation::Select(_) | Operation::SelectIndexed(_) | Operation::Cast(_) => count,
            Operation::Take(n) => count.min(const_int(n)?.max(0)),
            Operation::Skip(n) => (count - const_int(n)?.max(0)).max(0),
            Operation::Concat(second) => count + static_count(second)?,
            Operation::Where(_)
            | Operation::WhereIndexed(_)
            | Operation::Distinct
            | Operation::DistinctBy(_)
            | Operation::OfType(_) => return None,
        };
    }
    Some(count)
}

fn generation_static(node: &Node<Generation>) -> Option<i64> {
    match &node.kind {
        Generation::Range { count, .. } | Generation::Repeat { count, .. } => {
            Some(const_int(count)?.max(0))
        }
        Generation::Empty => Some(0),
        Generation::WrapList { source } | Generation::WrapSpan { source } => match source {
            Expr::List(items) => i64::try_from(items.len()).ok(),
            Expr::Const(Value::List(items)) => i64::try_from(items.len()).ok(),
            _ => None,
        },
        Generation::WrapArbitrary { .. } => None,
        Generation::Concat(a, b) => Some(generation_static(a)? + generation_static(b)?),
    }
}

/// Fold an integer constant expression.
pub fn const_int(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Const(Value::Int(n)) => Some(i64::from(*n)),
        Expr::Const(Value::Long(n)) => Some(*n),
        Expr::Unary(UnOp::Neg, e) => const_int(e)?.checked_neg(),
        Expr::Binary(op, a, b) => {
            let (a, b) = (const_int(a)?, const_int(b)?);
            match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Min => Some(a.min(b)),
                BinOp::Max => Some(a.max(b)),
                _ => None,
            }
        }
        _ => None,
    }
}

// ── Partition plan ──

/// Skip/Take stages folded into a partitionable generation.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionPlan {
    /// Operations that emit no per-element code.
    pub fused: Vec<StageId>,
    /// First source index to produce.
    pub offset: Expr,
    /// Maximum number of elements to produce from `offset`; `None` means
    /// "to the end of the source".
    pub length: Option<Expr>,
}

impl PartitionPlan {
    pub fn is_fused(&self, id: StageId) -> bool {
        self.fused.contains(&id)
    }
}

/// `a + b` over clamped bounds (both non-negative), saturating at
/// `i32::MAX` so stacked skips never wrap the start offset negative.
fn add_saturating(a: Expr, b: Expr) -> Expr {
    match a {
        Expr::Const(Value::Int(0)) => b,
        a => Expr::add(
            Expr::min(a, Expr::sub(Expr::int(i32::MAX), b.clone())),
            b,
        ),
    }
}

/// Fold the leading Skip/Take run of `pipeline`, if its source allows it.
pub fn partition_plan(pipeline: &Pipeline) -> Option<PartitionPlan> {
    if !pipeline.generation.kind.supports_partition() {
        return None;
    }
    let mut fused = Vec::new();
    let mut offset = Expr::int(0);
    let mut length: Option<Expr> = None;

    for op in &pipeline.operations {
        match &op.kind {
            Operation::Skip(_) => {
                let skip = field(op.id, "skip");
                offset = add_saturating(offset, skip.clone());
                length = length.map(|l| Expr::max(Expr::sub(l, skip), Expr::int(0)));
            }
            Operation::Take(_) => {
                let take = field(op.id, "take");
                length = Some(match length {
                    Some(l) => Expr::min(l, take),
                    None => take,
                });
            }
            _ => break,
        }
        fused.push(op.id);
    }

    if fused.is_empty() {
        None
    } else {
        Some(PartitionPlan {
            fused,
            offset,
            length,
        })
    }
}
