// instr.rs — Instruction nodes: the assembled, immutable chain model
//
// A chain is one Generation at the root, a linear run of Operations, and at
// most one Evaluation at the tip. Upstream linkage is positional: the
// upstream of `operations[i]` is `operations[i - 1]` (or the generation), so
// no node is ever shared between chains or between two downstream stages.
// The only non-linear shapes are the two Concat variants, which own their
// second input outright.
//
// Preconditions: built only by `assemble`, which validates shapes and types.
// Postconditions: ids are unique within a chain and increase from source to
//   terminal.
// Failure modes: none (data-only module).
// Side effects: none.

use serde::Serialize;

use crate::descriptor::ParamDecl;
use crate::id::StageId;
use crate::ir::{Expr, Lambda};
use crate::types::Type;

/// Identity, linkage types, and per-kind payload of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node<K> {
    pub id: StageId,
    /// Element type consumed; `None` for generations.
    pub input: Option<Type>,
    /// Element type produced; result type for evaluations.
    pub output: Type,
    pub kind: K,
}

// ── Generation ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Generation {
    Range { start: Expr, count: Expr },
    Empty,
    Repeat { value: Expr, count: Expr },
    WrapList { source: Expr },
    WrapSpan { source: Expr },
    WrapArbitrary { source: Expr },
    /// Two sources iterated back to back.
    Concat(Box<Node<Generation>>, Box<Node<Generation>>),
}

impl Generation {
    pub fn name(&self) -> &'static str {
        match self {
            Generation::Range { .. } => "Range",
            Generation::Empty => "Empty",
            Generation::Repeat { .. } => "Repeat",
            Generation::WrapList { .. } => "WrapList",
            Generation::WrapSpan { .. } => "WrapSpan",
            Generation::WrapArbitrary { .. } => "WrapArbitrary",
            Generation::Concat(..) => "Concat",
        }
    }

    /// Whether the source can start at an offset and stop at a limit
    /// without a per-element counter.
    pub fn supports_partition(&self) -> bool {
        matches!(
            self,
            Generation::Range { .. }
                | Generation::Repeat { .. }
                | Generation::WrapList { .. }
                | Generation::WrapSpan { .. }
        )
    }
}

// ── Operation ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operation {
    Where(Lambda),
    WhereIndexed(Lambda),
    Select(Lambda),
    SelectIndexed(Lambda),
    Take(Expr),
    Skip(Expr),
    Distinct,
    /// Deduplicate on a projected key.
    DistinctBy(Lambda),
    Cast(Type),
    OfType(Type),
    /// Continue with a second pipeline once the upstream is exhausted.
    Concat(Box<Pipeline>),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Where(_) => "Where",
            Operation::WhereIndexed(_) => "WhereIndexed",
            Operation::Select(_) => "Select",
            Operation::SelectIndexed(_) => "SelectIndexed",
            Operation::Take(_) => "Take",
            Operation::Skip(_) => "Skip",
            Operation::Distinct => "Distinct",
            Operation::DistinctBy(_) => "DistinctWithComparer",
            Operation::Cast(_) => "Cast",
            Operation::OfType(_) => "OfType",
            Operation::Concat(_) => "Concat",
        }
    }
}

// ── Evaluation ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Evaluation {
    /// Optional selector.
    Sum(Option<Lambda>),
    /// Optional `(a, b) => int` comparer.
    Min(Option<Lambda>),
    Max(Option<Lambda>),
    /// Optional predicate.
    Count(Option<Lambda>),
    ToList,
    ToArray,
    Aggregate { seed: Option<Expr>, func: Lambda },
    First(Option<Lambda>),
    Any(Option<Lambda>),
    All(Lambda),
}

impl Evaluation {
    pub fn name(&self) -> &'static str {
        match self {
            Evaluation::Sum(_) => "Sum",
            Evaluation::Min(_) => "Min",
            Evaluation::Max(_) => "Max",
            Evaluation::Count(_) => "Count",
            Evaluation::ToList => "ToList",
            Evaluation::ToArray => "ToArray",
            Evaluation::Aggregate { .. } => "Aggregate",
            Evaluation::First(_) => "First",
            Evaluation::Any(_) => "Any",
            Evaluation::All(_) => "All",
        }
    }
}

// ── Chain ──

/// A generation followed by zero or more operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pipeline {
    pub generation: Node<Generation>,
    pub operations: Vec<Node<Operation>>,
}

impl Pipeline {
    /// Element type leaving the last stage.
    pub fn output(&self) -> &Type {
        self.operations
            .last()
            .map_or(&self.generation.output, |op| &op.output)
    }

    /// Number of Concat stages (operation or generation) anywhere inside.
    pub fn concat_count(&self) -> usize {
        generation_concats(&self.generation)
            + self
                .operations
                .iter()
                .map(|op| match &op.kind {
                    Operation::Concat(second) => 1 + second.concat_count(),
                    _ => 0,
                })
                .sum::<usize>()
    }

    /// Every stage id in this pipeline, ascending.
    pub fn stage_ids(&self) -> Vec<StageId> {
        let mut ids = Vec::new();
        collect_generation_ids(&self.generation, &mut ids);
        for op in &self.operations {
            if let Operation::Concat(second) = &op.kind {
                ids.extend(second.stage_ids());
            }
            ids.push(op.id);
        }
        ids.sort();
        ids
    }
}

fn generation_concats(node: &Node<Generation>) -> usize {
    match &node.kind {
        Generation::Concat(a, b) => 1 + generation_concats(a) + generation_concats(b),
        _ => 0,
    }
}

fn collect_generation_ids(node: &Node<Generation>, ids: &mut Vec<StageId>) {
    if let Generation::Concat(a, b) = &node.kind {
        collect_generation_ids(a, ids);
        collect_generation_ids(b, ids);
    }
    ids.push(node.id);
}

/// A fully assembled chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chain {
    pub name: String,
    pub params: Vec<ParamDecl>,
    /// A forwarding entry point is emitted for this chain.
    pub entry_point: bool,
    pub pipeline: Pipeline,
    /// `None` leaves the chain as a lazy sequence.
    pub evaluation: Option<Node<Evaluation>>,
}

impl Chain {
    pub fn stage_count(&self) -> usize {
        self.pipeline.stage_ids().len() + usize::from(self.evaluation.is_some())
    }

    /// Type of the value the chain produces: the evaluation result, or a
    /// sequence of the pipeline's elements.
    pub fn result_type(&self) -> Type {
        match &self.evaluation {
            Some(eval) => eval.output.clone(),
            None => Type::Seq(Box::new(self.pipeline.output().clone())),
        }
    }
}
