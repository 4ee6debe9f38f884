// assemble.rs — Chain descriptor → instruction chain
//
// Walks the tip descriptor's receiver links back to the root source and
// builds one instruction per call, allocating ids in source-to-terminal
// order. Assembly is all-or-nothing: any call that does not fit a known
// stage shape rejects the whole chain.
//
// Preconditions: descriptor produced by `bind` or deserialized from JSON.
// Postconditions: on success, every node carries its resolved types, ids are
//   strictly increasing source-first, and every capture matches its kind.
// Failure modes: `AssemblyError` describing the first offending call.
// Side effects: none.

use thiserror::Error;

use crate::descriptor::{
    CallDescriptor, Capture, ChainDescriptor, Origin, Role, StageKind,
};
use crate::diag::{codes, DiagCode};
use crate::id::IdAllocator;
use crate::instr::{Chain, Evaluation, Generation, Node, Operation, Pipeline};
use crate::ir::{Expr, Lambda};
use crate::types::Type;

/// Why a chain descriptor was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    #[error("`{kind:?}` is a source and cannot be called on a receiver")]
    SourceWithReceiver { kind: StageKind },
    #[error("`{kind:?}` needs a receiver")]
    MissingReceiver { kind: StageKind },
    #[error("`{kind:?}` is terminal and must be the last call of the chain")]
    EvaluationNotAtTip { kind: StageKind },
    #[error("`{kind:?}`: {detail}")]
    BadCaptures { kind: StageKind, detail: String },
    #[error("`{kind:?}`: missing {what} type")]
    MissingType { kind: StageKind, what: &'static str },
    #[error("`{kind:?}` expects `{expected}` elements but its receiver produces `{found}`")]
    ElementMismatch {
        kind: StageKind,
        expected: Type,
        found: Type,
    },
    #[error("`{kind:?}` requires a random-access receiver")]
    NotIndexable { kind: StageKind },
}

impl AssemblyError {
    pub fn code(&self) -> DiagCode {
        match self {
            AssemblyError::SourceWithReceiver { .. } => codes::E0200,
            AssemblyError::MissingReceiver { .. } => codes::E0201,
            AssemblyError::EvaluationNotAtTip { .. } => codes::E0202,
            AssemblyError::BadCaptures { .. } => codes::E0203,
            AssemblyError::MissingType { .. } => codes::E0204,
            AssemblyError::ElementMismatch { .. } => codes::E0205,
            AssemblyError::NotIndexable { .. } => codes::E0206,
        }
    }
}

type Result<T> = std::result::Result<T, AssemblyError>;

// ── Public API ──

/// Assemble one chain.
pub fn assemble(desc: &ChainDescriptor) -> Result<Chain> {
    let mut ids = IdAllocator::new();
    let tip = &desc.tip;

    let (pipeline_tip, evaluation_call) = match tip.kind.role() {
        Role::Evaluation => {
            let receiver = tip
                .receiver
                .as_deref()
                .ok_or(AssemblyError::MissingReceiver { kind: tip.kind })?;
            (receiver, Some(tip))
        }
        _ => (tip, None),
    };

    let pipeline = assemble_pipeline(pipeline_tip, &mut ids)?;
    let evaluation = match evaluation_call {
        Some(call) => Some(assemble_evaluation(call, pipeline.output(), &mut ids)?),
        None => None,
    };

    Ok(Chain {
        name: desc.name.clone(),
        params: desc.params.clone(),
        entry_point: tip.origin == Origin::Standalone,
        pipeline,
        evaluation,
    })
}

// ── Pipelines ──

/// Assemble a generation plus operations ending at `tip`.
fn assemble_pipeline(tip: &CallDescriptor, ids: &mut IdAllocator) -> Result<Pipeline> {
    // Collect calls tip-first, then walk them source-first.
    let mut calls = vec![tip];
    let mut cursor = tip;
    while let Some(receiver) = cursor.receiver.as_deref() {
        calls.push(receiver);
        cursor = receiver;
    }
    calls.reverse();

    let (root, rest) = calls
        .split_first()
        .ok_or(AssemblyError::MissingReceiver { kind: tip.kind })?;
    if root.kind.role() != Role::Generation {
        return Err(AssemblyError::MissingReceiver { kind: root.kind });
    }
    let generation = assemble_generation(root, ids)?;

    let mut operations: Vec<Node<Operation>> = Vec::new();
    for call in rest {
        match call.kind.role() {
            Role::Generation => {
                return Err(AssemblyError::SourceWithReceiver { kind: call.kind })
            }
            Role::Evaluation => {
                return Err(AssemblyError::EvaluationNotAtTip { kind: call.kind })
            }
            Role::Operation => {}
        }
        let upstream = operations
            .last()
            .map_or(&generation.output, |op| &op.output)
            .clone();
        operations.push(assemble_operation(call, &upstream, ids)?);
    }

    Ok(Pipeline {
        generation,
        operations,
    })
}

// ── Generations ──

fn assemble_generation(call: &CallDescriptor, ids: &mut IdAllocator) -> Result<Node<Generation>> {
    let kind = call.kind;
    if call.receiver.is_some() {
        return Err(AssemblyError::SourceWithReceiver { kind });
    }
    let output = output_type(call)?;

    let generation = match kind {
        StageKind::Range => {
            let [start, count] = values::<2>(call)?;
            Generation::Range { start, count }
        }
        StageKind::Empty => {
            values::<0>(call)?;
            if call.type_arg.is_none() {
                return Err(AssemblyError::MissingType {
                    kind,
                    what: "element",
                });
            }
            Generation::Empty
        }
        StageKind::Repeat => {
            let [value, count] = values::<2>(call)?;
            Generation::Repeat { value, count }
        }
        StageKind::WrapList | StageKind::WrapSpan => {
            if !call.indexable {
                return Err(AssemblyError::NotIndexable { kind });
            }
            let [source] = values::<1>(call)?;
            if kind == StageKind::WrapList {
                Generation::WrapList { source }
            } else {
                Generation::WrapSpan { source }
            }
        }
        StageKind::WrapArbitrary => {
            let [source] = values::<1>(call)?;
            Generation::WrapArbitrary { source }
        }
        StageKind::ConcatSource => {
            let [first, second] = chains::<2>(call)?;
            let first = assemble_generation(first, ids)?;
            let second = assemble_generation(second, ids)?;
            if first.output != output || second.output != output {
                let found = if first.output != output {
                    first.output.clone()
                } else {
                    second.output.clone()
                };
                return Err(AssemblyError::ElementMismatch {
                    kind,
                    expected: output,
                    found,
                });
            }
            Generation::Concat(Box::new(first), Box::new(second))
        }
        _ => return Err(AssemblyError::MissingReceiver { kind }),
    };

    Ok(Node {
        id: ids.alloc_stage(),
        input: None,
        output,
        kind: generation,
    })
}

// ── Operations ──

fn assemble_operation(
    call: &CallDescriptor,
    upstream: &Type,
    ids: &mut IdAllocator,
) -> Result<Node<Operation>> {
    let kind = call.kind;
    let input = input_type(call, upstream)?;
    let output = output_type(call)?;

    let operation = match kind {
        StageKind::Where => Operation::Where(lambda(call, 1)?),
        StageKind::WhereIndexed => Operation::WhereIndexed(lambda(call, 2)?),
        StageKind::Select => Operation::Select(lambda(call, 1)?),
        StageKind::SelectIndexed => Operation::SelectIndexed(lambda(call, 2)?),
        StageKind::Take => {
            let [n] = values::<1>(call)?;
            Operation::Take(n)
        }
        StageKind::Skip => {
            let [n] = values::<1>(call)?;
            Operation::Skip(n)
        }
        StageKind::Distinct => {
            values::<0>(call)?;
            Operation::Distinct
        }
        StageKind::DistinctWithComparer => Operation::DistinctBy(lambda(call, 1)?),
        StageKind::Cast | StageKind::OfType => {
            values::<0>(call)?;
            let target = call.type_arg.clone().ok_or(AssemblyError::MissingType {
                kind,
                what: "target",
            })?;
            if kind == StageKind::Cast {
                Operation::Cast(target)
            } else {
                Operation::OfType(target)
            }
        }
        StageKind::Concat => {
            let [second] = chains::<1>(call)?;
            // The second pipeline's ids come after everything upstream and
            // before the Concat itself.
            let second = assemble_pipeline(second, ids)?;
            if second.output() != &input {
                return Err(AssemblyError::ElementMismatch {
                    kind,
                    expected: input,
                    found: second.output().clone(),
                });
            }
            Operation::Concat(Box::new(second))
        }
        _ => return Err(AssemblyError::MissingReceiver { kind }),
    };

    Ok(Node {
        id: ids.alloc_stage(),
        input: Some(input),
        output,
        kind: operation,
    })
}

// ── Evaluations ──

fn assemble_evaluation(
    call: &CallDescriptor,
    upstream: &Type,
    ids: &mut IdAllocator,
) -> Result<Node<Evaluation>> {
    let kind = call.kind;
    let input = input_type(call, upstream)?;
    let output = output_type(call)?;

    let evaluation = match kind {
        StageKind::Sum => Evaluation::Sum(optional_lambda(call, 1)?),
        StageKind::Min => Evaluation::Min(optional_lambda(call, 2)?),
        StageKind::Max => Evaluation::Max(optional_lambda(call, 2)?),
        StageKind::Count => Evaluation::Count(optional_lambda(call, 1)?),
        StageKind::ToList => {
            values::<0>(call)?;
            Evaluation::ToList
        }
        StageKind::ToArray => {
            values::<0>(call)?;
            Evaluation::ToArray
        }
        StageKind::Aggregate => match call.args.as_slice() {
            [Capture::Lambda(func)] if func.params.len() == 2 => Evaluation::Aggregate {
                seed: None,
                func: func.clone(),
            },
            [Capture::Value(seed), Capture::Lambda(func)] if func.params.len() == 2 => {
                Evaluation::Aggregate {
                    seed: Some(seed.clone()),
                    func: func.clone(),
                }
            }
            _ => {
                return Err(AssemblyError::BadCaptures {
                    kind,
                    detail: "expected an optional seed and a two-parameter lambda".into(),
                })
            }
        },
        StageKind::First => Evaluation::First(optional_lambda(call, 1)?),
        StageKind::Any => Evaluation::Any(optional_lambda(call, 1)?),
        StageKind::All => Evaluation::All(lambda(call, 1)?),
        _ => return Err(AssemblyError::EvaluationNotAtTip { kind }),
    };

    Ok(Node {
        id: ids.alloc_stage(),
        input: Some(input),
        output,
        kind: evaluation,
    })
}

// ── Capture and type helpers ──

fn output_type(call: &CallDescriptor) -> Result<Type> {
    call.output_type.clone().ok_or(AssemblyError::MissingType {
        kind: call.kind,
        what: "output",
    })
}

fn input_type(call: &CallDescriptor, upstream: &Type) -> Result<Type> {
    let input = call.input_type.clone().ok_or(AssemblyError::MissingType {
        kind: call.kind,
        what: "input",
    })?;
    if &input != upstream {
        return Err(AssemblyError::ElementMismatch {
            kind: call.kind,
            expected: input,
            found: upstream.clone(),
        });
    }
    Ok(input)
}

fn values<const N: usize>(call: &CallDescriptor) -> Result<[Expr; N]> {
    let exprs: Vec<Expr> = call
        .args
        .iter()
        .filter_map(|a| match a {
            Capture::Value(e) => Some(e.clone()),
            _ => None,
        })
        .collect();
    if exprs.len() != call.args.len() {
        return Err(AssemblyError::BadCaptures {
            kind: call.kind,
            detail: "expected value arguments only".into(),
        });
    }
    exprs.try_into().map_err(|v: Vec<Expr>| AssemblyError::BadCaptures {
        kind: call.kind,
        detail: format!("expected {N} argument(s), found {}", v.len()),
    })
}

fn chains<const N: usize>(call: &CallDescriptor) -> Result<[&CallDescriptor; N]> {
    let nested: Vec<&CallDescriptor> = call
        .args
        .iter()
        .filter_map(|a| match a {
            Capture::Chain(c) => Some(c.as_ref()),
            _ => None,
        })
        .collect();
    if nested.len() != call.args.len() {
        return Err(AssemblyError::BadCaptures {
            kind: call.kind,
            detail: "expected chain arguments only".into(),
        });
    }
    nested
        .try_into()
        .map_err(|v: Vec<&CallDescriptor>| AssemblyError::BadCaptures {
            kind: call.kind,
            detail: format!("expected {N} chain argument(s), found {}", v.len()),
        })
}

fn lambda(call: &CallDescriptor, arity: usize) -> Result<Lambda> {
    optional_lambda(call, arity)?.ok_or_else(|| AssemblyError::BadCaptures {
        kind: call.kind,
        detail: format!("expected a {arity}-parameter lambda"),
    })
}

fn optional_lambda(call: &CallDescriptor, arity: usize) -> Result<Option<Lambda>> {
    match call.args.as_slice() {
        [] => Ok(None),
        [Capture::Lambda(l)] if l.params.len() == arity => Ok(Some(l.clone())),
        _ => Err(AssemblyError::BadCaptures {
            kind: call.kind,
            detail: format!("expected at most one {arity}-parameter lambda"),
        }),
    }
}
