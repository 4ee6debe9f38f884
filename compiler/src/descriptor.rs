// descriptor.rs — Chain descriptors handed to the fusion core
//
// A `ChainDescriptor` is the binding layer's complete statement about one
// call chain: every call's stage kind, its captured argument expressions, and
// its resolved element types. The core performs no symbol resolution of its
// own; everything it needs is in here. Descriptors serialize to JSON so any
// host can produce them.
//
// Preconditions: none (data-only module).
// Postconditions: none.
// Failure modes: malformed JSON is reported by `serde_json`.
// Side effects: none.

use serde::{Deserialize, Serialize};

use crate::ir::{Expr, Lambda};
use crate::types::Type;

/// A complete call chain, named, with its entry-point parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    /// The last call of the chain; earlier calls hang off `receiver`.
    pub tip: CallDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: Type,
}

/// Whether a call is the outermost call of an externally callable chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Standalone,
    #[default]
    Chained,
}

/// One call in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub kind: StageKind,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Box<CallDescriptor>>,
    /// Element type consumed (none for sources).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<Type>,
    /// Element type produced; for evaluations, the result type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<Type>,
    /// Explicit type argument (`Cast<T>`, `OfType<T>`, `Empty<T>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_arg: Option<Type>,
    #[serde(default)]
    pub args: Vec<Capture>,
    /// The wrapped receiver supports random access.
    #[serde(default)]
    pub indexable: bool,
}

/// A captured argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capture {
    Value(Expr),
    Lambda(Lambda),
    /// A nested chain (second input of Concat).
    Chain(Box<CallDescriptor>),
}

/// Recognised call shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    // Sources
    Range,
    Empty,
    Repeat,
    WrapList,
    WrapSpan,
    WrapArbitrary,
    ConcatSource,
    // Operations
    Where,
    WhereIndexed,
    Select,
    SelectIndexed,
    Take,
    Skip,
    Distinct,
    DistinctWithComparer,
    Cast,
    OfType,
    Concat,
    // Evaluations
    Sum,
    Min,
    Max,
    Count,
    ToList,
    ToArray,
    Aggregate,
    First,
    Any,
    All,
}

/// Which part of a chain a stage kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Generation,
    Operation,
    Evaluation,
}

impl StageKind {
    pub fn role(self) -> Role {
        use StageKind::*;
        match self {
            Range | Empty | Repeat | WrapList | WrapSpan | WrapArbitrary | ConcatSource => {
                Role::Generation
            }
            Where | WhereIndexed | Select | SelectIndexed | Take | Skip | Distinct
            | DistinctWithComparer | Cast | OfType | Concat => Role::Operation,
            Sum | Min | Max | Count | ToList | ToArray | Aggregate | First | Any | All => {
                Role::Evaluation
            }
        }
    }
}

impl CallDescriptor {
    /// A call with no receiver, types or arguments; builders fill the rest.
    pub fn new(kind: StageKind) -> Self {
        CallDescriptor {
            kind,
            origin: Origin::Chained,
            receiver: None,
            input_type: None,
            output_type: None,
            type_arg: None,
            args: Vec::new(),
            indexable: false,
        }
    }

    /// Number of calls in this chain, counting the receiver chain and any
    /// nested chain captures.
    pub fn call_count(&self) -> usize {
        let nested: usize = self
            .args
            .iter()
            .map(|a| match a {
                Capture::Chain(c) => c.call_count(),
                _ => 0,
            })
            .sum();
        1 + nested + self.receiver.as_ref().map_or(0, |r| r.call_count())
    }
}

impl ChainDescriptor {
    /// Canonical JSON used for provenance hashing.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
