// id.rs — Stable per-chain stage identifiers
//
// Ids are allocated while a chain is assembled, strictly increasing in
// source-to-terminal order. They are the only input to name mangling, so two
// stages of one chain never share a generated name, and ids restart at zero
// for every chain.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for one stage of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(pub u32);

impl StageId {
    /// Mangle a stage-scoped name: `index` of stage 3 becomes `index_3`.
    pub fn mangle(self, name: &str) -> String {
        format!("{name}_{}", self.0)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocator for stage ids. Produces monotonically increasing ids in
/// allocation order, ensuring deterministic assignment.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_stage: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_stage(&mut self) -> StageId {
        let id = StageId(self.next_stage);
        self.next_stage += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next_stage
    }
}
