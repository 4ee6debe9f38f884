// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the compiler's four passes (parse is outside the runner), their
// dependency edges, and the artifacts they produce. Used by the pipeline
// runner to compute minimal pass subsets for each --emit target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass. Parsing happens before the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Bind,
    Assemble,
    Render,
    Emit,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Descriptors, // Vec<ChainDescriptor>
    Chains,      // Vec<Chain>
    Fused,       // Vec<FusedChain>
    Generated,   // GeneratedCode
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// What invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Bind => PassDescriptor {
            name: "bind",
            inputs: &[],
            outputs: &[ArtifactId::Descriptors],
            invalidation_key: "source",
            invariants: "names resolved, every call typed and tagged with a stage kind",
        },
        PassId::Assemble => PassDescriptor {
            name: "assemble",
            inputs: &[PassId::Bind],
            outputs: &[ArtifactId::Chains],
            invalidation_key: "descriptors",
            invariants: "one node per call, ids increasing source-first",
        },
        PassId::Render => PassDescriptor {
            name: "render",
            inputs: &[PassId::Assemble],
            outputs: &[ArtifactId::Fused],
            invalidation_key: "chains",
            invariants: "one loop per chain plus one per Concat, no placeholders left",
        },
        PassId::Emit => PassDescriptor {
            name: "emit",
            inputs: &[PassId::Render],
            outputs: &[ArtifactId::Generated],
            invalidation_key: "fused chains + compile options",
            invariants: "deterministic text",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 4] = [PassId::Bind, PassId::Assemble, PassId::Render, PassId::Emit];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_emit_includes_all() {
        assert_eq!(required_passes(PassId::Emit), ALL_PASSES.to_vec());
    }

    #[test]
    fn required_passes_assemble_stops_early() {
        let passes = required_passes(PassId::Assemble);
        assert_eq!(passes, vec![PassId::Bind, PassId::Assemble]);
        assert!(!passes.contains(&PassId::Render));
    }

    #[test]
    fn required_passes_bind_is_minimal() {
        assert_eq!(required_passes(PassId::Bind), vec![PassId::Bind]);
    }

    #[test]
    fn no_parse_in_pass_id() {
        for pass in &ALL_PASSES {
            assert_ne!(descriptor(*pass).name, "parse");
        }
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            assert!(
                !descriptor(*pass).outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let order = required_passes(*pass);
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep);
                let self_pos = order.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
