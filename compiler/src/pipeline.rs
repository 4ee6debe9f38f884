// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for a given
// terminal PassId. Input is either a parsed `.lfc` program (bind runs) or a
// list of chain descriptors supplied directly (bind is skipped).
//
// Preconditions: the state was built with `from_program` or `from_descriptors`.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics.
// Side effects: calls on_pass_complete callback after each pass for immediate
//   display; emits a `tracing` debug event per pass.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::assemble::assemble;
use crate::ast::{Program, Span};
use crate::descriptor::ChainDescriptor;
use crate::diag::{DiagLevel, Diagnostic};
use crate::emit::{CompileOptions, GeneratedCode};
use crate::instr::Chain;
use crate::pass::{descriptor, required_passes, PassId};
use crate::render::{render, FusedChain};

// ── Artifact storage ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Artifacts {
    pub descriptors: Option<Vec<ChainDescriptor>>,
    /// Definition span per chain name, when the input was source text.
    pub spans: HashMap<String, Span>,
    pub chains: Option<Vec<Chain>>,
    pub fused: Option<Vec<FusedChain>>,
    pub generated: Option<GeneratedCode>,
}

/// Provenance metadata stamped on emitted output.
///
/// `source_hash`: SHA-256 of the raw input text.
/// `descriptor_fingerprint`: SHA-256 of the canonical JSON of every descriptor.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub descriptor_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the descriptor fingerprint (64 characters).
    pub fn descriptor_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.descriptor_fingerprint)
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from the input text and the bound descriptors.
///
/// The fingerprint hashes compact JSON so it is independent of how the
/// descriptors were produced (source text or a JSON file).
pub fn compute_provenance(source: &str, descriptors: &[ChainDescriptor]) -> Provenance {
    let mut canonical = String::new();
    for d in descriptors {
        // Serializing plain data cannot fail; an empty entry still changes the hash.
        canonical.push_str(&d.canonical_json().unwrap_or_default());
        canonical.push('\n');
    }
    Provenance {
        source_hash: sha256(source.as_bytes()),
        descriptor_fingerprint: sha256(canonical.as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    /// Raw input text, hashed for provenance.
    pub source: String,
    pub program: Option<Program>,
    pub artifacts: Artifacts,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn from_program(source: impl Into<String>, program: Program) -> Self {
        Self {
            source: source.into(),
            program: Some(program),
            artifacts: Artifacts::default(),
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }

    pub fn from_descriptors(source: impl Into<String>, descriptors: Vec<ChainDescriptor>) -> Self {
        Self {
            source: source.into(),
            program: None,
            artifacts: Artifacts {
                descriptors: Some(descriptors),
                ..Artifacts::default()
            },
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

// ── Helper: check diagnostics for errors ───────────────────────────────────

fn has_error_diags(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

/// Per-pass post-processing: callback, accumulate, log, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_error_diags(&diags);
    state.diagnostics.extend(diags);
    debug!(
        pass = descriptor(pass_id).name,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

fn span_of(state: &CompilationState, chain: &str) -> Span {
    state
        .artifacts
        .spans
        .get(chain)
        .copied()
        .unwrap_or_else(|| (0..0).into())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → log → error check.
///
/// Preconditions: `state` holds a program or descriptors.
/// Postconditions: artifacts for all passes in `required_passes(terminal)` are
///   populated, or `state.has_error` is true.
/// Failure modes: any pass producing error-level diagnostics.
/// Side effects: calls `on_pass_complete` after each pass.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &CompileOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        match pass_id {
            PassId::Bind => {
                // Descriptors supplied directly need no binding.
                let mut diags = Vec::new();
                if state.artifacts.descriptors.is_none() {
                    if let Some(program) = &state.program {
                        let result = crate::bind::bind(program);
                        state.artifacts.spans = result.spans;
                        state.artifacts.descriptors = Some(result.chains);
                        diags = result.diagnostics;
                    }
                }
                let descriptors = state.artifacts.descriptors.get_or_insert_with(Vec::new);
                state.provenance = Some(compute_provenance(&state.source, descriptors));
                finish_pass(state, pass_id, diags, t.elapsed(), &mut on_pass_complete)?;
            }
            PassId::Assemble => {
                let mut chains = Vec::new();
                let mut diags = Vec::new();
                for desc in state.artifacts.descriptors.as_deref().unwrap_or_default() {
                    match assemble(desc) {
                        Ok(chain) => chains.push(chain),
                        Err(err) => diags.push(Diagnostic::error(
                            span_of(state, &desc.name),
                            err.code(),
                            format!("chain `{}` rejected: {err}", desc.name),
                        )),
                    }
                }
                state.artifacts.chains = Some(chains);
                finish_pass(state, pass_id, diags, t.elapsed(), &mut on_pass_complete)?;
            }
            PassId::Render => {
                let fused = state
                    .artifacts
                    .chains
                    .iter()
                    .flatten()
                    .map(render)
                    .collect();
                state.artifacts.fused = Some(fused);
                finish_pass(state, pass_id, Vec::new(), t.elapsed(), &mut on_pass_complete)?;
            }
            PassId::Emit => {
                let fused = state.artifacts.fused.as_deref().unwrap_or_default();
                let generated = crate::emit::emit(fused, state.provenance.as_ref(), options);
                state.artifacts.generated = Some(generated);
                finish_pass(state, pass_id, Vec::new(), t.elapsed(), &mut on_pass_complete)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn state_for(source: &str) -> CompilationState {
        let program = parse(source).program.expect("program");
        CompilationState::from_program(source, program)
    }

    #[test]
    fn runs_only_required_passes() {
        let mut state = state_for("chain c = Range(0, 3).Count()");
        let mut seen = Vec::new();
        run_pipeline(&mut state, PassId::Assemble, &CompileOptions::default(), |p, _| {
            seen.push(p)
        })
        .expect("no errors");
        assert_eq!(seen, vec![PassId::Bind, PassId::Assemble]);
        assert_eq!(state.artifacts.chains.as_ref().map(Vec::len), Some(1));
        assert!(state.artifacts.fused.is_none());
    }

    #[test]
    fn bind_error_stops_the_pipeline() {
        let mut state = state_for("chain c = Range(0, nope).Count()");
        let err = run_pipeline(&mut state, PassId::Emit, &CompileOptions::default(), |_, _| {})
            .expect_err("bind fails");
        assert_eq!(err.failing_pass, PassId::Bind);
        assert!(state.has_error);
        assert!(state.artifacts.generated.is_none());
    }

    #[test]
    fn descriptors_skip_binding() {
        let source = "chain c = List([1, 2]).ToList()";
        let mut from_source = state_for(source);
        run_pipeline(&mut from_source, PassId::Bind, &CompileOptions::default(), |_, _| {})
            .expect("binds");
        let descriptors = from_source.artifacts.descriptors.clone().unwrap_or_default();

        let json = serde_json::to_string(&descriptors).expect("serializes");
        let mut state = CompilationState::from_descriptors(json, descriptors);
        run_pipeline(&mut state, PassId::Emit, &CompileOptions::default(), |_, _| {})
            .expect("compiles");
        let generated = state.artifacts.generated.expect("generated");
        assert!(generated.rust_source.contains("pub struct C {"));
        // Same descriptors, same fingerprint, whatever the input text.
        assert_eq!(
            from_source.provenance.map(|p| p.descriptor_fingerprint),
            state.provenance.map(|p| p.descriptor_fingerprint)
        );
    }

    #[test]
    fn assembly_rejection_is_a_diagnostic() {
        use crate::descriptor::{CallDescriptor, StageKind};
        let mut take = CallDescriptor::new(StageKind::Take);
        take.output_type = Some(crate::types::Type::Int);
        let desc = ChainDescriptor {
            name: "orphan".into(),
            params: Vec::new(),
            tip: take,
        };
        let mut state = CompilationState::from_descriptors("[]", vec![desc]);
        let err = run_pipeline(&mut state, PassId::Render, &CompileOptions::default(), |_, _| {})
            .expect_err("rejected");
        assert_eq!(err.failing_pass, PassId::Assemble);
        assert_eq!(state.diagnostics[0].code, Some(crate::diag::codes::E0201));
    }

    #[test]
    fn provenance_hashes_differ_by_source() {
        let a = compute_provenance("chain a = Range(0, 1)", &[]);
        let b = compute_provenance("chain b = Range(0, 1)", &[]);
        assert_ne!(a.source_hash, b.source_hash);
        assert_eq!(a.descriptor_fingerprint, b.descriptor_fingerprint);
        assert_eq!(a.source_hash_hex().len(), 64);
    }
}
