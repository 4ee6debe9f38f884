// Property-based tests for fusion.
//
// Three categories:
// 1. Random chains: fused bodies agree with the stage-by-stage reference,
//    faults included
// 2. Static counts: a known count matches the number of elements produced
// 3. Lazy chains: iterating the fused iterator matches the reference list
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use lfc::emit::CompileOptions;
use lfc::pass::PassId;
use lfc::pipeline::{run_pipeline, CompilationState};
use lfc::pool::{ArrayPool, SharedPool};
use lfc::value::Value;
use proptest::prelude::*;
use std::sync::Arc;

// ── Test helpers ────────────────────────────────────────────────────────────

fn compile(source: &str) -> Option<CompilationState> {
    let program = lfc::parser::parse(source).program?;
    let mut state = CompilationState::from_program(source, program);
    run_pipeline(&mut state, PassId::Render, &CompileOptions::default(), |_, _| {}).ok()?;
    Some(state)
}

fn list(items: &[i32]) -> Value {
    Value::List(items.iter().copied().map(Value::Int).collect())
}

fn pool() -> Arc<dyn ArrayPool> {
    Arc::new(SharedPool::new())
}

// ── Chain generator ─────────────────────────────────────────────────────────

/// Sources over `xs: list<int>` and `ys: seq<int>`, or literal-sized ones.
fn arb_source() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("List(xs)".to_string()),
        Just("Seq(ys)".to_string()),
        (-3i32..5, -2i32..8).prop_map(|(s, n)| format!("Range({s}, {n})")),
        (-3i32..3, 0i32..4).prop_map(|(v, n)| format!("Repeat({v}, {n})")),
        (0i32..4).prop_map(|n| format!("Concat(List(xs), Range(10, {n}))")),
        Just("Empty<int>()".to_string()),
    ]
}

fn arb_operation() -> impl Strategy<Value = String> {
    prop_oneof![
        (2i32..5, 0i32..2).prop_map(|(k, r)| format!(".Where(x => x % {k} == {r})")),
        Just(".Where((x, i) => i % 2 == 0)".to_string()),
        (-3i32..4).prop_map(|c| format!(".Select(x => x + {c})")),
        Just(".Select((x, i) => x * 2 - i)".to_string()),
        (-2i32..6).prop_map(|n| format!(".Take({n})")),
        (-2i32..6).prop_map(|n| format!(".Skip({n})")),
        Just(".Distinct()".to_string()),
        (2i32..4).prop_map(|k| format!(".Distinct(x => x % {k})")),
        Just(".Concat(Seq(ys).Where(x => x > 0))".to_string()),
        Just(".Concat(List(xs))".to_string()),
    ]
}

fn arb_evaluation() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(".Count()".to_string()),
        Just(".Sum()".to_string()),
        Just(".ToList()".to_string()),
        Just(".ToArray()".to_string()),
        Just(".Min()".to_string()),
        Just(".Max()".to_string()),
        Just(".First()".to_string()),
        Just(".First(x => x > 2)".to_string()),
        Just(".Any()".to_string()),
        Just(".All(x => x < 4)".to_string()),
        Just(".Aggregate((a, b) => a * 3 - b)".to_string()),
        Just(".Aggregate(0L, (a, x) => a * 2L + x)".to_string()),
    ]
}

fn arb_chain() -> impl Strategy<Value = String> {
    (
        arb_source(),
        prop::collection::vec(arb_operation(), 0..=4),
        arb_evaluation(),
    )
        .prop_map(|(source, ops, eval)| {
            format!(
                "chain c(xs: list<int>, ys: seq<int>) = {source}{}{eval}",
                ops.concat()
            )
        })
}

fn arb_lazy_chain() -> impl Strategy<Value = String> {
    (arb_source(), prop::collection::vec(arb_operation(), 0..=4)).prop_map(|(source, ops)| {
        format!("chain c(xs: list<int>, ys: seq<int>) = {source}{}", ops.concat())
    })
}

fn arb_input() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(-5i32..6, 0..8)
}

// ── 1. Fused vs reference ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn fused_matches_reference(src in arb_chain(), xs in arb_input(), ys in arb_input()) {
        // Unused parameters only warn, so every generated chain compiles.
        let state = compile(&src);
        prop_assert!(state.is_some(), "compile failed for:\n{}", src);
        let state = state.unwrap();
        let fused = &state.artifacts.fused.as_ref().unwrap()[0];
        let chain = &state.artifacts.chains.as_ref().unwrap()[0];

        let args = vec![list(&xs), list(&ys)];
        let expected = lfc::reference::run(chain, args.clone());
        let actual = fused.call(args, pool());
        prop_assert_eq!(actual, expected, "chain:\n{}", src);
    }
}

// ── 2. Static counts ────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn static_count_matches_produced_elements(
        start in -3i32..3,
        count in -2i32..12,
        parts in prop::collection::vec((prop::bool::ANY, -2i32..10), 0..4),
    ) {
        let mut src = format!("chain c = Range({start}, {count})");
        for (take, n) in &parts {
            let name = if *take { "Take" } else { "Skip" };
            src.push_str(&format!(".{name}({n})"));
        }
        src.push_str(".Select(x => x * 2).ToList()");

        let state = compile(&src).expect("compiles");
        let fused = &state.artifacts.fused.as_ref().unwrap()[0];
        let known = fused.static_count;
        prop_assert!(known.is_some(), "literal partitions have a static count: {}", src);

        let produced = match fused.call(Vec::new(), pool()) {
            Ok(Value::List(items)) => items.len() as i64,
            other => panic!("unexpected result {other:?} for {src}"),
        };
        prop_assert_eq!(known, Some(produced), "chain:\n{}", src);
    }
}

// ── 3. Lazy chains ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn lazy_iteration_matches_reference(src in arb_lazy_chain(), xs in arb_input(), ys in arb_input()) {
        let state = compile(&src).expect("compiles");
        let fused = &state.artifacts.fused.as_ref().unwrap()[0];
        let chain = &state.artifacts.chains.as_ref().unwrap()[0];
        let args = vec![list(&xs), list(&ys)];

        let instance = fused.instantiate(args.clone(), pool()).expect("instantiates");
        let first: Result<Vec<Value>, _> = instance.iter().collect();
        let second: Result<Vec<Value>, _> = instance.iter().collect();
        prop_assert_eq!(&first, &second, "reiteration differs for:\n{}", src);

        let expected = lfc::reference::run(chain, args);
        prop_assert_eq!(first.map(Value::List), expected, "chain:\n{}", src);
    }
}
