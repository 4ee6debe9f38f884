// Fused bodies against the stage-by-stage reference model.
//
// Every chain below is compiled through the full pipeline, then run twice:
// once through its fused iterator/evaluation body and once through
// `lfc::reference::run`. Results (values and faults alike) must agree.
// Cases with an obvious answer also pin the expected value.

use lfc::emit::CompileOptions;
use lfc::exec::ExecError;
use lfc::pass::PassId;
use lfc::pipeline::{run_pipeline, CompilationState};
use lfc::pool::{ArrayPool, SharedPool};
use lfc::value::{Fault, Value, NO_ELEMENTS, NO_MATCH};
use std::sync::Arc;

// ── Helpers ─────────────────────────────────────────────────────────────────

fn compile(source: &str) -> CompilationState {
    let program = lfc::parser::parse(source).program.expect("source parses");
    let mut state = CompilationState::from_program(source, program);
    let result = run_pipeline(&mut state, PassId::Render, &CompileOptions::default(), |_, _| {});
    assert!(
        result.is_ok(),
        "compile failed for:\n{source}\n{:#?}",
        state.diagnostics
    );
    state
}

/// Run chain `name` both ways; assert agreement; return the fused result.
fn run(source: &str, name: &str, args: Vec<Value>) -> Result<Value, ExecError> {
    let state = compile(source);
    let fused = state
        .artifacts
        .fused
        .iter()
        .flatten()
        .find(|c| c.name == name)
        .expect("fused chain");
    let chain = state
        .artifacts
        .chains
        .iter()
        .flatten()
        .find(|c| c.name == name)
        .expect("assembled chain");

    let pool: Arc<dyn ArrayPool> = Arc::new(SharedPool::new());
    let fused_result = fused.call(args.clone(), pool);
    let reference_result = lfc::reference::run(chain, args);
    assert_eq!(
        fused_result, reference_result,
        "fused and reference disagree for:\n{source}"
    );
    fused_result
}

fn ints(items: &[i32]) -> Value {
    Value::List(items.iter().copied().map(Value::Int).collect())
}

fn fault(f: Fault) -> Result<Value, ExecError> {
    Err(ExecError::Fault(f))
}

// ── Generations ─────────────────────────────────────────────────────────────

#[test]
fn range_where_select_sum() {
    let src = "chain evens(n: int) = Range(0, n).Where(x => x % 2 == 0).Select(x => x * 3).Sum()";
    assert_eq!(run(src, "evens", vec![Value::Int(10)]), Ok(Value::Long(60)));
    assert_eq!(run(src, "evens", vec![Value::Int(0)]), Ok(Value::Long(0)));
    assert_eq!(run(src, "evens", vec![Value::Int(-4)]), Ok(Value::Long(0)));
}

#[test]
fn repeat_and_empty() {
    let src = "chain r(n: int) = Repeat(7, n).ToList()\nchain e = Empty<int>().Sum()";
    assert_eq!(run(src, "r", vec![Value::Int(3)]), Ok(ints(&[7, 7, 7])));
    assert_eq!(run(src, "r", vec![Value::Int(-1)]), Ok(ints(&[])));
    assert_eq!(run(src, "e", Vec::new()), Ok(Value::Long(0)));
}

#[test]
fn seq_source_with_distinct() {
    let src = "chain u(xs: seq<int>) = Seq(xs).Distinct().ToList()";
    assert_eq!(
        run(src, "u", vec![ints(&[3, 1, 3, 2, 1])]),
        Ok(ints(&[3, 1, 2]))
    );
    assert_eq!(run(src, "u", vec![ints(&[])]), Ok(ints(&[])));
}

#[test]
fn concat_source_of_two_generations() {
    let src = "chain c(a: list<int>, n: int) = Concat(List(a), Range(0, n)).Min()";
    assert_eq!(run(src, "c", vec![ints(&[5, 9]), Value::Int(3)]), Ok(Value::Int(0)));
    assert_eq!(run(src, "c", vec![ints(&[5, 9]), Value::Int(0)]), Ok(Value::Int(5)));
    assert_eq!(
        run(src, "c", vec![ints(&[]), Value::Int(0)]),
        fault(Fault::InvalidOperation(NO_ELEMENTS))
    );
}

// ── Operations ──────────────────────────────────────────────────────────────

#[test]
fn partitioned_range() {
    let src = "chain p(n: int) = Range(3, n).Skip(2).Take(4).ToList()";
    assert_eq!(run(src, "p", vec![Value::Int(10)]), Ok(ints(&[5, 6, 7, 8])));
    assert_eq!(run(src, "p", vec![Value::Int(4)]), Ok(ints(&[5, 6])));
    assert_eq!(run(src, "p", vec![Value::Int(1)]), Ok(ints(&[])));
}

#[test]
fn negative_and_oversized_partitions() {
    let src = "chain w(xs: list<int>, s: int, t: int) = List(xs).Skip(s).Take(t).ToArray()";
    let xs = ints(&[1, 2, 3, 4, 5, 6]);
    let cases = [
        (-1, 2, vec![1, 2]),
        (2, -3, vec![]),
        (4, 10, vec![5, 6]),
        (10, 1, vec![]),
        (0, 6, vec![1, 2, 3, 4, 5, 6]),
    ];
    for (s, t, expected) in cases {
        assert_eq!(
            run(src, "w", vec![xs.clone(), Value::Int(s), Value::Int(t)]),
            Ok(ints(&expected)),
            "Skip({s}).Take({t})"
        );
    }
}

#[test]
fn stacked_maximal_skips_produce_nothing() {
    let src = "chain r = Range(0, 10).Skip(2147483647).Skip(2147483647).ToList()\n\
               chain one = Range(0, 10).Skip(2147483647).Skip(1).Count()\n\
               chain l(xs: list<int>, t: int) = List(xs).Skip(2147483647).Take(t).Skip(2147483647).ToList()";
    assert_eq!(run(src, "r", Vec::new()), Ok(ints(&[])));
    assert_eq!(run(src, "one", Vec::new()), Ok(Value::Int(0)));
    assert_eq!(
        run(src, "l", vec![ints(&[1, 2, 3]), Value::Int(5)]),
        Ok(ints(&[]))
    );

    let state = compile(src);
    let fused = state.artifacts.fused.as_ref().unwrap();
    assert_eq!(fused[0].static_count, Some(0));
    assert_eq!(fused[1].static_count, Some(0));
}

#[test]
fn indexed_select_counts_from_its_own_input() {
    let src = "chain s(xs: list<int>) = List(xs).Skip(1).Select((x, i) => x + i).ToList()";
    assert_eq!(
        run(src, "s", vec![ints(&[10, 20, 30, 40])]),
        Ok(ints(&[20, 31, 42]))
    );
}

#[test]
fn indexed_where() {
    let src = "chain w(xs: list<int>) = List(xs).Where((x, i) => i % 2 == 0).ToList()";
    assert_eq!(
        run(src, "w", vec![ints(&[10, 11, 12, 13, 14])]),
        Ok(ints(&[10, 12, 14]))
    );
}

#[test]
fn take_after_filter_is_not_folded() {
    let src = "chain t(n: int) = Range(0, n).Where(x => x % 2 == 1).Take(3).ToList()";
    assert_eq!(run(src, "t", vec![Value::Int(100)]), Ok(ints(&[1, 3, 5])));
    assert_eq!(run(src, "t", vec![Value::Int(4)]), Ok(ints(&[1, 3])));
}

#[test]
fn take_before_filter() {
    let src = "chain t = Range(0, 100).Take(10).Where(x => x > 5).Count()";
    assert_eq!(run(src, "t", Vec::new()), Ok(Value::Int(4)));
}

#[test]
fn take_on_an_arbitrary_sequence() {
    let src = "chain t(xs: seq<int>, n: int) = Seq(xs).Take(n).ToList()";
    assert_eq!(
        run(src, "t", vec![ints(&[4, 5, 6]), Value::Int(2)]),
        Ok(ints(&[4, 5]))
    );
    assert_eq!(run(src, "t", vec![ints(&[4, 5, 6]), Value::Int(0)]), Ok(ints(&[])));
}

#[test]
fn distinct_by_key() {
    let src = "chain d(xs: list<int>) = List(xs).Distinct(x => x % 3).ToList()";
    assert_eq!(
        run(src, "d", vec![ints(&[1, 2, 3, 4, 5, 6])]),
        Ok(ints(&[1, 2, 3]))
    );
}

#[test]
fn concat_operation_with_its_own_stages() {
    let src = "chain c(n: int, xs: list<int>) = Range(0, n).Concat(List(xs).Where(x => x > 2)).ToList()";
    assert_eq!(
        run(src, "c", vec![Value::Int(3), ints(&[1, 5, 2, 8])]),
        Ok(ints(&[0, 1, 2, 5, 8]))
    );
}

#[test]
fn stages_after_concat_see_both_halves() {
    let src = "chain c(n: int) = Range(0, n).Concat(Repeat(7, 2)).Aggregate(0L, (acc, x) => acc * 10L + x)";
    assert_eq!(run(src, "c", vec![Value::Int(3)]), Ok(Value::Long(1277)));
}

#[test]
fn of_type_and_cast() {
    let src = "chain o(xs: list<object>) = List(xs).OfType<int>().ToList()\n\
               chain c(xs: list<object>) = List(xs).Cast<int>().Count()";
    let mixed = Value::List(vec![
        Value::Int(1),
        Value::Str("a".into()),
        Value::Long(2),
        Value::Int(3),
    ]);
    assert_eq!(run(src, "o", vec![mixed.clone()]), Ok(ints(&[1, 3])));
    assert!(matches!(
        run(src, "c", vec![mixed]),
        Err(ExecError::Fault(Fault::InvalidCast { .. }))
    ));
    assert_eq!(
        run(src, "c", vec![Value::List(vec![Value::Int(4)])]),
        Ok(Value::Int(1))
    );
}

#[test]
fn take_pulls_one_element_past_its_bound() {
    // The fused Take stops only after the next upstream element is
    // computed, so a cast fault on that element surfaces.
    let src = "chain c(xs: list<object>) = List(xs).Cast<int>().Take(1).ToList()\n\
               chain s(xs: list<object>) = List(xs).Cast<int>().Skip(1).ToList()\n\
               chain d(xs: list<int>, n: int) = List(xs).Select(x => 12 / x).Take(n).Count()";
    let mixed = Value::List(vec![Value::Int(1), Value::Str("a".into())]);
    assert!(matches!(
        run(src, "c", vec![mixed]),
        Err(ExecError::Fault(Fault::InvalidCast { .. }))
    ));
    let tail = Value::List(vec![Value::Str("a".into()), Value::Int(1)]);
    assert!(matches!(
        run(src, "s", vec![tail]),
        Err(ExecError::Fault(Fault::InvalidCast { .. }))
    ));
    assert_eq!(
        run(src, "c", vec![Value::List(vec![Value::Int(1)])]),
        Ok(ints(&[1]))
    );
    assert_eq!(
        run(src, "d", vec![ints(&[4, 0]), Value::Int(1)]),
        fault(Fault::DivideByZero)
    );
    assert_eq!(
        run(src, "d", vec![ints(&[4, 0]), Value::Int(0)]),
        Ok(Value::Int(0))
    );
    assert_eq!(
        run(src, "d", vec![ints(&[4, 6]), Value::Int(2)]),
        Ok(Value::Int(2))
    );
}

// ── Evaluations ─────────────────────────────────────────────────────────────

#[test]
fn sum_with_selector_widens_to_double() {
    let src = "chain s(n: int) = Range(1, n).Sum(x => x * 1.5)";
    assert_eq!(run(src, "s", vec![Value::Int(3)]), Ok(Value::Double(9.0)));
}

#[test]
fn min_max_and_comparers() {
    let src = "chain lo(xs: list<int>) = List(xs).Min()\n\
               chain hi(xs: list<int>) = List(xs).Max()\n\
               chain rev(xs: list<int>) = List(xs).Max((a, b) => b - a)";
    let xs = ints(&[4, 1, 7, 1]);
    assert_eq!(run(src, "lo", vec![xs.clone()]), Ok(Value::Int(1)));
    assert_eq!(run(src, "hi", vec![xs.clone()]), Ok(Value::Int(7)));
    // Only agreement matters for the custom comparer.
    run(src, "rev", vec![xs]).expect("comparer max");
    assert_eq!(
        run(src, "hi", vec![ints(&[])]),
        fault(Fault::InvalidOperation(NO_ELEMENTS))
    );
}

#[test]
fn count_with_predicate() {
    let src = "chain c(n: int) = Range(0, n).Count(x => x % 4 == 0)";
    assert_eq!(run(src, "c", vec![Value::Int(10)]), Ok(Value::Int(3)));
}

#[test]
fn aggregate_without_seed() {
    let src = "chain a(xs: list<int>) = List(xs).Aggregate((a, b) => a - b)";
    assert_eq!(run(src, "a", vec![ints(&[10, 3, 2])]), Ok(Value::Int(5)));
    assert_eq!(run(src, "a", vec![ints(&[42])]), Ok(Value::Int(42)));
    assert_eq!(
        run(src, "a", vec![ints(&[])]),
        fault(Fault::InvalidOperation(NO_ELEMENTS))
    );
}

#[test]
fn first_any_all() {
    let src = "chain f(n: int) = Range(0, n).First(x => x > 2)\n\
               chain g(n: int) = Range(0, n).First()\n\
               chain any(n: int) = Range(0, n).Any(x => x == 3)\n\
               chain none(n: int) = Range(0, n).Any()\n\
               chain all(n: int) = Range(0, n).All(x => x < 3)";
    assert_eq!(run(src, "f", vec![Value::Int(10)]), Ok(Value::Int(3)));
    assert_eq!(
        run(src, "f", vec![Value::Int(2)]),
        fault(Fault::InvalidOperation(NO_MATCH))
    );
    assert_eq!(
        run(src, "g", vec![Value::Int(0)]),
        fault(Fault::InvalidOperation(NO_ELEMENTS))
    );
    assert_eq!(run(src, "any", vec![Value::Int(10)]), Ok(Value::Bool(true)));
    assert_eq!(run(src, "none", vec![Value::Int(0)]), Ok(Value::Bool(false)));
    assert_eq!(run(src, "all", vec![Value::Int(3)]), Ok(Value::Bool(true)));
    assert_eq!(run(src, "all", vec![Value::Int(4)]), Ok(Value::Bool(false)));
}

#[test]
fn lazy_chain_iterates_to_a_list() {
    let src = "chain l(xs: list<int>) = List(xs).Select((x, i) => x * 100 + i)";
    assert_eq!(run(src, "l", vec![ints(&[1, 2])]), Ok(ints(&[100, 201])));
}

#[test]
fn short_circuit_skips_faulting_elements() {
    // The division faults on 0, which First never reaches.
    let src = "chain f(xs: list<int>) = List(xs).Select(x => 12 / x).First()";
    assert_eq!(run(src, "f", vec![ints(&[4, 0])]), Ok(Value::Int(3)));
    assert_eq!(
        run(src, "f", vec![ints(&[0, 4])]),
        fault(Fault::DivideByZero)
    );
}
