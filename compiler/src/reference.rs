// reference.rs — Stage-by-stage reference model
//
// Runs an assembled chain the unfused way: every stage is an independent
// lazy iterator adapter over its upstream, exactly one per operator. Fused
// results are checked against this model.
//
// Preconditions: chain produced by `assemble`.
// Postconditions: same elements, same order, and same terminal faults as the
//   fused form. Take pulls one element past its bound before stopping, like
//   the fused counter, so a fault on that element surfaces in both.
// Failure modes: `ExecError` for faults and bad arguments.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::exec::ExecError;
use crate::instr::{Chain, Evaluation, Generation, Node, Operation, Pipeline};
use crate::ir::{BinOp, Expr, Intrinsic, Lambda, Var};
use crate::types::Type;
use crate::value::{Fault, Key, Value, NO_ELEMENTS, NO_MATCH};

type Result<T> = std::result::Result<T, ExecError>;
type Stream<'a> = Box<dyn Iterator<Item = Result<Value>> + 'a>;

/// Chain arguments by name.
pub struct Env {
    args: HashMap<String, Value>,
}

impl Env {
    /// Bind positional `args` to the chain's parameters.
    pub fn bind(chain: &Chain, args: Vec<Value>) -> Result<Env> {
        if args.len() != chain.params.len() {
            return Err(ExecError::Arity {
                chain: chain.name.clone(),
                expected: chain.params.len(),
                found: args.len(),
            });
        }
        let mut bound = HashMap::new();
        for (p, v) in chain.params.iter().zip(args) {
            bound.insert(p.name.clone(), v.convert(&p.ty)?);
        }
        Ok(Env { args: bound })
    }

    fn eval(&self, expr: &Expr, params: &HashMap<&str, Value>) -> Result<Value> {
        let eval = |e: &Expr| self.eval(e, params);
        match expr {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Var(Var::Param(p)) => params
                .get(p.as_str())
                .cloned()
                .ok_or_else(|| ExecError::Unbound(p.clone())),
            Expr::Var(Var::Arg(a)) => self
                .args
                .get(a)
                .cloned()
                .ok_or_else(|| ExecError::Unbound(a.clone())),
            Expr::Var(other) | Expr::PreInc(other) => Err(ExecError::Placeholder(other.clone())),
            Expr::List(items) => Ok(Value::List(items.iter().map(eval).collect::<Result<_>>()?)),
            Expr::Unary(op, e) => Ok(Value::unary(*op, &eval(e)?)?),
            Expr::Binary(BinOp::And, a, b) => {
                Ok(Value::Bool(eval(a)?.as_bool()? && eval(b)?.as_bool()?))
            }
            Expr::Binary(BinOp::Or, a, b) => {
                Ok(Value::Bool(eval(a)?.as_bool()? || eval(b)?.as_bool()?))
            }
            Expr::Binary(op, a, b) => Ok(Value::binary(*op, &eval(a)?, &eval(b)?)?),
            Expr::Call(Intrinsic::Len, args) if args.len() == 1 => {
                let len = eval(&args[0])?.as_list()?.len();
                Ok(Value::Int(i32::try_from(len).unwrap_or(i32::MAX)))
            }
            Expr::Call(Intrinsic::Compare, args) if args.len() == 2 => {
                Ok(Value::Int(eval(&args[0])?.compare(&eval(&args[1])?)? as i32))
            }
            Expr::Call(Intrinsic::Index, args) if args.len() == 2 => {
                let list = eval(&args[0])?;
                let i = eval(&args[1])?.as_int()?;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| list.as_list().ok()?.get(i).cloned())
                    .ok_or_else(|| Fault::InvalidOperation("index was out of range").into())
            }
            Expr::Call(f, _) => Err(ExecError::ResourceInExpression(f.name())),
            Expr::Is(e, ty) => Ok(Value::Bool(eval(e)?.is_type(ty))),
            Expr::Cast(e, ty) => Ok(eval(e)?.cast(ty)?),
            Expr::Convert(e, ty) => Ok(eval(e)?.convert(ty)?),
        }
    }

    fn apply(&self, lambda: &Lambda, args: &[Value]) -> Result<Value> {
        let params = lambda
            .params
            .iter()
            .map(String::as_str)
            .zip(args.iter().cloned())
            .collect();
        self.eval(&lambda.body, &params)
    }

    fn test(&self, lambda: &Lambda, args: &[Value]) -> Result<bool> {
        Ok(self.apply(lambda, args)?.as_bool()?)
    }

    fn constant(&self, expr: &Expr) -> Result<Value> {
        self.eval(expr, &HashMap::new())
    }

    fn count(&self, expr: &Expr) -> Result<usize> {
        Ok(usize::try_from(self.constant(expr)?.as_int()?).unwrap_or(0))
    }
}

fn index_value(i: usize) -> Value {
    Value::Int(i32::try_from(i).unwrap_or(i32::MAX))
}

// ── Sources ──

fn source<'a>(node: &'a Node<Generation>, env: &'a Env) -> Result<Stream<'a>> {
    Ok(match &node.kind {
        Generation::Range { start, count } => {
            let start = env.constant(start)?.as_int()?;
            let count = env.count(count)?;
            Box::new((0..count).map(move |i| Ok(Value::Int(start.wrapping_add(i as i32)))))
        }
        Generation::Empty => Box::new(std::iter::empty()),
        Generation::Repeat { value, count } => {
            let value = env.constant(value)?;
            Box::new(std::iter::repeat(value).take(env.count(count)?).map(Ok))
        }
        Generation::WrapList { source }
        | Generation::WrapSpan { source }
        | Generation::WrapArbitrary { source } => {
            let items = env.constant(source)?.as_list()?.to_vec();
            Box::new(items.into_iter().map(Ok))
        }
        Generation::Concat(a, b) => Box::new(source(a, env)?.chain(source(b, env)?)),
    })
}

// ── Operations ──

/// Keep elements where `keep` holds, passing errors through.
fn filter<'a>(
    input: Stream<'a>,
    mut keep: impl FnMut(&Value) -> Result<bool> + 'a,
) -> Stream<'a> {
    Box::new(input.filter_map(move |item| match item.and_then(|x| Ok((keep(&x)?, x))) {
        Ok((true, x)) => Some(Ok(x)),
        Ok((false, _)) => None,
        Err(e) => Some(Err(e)),
    }))
}

/// Count elements as they are pulled. `decide(seen, bound)` yields the
/// element (`Some(true)`), drops it (`Some(false)`) or ends the stream
/// (`None`). Faults pass through uncounted.
fn counted<'a>(
    mut input: Stream<'a>,
    bound: usize,
    decide: impl Fn(usize, usize) -> Option<bool> + 'a,
) -> Stream<'a> {
    let mut seen = 0usize;
    let mut done = false;
    Box::new(std::iter::from_fn(move || {
        while !done {
            let item = input.next()?;
            if item.is_err() {
                return Some(item);
            }
            match decide(seen, bound) {
                Some(keep) => {
                    seen += 1;
                    if keep {
                        return Some(item);
                    }
                }
                None => done = true,
            }
        }
        None
    }))
}

fn operation<'a>(op: &'a Node<Operation>, input: Stream<'a>, env: &'a Env) -> Result<Stream<'a>> {
    Ok(match &op.kind {
        Operation::Where(pred) => filter(input, move |x| env.test(pred, &[x.clone()])),
        Operation::WhereIndexed(pred) => {
            let mut i = 0usize;
            filter(input, move |x| {
                let keep = env.test(pred, &[x.clone(), index_value(i)]);
                i += 1;
                keep
            })
        }
        Operation::Select(proj) => {
            Box::new(input.map(move |item| item.and_then(|x| env.apply(proj, &[x]))))
        }
        Operation::SelectIndexed(proj) => Box::new(
            input
                .enumerate()
                .map(move |(i, item)| item.and_then(|x| env.apply(proj, &[x, index_value(i)]))),
        ),
        Operation::Take(n) => {
            counted(input, env.count(n)?, |passed, take| (passed < take).then_some(true))
        }
        Operation::Skip(n) => counted(input, env.count(n)?, |passed, skip| Some(passed >= skip)),
        Operation::Distinct => {
            let mut seen = HashSet::new();
            filter(input, move |x| Ok(seen.insert(Key(x.clone()))))
        }
        Operation::DistinctBy(key) => {
            let mut seen = HashSet::new();
            filter(input, move |x| Ok(seen.insert(Key(env.apply(key, &[x.clone()])?))))
        }
        Operation::Cast(ty) => {
            let ty = ty.clone();
            Box::new(input.map(move |item| Ok(item?.cast(&ty)?)))
        }
        Operation::OfType(ty) => filter(input, move |x| Ok(x.is_type(ty))),
        Operation::Concat(second) => Box::new(input.chain(pipeline(second, env)?)),
    })
}

fn pipeline<'a>(p: &'a Pipeline, env: &'a Env) -> Result<Stream<'a>> {
    let mut stream = source(&p.generation, env)?;
    for op in &p.operations {
        stream = operation(op, stream, env)?;
    }
    Ok(stream)
}

// ── Evaluations ──

fn no_elements() -> ExecError {
    Fault::InvalidOperation(NO_ELEMENTS).into()
}

fn extreme(
    input: Stream<'_>,
    comparer: &Option<Lambda>,
    replace_when: std::cmp::Ordering,
    env: &Env,
) -> Result<Value> {
    let mut best: Option<Value> = None;
    for item in input {
        let x = item?;
        best = Some(match best {
            None => x,
            Some(b) => {
                let ord = match comparer {
                    Some(c) => env.apply(c, &[b.clone(), x.clone()])?.as_int()?.cmp(&0),
                    None => b.compare(&x)?,
                };
                if ord == replace_when {
                    x
                } else {
                    b
                }
            }
        });
    }
    best.ok_or_else(no_elements)
}

fn evaluate(eval: &Node<Evaluation>, input: Stream<'_>, env: &Env) -> Result<Value> {
    let out: &Type = &eval.output;
    match &eval.kind {
        Evaluation::Sum(selector) => {
            let mut sum = Value::default_for(out);
            for item in input {
                let x = item?;
                let x = match selector {
                    Some(s) => env.apply(s, &[x])?,
                    None => x,
                };
                sum = Value::binary(BinOp::Add, &sum, &x.convert(out)?)?;
            }
            Ok(sum)
        }
        Evaluation::Count(pred) => {
            let mut count = 0i32;
            for item in input {
                let x = item?;
                if pred.as_ref().map_or(Ok(true), |p| env.test(p, &[x]))? {
                    count = count.wrapping_add(1);
                }
            }
            Ok(Value::Int(count))
        }
        Evaluation::Min(cmp) => extreme(input, cmp, std::cmp::Ordering::Greater, env),
        Evaluation::Max(cmp) => extreme(input, cmp, std::cmp::Ordering::Less, env),
        Evaluation::ToList | Evaluation::ToArray => {
            Ok(Value::List(input.collect::<Result<Vec<_>>>()?))
        }
        Evaluation::Aggregate { seed, func } => {
            let mut acc = match seed {
                Some(s) => Some(env.constant(s)?),
                None => None,
            };
            for item in input {
                let x = item?;
                acc = Some(match acc {
                    Some(a) => env.apply(func, &[a, x])?,
                    None => x,
                });
            }
            acc.ok_or_else(no_elements)
        }
        Evaluation::First(pred) => {
            for item in input {
                let x = item?;
                if pred.as_ref().map_or(Ok(true), |p| env.test(p, &[x.clone()]))? {
                    return Ok(x);
                }
            }
            let message = if pred.is_some() { NO_MATCH } else { NO_ELEMENTS };
            Err(Fault::InvalidOperation(message).into())
        }
        Evaluation::Any(pred) => {
            for item in input {
                let x = item?;
                if pred.as_ref().map_or(Ok(true), |p| env.test(p, &[x]))? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Evaluation::All(pred) => {
            for item in input {
                if !env.test(pred, &[item?])? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
    }
}

/// Run `chain` unfused: the evaluation result, or the elements as a list.
pub fn run(chain: &Chain, args: Vec<Value>) -> Result<Value> {
    let env = Env::bind(chain, args)?;
    let stream = pipeline(&chain.pipeline, &env)?;
    match &chain.evaluation {
        Some(eval) => evaluate(eval, stream, &env),
        None => Ok(Value::List(stream.collect::<Result<Vec<_>>>()?)),
    }
}
