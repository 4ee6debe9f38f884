// bind.rs — AST → chain descriptors
//
// Stands in for the host binding layer. Resolves names (lambda parameters
// shadow chain parameters), infers every call's element types, tags each call
// with its stage kind and captures its arguments. The fusion core performs no
// resolution of its own; everything it needs is in the descriptors built here.
//
// Preconditions: `program` is a well-formed AST from the parser.
// Postconditions: only chains that bound without errors are returned; the
//   tip of a `pub` chain carries `Origin::Standalone`.
// Failure modes: unknown names/sources/methods, arity and type errors,
//   duplicates and missing type arguments produce `E01xx` diagnostics.
//   Binding continues with the next chain.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{self, BinaryOp, ChainDef, ExprKind, Ident, Program, Span, TypeExpr, UnaryOp};
use crate::descriptor::{
    CallDescriptor, Capture, ChainDescriptor, Origin, ParamDecl, Role, StageKind,
};
use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic};
use crate::ir::{BinOp, Expr, Lambda, UnOp, Var};
use crate::types::Type;
use crate::value::Value;

// ── Public API ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct BindResult {
    pub chains: Vec<ChainDescriptor>,
    /// Definition span of every bound chain, by name.
    pub spans: HashMap<String, Span>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Bind every chain definition in `program`.
pub fn bind(program: &Program) -> BindResult {
    let mut result = BindResult::default();
    let mut defined: HashMap<&str, Span> = HashMap::new();

    for def in &program.chains {
        if let Some(first) = defined.get(def.name.name.as_str()) {
            result.diagnostics.push(
                Diagnostic::error(
                    def.name.span,
                    codes::E0105,
                    format!("chain `{}` is defined more than once", def.name.name),
                )
                .with_related(*first, "first defined here"),
            );
            continue;
        }
        defined.insert(&def.name.name, def.name.span);

        let mut binder = ChainBinder::default();
        let descriptor = binder.chain_def(def);
        let failed = binder.diagnostics.iter().any(Diagnostic::is_error);
        result.diagnostics.append(&mut binder.diagnostics);
        if let (Some(descriptor), false) = (descriptor, failed) {
            debug!(
                chain = %descriptor.name,
                calls = descriptor.tip.call_count(),
                "bound chain"
            );
            result.spans.insert(descriptor.name.clone(), def.span);
            result.chains.push(descriptor);
        }
    }
    result
}

// ── Binder ──────────────────────────────────────────────────────────────────

const METHODS: &[&str] = &[
    "Where", "Select", "Take", "Skip", "Distinct", "Cast", "OfType", "Concat", "Sum", "Min",
    "Max", "Count", "ToList", "ToArray", "Aggregate", "First", "Any", "All",
];

#[derive(Default)]
struct ChainBinder {
    args: HashMap<String, Type>,
    used: HashSet<String>,
    /// Lambda parameters in scope, innermost last.
    locals: Vec<(String, Type)>,
    diagnostics: Vec<Diagnostic>,
}

fn descriptor(
    kind: StageKind,
    input: Option<Type>,
    output: Type,
    args: Vec<Capture>,
) -> CallDescriptor {
    let mut d = CallDescriptor::new(kind);
    d.input_type = input;
    d.output_type = Some(output);
    d.args = args;
    d
}

fn lambda_arity(e: &ast::Expr) -> Option<usize> {
    match &e.kind {
        ExprKind::Lambda(params, _) => Some(params.len()),
        _ => None,
    }
}

fn is_comparable(t: &Type) -> bool {
    t.is_numeric() || matches!(t, Type::Str | Type::Bool)
}

impl ChainBinder {
    fn error<T>(&mut self, span: Span, code: DiagCode, message: impl Into<String>) -> Option<T> {
        self.diagnostics.push(Diagnostic::error(span, code, message));
        None
    }

    fn chain_def(&mut self, def: &ChainDef) -> Option<ChainDescriptor> {
        let mut params: Vec<ParamDecl> = Vec::new();
        for p in &def.params {
            if params.iter().any(|d| d.name == p.name.name) {
                self.error::<()>(
                    p.name.span,
                    codes::E0105,
                    format!("parameter `{}` is declared more than once", p.name.name),
                );
                continue;
            }
            if let Some(ty) = self.resolve_type(&p.ty) {
                self.args.insert(p.name.name.clone(), ty.clone());
                params.push(ParamDecl {
                    name: p.name.name.clone(),
                    ty,
                });
            }
        }

        let mut tip = self.chain(&def.body)?;
        if def.public {
            tip.origin = Origin::Standalone;
        }

        for p in &def.params {
            if !self.used.contains(&p.name.name) {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagLevel::Warning,
                        p.name.span,
                        format!("parameter `{}` is never used", p.name.name),
                    )
                    .with_code(codes::W0001),
                );
            }
        }

        Some(ChainDescriptor {
            name: def.name.name.clone(),
            params,
            tip,
        })
    }

    fn resolve_type(&mut self, t: &TypeExpr) -> Option<Type> {
        match (t.name.name.as_str(), t.args.as_slice()) {
            ("list", [elem]) => Some(Type::List(Box::new(self.resolve_type(elem)?))),
            ("seq", [elem]) => Some(Type::Seq(Box::new(self.resolve_type(elem)?))),
            (name, []) => match Type::from_name(name) {
                Some(ty) => Some(ty),
                None => self.error(t.span, codes::E0106, format!("unknown type `{name}`")),
            },
            (name, args) => self.error(
                t.span,
                codes::E0106,
                format!("`{name}` does not take {} type argument(s)", args.len()),
            ),
        }
    }

    /// The single optional type argument of a call.
    fn type_arg(&mut self, call: &ast::Call) -> Option<Option<Type>> {
        match call.type_args.as_slice() {
            [] => Some(None),
            [t] => self.resolve_type(t).map(Some),
            _ => self.error(
                call.name.span,
                codes::E0102,
                format!("`{}` takes at most one type argument", call.name.name),
            ),
        }
    }

    fn arity<'a, const N: usize>(
        &mut self,
        call: &'a ast::Call,
        span: Span,
    ) -> Option<&'a [ast::Expr; N]> {
        match call.args.as_slice().try_into() {
            Ok(args) => Some(args),
            Err(_) => self.error(
                span,
                codes::E0102,
                format!(
                    "`{}` takes {N} argument(s), found {}",
                    call.name.name,
                    call.args.len()
                ),
            ),
        }
    }

    // ── Chains ──

    fn chain(&mut self, e: &ast::Expr) -> Option<CallDescriptor> {
        match &e.kind {
            ExprKind::Call(call) => self.source(call, e.span),
            ExprKind::Method(receiver, call) => {
                let receiver = self.chain(receiver)?;
                if receiver.kind.role() == Role::Evaluation {
                    return self.error(
                        call.name.span,
                        codes::E0108,
                        format!(
                            "`{}` cannot follow the terminal `{:?}`",
                            call.name.name, receiver.kind
                        ),
                    );
                }
                self.method(receiver, call, e.span)
            }
            _ => self.error(e.span, codes::E0108, "expected a call chain starting at a source"),
        }
    }

    fn source(&mut self, call: &ast::Call, span: Span) -> Option<CallDescriptor> {
        let name = call.name.name.as_str();
        let type_arg = self.type_arg(call)?;
        if type_arg.is_some() && !matches!(name, "Empty" | "List" | "Span" | "Seq") {
            return self.error(span, codes::E0102, format!("`{name}` takes no type arguments"));
        }

        match name {
            "Range" => {
                let [start, count] = self.arity::<2>(call, span)?;
                let start = self.int_value(start);
                let count = self.int_value(count);
                let (start, count) = (start?, count?);
                Some(descriptor(
                    StageKind::Range,
                    None,
                    Type::Int,
                    vec![Capture::Value(start), Capture::Value(count)],
                ))
            }
            "Empty" => {
                self.arity::<0>(call, span)?;
                let Some(elem) = type_arg else {
                    return self.error(
                        span,
                        codes::E0104,
                        "`Empty` needs an element type: `Empty<T>()`",
                    );
                };
                let mut d = descriptor(StageKind::Empty, None, elem.clone(), Vec::new());
                d.type_arg = Some(elem);
                Some(d)
            }
            "Repeat" => {
                let [value, count] = self.arity::<2>(call, span)?;
                let value = self.value(value);
                let count = self.int_value(count);
                let ((value, elem), count) = (value?, count?);
                Some(descriptor(
                    StageKind::Repeat,
                    None,
                    elem,
                    vec![Capture::Value(value), Capture::Value(count)],
                ))
            }
            "List" | "Span" | "Seq" => {
                let [source] = self.arity::<1>(call, span)?;
                let (source, ty) = self.value(source)?;
                let elem = match (&ty, name) {
                    (Type::List(t), _) | (Type::Seq(t), "Seq") => (**t).clone(),
                    _ => {
                        let wanted = if name == "Seq" { "a list or seq" } else { "a list" };
                        return self.error(
                            span,
                            codes::E0103,
                            format!("`{name}` needs {wanted}, found `{ty}`"),
                        );
                    }
                };
                let output = match type_arg {
                    Some(t) if t != elem => {
                        return self.error(
                            span,
                            codes::E0103,
                            format!("`{name}<{t}>` over elements of type `{elem}`"),
                        )
                    }
                    Some(t) => t,
                    None => elem,
                };
                let kind = match name {
                    "List" => StageKind::WrapList,
                    "Span" => StageKind::WrapSpan,
                    _ => StageKind::WrapArbitrary,
                };
                let mut d = descriptor(kind, None, output, vec![Capture::Value(source)]);
                d.indexable = kind != StageKind::WrapArbitrary;
                Some(d)
            }
            "Concat" => {
                let [a, b] = self.arity::<2>(call, span)?;
                let a = self.concat_source(a);
                let b = self.concat_source(b);
                let (a, b) = (a?, b?);
                if a.output_type != b.output_type {
                    return self.error(
                        span,
                        codes::E0103,
                        format!(
                            "`Concat` sources produce `{}` and `{}`",
                            a.output_type.unwrap_or(Type::Object),
                            b.output_type.unwrap_or(Type::Object)
                        ),
                    );
                }
                let output = a.output_type.clone().unwrap_or(Type::Object);
                Some(descriptor(
                    StageKind::ConcatSource,
                    None,
                    output,
                    vec![Capture::Chain(Box::new(a)), Capture::Chain(Box::new(b))],
                ))
            }
            _ if METHODS.contains(&name) => self.error(
                call.name.span,
                codes::E0108,
                format!("`{name}` needs a receiver"),
            ),
            _ => self.error(call.name.span, codes::E0101, format!("unknown source `{name}`")),
        }
    }

    fn concat_source(&mut self, e: &ast::Expr) -> Option<CallDescriptor> {
        match &e.kind {
            ExprKind::Call(call) => self.source(call, e.span),
            _ => self.error(
                e.span,
                codes::E0108,
                "`Concat(a, b)` joins plain sources; append a chain with `.Concat(..)`",
            ),
        }
    }

    fn method(
        &mut self,
        receiver: CallDescriptor,
        call: &ast::Call,
        span: Span,
    ) -> Option<CallDescriptor> {
        use StageKind as K;

        let name = call.name.name.as_str();
        let input = receiver.output_type.clone().unwrap_or(Type::Object);
        let type_arg = self.type_arg(call)?;
        if type_arg.is_some() && !matches!(name, "Cast" | "OfType") {
            return self.error(span, codes::E0102, format!("`{name}` takes no type arguments"));
        }
        let elem = || input.clone();

        let (kind, output, captures) = match (name, call.args.as_slice()) {
            ("Where", [f]) => {
                let (kind, params) = match lambda_arity(f) {
                    Some(2) => (K::WhereIndexed, vec![elem(), Type::Int]),
                    _ => (K::Where, vec![elem()]),
                };
                let pred = self.predicate(f, &params)?;
                (kind, elem(), vec![Capture::Lambda(pred)])
            }
            ("Select", [f]) => {
                let (kind, params) = match lambda_arity(f) {
                    Some(2) => (K::SelectIndexed, vec![elem(), Type::Int]),
                    _ => (K::Select, vec![elem()]),
                };
                let (proj, ty) = self.lambda(f, &params)?;
                (kind, ty, vec![Capture::Lambda(proj)])
            }
            ("Take" | "Skip", [n]) => {
                let kind = if name == "Take" { K::Take } else { K::Skip };
                (kind, elem(), vec![Capture::Value(self.int_value(n)?)])
            }
            ("Distinct", []) => (K::Distinct, elem(), Vec::new()),
            ("Distinct", [f]) => {
                let (key, _) = self.lambda(f, &[elem()])?;
                (K::DistinctWithComparer, elem(), vec![Capture::Lambda(key)])
            }
            ("Cast" | "OfType", []) => {
                let Some(target) = type_arg.clone() else {
                    return self.error(
                        span,
                        codes::E0104,
                        format!("`{name}` needs a target type: `{name}<T>()`"),
                    );
                };
                let kind = if name == "Cast" { K::Cast } else { K::OfType };
                (kind, target, Vec::new())
            }
            ("Concat", [second]) => {
                let second = self.chain(second)?;
                if second.kind.role() == Role::Evaluation {
                    return self.error(
                        span,
                        codes::E0108,
                        format!("`Concat` needs a sequence, not a terminal `{:?}`", second.kind),
                    );
                }
                if second.output_type.as_ref() != Some(&input) {
                    return self.error(
                        span,
                        codes::E0103,
                        format!(
                            "`Concat` of `{input}` with `{}`",
                            second.output_type.unwrap_or(Type::Object)
                        ),
                    );
                }
                (K::Concat, elem(), vec![Capture::Chain(Box::new(second))])
            }
            ("Sum", []) => {
                let Some(acc) = input.sum_accumulator() else {
                    return self.error(
                        span,
                        codes::E0103,
                        format!("`Sum` needs numeric elements, found `{input}`"),
                    );
                };
                (K::Sum, acc, Vec::new())
            }
            ("Sum", [f]) => {
                let (selector, ty) = self.lambda(f, &[elem()])?;
                let Some(acc) = ty.sum_accumulator() else {
                    return self.error(
                        f.span,
                        codes::E0103,
                        format!("`Sum` selector must return a number, found `{ty}`"),
                    );
                };
                (K::Sum, acc, vec![Capture::Lambda(selector)])
            }
            ("Min" | "Max", args @ ([] | [_])) => {
                let kind = if name == "Min" { K::Min } else { K::Max };
                let captures = match args {
                    [f] => {
                        let (cmp, ty) = self.lambda(f, &[elem(), elem()])?;
                        if ty != Type::Int {
                            return self.error(
                                f.span,
                                codes::E0103,
                                format!("comparer must return `int`, found `{ty}`"),
                            );
                        }
                        vec![Capture::Lambda(cmp)]
                    }
                    _ if !is_comparable(&input) => {
                        return self.error(
                            span,
                            codes::E0103,
                            format!("`{name}` without a comparer over `{input}`"),
                        )
                    }
                    _ => Vec::new(),
                };
                (kind, elem(), captures)
            }
            ("Count", []) => (K::Count, Type::Int, Vec::new()),
            ("Count", [f]) => {
                let pred = self.predicate(f, &[elem()])?;
                (K::Count, Type::Int, vec![Capture::Lambda(pred)])
            }
            ("ToList", []) => (K::ToList, Type::List(Box::new(elem())), Vec::new()),
            ("ToArray", []) => (K::ToArray, Type::List(Box::new(elem())), Vec::new()),
            ("Aggregate", [f]) => {
                let (func, ty) = self.lambda(f, &[elem(), elem()])?;
                let func = self.coerce(func, &ty, &input, f.span)?;
                (K::Aggregate, elem(), vec![Capture::Lambda(func)])
            }
            ("Aggregate", [seed, f]) => {
                let (seed, acc) = self.value(seed)?;
                let (func, ty) = self.lambda(f, &[acc.clone(), elem()])?;
                let func = self.coerce(func, &ty, &acc, f.span)?;
                (
                    K::Aggregate,
                    acc,
                    vec![Capture::Value(seed), Capture::Lambda(func)],
                )
            }
            ("First", []) => (K::First, elem(), Vec::new()),
            ("First", [f]) => {
                let pred = self.predicate(f, &[elem()])?;
                (K::First, elem(), vec![Capture::Lambda(pred)])
            }
            ("Any", []) => (K::Any, Type::Bool, Vec::new()),
            ("Any", [f]) => {
                let pred = self.predicate(f, &[elem()])?;
                (K::Any, Type::Bool, vec![Capture::Lambda(pred)])
            }
            ("All", [f]) => {
                let pred = self.predicate(f, &[elem()])?;
                (K::All, Type::Bool, vec![Capture::Lambda(pred)])
            }
            (name, args) if METHODS.contains(&name) => {
                return self.error(
                    span,
                    codes::E0102,
                    format!("`{name}` does not take {} argument(s)", args.len()),
                )
            }
            (name, _) => {
                return self.error(
                    call.name.span,
                    codes::E0101,
                    format!("unknown method `{name}`"),
                )
            }
        };

        let mut d = descriptor(kind, Some(input), output, captures);
        d.type_arg = type_arg;
        d.receiver = Some(Box::new(receiver));
        Some(d)
    }

    // ── Lambdas ──

    fn lambda(&mut self, e: &ast::Expr, params: &[Type]) -> Option<(Lambda, Type)> {
        let ExprKind::Lambda(names, body) = &e.kind else {
            return self.error(e.span, codes::E0107, "expected a lambda");
        };
        if names.len() != params.len() {
            return self.error(
                e.span,
                codes::E0102,
                format!(
                    "lambda takes {} parameter(s) here, found {}",
                    params.len(),
                    names.len()
                ),
            );
        }
        let depth = self.locals.len();
        self.locals
            .extend(names.iter().map(|n| n.name.clone()).zip(params.iter().cloned()));
        let body = self.value(body);
        self.locals.truncate(depth);
        let (body, ty) = body?;
        let params = names.iter().map(|n| n.name.clone()).collect();
        Some((Lambda { params, body }, ty))
    }

    fn predicate(&mut self, e: &ast::Expr, params: &[Type]) -> Option<Lambda> {
        let (pred, ty) = self.lambda(e, params)?;
        if ty != Type::Bool {
            return self.error(
                e.span,
                codes::E0103,
                format!("predicate must return `bool`, found `{ty}`"),
            );
        }
        Some(pred)
    }

    /// Widen a lambda's result to the accumulator type.
    fn coerce(&mut self, mut func: Lambda, found: &Type, target: &Type, span: Span) -> Option<Lambda> {
        if found == target {
            return Some(func);
        }
        if found.assignable_to(target) {
            func.body = Expr::Convert(Box::new(func.body), target.clone());
            return Some(func);
        }
        self.error(
            span,
            codes::E0103,
            format!("accumulator has type `{target}` but the lambda returns `{found}`"),
        )
    }

    // ── Values ──

    fn int_value(&mut self, e: &ast::Expr) -> Option<Expr> {
        let (value, ty) = self.value(e)?;
        if ty != Type::Int {
            return self.error(e.span, codes::E0103, format!("expected `int`, found `{ty}`"));
        }
        Some(value)
    }

    fn value(&mut self, e: &ast::Expr) -> Option<(Expr, Type)> {
        match &e.kind {
            ExprKind::Int(n) => Some((Expr::Const(Value::Int(*n)), Type::Int)),
            ExprKind::Long(n) => Some((Expr::Const(Value::Long(*n)), Type::Long)),
            ExprKind::Double(n) => Some((Expr::Const(Value::Double(*n)), Type::Double)),
            ExprKind::Str(s) => Some((Expr::Const(Value::Str(s.clone())), Type::Str)),
            ExprKind::Bool(b) => Some((Expr::Const(Value::Bool(*b)), Type::Bool)),
            ExprKind::List(items) => self.list(items, e.span),
            ExprKind::Name(id) => self.name(id),
            ExprKind::Unary(op, inner) => {
                let (x, ty) = self.value(inner)?;
                match op {
                    UnaryOp::Neg if ty.is_numeric() => Some((Expr::Unary(UnOp::Neg, Box::new(x)), ty)),
                    UnaryOp::Not if ty == Type::Bool => Some((Expr::not(x), Type::Bool)),
                    UnaryOp::Neg => self.error(e.span, codes::E0103, format!("cannot negate `{ty}`")),
                    UnaryOp::Not => self.error(e.span, codes::E0103, format!("cannot apply `!` to `{ty}`")),
                }
            }
            ExprKind::Binary(op, a, b) => {
                let a = self.value(a);
                let b = self.value(b);
                let ((a, ta), (b, tb)) = (a?, b?);
                self.binary(*op, (a, ta), (b, tb), e.span)
            }
            ExprKind::Call(call) => self.builtin(call, e.span),
            ExprKind::Method(..) => self.error(
                e.span,
                codes::E0108,
                "a chain cannot be used as a value; only `Concat` takes a chain argument",
            ),
            ExprKind::Lambda(..) => self.error(e.span, codes::E0107, "a lambda is not allowed here"),
        }
    }

    fn name(&mut self, id: &Ident) -> Option<(Expr, Type)> {
        if let Some((_, ty)) = self.locals.iter().rev().find(|(n, _)| *n == id.name) {
            return Some((Expr::var(Var::Param(id.name.clone())), ty.clone()));
        }
        if let Some(ty) = self.args.get(&id.name).cloned() {
            self.used.insert(id.name.clone());
            return Some((Expr::var(Var::Arg(id.name.clone())), ty));
        }
        self.error(id.span, codes::E0100, format!("unknown name `{}`", id.name))
    }

    fn list(&mut self, items: &[ast::Expr], span: Span) -> Option<(Expr, Type)> {
        let bound: Vec<Option<(Expr, Type)>> = items.iter().map(|item| self.value(item)).collect();
        let bound: Vec<(Expr, Type)> = bound.into_iter().collect::<Option<_>>()?;

        let mut elem: Option<Type> = None;
        for (_, ty) in &bound {
            elem = Some(match elem {
                None => ty.clone(),
                Some(e) if e == *ty => e,
                Some(e) => match Type::promote(&e, ty) {
                    Some(p) => p,
                    None => {
                        return self.error(
                            span,
                            codes::E0103,
                            format!("list mixes `{e}` and `{ty}` elements"),
                        )
                    }
                },
            });
        }
        let elem = elem.unwrap_or(Type::Object);
        let exprs = bound
            .into_iter()
            .map(|(x, ty)| {
                if ty == elem {
                    x
                } else {
                    Expr::Convert(Box::new(x), elem.clone())
                }
            })
            .collect();
        Some((Expr::List(exprs), Type::List(Box::new(elem))))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        (a, ta): (Expr, Type),
        (b, tb): (Expr, Type),
        span: Span,
    ) -> Option<(Expr, Type)> {
        use BinaryOp as B;
        let numeric = Type::promote(&ta, &tb);
        let (bin, ty) = match op {
            B::Add if ta == Type::Str && tb == Type::Str => (BinOp::Add, Some(Type::Str)),
            B::Add => (BinOp::Add, numeric),
            B::Sub => (BinOp::Sub, numeric),
            B::Mul => (BinOp::Mul, numeric),
            B::Div => (BinOp::Div, numeric),
            B::Rem => (BinOp::Rem, numeric),
            B::Lt | B::Le | B::Gt | B::Ge => {
                let ok = numeric.is_some() || (ta == tb && is_comparable(&ta));
                let bin = match op {
                    B::Lt => BinOp::Lt,
                    B::Le => BinOp::Le,
                    B::Gt => BinOp::Gt,
                    _ => BinOp::Ge,
                };
                (bin, ok.then_some(Type::Bool))
            }
            B::Eq | B::Ne => {
                let ok = numeric.is_some() || ta == tb || ta == Type::Object || tb == Type::Object;
                let bin = if op == B::Eq { BinOp::Eq } else { BinOp::Ne };
                (bin, ok.then_some(Type::Bool))
            }
            B::And | B::Or => {
                let ok = ta == Type::Bool && tb == Type::Bool;
                let bin = if op == B::And { BinOp::And } else { BinOp::Or };
                (bin, ok.then_some(Type::Bool))
            }
        };
        match ty {
            Some(ty) => Some((Expr::bin(bin, a, b), ty)),
            None => self.error(
                span,
                codes::E0103,
                format!("cannot apply `{}` to `{ta}` and `{tb}`", symbol(op)),
            ),
        }
    }

    fn builtin(&mut self, call: &ast::Call, span: Span) -> Option<(Expr, Type)> {
        let name = call.name.name.as_str();
        match name {
            "abs" => {
                let [x] = self.arity::<1>(call, span)?;
                let (x, ty) = self.value(x)?;
                if !ty.is_numeric() {
                    return self.error(span, codes::E0103, format!("`abs` of `{ty}`"));
                }
                Some((Expr::Unary(UnOp::Abs, Box::new(x)), ty))
            }
            "min" | "max" => {
                let [a, b] = self.arity::<2>(call, span)?;
                let a = self.value(a);
                let b = self.value(b);
                let ((a, ta), (b, tb)) = (a?, b?);
                let Some(ty) = Type::promote(&ta, &tb) else {
                    return self.error(span, codes::E0103, format!("`{name}` of `{ta}` and `{tb}`"));
                };
                let expr = if name == "min" { Expr::min(a, b) } else { Expr::max(a, b) };
                Some((expr, ty))
            }
            "Range" | "Empty" | "Repeat" | "List" | "Span" | "Seq" | "Concat" => self.error(
                span,
                codes::E0108,
                "a chain cannot be used as a value; only `Concat` takes a chain argument",
            ),
            _ => self.error(call.name.span, codes::E0101, format!("unknown function `{name}`")),
        }
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}
