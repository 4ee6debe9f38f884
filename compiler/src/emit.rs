// emit.rs — Rust-flavoured text for fused chains
//
// Prints each `FusedChain` as a chain struct (instance fields, constructor,
// evaluation method), an iterator struct (`parent`, `current`, iterator
// fields) with `init_state`/`advance`/`dispose`, and a forwarding function
// for entry points. Output is for reading and diffing; it is not compiled.
//
// Preconditions: chains produced by `render`.
// Postconditions: output is deterministic for a given input.
// Failure modes: none.
// Side effects: none.

use std::fmt::Write as _;

use crate::ir::{BinOp, Expr, FailKind, Intrinsic, Receiver, Stmt, UnOp, Var};
use crate::pipeline::Provenance;
use crate::render::{FieldScope, FusedChain};
use crate::value::Value;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Prefix output with compiler version and input hashes.
    pub provenance: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { provenance: true }
    }
}

#[derive(Debug)]
pub struct GeneratedCode {
    pub rust_source: String,
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn emit(
    chains: &[FusedChain],
    provenance: Option<&Provenance>,
    options: &CompileOptions,
) -> GeneratedCode {
    let mut out = String::new();
    if let (true, Some(p)) = (options.provenance, provenance) {
        let _ = writeln!(out, "// Generated by lfc {}. Do not edit.", p.compiler_version);
        let _ = writeln!(out, "// source: sha256:{}", p.source_hash_hex());
        let _ = writeln!(out, "// descriptors: sha256:{}", p.descriptor_fingerprint_hex());
        out.push('\n');
    }
    for (i, chain) in chains.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&emit_chain(chain));
    }
    GeneratedCode { rust_source: out }
}

/// Text of one fused chain.
pub fn emit_chain(chain: &FusedChain) -> String {
    let ty = type_name(&chain.name);
    let iter_ty = format!("{ty}Iter");
    let mut p = Printer::new();

    let stages: Vec<String> = chain
        .stages
        .iter()
        .map(|s| format!("{}#{}", s.kind, s.id.0))
        .collect();
    p.line(format!("// chain `{}`: {}", chain.name, stages.join(" -> ")));
    let count = chain
        .static_count
        .map_or_else(|| "unknown".to_string(), |c| c.to_string());
    p.line(format!("// loops: {}, static count: {count}", chain.loop_count));

    // Chain struct.
    p.line(format!("pub struct {ty} {{"));
    p.indented(|p| {
        for f in chain.fields.iter().filter(|f| f.scope == FieldScope::Instance) {
            p.line(format!("{}: {},", f.name, f.ty.rust_name()));
        }
    });
    p.line("}");
    p.blank();

    p.line(format!("impl {ty} {{"));
    p.indented(|p| {
        let params = param_list(chain);
        p.line(format!("pub fn new({params}) -> Self {{"));
        p.indented(|p| {
            p.line("let mut this = Self::default();");
            p.with_source("this", |p| p.block(&chain.ctor));
            p.line("this");
        });
        p.line("}");
        p.blank();

        p.line(format!("pub fn iter(&self) -> {iter_ty}<'_> {{"));
        p.indented(|p| p.line(format!("{iter_ty}::new(self)")));
        p.line("}");

        if let Some(eval) = &chain.evaluation {
            p.blank();
            p.line(format!(
                "pub fn {}(&self) -> Result<{}, Fault> {{",
                snake_case(eval.kind),
                eval.ret.rust_name()
            ));
            p.indented(|p| {
                p.with_source("self", |p| p.block(&eval.body));
            });
            p.line("}");
        }
    });
    p.line("}");
    p.blank();

    // Iterator struct.
    let element = chain.element.rust_name();
    p.line(format!("pub struct {iter_ty}<'a> {{"));
    p.indented(|p| {
        p.line(format!("parent: &'a {ty},"));
        p.line("state: IterState,");
        p.line(format!("current: {element},"));
        for f in chain.fields.iter().filter(|f| f.scope == FieldScope::Iterator) {
            p.line(format!("{}: {},", f.name, f.ty.rust_name()));
        }
    });
    p.line("}");
    p.blank();

    p.line(format!("impl {iter_ty}<'_> {{"));
    p.indented(|p| {
        p.line("fn init_state(&mut self) {");
        p.indented(|p| p.block(&chain.iterator.init));
        p.line("}");
        p.blank();
        p.line("fn advance(&mut self) -> Result<bool, Fault> {");
        p.indented(|p| {
            p.block(&chain.iterator.step);
            p.line("Ok(false)");
        });
        p.line("}");
        p.blank();
        p.line("fn dispose(&mut self) {");
        p.indented(|p| p.block(&chain.iterator.dispose));
        p.line("}");
    });
    p.line("}");

    if let Some(entry) = &chain.entry_point {
        let params = param_list(chain);
        let args: Vec<&str> = entry.params.iter().map(|p| p.name.as_str()).collect();
        p.blank();
        match &chain.evaluation {
            Some(eval) => {
                p.line(format!(
                    "pub fn {}({params}) -> Result<{}, Fault> {{",
                    entry.name,
                    entry.ret.rust_name()
                ));
                p.indented(|p| {
                    p.line(format!(
                        "{ty}::new({}).{}()",
                        args.join(", "),
                        snake_case(eval.kind)
                    ))
                });
            }
            None => {
                p.line(format!("pub fn {}({params}) -> {ty} {{", entry.name));
                p.indented(|p| p.line(format!("{ty}::new({})", args.join(", "))));
            }
        }
        p.line("}");
    }

    p.out
}

fn param_list(chain: &FusedChain) -> String {
    chain
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, p.ty.rust_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `dedup_list` → `DedupList`.
fn type_name(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|c| c.to_ascii_uppercase().to_string() + chars.as_str())
                .unwrap_or_default()
        })
        .collect()
}

/// `ToList` → `to_list`.
fn snake_case(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ── Printer ─────────────────────────────────────────────────────────────────

struct Printer {
    out: String,
    depth: usize,
    /// Spelling of `Receiver::Source` in the current body.
    source: &'static str,
}

impl Printer {
    fn new() -> Self {
        Printer {
            out: String::new(),
            depth: 0,
            source: "self",
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn indented(&mut self, f: impl FnOnce(&mut Self)) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    fn with_source(&mut self, spelling: &'static str, f: impl FnOnce(&mut Self)) {
        let saved = std::mem::replace(&mut self.source, spelling);
        f(self);
        self.source = saved;
    }

    fn block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let(v, ty, e) => {
                let line = format!("let mut {}: {} = {};", self.var(v), ty.rust_name(), self.expr(e));
                self.line(line);
            }
            Stmt::Assign(v, e) => {
                let line = format!("{} = {};", self.var(v), self.expr(e));
                self.line(line);
            }
            Stmt::Eval(e) => {
                let line = format!("{};", self.expr(e));
                self.line(line);
            }
            Stmt::If(cond, then, els) => {
                let head = format!("if {} {{", self.expr(cond));
                self.line(head);
                self.indented(|p| p.block(then));
                if els.is_empty() {
                    self.line("}");
                } else {
                    self.line("} else {");
                    self.indented(|p| p.block(els));
                    self.line("}");
                }
            }
            Stmt::While(cond, body) => {
                let head = format!("while {} {{", self.expr(cond));
                self.line(head);
                self.indented(|p| p.block(body));
                self.line("}");
            }
            Stmt::Continue => self.line("continue;"),
            Stmt::Break => self.line("break;"),
            Stmt::Return(e) => {
                let line = format!("return Ok({});", self.expr(e));
                self.line(line);
            }
            Stmt::Yield(e) => {
                let line = format!("self.current = {};", self.expr(e));
                self.line(line);
                self.line("return Ok(true);");
            }
            Stmt::Fail(kind) => {
                let message = match kind {
                    FailKind::NoElements => "NO_ELEMENTS",
                    FailKind::NoMatch => "NO_MATCH",
                };
                self.line(format!("return Err(Fault::InvalidOperation({message}));"));
            }
            Stmt::Guarded { body, finally } => {
                self.line("let outcome = (|| {");
                self.indented(|p| p.block(body));
                self.line("})();");
                self.block(finally);
                self.line("outcome");
            }
        }
    }

    fn var(&self, v: &Var) -> String {
        match v {
            Var::Local(n) => n.clone(),
            Var::Field(Receiver::State, n) => format!("self.{n}"),
            Var::Field(Receiver::Parent, n) => format!("self.parent.{n}"),
            Var::Field(Receiver::Source, n) => format!("{}.{n}", self.source),
            Var::Current => "current".into(),
            Var::Param(n) | Var::Arg(n) | Var::Stage(n) => n.clone(),
        }
    }

    /// Operand position: binary subexpressions get parentheses.
    fn operand(&self, e: &Expr) -> String {
        match e {
            Expr::Binary(..) | Expr::Convert(..) => format!("({})", self.expr(e)),
            _ => self.expr(e),
        }
    }

    fn expr(&self, e: &Expr) -> String {
        match e {
            Expr::Const(v) => literal(v),
            Expr::Var(v) => self.var(v),
            Expr::List(items) => format!("vec![{}]", self.args(items)),
            Expr::Unary(UnOp::Neg, x) => format!("-{}", self.operand(x)),
            Expr::Unary(UnOp::Not, x) => format!("!{}", self.operand(x)),
            Expr::Unary(UnOp::Abs, x) => format!("{}.abs()", self.operand(x)),
            Expr::Binary(op, a, b) => {
                let (a, b) = (self.operand(a), self.operand(b));
                match op {
                    BinOp::LtU => format!("({a} as u32) < ({b} as u32)"),
                    BinOp::GeU => format!("({a} as u32) >= ({b} as u32)"),
                    BinOp::Min => format!("{a}.min({b})"),
                    BinOp::Max => format!("{a}.max({b})"),
                    _ => format!("{a} {} {b}", infix(*op)),
                }
            }
            Expr::PreInc(v) => {
                let v = self.var(v);
                format!("{{ {v} += 1; {v} }}")
            }
            Expr::Call(f, args) => self.call(*f, args),
            Expr::Is(x, ty) => format!("{}.is::<{}>()", self.operand(x), ty.rust_name()),
            Expr::Cast(x, ty) => format!("{}.cast::<{}>()?", self.operand(x), ty.rust_name()),
            Expr::Convert(x, ty) => format!("{} as {}", self.operand(x), ty.rust_name()),
        }
    }

    fn args(&self, args: &[Expr]) -> String {
        args.iter().map(|a| self.expr(a)).collect::<Vec<_>>().join(", ")
    }

    fn call(&self, f: Intrinsic, args: &[Expr]) -> String {
        let recv = args.first().map(|a| self.operand(a)).unwrap_or_default();
        let rest = args.get(1..).map(|r| self.args(r)).unwrap_or_default();
        match f {
            Intrinsic::Len => format!("{recv}.len() as i32"),
            Intrinsic::Index => format!("{recv}[{rest} as usize].clone()"),
            Intrinsic::Compare => format!("compare(&{recv}, &{rest})"),
            Intrinsic::SetNew => "DedupSet::new()".into(),
            Intrinsic::SetInsert => format!("{recv}.insert({rest})"),
            Intrinsic::SetRelease => format!("{recv}.release()"),
            Intrinsic::ListNew => format!("PooledList::create(pool(), {recv} as usize)"),
            Intrinsic::ListPush => format!("{recv}.append({rest})?"),
            Intrinsic::ListFinish => format!("{recv}.finalize()"),
            Intrinsic::ListRelease => format!("{recv}.dispose()"),
            Intrinsic::SeqOpen => format!("SeqCursor::open({recv}.clone())"),
            Intrinsic::SeqAdvance => format!("{recv}.advance()"),
            Intrinsic::SeqCurrent => format!("{recv}.current()"),
            Intrinsic::SeqClose => format!("{recv}.close()"),
        }
    }
}

fn infix(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt | BinOp::LtU => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge | BinOp::GeU => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::Min => "min",
        BinOp::Max => "max",
    }
}

fn literal(v: &Value) -> String {
    match v {
        Value::Null => "Value::Null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Long(n) => format!("{n}i64"),
        Value::Double(n) if n.fract() == 0.0 && n.is_finite() => format!("{n:.1}"),
        Value::Double(n) => n.to_string(),
        Value::Str(s) => format!("{s:?}.to_string()"),
        Value::List(items) => format!(
            "vec![{}]",
            items.iter().map(literal).collect::<Vec<_>>().join(", ")
        ),
    }
}
