// exec.rs — Executes rendered chains
//
// A tree-walking machine over the rendered IR. It is the runtime half of the
// fused iterator: `FusedChain::instantiate` runs the constructor and yields
// an `Instance` holding the per-instance fields; `Instance::iter` creates a
// `FusedIter` owning the per-iterator state; `Instance::evaluate` runs the
// evaluation body with iterator fields as locals.
//
// Iterator lifecycle: Created → (first advance runs `init`) Iterating →
// Exhausted | Disposed. `dispose` runs the teardown block only if `init` ran,
// at most once, and again never; dropping the iterator disposes it.
//
// Preconditions: the chain came from `render` (no placeholders survive).
// Postconditions: every resource acquired is released exactly once when the
//   body disposes properly; acquisitions and releases are logged as events.
// Failure modes: `ExecError::Fault` for generated-code faults; other
//   variants for malformed bodies or bad arguments.
// Side effects: rents buffers from the injected `ArrayPool`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{trace, warn};

use crate::ir::{BinOp, Expr, FailKind, Intrinsic, Receiver, Stmt, Var};
use crate::pool::{ArrayPool, DedupSet, PooledList, SeqCursor};
use crate::render::FusedChain;
use crate::value::{Fault, Value, NO_ELEMENTS, NO_MATCH};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("unbound variable `{0}`")]
    Unbound(String),
    #[error("placeholder `{0:?}` reached the machine")]
    Placeholder(Var),
    #[error("field `{0}` is read-only here")]
    ReadOnly(String),
    #[error("`{name}` holds a {found}, expected {expected}")]
    SlotKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("`{0}` creates a resource and must be assigned directly")]
    ResourceInExpression(&'static str),
    #[error("`{0}` needs a variable as its first argument")]
    ResourceOperand(&'static str),
    #[error("`{0}` outside of a loop")]
    StrayJump(&'static str),
    #[error("`yield` outside of an iterator body")]
    YieldOutsideIterator,
    #[error("evaluation body finished without returning")]
    MissingReturn,
    #[error("chain `{0}` has no evaluation")]
    NoEvaluation(String),
    #[error("chain `{chain}` takes {expected} argument(s), {found} given")]
    Arity {
        chain: String,
        expected: usize,
        found: usize,
    },
}

type Result<T> = std::result::Result<T, ExecError>;

// ── Resource events ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Set,
    List,
    Cursor,
}

/// A resource acquisition or release, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquired { kind: ResourceKind, name: String },
    Released { kind: ResourceKind, name: String },
}

// ── Slots ──

enum Slot {
    Value(Value),
    Set(DedupSet),
    List(PooledList),
    Cursor(SeqCursor),
}

impl Slot {
    fn describe(&self) -> &'static str {
        match self {
            Slot::Value(_) => "value",
            Slot::Set(_) => "set",
            Slot::List(_) => "collector",
            Slot::Cursor(_) => "cursor",
        }
    }
}

type Fields = HashMap<String, Value>;
type State = HashMap<String, Slot>;

/// Control transfer out of a block.
enum Flow {
    Normal,
    Continue,
    Break,
    Return(Value),
    Yield(Value),
}

fn var_name(var: &Var) -> String {
    match var {
        Var::Local(n) | Var::Field(_, n) => n.clone(),
        other => format!("{other:?}"),
    }
}

// ── Machine ──

struct Machine<'a> {
    instance: Cow<'a, Fields>,
    state: Option<&'a mut State>,
    locals: State,
    pool: &'a Arc<dyn ArrayPool>,
    events: &'a mut Vec<Event>,
}

impl Machine<'_> {
    fn slot(&self, var: &Var) -> Result<&Slot> {
        let found = match var {
            Var::Local(name) => self.locals.get(name),
            Var::Field(Receiver::State, name) => self.state.as_deref().and_then(|s| s.get(name)),
            Var::Field(_, _) => None,
            other => return Err(ExecError::Placeholder(other.clone())),
        };
        found.ok_or_else(|| ExecError::Unbound(var_name(var)))
    }

    fn slot_mut(&mut self, var: &Var) -> Result<&mut Slot> {
        let found = match var {
            Var::Local(name) => self.locals.get_mut(name),
            Var::Field(Receiver::State, name) => {
                self.state.as_deref_mut().and_then(|s| s.get_mut(name))
            }
            Var::Field(_, name) => return Err(ExecError::ReadOnly(name.clone())),
            other => return Err(ExecError::Placeholder(other.clone())),
        };
        found.ok_or_else(|| ExecError::Unbound(var_name(var)))
    }

    fn read(&self, var: &Var) -> Result<Value> {
        if let Var::Field(Receiver::Parent | Receiver::Source, name) = var {
            return self
                .instance
                .get(name)
                .cloned()
                .ok_or_else(|| ExecError::Unbound(name.clone()));
        }
        match self.slot(var)? {
            Slot::Value(v) => Ok(v.clone()),
            other => Err(ExecError::SlotKind {
                name: var_name(var),
                expected: "value",
                found: other.describe(),
            }),
        }
    }

    fn store(&mut self, var: &Var, slot: Slot) -> Result<()> {
        match var {
            Var::Local(name) => {
                self.locals.insert(name.clone(), slot);
            }
            Var::Field(Receiver::State, name) => match self.state.as_deref_mut() {
                Some(state) => {
                    state.insert(name.clone(), slot);
                }
                None => return Err(ExecError::Unbound(name.clone())),
            },
            Var::Field(_, name) => {
                let Cow::Owned(fields) = &mut self.instance else {
                    return Err(ExecError::ReadOnly(name.clone()));
                };
                let found = slot.describe();
                let Slot::Value(value) = slot else {
                    return Err(ExecError::SlotKind {
                        name: name.clone(),
                        expected: "value",
                        found,
                    });
                };
                fields.insert(name.clone(), value);
            }
            other => return Err(ExecError::Placeholder(other.clone())),
        }
        Ok(())
    }

    fn record(&mut self, event: Event) {
        trace!(?event, "resource");
        self.events.push(event);
    }

    // ── Statements ──

    fn exec_block(&mut self, block: &[Stmt]) -> Result<Flow> {
        for stmt in block {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Let(var, _, expr) | Stmt::Assign(var, expr) => {
                let slot = self.eval_slot(var, expr)?;
                self.store(var, slot)?;
            }
            Stmt::Eval(expr) => {
                self.eval(expr)?;
            }
            Stmt::If(cond, then, els) => {
                let branch = if self.eval(cond)?.as_bool()? { then } else { els };
                return self.exec_block(branch);
            }
            Stmt::While(cond, body) => {
                while self.eval(cond)?.as_bool()? {
                    match self.exec_block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow => return Ok(flow),
                    }
                }
            }
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Return(expr) => return Ok(Flow::Return(self.eval(expr)?)),
            Stmt::Yield(expr) => return Ok(Flow::Yield(self.eval(expr)?)),
            Stmt::Fail(kind) => {
                let message = match kind {
                    FailKind::NoElements => NO_ELEMENTS,
                    FailKind::NoMatch => NO_MATCH,
                };
                return Err(Fault::InvalidOperation(message).into());
            }
            Stmt::Guarded { body, finally } => {
                let outcome = self.exec_block(body);
                let cleanup = self.exec_block(finally);
                return match (outcome, cleanup) {
                    (Err(e), _) => Err(e),
                    (Ok(_), Err(e)) => Err(e),
                    (Ok(flow), Ok(_)) => Ok(flow),
                };
            }
        }
        Ok(Flow::Normal)
    }

    /// Value for an assignment; resource constructors yield resource slots.
    fn eval_slot(&mut self, target: &Var, expr: &Expr) -> Result<Slot> {
        let Expr::Call(f, args) = expr else {
            return Ok(Slot::Value(self.eval(expr)?));
        };
        let (kind, slot) = match f {
            Intrinsic::SetNew => (ResourceKind::Set, Slot::Set(DedupSet::new())),
            Intrinsic::ListNew => {
                let hint = match args.first() {
                    Some(e) => usize::try_from(self.eval(e)?.as_int()?).unwrap_or(0),
                    None => 0,
                };
                (
                    ResourceKind::List,
                    Slot::List(PooledList::create(Arc::clone(self.pool), hint)),
                )
            }
            Intrinsic::SeqOpen => {
                let source = match args.first() {
                    Some(e) => self.eval(e)?,
                    None => Value::List(Vec::new()),
                };
                let items = source.as_list()?.to_vec();
                (ResourceKind::Cursor, Slot::Cursor(SeqCursor::open(items)))
            }
            _ => return Ok(Slot::Value(self.eval(expr)?)),
        };
        self.record(Event::Acquired {
            kind,
            name: var_name(target),
        });
        Ok(slot)
    }

    // ── Expressions ──

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Var(var) => self.read(var),
            Expr::List(items) => Ok(Value::List(
                items.iter().map(|e| self.eval(e)).collect::<Result<_>>()?,
            )),
            Expr::Unary(op, e) => Ok(Value::unary(*op, &self.eval(e)?)?),
            Expr::Binary(BinOp::And, a, b) => {
                let lhs = self.eval(a)?.as_bool()?;
                Ok(Value::Bool(lhs && self.eval(b)?.as_bool()?))
            }
            Expr::Binary(BinOp::Or, a, b) => {
                let lhs = self.eval(a)?.as_bool()?;
                Ok(Value::Bool(lhs || self.eval(b)?.as_bool()?))
            }
            Expr::Binary(op, a, b) => {
                let (a, b) = (self.eval(a)?, self.eval(b)?);
                Ok(Value::binary(*op, &a, &b)?)
            }
            Expr::PreInc(var) => {
                let next = Value::Int(self.read(var)?.as_int()?.wrapping_add(1));
                self.store(var, Slot::Value(next.clone()))?;
                Ok(next)
            }
            Expr::Call(f, args) => self.call(*f, args),
            Expr::Is(e, ty) => Ok(Value::Bool(self.eval(e)?.is_type(ty))),
            Expr::Cast(e, ty) => Ok(self.eval(e)?.cast(ty)?),
            Expr::Convert(e, ty) => Ok(self.eval(e)?.convert(ty)?),
        }
    }

    fn resource_var(f: Intrinsic, args: &[Expr]) -> Result<&Var> {
        match args.first() {
            Some(Expr::Var(v)) => Ok(v),
            _ => Err(ExecError::ResourceOperand(f.name())),
        }
    }

    fn arg(&mut self, args: &[Expr], i: usize) -> Result<Value> {
        match args.get(i) {
            Some(e) => self.eval(e),
            None => Ok(Value::Null),
        }
    }

    fn call(&mut self, f: Intrinsic, args: &[Expr]) -> Result<Value> {
        match f {
            Intrinsic::Len => {
                let len = self.arg(args, 0)?.as_list()?.len();
                Ok(Value::Int(i32::try_from(len).unwrap_or(i32::MAX)))
            }
            Intrinsic::Index => {
                let list = self.arg(args, 0)?;
                let i = self.arg(args, 1)?.as_int()?;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| list.as_list().ok()?.get(i).cloned())
                    .ok_or_else(|| Fault::InvalidOperation("index was out of range").into())
            }
            Intrinsic::Compare => {
                let (a, b) = (self.arg(args, 0)?, self.arg(args, 1)?);
                Ok(Value::Int(a.compare(&b)? as i32))
            }
            Intrinsic::SetNew | Intrinsic::ListNew | Intrinsic::SeqOpen => {
                Err(ExecError::ResourceInExpression(f.name()))
            }
            Intrinsic::SetInsert => {
                let value = self.arg(args, 1)?;
                let var = Self::resource_var(f, args)?;
                match self.slot_mut(var)? {
                    Slot::Set(set) => Ok(Value::Bool(set.insert(value))),
                    other => Err(wrong_slot(var, "set", other)),
                }
            }
            Intrinsic::ListPush => {
                let value = self.arg(args, 1)?;
                let var = Self::resource_var(f, args)?;
                match self.slot_mut(var)? {
                    Slot::List(list) => {
                        list.append(value)?;
                        Ok(Value::Null)
                    }
                    other => Err(wrong_slot(var, "collector", other)),
                }
            }
            Intrinsic::ListFinish => {
                let var = Self::resource_var(f, args)?;
                match self.slot(var)? {
                    Slot::List(list) => Ok(Value::List(list.finalize())),
                    other => Err(wrong_slot(var, "collector", other)),
                }
            }
            Intrinsic::SeqAdvance => {
                let var = Self::resource_var(f, args)?;
                match self.slot_mut(var)? {
                    Slot::Cursor(c) => Ok(Value::Bool(c.advance())),
                    other => Err(wrong_slot(var, "cursor", other)),
                }
            }
            Intrinsic::SeqCurrent => {
                let var = Self::resource_var(f, args)?;
                match self.slot(var)? {
                    Slot::Cursor(c) => c.current().cloned().ok_or_else(|| {
                        Fault::InvalidOperation("cursor is not positioned on an element").into()
                    }),
                    other => Err(wrong_slot(var, "cursor", other)),
                }
            }
            Intrinsic::SetRelease | Intrinsic::ListRelease | Intrinsic::SeqClose => {
                let var = Self::resource_var(f, args)?;
                self.release(var)?;
                Ok(Value::Null)
            }
        }
    }

    /// Release whatever resource `var` holds. A slot that never acquired
    /// one (still null) is left alone.
    fn release(&mut self, var: &Var) -> Result<()> {
        let slot = self.slot_mut(var)?;
        let kind = match slot {
            Slot::Value(_) => return Ok(()),
            Slot::Set(set) => {
                set.release();
                ResourceKind::Set
            }
            Slot::List(list) => {
                list.dispose();
                ResourceKind::List
            }
            Slot::Cursor(cursor) => {
                cursor.close();
                ResourceKind::Cursor
            }
        };
        *slot = Slot::Value(Value::Null);
        self.record(Event::Released {
            kind,
            name: var_name(var),
        });
        Ok(())
    }
}

fn wrong_slot(var: &Var, expected: &'static str, found: &Slot) -> ExecError {
    ExecError::SlotKind {
        name: var_name(var),
        expected,
        found: found.describe(),
    }
}

// ── Instances ──

/// A constructed chain value: its per-instance fields.
pub struct Instance<'c> {
    chain: &'c FusedChain,
    fields: Fields,
    pool: Arc<dyn ArrayPool>,
}

impl FusedChain {
    /// Run the constructor with positional `args`.
    pub fn instantiate(&self, args: Vec<Value>, pool: Arc<dyn ArrayPool>) -> Result<Instance<'_>> {
        if args.len() != self.params.len() {
            return Err(ExecError::Arity {
                chain: self.name.clone(),
                expected: self.params.len(),
                found: args.len(),
            });
        }
        let mut locals = State::new();
        for (param, value) in self.params.iter().zip(args) {
            locals.insert(param.name.clone(), Slot::Value(value.convert(&param.ty)?));
        }
        let mut events = Vec::new();
        let mut machine = Machine {
            instance: Cow::Owned(Fields::new()),
            state: None,
            locals,
            pool: &pool,
            events: &mut events,
        };
        machine.exec_block(&self.ctor)?;
        let fields = machine.instance.into_owned();
        Ok(Instance {
            chain: self,
            fields,
            pool,
        })
    }

    /// Construct and run: the evaluation result, or the iterated elements
    /// as a list for a chain without one.
    pub fn call(&self, args: Vec<Value>, pool: Arc<dyn ArrayPool>) -> Result<Value> {
        let instance = self.instantiate(args, pool)?;
        if self.evaluation.is_some() {
            return instance.evaluate();
        }
        let values = instance.iter().collect::<Result<Vec<_>>>()?;
        Ok(Value::List(values))
    }
}

impl<'c> Instance<'c> {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// A fresh iterator over this instance.
    pub fn iter(&self) -> FusedIter<'_> {
        FusedIter {
            chain: self.chain,
            fields: &self.fields,
            pool: Arc::clone(&self.pool),
            state: State::new(),
            phase: Phase::Created,
            initialized: false,
            current: None,
            events: Vec::new(),
        }
    }

    pub fn evaluate(&self) -> Result<Value> {
        self.evaluate_with_events().0
    }

    /// Evaluate, also returning the resource events in order.
    pub fn evaluate_with_events(&self) -> (Result<Value>, Vec<Event>) {
        let mut events = Vec::new();
        let Some(eval) = &self.chain.evaluation else {
            return (Err(ExecError::NoEvaluation(self.chain.name.clone())), events);
        };
        let mut machine = Machine {
            instance: Cow::Borrowed(&self.fields),
            state: None,
            locals: State::new(),
            pool: &self.pool,
            events: &mut events,
        };
        let result = match machine.exec_block(&eval.body) {
            Ok(Flow::Return(v)) => Ok(v),
            Ok(Flow::Yield(_)) => Err(ExecError::YieldOutsideIterator),
            Ok(Flow::Break) => Err(ExecError::StrayJump("break")),
            Ok(Flow::Continue) => Err(ExecError::StrayJump("continue")),
            Ok(Flow::Normal) => Err(ExecError::MissingReturn),
            Err(e) => Err(e),
        };
        (result, events)
    }
}

// ── Iterator ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Iterating,
    Exhausted,
    Disposed,
}

pub struct FusedIter<'i> {
    chain: &'i FusedChain,
    fields: &'i Fields,
    pool: Arc<dyn ArrayPool>,
    state: State,
    phase: Phase,
    initialized: bool,
    current: Option<Value>,
    events: Vec<Event>,
}

impl FusedIter<'_> {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn run(&mut self, block: &[Stmt]) -> Result<Flow> {
        let mut machine = Machine {
            instance: Cow::Borrowed(self.fields),
            state: Some(&mut self.state),
            locals: State::new(),
            pool: &self.pool,
            events: &mut self.events,
        };
        machine.exec_block(block)
    }

    /// Move to the next element. `Ok(false)` once exhausted or disposed.
    pub fn advance(&mut self) -> Result<bool> {
        match self.phase {
            Phase::Exhausted | Phase::Disposed => return Ok(false),
            Phase::Created => {
                self.initialized = true;
                self.phase = Phase::Iterating;
                let chain = self.chain;
                if let Err(e) = self.run(&chain.iterator.init) {
                    self.phase = Phase::Exhausted;
                    return Err(e);
                }
            }
            Phase::Iterating => {}
        }
        let chain = self.chain;
        let flow = self.run(&chain.iterator.step);
        let outcome = match flow {
            Ok(Flow::Yield(v)) => {
                self.current = Some(v);
                return Ok(true);
            }
            Ok(Flow::Normal) => Ok(false),
            Ok(Flow::Return(_)) => Err(ExecError::StrayJump("return")),
            Ok(Flow::Break) => Err(ExecError::StrayJump("break")),
            Ok(Flow::Continue) => Err(ExecError::StrayJump("continue")),
            Err(e) => Err(e),
        };
        self.current = None;
        self.phase = Phase::Exhausted;
        outcome
    }

    /// Run the teardown block if `init` ran. Idempotent.
    pub fn dispose(&mut self) -> Result<()> {
        if self.phase == Phase::Disposed {
            return Ok(());
        }
        self.phase = Phase::Disposed;
        self.current = None;
        if !self.initialized {
            return Ok(());
        }
        let chain = self.chain;
        self.run(&chain.iterator.dispose).map(|_| ())
    }

    /// Dispose and hand back the resource log.
    pub fn finish(mut self) -> Result<Vec<Event>> {
        self.dispose()?;
        Ok(std::mem::take(&mut self.events))
    }
}

impl Iterator for FusedIter<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(true) => self.current.clone().map(Ok),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Drop for FusedIter<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!(chain = %self.chain.name, error = %e, "dispose failed during drop");
        }
    }
}
