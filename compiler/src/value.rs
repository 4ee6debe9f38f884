// value.rs — Runtime values and generated-code faults
//
// Values flow through the fused-body machine and the reference model. All
// arithmetic lives here so both agree bit-for-bit: 32-bit `int` wraps,
// mixed operands promote int → long → double, integer division by zero is a
// fault.
//
// Preconditions: none.
// Postconditions: operations on well-typed operands never panic.
// Failure modes: `Fault` for division by zero, failed casts, and operand
//   type mismatches that the binder should have rejected.
// Side effects: none.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::{BinOp, UnOp};
use crate::types::Type;

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    List(Vec<Value>),
}

/// A fault raised by generated code at the element or stage that detects it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
    #[error("invalid cast: cannot cast {from} to {to}")]
    InvalidCast { from: String, to: Type },
    #[error("attempted to divide by zero")]
    DivideByZero,
    #[error("collector capacity exceeded ({requested} > {limit})")]
    CapacityOverflow { requested: usize, limit: usize },
    #[error("operand type mismatch: {0}")]
    TypeMismatch(String),
}

pub const NO_ELEMENTS: &str = "sequence contains no elements";
pub const NO_MATCH: &str = "sequence contains no matching element";

impl Value {
    /// Default value used to initialise a field of type `ty`.
    pub fn default_for(ty: &Type) -> Value {
        match ty {
            Type::Int => Value::Int(0),
            Type::Long => Value::Long(0),
            Type::Double => Value::Double(0.0),
            Type::Bool => Value::Bool(false),
            Type::Str => Value::Str(String::new()),
            Type::List(_) | Type::Seq(_) => Value::List(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Runtime type of this value (`object` for null).
    pub fn type_of(&self) -> Type {
        match self {
            Value::Null => Type::Object,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Long(_) => Type::Long,
            Value::Double(_) => Type::Double,
            Value::Str(_) => Type::Str,
            Value::List(_) => Type::List(Box::new(Type::Object)),
        }
    }

    /// Exact runtime type test used by Cast/OfType. `object` accepts anything.
    pub fn is_type(&self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Object) => true,
            (Value::Bool(_), Type::Bool)
            | (Value::Int(_), Type::Int)
            | (Value::Long(_), Type::Long)
            | (Value::Double(_), Type::Double)
            | (Value::Str(_), Type::Str) => true,
            (Value::List(items), Type::List(t)) | (Value::List(items), Type::Seq(t)) => {
                items.iter().all(|v| v.is_type(t))
            }
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Result<bool, Fault> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Fault::TypeMismatch(format!("expected bool, found {other}"))),
        }
    }

    pub fn as_int(&self) -> Result<i32, Fault> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(Fault::TypeMismatch(format!("expected int, found {other}"))),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], Fault> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(Fault::TypeMismatch(format!("expected list, found {other}"))),
        }
    }

    /// Checked cast: succeeds only if the runtime type matches exactly.
    pub fn cast(&self, ty: &Type) -> Result<Value, Fault> {
        if self.is_type(ty) {
            Ok(self.clone())
        } else {
            Err(Fault::InvalidCast {
                from: self.type_of().to_string(),
                to: ty.clone(),
            })
        }
    }

    /// Numeric widening conversion (int → long → double).
    pub fn convert(&self, ty: &Type) -> Result<Value, Fault> {
        match (self, ty) {
            (Value::Int(n), Type::Long) => Ok(Value::Long(i64::from(*n))),
            (Value::Int(n), Type::Double) => Ok(Value::Double(f64::from(*n))),
            (Value::Long(n), Type::Double) => Ok(Value::Double(*n as f64)),
            (v, t) if v.is_type(t) => Ok(v.clone()),
            (v, t) => Err(Fault::TypeMismatch(format!("cannot convert {v} to {t}"))),
        }
    }

    pub fn unary(op: UnOp, v: &Value) -> Result<Value, Fault> {
        match (op, v) {
            (UnOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
            (UnOp::Neg, Value::Long(n)) => Ok(Value::Long(n.wrapping_neg())),
            (UnOp::Neg, Value::Double(n)) => Ok(Value::Double(-n)),
            (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnOp::Abs, Value::Int(n)) => Ok(Value::Int(n.wrapping_abs())),
            (UnOp::Abs, Value::Long(n)) => Ok(Value::Long(n.wrapping_abs())),
            (UnOp::Abs, Value::Double(n)) => Ok(Value::Double(n.abs())),
            (op, v) => Err(Fault::TypeMismatch(format!("cannot apply {op:?} to {v}"))),
        }
    }

    /// Evaluate a strict binary operator. `And`/`Or` short-circuit in the
    /// callers; here they are evaluated eagerly.
    pub fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, Fault> {
        use BinOp::*;
        match op {
            Add | Sub | Mul | Div | Rem => arith(op, a, b),
            Eq => Ok(Value::Bool(a.loose_eq(b))),
            Ne => Ok(Value::Bool(!a.loose_eq(b))),
            Lt | Le | Gt | Ge => {
                let ord = a.compare(b)?;
                Ok(Value::Bool(match op {
                    Lt => ord == Ordering::Less,
                    Le => ord != Ordering::Greater,
                    Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
            LtU | GeU => {
                let (x, y) = (a.as_int()? as u32, b.as_int()? as u32);
                Ok(Value::Bool(if op == LtU { x < y } else { x >= y }))
            }
            And => Ok(Value::Bool(a.as_bool()? && b.as_bool()?)),
            Or => Ok(Value::Bool(a.as_bool()? || b.as_bool()?)),
            Min | Max => {
                let ord = a.compare(b)?;
                let pick_a = if op == Min {
                    ord != Ordering::Greater
                } else {
                    ord != Ordering::Less
                };
                let chosen = if pick_a { a } else { b };
                match Type::promote(&a.type_of(), &b.type_of()) {
                    Some(t) => chosen.convert(&t),
                    None => Ok(chosen.clone()),
                }
            }
        }
    }

    /// Default ordering used by Min/Max without a comparer.
    pub fn compare(&self, other: &Value) -> Result<Ordering, Fault> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (a, b) => match (a.numeric(), b.numeric()) {
                (Some(Num::I(x)), Some(Num::I(y))) => Ok(x.cmp(&y)),
                (Some(x), Some(y)) => Ok(x.as_f64().total_cmp(&y.as_f64())),
                _ => Err(Fault::TypeMismatch(format!("cannot compare {a} with {b}"))),
            },
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self.numeric(), other.numeric()) {
            (Some(Num::I(x)), Some(Num::I(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => self == other,
        }
    }

    fn numeric(&self) -> Option<Num> {
        match self {
            Value::Int(n) => Some(Num::I(i64::from(*n))),
            Value::Long(n) => Some(Num::I(*n)),
            Value::Double(n) => Some(Num::F(*n)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::I(n) => n as f64,
            Num::F(n) => n,
        }
    }
}

fn arith(op: BinOp, a: &Value, b: &Value) -> Result<Value, Fault> {
    use BinOp::*;
    match (a, b) {
        (Value::Str(x), Value::Str(y)) if op == Add => Ok(Value::Str(format!("{x}{y}"))),
        (Value::Int(x), Value::Int(y)) => {
            let (x, y) = (*x, *y);
            Ok(Value::Int(match op {
                Add => x.wrapping_add(y),
                Sub => x.wrapping_sub(y),
                Mul => x.wrapping_mul(y),
                Div if y == 0 => return Err(Fault::DivideByZero),
                Div => x.wrapping_div(y),
                Rem if y == 0 => return Err(Fault::DivideByZero),
                _ => x.wrapping_rem(y),
            }))
        }
        _ => match (a.numeric(), b.numeric()) {
            (Some(Num::I(x)), Some(Num::I(y))) => Ok(Value::Long(match op {
                Add => x.wrapping_add(y),
                Sub => x.wrapping_sub(y),
                Mul => x.wrapping_mul(y),
                Div if y == 0 => return Err(Fault::DivideByZero),
                Div => x.wrapping_div(y),
                Rem if y == 0 => return Err(Fault::DivideByZero),
                _ => x.wrapping_rem(y),
            })),
            (Some(x), Some(y)) => {
                let (x, y) = (x.as_f64(), y.as_f64());
                Ok(Value::Double(match op {
                    Add => x + y,
                    Sub => x - y,
                    Mul => x * y,
                    Div => x / y,
                    _ => x % y,
                }))
            }
            _ => Err(Fault::TypeMismatch(format!(
                "cannot apply {op:?} to {a} and {b}"
            ))),
        },
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}L"),
            Value::Double(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── Hashing for deduplication ───────────────────────────────────────────────

/// Hash/equality wrapper: doubles compare by bit pattern, `1` and `1L` are
/// distinct keys (exact runtime type, as the dedup set sees boxed values).
#[derive(Debug, Clone)]
pub struct Key(pub Value);

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        key_eq(&self.0, &other.0)
    }
}

impl Eq for Key {}

fn key_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| key_eq(a, b))
        }
        _ => a == b,
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn hash_value<H: Hasher>(v: &Value, state: &mut H) {
    std::mem::discriminant(v).hash(state);
    match v {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Int(n) => n.hash(state),
        Value::Long(n) => n.hash(state),
        Value::Double(n) => n.to_bits().hash(state),
        Value::Str(s) => s.hash(state),
        Value::List(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn int_arithmetic_wraps() {
        let r = Value::binary(BinOp::Add, &Value::Int(i32::MAX), &Value::Int(1)).unwrap();
        assert_eq!(r, Value::Int(i32::MIN));
    }

    #[test]
    fn mixed_operands_promote() {
        let r = Value::binary(BinOp::Mul, &Value::Int(3), &Value::Long(4)).unwrap();
        assert_eq!(r, Value::Long(12));
        let r = Value::binary(BinOp::Add, &Value::Int(1), &Value::Double(0.5)).unwrap();
        assert_eq!(r, Value::Double(1.5));
    }

    #[test]
    fn integer_division_by_zero_faults() {
        let r = Value::binary(BinOp::Div, &Value::Int(1), &Value::Int(0));
        assert_eq!(r, Err(Fault::DivideByZero));
        let r = Value::binary(BinOp::Rem, &Value::Long(1), &Value::Int(0));
        assert_eq!(r, Err(Fault::DivideByZero));
    }

    #[test]
    fn unsigned_compare_treats_negative_as_large() {
        let r = Value::binary(BinOp::GeU, &Value::Int(0), &Value::Int(-1)).unwrap();
        assert_eq!(r, Value::Bool(false));
        let r = Value::binary(BinOp::LtU, &Value::Int(-1), &Value::Int(3)).unwrap();
        assert_eq!(r, Value::Bool(false));
    }

    #[test]
    fn cast_requires_exact_type() {
        assert_eq!(Value::Int(1).cast(&Type::Int), Ok(Value::Int(1)));
        assert!(matches!(
            Value::Int(1).cast(&Type::Long),
            Err(Fault::InvalidCast { .. })
        ));
        assert!(Value::Str("a".into()).is_type(&Type::Object));
    }

    #[test]
    fn key_distinguishes_int_and_long() {
        let mut set = HashSet::new();
        assert!(set.insert(Key(Value::Int(1))));
        assert!(set.insert(Key(Value::Long(1))));
        assert!(!set.insert(Key(Value::Int(1))));
        assert!(set.insert(Key(Value::Double(f64::NAN))));
        assert!(!set.insert(Key(Value::Double(f64::NAN))));
    }

    #[test]
    fn min_max_promote() {
        let r = Value::binary(BinOp::Min, &Value::Int(3), &Value::Long(7)).unwrap();
        assert_eq!(r, Value::Long(3));
        let r = Value::binary(BinOp::Max, &Value::Int(3), &Value::Int(7)).unwrap();
        assert_eq!(r, Value::Int(7));
    }

    #[test]
    fn display_list() {
        let v = Value::List(vec![Value::Int(1), Value::Double(2.0), Value::Str("x".into())]);
        assert_eq!(v.to_string(), "[1, 2.0, \"x\"]");
    }
}
