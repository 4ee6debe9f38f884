// types.rs — Element and field type descriptors
//
// The core treats element types as opaque descriptors handed over by the
// binding layer. The only structure it relies on is: numeric widening for
// accumulators, exact-match runtime checks for Cast/OfType, and a printable
// name for the emission backend.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: `Type::from_name` returns None for unknown type names.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A semantic type as seen by the fusion core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Int,
    Long,
    Double,
    Bool,
    Str,
    /// Dynamically typed element (boxed value).
    Object,
    /// Random-access sequence supplied by the caller.
    List(Box<Type>),
    /// Forward-only sequence supplied by the caller.
    Seq(Box<Type>),
    // ── Runtime resource types (fields only, never element types) ──
    /// Deduplication set owned by one iterator.
    Set,
    /// Pooled collector owned by one accumulation.
    Collector(Box<Type>),
    /// Cursor over a forward-only sequence.
    Cursor(Box<Type>),
}

impl Type {
    /// Resolve a surface type name (`int`, `list<double>` is handled by the
    /// parser, which calls this for the leaf).
    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "int" => Some(Type::Int),
            "long" => Some(Type::Long),
            "double" => Some(Type::Double),
            "bool" => Some(Type::Bool),
            "string" => Some(Type::Str),
            "object" => Some(Type::Object),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Long | Type::Double)
    }

    /// Element type of a sequence type.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::List(t) | Type::Seq(t) => Some(t),
            _ => None,
        }
    }

    /// Accumulator type used by Sum: int widens to long, everything else
    /// accumulates in its own type.
    pub fn sum_accumulator(&self) -> Option<Type> {
        match self {
            Type::Int | Type::Long => Some(Type::Long),
            Type::Double => Some(Type::Double),
            _ => None,
        }
    }

    /// Result type of a binary arithmetic op on two numeric operands.
    pub fn promote(a: &Type, b: &Type) -> Option<Type> {
        match (a, b) {
            (Type::Double, t) | (t, Type::Double) if t.is_numeric() => Some(Type::Double),
            (Type::Long, t) | (t, Type::Long) if t.is_numeric() => Some(Type::Long),
            (Type::Int, Type::Int) => Some(Type::Int),
            _ => None,
        }
    }

    /// Whether a value of type `self` may be stored where `target` is expected
    /// without an explicit conversion.
    pub fn assignable_to(&self, target: &Type) -> bool {
        if self == target || *target == Type::Object {
            return true;
        }
        match (self, target) {
            (Type::Int, Type::Long) | (Type::Int, Type::Double) | (Type::Long, Type::Double) => {
                true
            }
            (Type::List(a), Type::List(b)) | (Type::List(a), Type::Seq(b)) => a.assignable_to(b),
            (Type::Seq(a), Type::Seq(b)) => a.assignable_to(b),
            _ => false,
        }
    }

    /// Name used by the Rust emission backend.
    pub fn rust_name(&self) -> String {
        match self {
            Type::Int => "i32".into(),
            Type::Long => "i64".into(),
            Type::Double => "f64".into(),
            Type::Bool => "bool".into(),
            Type::Str => "String".into(),
            Type::Object => "Value".into(),
            Type::List(t) => format!("Vec<{}>", t.rust_name()),
            Type::Seq(t) => format!("Seq<{}>", t.rust_name()),
            Type::Set => "DedupSet".into(),
            Type::Collector(t) => format!("PooledList<{}>", t.rust_name()),
            Type::Cursor(t) => format!("SeqCursor<{}>", t.rust_name()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Double => write!(f, "double"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "string"),
            Type::Object => write!(f, "object"),
            Type::List(t) => write!(f, "list<{t}>"),
            Type::Seq(t) => write!(f, "seq<{t}>"),
            Type::Set => write!(f, "<set>"),
            Type::Collector(t) => write!(f, "<collector {t}>"),
            Type::Cursor(t) => write!(f, "<cursor {t}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_numeric() {
        assert_eq!(Type::promote(&Type::Int, &Type::Int), Some(Type::Int));
        assert_eq!(Type::promote(&Type::Int, &Type::Long), Some(Type::Long));
        assert_eq!(Type::promote(&Type::Long, &Type::Double), Some(Type::Double));
        assert_eq!(Type::promote(&Type::Str, &Type::Int), None);
    }

    #[test]
    fn sum_widens_int() {
        assert_eq!(Type::Int.sum_accumulator(), Some(Type::Long));
        assert_eq!(Type::Double.sum_accumulator(), Some(Type::Double));
        assert_eq!(Type::Bool.sum_accumulator(), None);
    }

    #[test]
    fn display_nested() {
        let t = Type::List(Box::new(Type::Seq(Box::new(Type::Int))));
        assert_eq!(t.to_string(), "list<seq<int>>");
        assert_eq!(t.rust_name(), "Vec<Seq<i32>>");
    }

    #[test]
    fn list_assignable_to_seq() {
        let list = Type::List(Box::new(Type::Int));
        let seq = Type::Seq(Box::new(Type::Int));
        assert!(list.assignable_to(&seq));
        assert!(!seq.assignable_to(&list));
    }
}
