//! Tagged preference values and the Rust types that map onto them

use std::any::{Any, type_name};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::storage::StoredValue;

/// The binding tag of a key. Two values have the same type iff their kinds are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKind {
    Int,
    Long,
    Float,
    Double,
    Bool,
    String,
    StringSet,
    /// Structured value, tagged with the concrete Rust type name
    Object(&'static str),
}

impl fmt::Display for PrefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefKind::Object(name) => write!(f, "Object<{}>", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A strongly-typed preference value
#[derive(Clone)]
pub enum PrefValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(String),
    StringSet(BTreeSet<String>),
    /// The typed object as written, shared across listeners
    Object {
        type_name: &'static str,
        data: Option<Arc<dyn Any + Send + Sync>>,
    },
}

impl PrefValue {
    pub fn kind(&self) -> PrefKind {
        match self {
            PrefValue::Int(_) => PrefKind::Int,
            PrefValue::Long(_) => PrefKind::Long,
            PrefValue::Float(_) => PrefKind::Float,
            PrefValue::Double(_) => PrefKind::Double,
            PrefValue::Bool(_) => PrefKind::Bool,
            PrefValue::String(_) => PrefKind::String,
            PrefValue::StringSet(_) => PrefKind::StringSet,
            PrefValue::Object { type_name, .. } => PrefKind::Object(*type_name),
        }
    }

    /// Zero value for a kind, used when an observed key is absent or deleted
    pub fn zero(kind: PrefKind) -> Self {
        match kind {
            PrefKind::Int => PrefValue::Int(0),
            PrefKind::Long => PrefValue::Long(0),
            PrefKind::Float => PrefValue::Float(0.0),
            PrefKind::Double => PrefValue::Double(0.0),
            PrefKind::Bool => PrefValue::Bool(false),
            PrefKind::String => PrefValue::String(String::new()),
            PrefKind::StringSet => PrefValue::StringSet(BTreeSet::new()),
            PrefKind::Object(type_name) => PrefValue::Object {
                type_name,
                data: None,
            },
        }
    }
}

impl fmt::Debug for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            PrefValue::Long(v) => f.debug_tuple("Long").field(v).finish(),
            PrefValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            PrefValue::Double(v) => f.debug_tuple("Double").field(v).finish(),
            PrefValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            PrefValue::String(v) => f.debug_tuple("String").field(v).finish(),
            PrefValue::StringSet(v) => f.debug_tuple("StringSet").field(v).finish(),
            PrefValue::Object { type_name, data } => f
                .debug_struct("Object")
                .field("type_name", type_name)
                .field("present", &data.is_some())
                .finish(),
        }
    }
}

impl PartialEq for PrefValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PrefValue::Int(a), PrefValue::Int(b)) => a == b,
            (PrefValue::Long(a), PrefValue::Long(b)) => a == b,
            (PrefValue::Float(a), PrefValue::Float(b)) => a == b,
            (PrefValue::Double(a), PrefValue::Double(b)) => a == b,
            (PrefValue::Bool(a), PrefValue::Bool(b)) => a == b,
            (PrefValue::String(a), PrefValue::String(b)) => a == b,
            (PrefValue::StringSet(a), PrefValue::StringSet(b)) => a == b,
            (
                PrefValue::Object {
                    type_name: ta,
                    data: da,
                },
                PrefValue::Object {
                    type_name: tb,
                    data: db,
                },
            ) => {
                ta == tb
                    && match (da, db) {
                        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

/// A Rust type that can be observed under a key
pub trait PrefType: Clone + Send + Sync + 'static {
    fn kind() -> PrefKind;

    /// Value reported for a key that has never been written
    fn zero() -> Self;

    fn into_value(self) -> PrefValue;

    /// Returns `None` if the value carries a different kind
    fn from_value(value: &PrefValue) -> Option<Self>;
}

/// A [`PrefType`] the underlying storage can hold directly
pub trait Primitive: PrefType {
    fn to_stored(&self) -> StoredValue;

    /// Returns `None` if the stored entry has a different primitive kind
    fn from_stored(stored: StoredValue) -> Option<Self>;
}

macro_rules! pref_type {
    ($ty:ty, $variant:ident, $zero:expr) => {
        impl PrefType for $ty {
            fn kind() -> PrefKind {
                PrefKind::$variant
            }

            fn zero() -> Self {
                $zero
            }

            fn into_value(self) -> PrefValue {
                PrefValue::$variant(self)
            }

            fn from_value(value: &PrefValue) -> Option<Self> {
                match value {
                    PrefValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

pref_type!(i32, Int, 0);
pref_type!(i64, Long, 0);
pref_type!(f32, Float, 0.0);
pref_type!(f64, Double, 0.0);
pref_type!(bool, Bool, false);
pref_type!(String, String, String::new());
pref_type!(BTreeSet<String>, StringSet, BTreeSet::new());

macro_rules! stored_as {
    ($ty:ty, $stored:ident) => {
        impl Primitive for $ty {
            fn to_stored(&self) -> StoredValue {
                StoredValue::$stored(self.clone())
            }

            fn from_stored(stored: StoredValue) -> Option<Self> {
                match stored {
                    StoredValue::$stored(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

stored_as!(i32, Int);
stored_as!(i64, Long);
stored_as!(f32, Float);
stored_as!(bool, Bool);
stored_as!(String, String);
stored_as!(BTreeSet<String>, StringSet);

// Doubles ride on the Long primitive as their IEEE-754 bit pattern.
impl Primitive for f64 {
    fn to_stored(&self) -> StoredValue {
        StoredValue::Long(self.to_bits() as i64)
    }

    fn from_stored(stored: StoredValue) -> Option<Self> {
        match stored {
            StoredValue::Long(bits) => Some(f64::from_bits(bits as u64)),
            _ => None,
        }
    }
}

/// Nullable holder pushed to object observers.
///
/// An empty holder means "no object stored", which is distinct from an
/// observer that has not been seeded yet.
pub struct ObjectHolder<O> {
    value: Option<Arc<O>>,
}

impl<O> ObjectHolder<O> {
    pub fn new(value: Option<O>) -> Self {
        Self {
            value: value.map(Arc::new),
        }
    }

    pub fn empty() -> Self {
        Self { value: None }
    }

    pub fn value(&self) -> Option<&O> {
        self.value.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl<O> Clone for ObjectHolder<O> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<O> From<Option<O>> for ObjectHolder<O> {
    fn from(value: Option<O>) -> Self {
        Self::new(value)
    }
}

impl<O: fmt::Debug> fmt::Debug for ObjectHolder<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHolder")
            .field("value", &self.value)
            .finish()
    }
}

impl<O: PartialEq> PartialEq for ObjectHolder<O> {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl<O: Send + Sync + 'static> PrefType for ObjectHolder<O> {
    fn kind() -> PrefKind {
        PrefKind::Object(type_name::<O>())
    }

    fn zero() -> Self {
        Self::empty()
    }

    fn into_value(self) -> PrefValue {
        PrefValue::Object {
            type_name: type_name::<O>(),
            data: self.value.map(|v| v as Arc<dyn Any + Send + Sync>),
        }
    }

    fn from_value(value: &PrefValue) -> Option<Self> {
        match value {
            PrefValue::Object { type_name: name, data } if *name == type_name::<O>() => {
                let value = match data {
                    Some(data) => Some(data.clone().downcast::<O>().ok()?),
                    None => None,
                };
                Some(Self { value })
            }
            _ => None,
        }
    }
}
