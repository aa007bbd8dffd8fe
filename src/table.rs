//! Runtime tables.
//!
//! Tables are hash maps over scalar keys. Float keys with an integral value are
//! normalized to integer keys, so `t[1]` and `t[1.0]` address the same entry.

use std::rc::Rc;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::error::BindError;
use crate::value::Value;

/// A normalized table key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    Integer(i64),
    Number(OrderedFloat<f64>),
    String(Rc<str>),
    Boolean(bool),
}

impl TableKey {
    /// Convert a slot value to a key.
    ///
    /// Fails for nil, NaN and reference values other than strings.
    pub fn from_value(value: &Value) -> Result<Self, BindError> {
        match value {
            Value::Integer(v) => Ok(TableKey::Integer(*v)),
            Value::Number(v) => Self::from_number(*v),
            Value::String(s) => Ok(TableKey::String(Rc::clone(s))),
            Value::Boolean(b) => Ok(TableKey::Boolean(*b)),
            Value::Nil => Err(BindError::InvalidKey("nil")),
            other => Err(BindError::InvalidKey(other.type_name())),
        }
    }

    fn from_number(v: f64) -> Result<Self, BindError> {
        if v.is_nan() {
            return Err(BindError::InvalidKey("NaN"));
        }
        if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
            Ok(TableKey::Integer(v as i64))
        } else {
            Ok(TableKey::Number(OrderedFloat(v)))
        }
    }

    /// The key as a slot value.
    pub fn to_value(&self) -> Value {
        match self {
            TableKey::Integer(v) => Value::Integer(*v),
            TableKey::Number(v) => Value::Number(v.into_inner()),
            TableKey::String(s) => Value::String(Rc::clone(s)),
            TableKey::Boolean(b) => Value::Boolean(*b),
        }
    }
}

impl From<i64> for TableKey {
    fn from(v: i64) -> Self {
        TableKey::Integer(v)
    }
}

impl From<i32> for TableKey {
    fn from(v: i32) -> Self {
        TableKey::Integer(v as i64)
    }
}

impl From<&str> for TableKey {
    fn from(v: &str) -> Self {
        TableKey::String(v.into())
    }
}

/// A runtime table.
#[derive(Debug, Default, Clone)]
pub struct Table {
    entries: FxHashMap<TableKey, Value>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence keyed `1..=n`.
    pub fn from_sequence(values: impl IntoIterator<Item = Value>) -> Self {
        let mut table = Table::new();
        for (i, value) in values.into_iter().enumerate() {
            table.set(i as i64 + 1, value);
        }
        table
    }

    /// Read an entry, nil when absent.
    pub fn get(&self, key: impl Into<TableKey>) -> Value {
        self.entries.get(&key.into()).cloned().unwrap_or_default()
    }

    /// Read an entry by slot value.
    pub fn get_value(&self, key: &Value) -> Result<Value, BindError> {
        Ok(self.get(TableKey::from_value(key)?))
    }

    /// Write an entry; assigning nil removes it.
    pub fn set(&mut self, key: impl Into<TableKey>, value: Value) {
        let key = key.into();
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// Write an entry by slot value.
    pub fn set_value(&mut self, key: &Value, value: Value) -> Result<(), BindError> {
        self.set(TableKey::from_value(key)?, value);
        Ok(())
    }

    /// Whether a non-nil entry exists.
    pub fn contains(&self, key: impl Into<TableKey>) -> bool {
        self.entries.contains_key(&key.into())
    }

    /// Length of the sequence part: the last `n` such that keys `1..=n` all exist.
    pub fn len(&self) -> usize {
        let mut n = 0;
        while self.entries.contains_key(&TableKey::Integer(n as i64 + 1)) {
            n += 1;
        }
        n
    }

    /// Whether the table has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableKey, &Value)> {
        self.entries.iter()
    }
}
