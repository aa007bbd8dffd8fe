//! Conversion between native values and exchange-stack slots.
//!
//! Every supported native type belongs to exactly one [`ValueKind`], declared
//! as an associated constant of its conversion impl. The strategy is therefore
//! fixed by the type system when a binding is built, never chosen per call.
//!
//! - [`FromStack`]: read a native value from a slot (`peek`; `pop` is peek +
//!   remove, see [`CallContext`](crate::CallContext))
//! - [`IntoStack`]: turn a native value into a slot value (`push`)
//! - [`ArgumentPack`]: fixed-arity argument lists for bound functions
//! - [`IntoResults`]: return values of bound functions
//!
//! ## Supported Types
//!
//! | Kind       | Types                                                      |
//! |------------|------------------------------------------------------------|
//! | Integral   | `i8`..`i64`, `u8`..`u64`, `isize`, `usize`, C-like enums   |
//! | Float      | `f32`, `f64`                                               |
//! | Boolean    | `bool`                                                     |
//! | Text       | `String`, `Rc<str>`, `char`; `&str` push only              |
//! | Object     | any [`NativeType`], [`ObjRef`], [`ObjMut`], [`Borrowed`]   |
//! | MutableRef | [`InOut`]                                                  |
//! | Pack       | tuples of up to eight elements                             |
//!
//! Integral reads are range checked against the target type, and `u64`/`usize`
//! values above `i64::MAX` fail to push rather than wrap. Enums opt in with
//! [`integral_enum!`](crate::integral_enum).
//!
//! `Option<T>` uses the kind of `T` and maps nil to `None`. [`Value`],
//! [`TableRef`] and [`HandleRef`] pass through unconverted.
//!
//! [`ObjRef`]: crate::ObjRef
//! [`ObjMut`]: crate::ObjMut

mod function;
mod object;
mod pack;
mod reference;
mod scalar;
mod text;

pub use function::{ConstMethodFn, IntoResults, MethodFn, StaticFn};
pub use object::Borrowed;
pub use pack::{ArgumentPack, WriteBack};
pub use reference::InOut;

use crate::error::BindError;
use crate::handle::HandleRef;
use crate::state::State;
use crate::value::{Function, TableRef, Value};

/// Semantic category of a marshalled native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integral,
    Float,
    Boolean,
    Text,
    Object,
    MutableRef,
    Pack,
    /// Raw slot values that are passed through untouched.
    Dynamic,
}

impl ValueKind {
    /// Human-readable name used in mismatch messages.
    pub fn expected(self) -> &'static str {
        match self {
            ValueKind::Integral => "integer",
            ValueKind::Float => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Text => "string",
            ValueKind::Object => "userdata",
            ValueKind::MutableRef => "value",
            ValueKind::Pack => "table",
            ValueKind::Dynamic => "value",
        }
    }
}

/// Marker for native types registered with a [`State`].
///
/// Implementing it lets the type cross the boundary as an object: by value
/// (owning push), as a copy (`T: Clone`), or through [`ObjRef`](crate::ObjRef)
/// and [`ObjMut`](crate::ObjMut) views.
///
/// # Example
///
/// ```
/// use nativebind::NativeType;
///
/// struct Mover { x: f64 }
///
/// impl NativeType for Mover {}
/// ```
pub trait NativeType: 'static {}

/// Read a native value from a slot.
pub trait FromStack: Sized {
    /// Marshalling strategy of the type.
    const KIND: ValueKind;

    /// Convert the slot value found at 1-based frame position `index`.
    fn from_value(value: &Value, index: usize, state: &State) -> Result<Self, BindError>;

    /// Value to store back into the slot once the native call returns.
    ///
    /// Only mutable-reference wrappers write back.
    fn write_back(&self) -> Option<WriteBack> {
        None
    }
}

/// Turn a native value into a slot value.
pub trait IntoStack {
    fn into_value(self, state: &State) -> Result<Value, BindError>;
}

// ============================================================================
// Pass-through implementations
// ============================================================================

impl FromStack for Value {
    const KIND: ValueKind = ValueKind::Dynamic;

    fn from_value(value: &Value, _index: usize, _state: &State) -> Result<Self, BindError> {
        Ok(value.clone())
    }
}

impl IntoStack for Value {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        Ok(self)
    }
}

impl FromStack for TableRef {
    const KIND: ValueKind = ValueKind::Dynamic;

    fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
        match value {
            Value::Table(t) => Ok(t.clone()),
            other => Err(BindError::mismatch(index, "table", other.type_name())),
        }
    }
}

impl IntoStack for TableRef {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        Ok(Value::Table(self))
    }
}

impl FromStack for Function {
    const KIND: ValueKind = ValueKind::Dynamic;

    fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
        match value {
            Value::Function(f) => Ok(f.clone()),
            other => Err(BindError::mismatch(index, "function", other.type_name())),
        }
    }
}

impl IntoStack for Function {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        Ok(Value::Function(self))
    }
}

impl FromStack for HandleRef {
    const KIND: ValueKind = ValueKind::Object;

    fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
        match value {
            Value::Userdata(h) => Ok(h.clone()),
            other => Err(BindError::mismatch(index, "userdata", other.type_name())),
        }
    }
}

impl IntoStack for HandleRef {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        Ok(Value::Userdata(self))
    }
}

// ============================================================================
// Option: nil <-> None
// ============================================================================

impl<T: FromStack> FromStack for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn from_value(value: &Value, index: usize, state: &State) -> Result<Self, BindError> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other, index, state).map(Some),
        }
    }

    fn write_back(&self) -> Option<WriteBack> {
        self.as_ref().and_then(T::write_back)
    }
}

impl<T: IntoStack> IntoStack for Option<T> {
    fn into_value(self, state: &State) -> Result<Value, BindError> {
        match self {
            Some(v) => v.into_value(state),
            None => Ok(Value::Nil),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    #[test]
    fn option_maps_nil() {
        let state = State::new();
        let none: Option<i32> = FromStack::from_value(&Value::Nil, 1, &state).unwrap();
        assert_eq!(none, None);
        let some: Option<i32> = FromStack::from_value(&Value::Integer(4), 1, &state).unwrap();
        assert_eq!(some, Some(4));
        assert_eq!(None::<String>.into_value(&state).unwrap(), Value::Nil);
        assert_eq!(<Option<f64> as FromStack>::KIND, ValueKind::Float);
    }

    #[test]
    fn value_passes_through() {
        let state = State::new();
        let table = Value::table(Table::new());
        let back: Value = FromStack::from_value(&table, 1, &state).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn table_ref_requires_table() {
        let state = State::new();
        let err = TableRef::from_value(&Value::Integer(1), 2, &state).unwrap_err();
        assert_eq!(err, BindError::mismatch(2, "table", "number"));
    }
}
