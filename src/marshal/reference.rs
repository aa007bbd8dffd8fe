//! Mutable argument slots.
//!
//! The runtime's value model has no references. [`InOut<T>`] reads the
//! caller's value on entry, lets native code replace it, and after the call
//! returns the forwarder stores the final value back into the same stack slot.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use super::{FromStack, IntoStack, ValueKind, WriteBack};
use crate::error::BindError;
use crate::state::State;
use crate::value::Value;

/// A by-reference argument.
///
/// # Example
///
/// ```
/// use nativebind::{InOut, State, Value};
///
/// let mut state = State::new();
/// let double = state.create_function("double", |n: InOut<i64>| n.update(|v| *v *= 2));
/// let mut args = [Value::Integer(21)];
/// state.call(&double, &mut args).unwrap();
/// assert_eq!(args[0], Value::Integer(42));
/// ```
pub struct InOut<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> InOut<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(value)),
        }
    }

    /// Current value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.cell.borrow().clone()
    }

    /// Replace the value written back to the caller.
    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }

    /// Modify the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.cell.borrow_mut());
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }
}

impl<T: fmt::Debug> fmt::Debug for InOut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InOut").field(&*self.cell.borrow()).finish()
    }
}

impl<T> FromStack for InOut<T>
where
    T: FromStack + IntoStack + Clone + 'static,
{
    const KIND: ValueKind = ValueKind::MutableRef;

    fn from_value(value: &Value, index: usize, state: &State) -> Result<Self, BindError> {
        T::from_value(value, index, state).map(InOut::new)
    }

    fn write_back(&self) -> Option<WriteBack> {
        let cell = Rc::clone(&self.cell);
        Some(WriteBack::new(move |state| {
            let value = cell.borrow().clone();
            value.into_value(state)
        }))
    }
}
