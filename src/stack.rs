//! Exchange stack and call frames.
//!
//! Every native call sees a frame of the shared [`ExchangeStack`] through a
//! [`CallContext`]. Frame slots are addressed 1-based from the frame bottom
//! (`1` is the first argument) or negatively from the top (`-1` is the last
//! slot). Index `0` is never valid.

use nativebind_registry::TypeHash;

use crate::error::BindError;
use crate::marshal::{FromStack, IntoStack};
use crate::state::State;
use crate::value::Value;

/// The ordered channel through which values cross the boundary.
#[derive(Debug, Default)]
pub struct ExchangeStack {
    slots: Vec<Value>,
}

impl ExchangeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of slots across all frames.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.slots.push(value);
    }

    pub(crate) fn get(&self, absolute: usize) -> Option<&Value> {
        self.slots.get(absolute)
    }

    pub(crate) fn set(&mut self, absolute: usize, value: Value) {
        if let Some(slot) = self.slots.get_mut(absolute) {
            *slot = value;
        }
    }

    pub(crate) fn remove(&mut self, absolute: usize) -> Value {
        self.slots.remove(absolute)
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    pub(crate) fn resize(&mut self, len: usize) {
        self.slots.resize(len, Value::Nil);
    }

    pub(crate) fn tail(&self, from: usize) -> &[Value] {
        &self.slots[from.min(self.slots.len())..]
    }
}

/// Context for native function calls.
///
/// This bridges the runtime and Rust: it exposes the current frame of the
/// exchange stack and the [`State`] that owns it.
pub struct CallContext<'s> {
    state: &'s mut State,
    base: usize,
}

impl<'s> CallContext<'s> {
    /// Open a frame starting at absolute stack position `base`.
    pub(crate) fn new(state: &'s mut State, base: usize) -> Self {
        Self { state, base }
    }

    /// The runtime state.
    pub fn state(&self) -> &State {
        self.state
    }

    /// Mutable access to the runtime state, for nested calls.
    pub fn state_mut(&mut self) -> &mut State {
        self.state
    }

    /// Number of slots in this frame.
    pub fn top(&self) -> usize {
        self.state.stack().len() - self.base
    }

    /// Resolve a frame index to an absolute stack position.
    fn absolute(&self, index: i32) -> Result<usize, BindError> {
        let top = self.top() as i64;
        let relative = match index as i64 {
            0 => return Err(BindError::InvalidIndex(index)),
            i if i > 0 && i <= top => i - 1,
            i if i < 0 && -i <= top => top + i,
            _ => return Err(BindError::InvalidIndex(index)),
        };
        Ok(self.base + relative as usize)
    }

    /// 1-based positive form of a frame index.
    pub fn positive_index(&self, index: i32) -> Result<usize, BindError> {
        Ok(self.absolute(index)? - self.base + 1)
    }

    /// Raw slot value; nil above the top of the frame.
    pub fn get(&self, index: i32) -> Value {
        self.absolute(index)
            .ok()
            .and_then(|abs| self.state.stack().get(abs).cloned())
            .unwrap_or_default()
    }

    /// Push a raw value.
    pub fn push(&mut self, value: Value) {
        self.state.stack_mut().push(value);
    }

    /// Marshal a native value and push it.
    pub fn push_value<T: IntoStack>(&mut self, value: T) -> Result<(), BindError> {
        let value = value.into_value(self.state)?;
        self.push(value);
        Ok(())
    }

    /// Read a slot without removing it.
    ///
    /// Positions above the top of the frame read as nil, so optional trailing
    /// arguments may simply be omitted by the caller.
    pub fn peek<T: FromStack>(&self, index: i32) -> Result<T, BindError> {
        let position = match self.absolute(index) {
            Ok(abs) => abs - self.base + 1,
            Err(_) if index > 0 => index as usize,
            Err(err) => return Err(err),
        };
        T::from_value(&self.get(index), position, self.state)
    }

    /// Read a slot and remove it; slots above shift down.
    pub fn pop_at<T: FromStack>(&mut self, index: i32) -> Result<T, BindError> {
        let value = self.peek::<T>(index)?;
        self.remove(index)?;
        Ok(value)
    }

    /// Read the top slot and remove it.
    pub fn pop<T: FromStack>(&mut self) -> Result<T, BindError> {
        self.pop_at(-1)
    }

    /// Remove a slot; slots above shift down.
    pub fn remove(&mut self, index: i32) -> Result<Value, BindError> {
        let abs = self.absolute(index)?;
        Ok(self.state.stack_mut().remove(abs))
    }

    /// Overwrite a slot in place.
    pub fn replace(&mut self, index: i32, value: Value) -> Result<(), BindError> {
        let abs = self.absolute(index)?;
        self.state.stack_mut().set(abs, value);
        Ok(())
    }

    /// Grow (with nil) or shrink the frame to `top` slots.
    pub fn set_top(&mut self, top: usize) {
        self.state.stack_mut().resize(self.base + top);
    }

    /// Whether slot `index` holds the global table of the given type.
    pub(crate) fn is_type_table(&self, index: i32, hash: TypeHash) -> bool {
        match (self.get(index), self.state.type_table(hash)) {
            (Value::Table(slot), Some(table)) => std::rc::Rc::ptr_eq(&slot, &table),
            _ => false,
        }
    }

    /// Call a function value from inside a native call.
    pub fn call(&mut self, function: &Value, args: &mut [Value]) -> Result<Vec<Value>, BindError> {
        self.state.call_raw(function, args)
    }
}

impl std::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("base", &self.base)
            .field("top", &self.top())
            .finish()
    }
}
