//! Opaque object conversions.
//!
//! Pushing a [`NativeType`] by value moves it into an owning handle; pushing a
//! [`Borrowed`] wraps a pointer the caller keeps ownership of. Reading checks
//! the handle's dynamic type against the requested type, directly or through
//! the registered bases, and applies the base's byte offset for this read only.

use std::ptr::NonNull;

use super::{FromStack, IntoStack, NativeType, ValueKind};
use crate::error::BindError;
use crate::handle::{HandleRef, ObjMut, ObjRef, ObjectHandle};
use crate::state::State;
use crate::value::Value;

/// Offset of the `T` sub-object inside the handle's object.
///
/// The handle's Rust type must be the one this state registered under the
/// handle's hash; a handle made by another state with a different type bound
/// to the same name is a mismatch.
fn upcast_for<T: NativeType>(
    state: &State,
    handle: &HandleRef,
    index: usize,
) -> Result<usize, BindError> {
    let (target, name) = state.type_info::<T>()?;
    let registry = state.registry();
    let mismatch = || BindError::mismatch(index, name.as_ref(), handle.type_name());
    match registry.get(handle.type_hash()) {
        Some(descriptor) if descriptor.type_id() == handle.type_id() => {}
        _ => return Err(mismatch()),
    }
    registry
        .upcast_offset(handle.type_hash(), target)
        .ok_or_else(mismatch)
}

fn expect_handle<T: NativeType>(
    value: &Value,
    index: usize,
    state: &State,
) -> Result<HandleRef, BindError> {
    match value {
        Value::Userdata(h) => Ok(h.clone()),
        other => {
            let (_, expected) = state.type_info::<T>()?;
            Err(BindError::mismatch(index, expected.as_ref(), other.type_name()))
        }
    }
}

/// Shared view of the `T` inside a userdata slot.
pub(crate) fn view_as<T: NativeType>(
    value: &Value,
    index: usize,
    state: &State,
) -> Result<ObjRef<T>, BindError> {
    let handle = expect_handle::<T>(value, index, state)?;
    let offset = upcast_for::<T>(state, &handle, index)?;
    ObjectHandle::view(&handle, offset)
}

/// Exclusive view of the `T` inside a userdata slot.
pub(crate) fn view_mut_as<T: NativeType>(
    value: &Value,
    index: usize,
    state: &State,
) -> Result<ObjMut<T>, BindError> {
    let handle = expect_handle::<T>(value, index, state)?;
    let offset = upcast_for::<T>(state, &handle, index)?;
    ObjectHandle::view_mut(&handle, offset)
}

// ============================================================================
// Owning push and copy
// ============================================================================

impl<T: NativeType> IntoStack for T {
    fn into_value(self, state: &State) -> Result<Value, BindError> {
        let (hash, name) = state.type_info::<T>()?;
        Ok(Value::Userdata(ObjectHandle::owned(self, hash, name)))
    }
}

impl<T: NativeType + Clone> FromStack for T {
    const KIND: ValueKind = ValueKind::Object;

    fn from_value(value: &Value, index: usize, state: &State) -> Result<Self, BindError> {
        let view = view_as::<T>(value, index, state)?;
        Ok(T::clone(&view))
    }
}

// ============================================================================
// Views
// ============================================================================

impl<T: NativeType> FromStack for ObjRef<T> {
    const KIND: ValueKind = ValueKind::Object;

    fn from_value(value: &Value, index: usize, state: &State) -> Result<Self, BindError> {
        view_as(value, index, state)
    }
}

impl<T: NativeType> FromStack for ObjMut<T> {
    const KIND: ValueKind = ValueKind::Object;

    fn from_value(value: &Value, index: usize, state: &State) -> Result<Self, BindError> {
        view_mut_as(value, index, state)
    }
}

// ============================================================================
// Borrowing push
// ============================================================================

/// A native object pushed without transferring ownership.
///
/// The handle created from it never drops the object.
pub struct Borrowed<T> {
    ptr: NonNull<T>,
    is_const: bool,
}

impl<T: NativeType> Borrowed<T> {
    /// Borrow a host object mutably.
    ///
    /// # Safety
    ///
    /// The object must outlive every handle created from this value (or those
    /// handles must be finalized first), and must not be accessed by the host
    /// while a script call is using it.
    pub unsafe fn new(value: &mut T) -> Self {
        Self {
            ptr: NonNull::from(value),
            is_const: false,
        }
    }

    /// Borrow a host object as const.
    ///
    /// # Safety
    ///
    /// The object must outlive every handle created from this value.
    pub unsafe fn new_const(value: &T) -> Self {
        Self {
            ptr: NonNull::from(value),
            is_const: true,
        }
    }

    /// Borrow an object that lives for the whole program.
    pub fn from_static(value: &'static T) -> Self {
        Self {
            ptr: NonNull::from(value),
            is_const: true,
        }
    }

    /// Borrow a leaked or static mutable object.
    pub fn from_static_mut(value: &'static mut T) -> Self {
        Self {
            ptr: NonNull::from(value),
            is_const: false,
        }
    }

    pub fn is_const(&self) -> bool {
        self.is_const
    }
}

impl<T: NativeType> IntoStack for Borrowed<T> {
    fn into_value(self, state: &State) -> Result<Value, BindError> {
        let (hash, name) = state.type_info::<T>()?;
        // SAFETY: the constructors of `Borrowed` carry the lifetime contract.
        let handle = unsafe { ObjectHandle::borrowed(self.ptr, self.is_const, hash, name, None) };
        Ok(Value::Userdata(handle))
    }
}
