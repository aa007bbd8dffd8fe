//! Object handles: the boundary representation of one native object.
//!
//! A handle carries a type-erased pointer to the native object, the registered
//! type it was created as, and two tags:
//!
//! - `OWNED`: the handle owns the allocation and frees it on finalization
//! - `CONST`: only shared access is allowed through this handle
//!
//! A handle may also carry an *anchor*: the handle whose object the pointer
//! points into. Anchored handles report [`BindError::StaleHandle`] once their
//! anchor is finalized, and borrowing through them also borrows the anchor.
//!
//! Finalization drops an owned object exactly once and clears the pointer, so
//! finalizing twice is a no-op.

use std::any::TypeId;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;

use bitflags::bitflags;
use nativebind_registry::TypeHash;
use tracing::debug;

use crate::error::BindError;

bitflags! {
    /// Handle tags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandleFlags: u8 {
        /// Mutable access through this handle is rejected.
        const CONST = 1 << 0;
        /// The handle owns the native object.
        const OWNED = 1 << 1;
    }
}

/// Shared reference to a handle, as stored in userdata slots.
pub type HandleRef = Rc<ObjectHandle>;

/// Boundary record for one native object.
pub struct ObjectHandle {
    type_hash: TypeHash,
    /// Rust type behind `ptr`; hashes are only unique within one registry.
    type_id: TypeId,
    type_name: Rc<str>,
    flags: HandleFlags,
    ptr: Cell<Option<NonNull<u8>>>,
    drop_fn: Option<unsafe fn(NonNull<u8>)>,
    anchor: Option<HandleRef>,
    /// `> 0` shared borrows, `-1` exclusive borrow.
    borrow: Cell<isize>,
}

unsafe fn drop_boxed<T>(ptr: NonNull<u8>) {
    // SAFETY: `ptr` came from `Box::<T>::into_raw` in `ObjectHandle::owned`
    // and is taken out of the handle before this runs.
    drop(unsafe { Box::from_raw(ptr.cast::<T>().as_ptr()) });
}

impl ObjectHandle {
    /// Move `value` to the heap and wrap it in an owning handle.
    pub fn owned<T: 'static>(value: T, type_hash: TypeHash, type_name: Rc<str>) -> HandleRef {
        let ptr = NonNull::from(Box::leak(Box::new(value))).cast::<u8>();
        Rc::new(ObjectHandle {
            type_hash,
            type_id: TypeId::of::<T>(),
            type_name,
            flags: HandleFlags::OWNED,
            ptr: Cell::new(Some(ptr)),
            drop_fn: Some(drop_boxed::<T>),
            anchor: None,
            borrow: Cell::new(0),
        })
    }

    /// Wrap a pointer owned by someone else.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `T` for as long as the handle can be
    /// dereferenced: until the handle is finalized, or until `anchor` is
    /// finalized when one is given. If `is_const` is false nothing else may
    /// access the object while a script call holds a mutable view of it.
    pub unsafe fn borrowed<T: 'static>(
        ptr: NonNull<T>,
        is_const: bool,
        type_hash: TypeHash,
        type_name: Rc<str>,
        anchor: Option<HandleRef>,
    ) -> HandleRef {
        let flags = if is_const {
            HandleFlags::CONST
        } else {
            HandleFlags::empty()
        };
        Rc::new(ObjectHandle {
            type_hash,
            type_id: TypeId::of::<T>(),
            type_name,
            flags,
            ptr: Cell::new(Some(ptr.cast::<u8>())),
            drop_fn: None,
            anchor,
            borrow: Cell::new(0),
        })
    }

    /// Registered type the handle was created as.
    pub fn type_hash(&self) -> TypeHash {
        self.type_hash
    }

    /// Rust type of the object the handle points at.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Display name of that type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn flags(&self) -> HandleFlags {
        self.flags
    }

    pub fn is_const(&self) -> bool {
        self.flags.contains(HandleFlags::CONST)
    }

    pub fn owns_object(&self) -> bool {
        self.flags.contains(HandleFlags::OWNED)
    }

    /// Handle this one borrows from, if any.
    pub fn anchor(&self) -> Option<&HandleRef> {
        self.anchor.as_ref()
    }

    /// Whether the handle, and every anchor, still points at a live object.
    pub fn is_alive(&self) -> bool {
        self.resolve().is_ok()
    }

    /// Address of the native object, `None` once finalized.
    pub fn address(&self) -> Option<usize> {
        self.ptr.get().map(|p| p.as_ptr() as usize)
    }

    /// Release the native object.
    ///
    /// Owned objects are dropped; borrowed pointers are just forgotten. Returns
    /// `Ok(true)` if an object was dropped by this call. Finalizing an already
    /// finalized handle returns `Ok(false)`. Fails while a call is borrowing
    /// the object.
    pub fn finalize(&self) -> Result<bool, BindError> {
        if self.borrow.get() != 0 {
            return Err(BindError::AlreadyBorrowed);
        }
        let Some(ptr) = self.ptr.take() else {
            return Ok(false);
        };
        match self.drop_fn {
            Some(drop_fn) if self.owns_object() => {
                debug!(type_name = %self.type_name, "finalizing owned object");
                // SAFETY: the pointer was produced by `owned::<T>` with the matching
                // `drop_fn`, and `take` above guarantees this runs at most once.
                unsafe { drop_fn(ptr) };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Pointer to the object, checking that neither it nor its anchors are gone.
    pub(crate) fn resolve(&self) -> Result<NonNull<u8>, BindError> {
        let ptr = self.ptr.get().ok_or(BindError::StaleHandle)?;
        if let Some(anchor) = &self.anchor {
            anchor.resolve()?;
        }
        Ok(ptr)
    }

    // ==========================================================================
    // Borrow tracking
    // ==========================================================================

    fn chain(&self) -> impl Iterator<Item = &ObjectHandle> {
        std::iter::successors(Some(self), |h| h.anchor.as_deref())
    }

    fn acquire(&self, exclusive: bool) -> Result<(), BindError> {
        let conflict = self.chain().any(|h| {
            let state = h.borrow.get();
            state < 0 || (exclusive && state > 0)
        });
        if conflict {
            return Err(BindError::AlreadyBorrowed);
        }
        for h in self.chain() {
            h.borrow.set(if exclusive { -1 } else { h.borrow.get() + 1 });
        }
        Ok(())
    }

    fn release(&self, exclusive: bool) {
        for h in self.chain() {
            h.borrow.set(if exclusive { 0 } else { h.borrow.get() - 1 });
        }
    }

    /// Shared view of the `T` found `offset` bytes into the object.
    ///
    /// The caller guarantees (through the type registry) that a `T` lives at
    /// that offset of the handle's dynamic type.
    pub(crate) fn view<T>(handle: &HandleRef, offset: usize) -> Result<ObjRef<T>, BindError> {
        let base = handle.resolve()?;
        handle.acquire(false)?;
        // SAFETY: `offset` comes from the registry's layout edges for the
        // handle's dynamic type, so it stays inside the same allocation.
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) }.cast::<T>();
        Ok(ObjRef {
            handle: Rc::clone(handle),
            ptr,
        })
    }

    /// Exclusive view of the `T` found `offset` bytes into the object.
    pub(crate) fn view_mut<T>(handle: &HandleRef, offset: usize) -> Result<ObjMut<T>, BindError> {
        if handle.is_const() {
            return Err(BindError::ConstViolation {
                type_name: handle.type_name.to_string(),
            });
        }
        let base = handle.resolve()?;
        handle.acquire(true)?;
        // SAFETY: see `view`.
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) }.cast::<T>();
        Ok(ObjMut {
            handle: Rc::clone(handle),
            ptr,
            _marker: PhantomData,
        })
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        // Guards keep an `Rc` to the handle, so nothing can be borrowed here.
        let _ = self.finalize();
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("type_name", &self.type_name)
            .field("type_hash", &self.type_hash)
            .field("flags", &self.flags)
            .field("alive", &self.ptr.get().is_some())
            .field("anchored", &self.anchor.is_some())
            .finish()
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Shared view of a native object held by a handle.
///
/// The object cannot be finalized or mutably borrowed while the view lives.
pub struct ObjRef<T> {
    handle: HandleRef,
    ptr: NonNull<T>,
}

impl<T> ObjRef<T> {
    /// The handle the view was taken from.
    pub fn handle(this: &Self) -> &HandleRef {
        &this.handle
    }
}

impl<T> Deref for ObjRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the object is alive (resolved on creation, finalization is
        // refused while borrowed) and no exclusive view exists.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for ObjRef<T> {
    fn drop(&mut self) {
        self.handle.release(false);
    }
}

impl<T: fmt::Debug> fmt::Debug for ObjRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Exclusive view of a native object held by a non-const handle.
pub struct ObjMut<T> {
    handle: HandleRef,
    ptr: NonNull<T>,
    _marker: PhantomData<T>,
}

impl<T> ObjMut<T> {
    /// The handle the view was taken from.
    pub fn handle(this: &Self) -> &HandleRef {
        &this.handle
    }
}

impl<T> Deref for ObjMut<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: see `ObjRef::deref`; this view is the only one.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for ObjMut<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the exclusive borrow flag is held for the guard's lifetime.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for ObjMut<T> {
    fn drop(&mut self) {
        self.handle.release(true);
    }
}

impl<T: fmt::Debug> fmt::Debug for ObjMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counted(Rc<Cell<u32>>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn hash() -> TypeHash {
        TypeHash::from_key("test.Counted")
    }

    #[test]
    fn finalize_is_idempotent() {
        let drops = Rc::new(Cell::new(0));
        let handle = ObjectHandle::owned(Counted(Rc::clone(&drops)), hash(), "Counted".into());
        assert!(handle.owns_object());
        assert_eq!(handle.finalize(), Ok(true));
        assert_eq!(handle.finalize(), Ok(false));
        assert_eq!(drops.get(), 1);
        assert!(handle.address().is_none());
        drop(handle);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn dropping_last_reference_finalizes() {
        let drops = Rc::new(Cell::new(0));
        let handle = ObjectHandle::owned(Counted(Rc::clone(&drops)), hash(), "Counted".into());
        let second = Rc::clone(&handle);
        drop(handle);
        assert_eq!(drops.get(), 0);
        drop(second);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn borrowed_handle_never_drops() {
        let drops = Rc::new(Cell::new(0));
        let mut host = Counted(Rc::clone(&drops));
        let handle = unsafe {
            ObjectHandle::borrowed(NonNull::from(&mut host), false, hash(), "Counted".into(), None)
        };
        assert_eq!(handle.finalize(), Ok(false));
        drop(handle);
        assert_eq!(drops.get(), 0);
        drop(host);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn records_the_rust_type() {
        let handle = ObjectHandle::owned(5_i32, hash(), "Int".into());
        assert_eq!(handle.type_id(), TypeId::of::<i32>());
        let mut host = 1.5_f64;
        let borrowed = unsafe {
            ObjectHandle::borrowed(NonNull::from(&mut host), true, hash(), "Int".into(), None)
        };
        assert_eq!(borrowed.type_id(), TypeId::of::<f64>());
    }

    #[test]
    fn stale_after_finalize() {
        let handle = ObjectHandle::owned(5_i32, hash(), "Int".into());
        handle.finalize().unwrap();
        assert!(matches!(
            ObjectHandle::view::<i32>(&handle, 0),
            Err(BindError::StaleHandle)
        ));
    }

    #[test]
    fn exclusive_view_excludes_others() {
        let handle = ObjectHandle::owned(1_i32, hash(), "Int".into());
        let mut guard = ObjectHandle::view_mut::<i32>(&handle, 0).unwrap();
        *guard += 1;
        assert!(matches!(
            ObjectHandle::view::<i32>(&handle, 0),
            Err(BindError::AlreadyBorrowed)
        ));
        assert_eq!(handle.finalize(), Err(BindError::AlreadyBorrowed));
        drop(guard);

        let a = ObjectHandle::view::<i32>(&handle, 0).unwrap();
        let b = ObjectHandle::view::<i32>(&handle, 0).unwrap();
        assert_eq!(*a + *b, 4);
        assert!(ObjectHandle::view_mut::<i32>(&handle, 0).is_err());
    }

    #[test]
    fn const_handle_rejects_mutable_view() {
        let mut value = 3_i32;
        let handle = unsafe {
            ObjectHandle::borrowed(NonNull::from(&mut value), true, hash(), "Int".into(), None)
        };
        assert!(matches!(
            ObjectHandle::view_mut::<i32>(&handle, 0),
            Err(BindError::ConstViolation { .. })
        ));
        assert_eq!(*ObjectHandle::view::<i32>(&handle, 0).unwrap(), 3);
    }

    #[test]
    fn anchored_handle_goes_stale_with_anchor() {
        let owner = ObjectHandle::owned((7_i32, 9_i32), hash(), "Pair".into());
        let inner = owner.resolve().unwrap().cast::<(i32, i32)>();
        let field = unsafe { NonNull::new_unchecked(std::ptr::addr_of_mut!((*inner.as_ptr()).1)) };
        let child = unsafe {
            ObjectHandle::borrowed(field, false, hash(), "Int".into(), Some(Rc::clone(&owner)))
        };

        {
            let view = ObjectHandle::view::<i32>(&child, 0).unwrap();
            assert_eq!(*view, 9);
            // The anchor is borrowed through the child.
            assert_eq!(owner.finalize(), Err(BindError::AlreadyBorrowed));
        }

        owner.finalize().unwrap();
        assert!(!child.is_alive());
        assert!(matches!(
            ObjectHandle::view::<i32>(&child, 0),
            Err(BindError::StaleHandle)
        ));
    }
}
