//! Dispatch engine: metatables, hooks and forwarding functions.
//!
//! Every registered type gets a [`Metatable`] mapping member names to
//! [`Member`]s plus three hooks the runtime invokes:
//!
//! - `__index(obj, key)`: methods yield their forwarding function, properties
//!   yield their current value
//! - `__newindex(obj, key, value)`: property write
//! - `__gc(obj)`: finalization
//!
//! ## Resolution
//!
//! A key is looked up in the metatable of the handle's dynamic type first. On a
//! miss the registry lineage of that type is walked in order and the first base
//! metatable holding the key wins. No hit is a [`BindError::NilAccess`].
//!
//! ## Pointer adjustment
//!
//! Forwarders never store an offset. Each call reads its receiver through
//! [`ObjRef`]/[`ObjMut`], which asks the registry for the offset between the
//! receiver's dynamic type and the member's declaring type. The adjustment is
//! therefore local to one call: dispatching a member of base X and then a
//! member of base Y on the same handle uses each base's own offset.

use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use nativebind_registry::{RegistrationError, TypeHash};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::BindError;
use crate::handle::{HandleRef, ObjMut, ObjRef, ObjectHandle};
use crate::marshal::{
    ArgumentPack, ConstMethodFn, FromStack, IntoResults, IntoStack, MethodFn, NativeType,
    StaticFn,
};
use crate::stack::CallContext;
use crate::state::State;
use crate::value::{Function, Value};

/// Reads a property from a receiver slot.
pub(crate) type Getter = Rc<dyn Fn(&State, &Value) -> Result<Value, BindError>>;

/// Writes a property: receiver slot, new value slot.
pub(crate) type Setter = Rc<dyn Fn(&State, &Value, &Value) -> Result<(), BindError>>;

/// Position of the receiver in a method frame.
const RECEIVER: i32 = 1;

/// Position of the assigned value in a `__newindex` frame.
const ASSIGNED: usize = 3;

/// A property's access and write entries.
#[derive(Clone)]
pub struct PropertyBinding {
    get: Getter,
    set: Option<Setter>,
}

impl PropertyBinding {
    pub(crate) fn new(get: Getter, set: Option<Setter>) -> Self {
        Self { get, set }
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

/// One entry of a dispatch table.
#[derive(Clone)]
pub enum Member {
    /// Forwarding function, called with the receiver as first argument.
    Method(Function),
    Property(PropertyBinding),
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Method(func) => write!(f, "Method({})", func.name()),
            Member::Property(p) => write!(f, "Property(writable: {})", p.is_writable()),
        }
    }
}

/// Dispatch table of one registered type.
pub struct Metatable {
    key: String,
    hash: TypeHash,
    name: Rc<str>,
    members: FxHashMap<Rc<str>, Member>,
    index: Value,
    newindex: Value,
    gc: Value,
}

impl Metatable {
    pub(crate) fn new(key: String, hash: TypeHash, name: Rc<str>) -> Self {
        Self {
            key,
            hash,
            name,
            members: FxHashMap::default(),
            index: Value::Function(Function::new("__index", index_hook)),
            newindex: Value::Function(Function::new("__newindex", newindex_hook)),
            gc: Value::Function(Function::new("__gc", gc_hook)),
        }
    }

    /// Qualified key, `"<namespace>.<TypeName>"`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member declared directly on this type.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Names of the members declared directly on this type.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(|k| &**k)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn insert(&mut self, name: &str, member: Member) -> Result<(), RegistrationError> {
        if self.members.contains_key(name) {
            return Err(RegistrationError::DuplicateMember {
                type_name: self.name.to_string(),
                member: name.to_string(),
            });
        }
        self.members.insert(name.into(), member);
        Ok(())
    }

    pub fn index_hook(&self) -> Value {
        self.index.clone()
    }

    pub fn newindex_hook(&self) -> Value {
        self.newindex.clone()
    }

    pub fn gc_hook(&self) -> Value {
        self.gc.clone()
    }
}

impl fmt::Debug for Metatable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metatable")
            .field("key", &self.key)
            .field("members", &self.members.len())
            .finish()
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Find `key` on the handle's type or, failing that, on its bases.
#[cfg_attr(feature = "profiling", profiling::function)]
pub(crate) fn resolve_member(
    state: &State,
    handle: &HandleRef,
    key: &str,
) -> Result<Member, BindError> {
    let hash = handle.type_hash();
    if let Some(mt) = state.metatable(hash)
        && let Some(member) = mt.member(key)
    {
        trace!(type_name = handle.type_name(), key, "resolved directly");
        return Ok(member.clone());
    }

    for ancestor in state.registry().lineage(hash).iter() {
        if let Some(mt) = state.metatable(ancestor.hash)
            && let Some(member) = mt.member(key)
        {
            trace!(
                type_name = handle.type_name(),
                base = mt.name(),
                offset = ancestor.offset,
                key,
                "resolved through base"
            );
            return Ok(member.clone());
        }
    }

    Err(BindError::NilAccess {
        type_name: handle.type_name().to_string(),
        key: key.to_string(),
    })
}

fn member_key(ctx: &CallContext<'_>, handle: &HandleRef) -> Result<Rc<str>, BindError> {
    match ctx.get(2) {
        Value::String(key) => Ok(key),
        other => Err(BindError::NilAccess {
            type_name: handle.type_name().to_string(),
            key: format!("{other:?}"),
        }),
    }
}

// ============================================================================
// Hooks
// ============================================================================

#[cfg_attr(feature = "profiling", profiling::function)]
fn index_hook(ctx: &mut CallContext<'_>) -> Result<usize, BindError> {
    let handle: HandleRef = ctx.peek(RECEIVER)?;
    let key = member_key(ctx, &handle)?;
    let value = match resolve_member(ctx.state(), &handle, &key)? {
        Member::Method(function) => Value::Function(function),
        Member::Property(property) => (property.get)(ctx.state(), &ctx.get(RECEIVER))?,
    };
    ctx.push(value);
    Ok(1)
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn newindex_hook(ctx: &mut CallContext<'_>) -> Result<usize, BindError> {
    let handle: HandleRef = ctx.peek(RECEIVER)?;
    let key = member_key(ctx, &handle)?;
    let member = resolve_member(ctx.state(), &handle, &key)?;
    if handle.is_const() {
        return Err(BindError::ConstViolation {
            type_name: handle.type_name().to_string(),
        });
    }
    match member {
        Member::Property(PropertyBinding { set: Some(set), .. }) => {
            set(ctx.state(), &ctx.get(RECEIVER), &ctx.get(ASSIGNED as i32))?;
            Ok(0)
        }
        _ => Err(BindError::NotWritable {
            type_name: handle.type_name().to_string(),
            key: key.to_string(),
        }),
    }
}

fn gc_hook(ctx: &mut CallContext<'_>) -> Result<usize, BindError> {
    let handle: HandleRef = ctx.peek(RECEIVER)?;
    handle.finalize()?;
    Ok(0)
}

// ============================================================================
// Forwarders
// ============================================================================

/// Forwarder for a method taking `&mut T`.
pub(crate) fn method<T, Args, F>(name: &str, f: F) -> Function
where
    T: NativeType,
    Args: ArgumentPack,
    F: MethodFn<T, Args>,
{
    Function::new(name, move |ctx| {
        // By-value copies of the receiver release their view while collecting.
        let (args, source) = Args::collect(ctx, RECEIVER + 1)?;
        let mut this = ctx.peek::<ObjMut<T>>(RECEIVER)?;
        let pending = args.write_backs();
        let output = f.call_method(&mut *this, args);
        drop(this);
        source.write_back(ctx, pending)?;
        output.push_results(ctx)
    })
}

/// Forwarder for a method taking `&T`; accepts const handles.
pub(crate) fn const_method<T, Args, F>(name: &str, f: F) -> Function
where
    T: NativeType,
    Args: ArgumentPack,
    F: ConstMethodFn<T, Args>,
{
    Function::new(name, move |ctx| {
        let (args, source) = Args::collect(ctx, RECEIVER + 1)?;
        let this = ctx.peek::<ObjRef<T>>(RECEIVER)?;
        let pending = args.write_backs();
        let output = f.call_method(&*this, args);
        drop(this);
        source.write_back(ctx, pending)?;
        output.push_results(ctx)
    })
}

/// Forwarder for a function stored on a type table.
///
/// Both `Type.f(a, b)` and `Type:f(a, b)` are accepted: when the first slot is
/// the type's own table it is skipped.
pub(crate) fn static_function<Args, F>(owner: TypeHash, name: &str, f: F) -> Function
where
    Args: ArgumentPack,
    F: StaticFn<Args>,
    F::Output: IntoResults,
{
    Function::new(name, move |ctx| {
        let first = if ctx.is_type_table(1, owner) { 2 } else { 1 };
        let (args, source) = Args::collect(ctx, first)?;
        let pending = args.write_backs();
        let output = f.call_static(args);
        source.write_back(ctx, pending)?;
        output.push_results(ctx)
    })
}

/// Forwarder for a free function.
pub(crate) fn free_function<Args, F>(name: &str, f: F) -> Function
where
    Args: ArgumentPack,
    F: StaticFn<Args>,
    F::Output: IntoResults,
{
    Function::new(name, move |ctx| {
        let (args, source) = Args::collect(ctx, 1)?;
        let pending = args.write_backs();
        let output = f.call_static(args);
        source.write_back(ctx, pending)?;
        output.push_results(ctx)
    })
}

/// Forwarder for a method returning a reference into its receiver.
///
/// The result is a borrowed handle anchored to the receiver's handle.
pub(crate) fn borrow_method<T, B, F>(name: &str, f: F) -> Function
where
    T: NativeType,
    B: NativeType,
    F: Fn(&T) -> &B + 'static,
{
    Function::new(name, move |ctx| {
        let this = ctx.peek::<ObjRef<T>>(RECEIVER)?;
        let ptr = NonNull::from(f(&*this));
        let anchor = Rc::clone(ObjRef::handle(&this));
        drop(this);
        let (hash, type_name) = ctx.state().type_info::<B>()?;
        // SAFETY: the builder's caller promised the projection stays valid for
        // the receiver's lifetime; the anchor tracks that lifetime.
        let handle = unsafe { ObjectHandle::borrowed(ptr, true, hash, type_name, Some(anchor)) };
        ctx.push(Value::Userdata(handle));
        Ok(1)
    })
}

/// Mutable variant of [`borrow_method`]; rejects const receivers.
pub(crate) fn borrow_method_mut<T, B, F>(name: &str, f: F) -> Function
where
    T: NativeType,
    B: NativeType,
    F: Fn(&mut T) -> &mut B + 'static,
{
    Function::new(name, move |ctx| {
        let mut this = ctx.peek::<ObjMut<T>>(RECEIVER)?;
        let ptr = NonNull::from(f(&mut *this));
        let anchor = Rc::clone(ObjMut::handle(&this));
        drop(this);
        let (hash, type_name) = ctx.state().type_info::<B>()?;
        // SAFETY: see `borrow_method`.
        let handle = unsafe { ObjectHandle::borrowed(ptr, false, hash, type_name, Some(anchor)) };
        ctx.push(Value::Userdata(handle));
        Ok(1)
    })
}

/// Property read entry.
pub(crate) fn getter<T, V, G>(get: G) -> Getter
where
    T: NativeType,
    V: IntoStack,
    G: Fn(&T) -> V + 'static,
{
    Rc::new(move |state, receiver| {
        let value = {
            let this = ObjRef::<T>::from_value(receiver, RECEIVER as usize, state)?;
            get(&*this)
        };
        value.into_value(state)
    })
}

/// Property write entry.
pub(crate) fn setter<T, V, S>(set: S) -> Setter
where
    T: NativeType,
    V: FromStack,
    S: Fn(&mut T, V) + 'static,
{
    Rc::new(move |state, receiver, assigned| {
        let value = V::from_value(assigned, ASSIGNED, state)?;
        let mut this = ObjMut::<T>::from_value(receiver, RECEIVER as usize, state)?;
        set(&mut *this, value);
        Ok(())
    })
}

/// `clone` entry for a copyable type.
pub(crate) fn cloner<T: NativeType + Clone>(owner: TypeHash) -> Function {
    Function::new("clone", move |ctx| {
        let first = if ctx.is_type_table(1, owner) { 2 } else { 1 };
        let this = ctx.peek::<ObjRef<T>>(first)?;
        let copy = T::clone(&*this);
        drop(this);
        ctx.push_value(copy)?;
        Ok(1)
    })
}

/// `clone` entry for a type without the copy capability: always nil.
pub(crate) fn no_clone() -> Function {
    Function::new("clone", |ctx| {
        ctx.push(Value::Nil);
        Ok(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_member_is_rejected() {
        let hash = TypeHash::from_key("test.Thing");
        let mut mt = Metatable::new("test.Thing".into(), hash, "Thing".into());
        mt.insert("go", Member::Method(no_clone())).unwrap();
        let err = mt.insert("go", Member::Method(no_clone())).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::DuplicateMember {
                type_name: "Thing".into(),
                member: "go".into()
            }
        );
        assert_eq!(mt.len(), 1);
        assert_eq!(mt.member_names().collect::<Vec<_>>(), vec!["go"]);
    }

    #[test]
    fn hooks_are_functions() {
        let hash = TypeHash::from_key("test.Thing");
        let mt = Metatable::new("test.Thing".into(), hash, "Thing".into());
        assert_eq!(mt.index_hook().type_name(), "function");
        assert_eq!(mt.newindex_hook().type_name(), "function");
        assert_eq!(mt.gc_hook().type_name(), "function");
        assert_eq!(mt.key(), "test.Thing");
        assert!(mt.is_empty());
    }

    #[test]
    fn no_clone_yields_nil() {
        let mut state = State::new();
        let results = state
            .call(&Value::Function(no_clone()), &mut [Value::Integer(1)])
            .unwrap();
        assert_eq!(results, vec![Value::Nil]);
    }
}
