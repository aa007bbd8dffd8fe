//! Registration-time API.
//!
//! [`State::register`] starts a [`ClassBuilder`] for one native type. Each
//! declaration step validates what it can immediately and returns the builder
//! again, so a whole binding reads as one `?` chain:
//!
//! ```
//! use nativebind::{NativeType, State, Value, base_of};
//!
//! #[derive(Clone)]
//! struct Mover {
//!     x: f64,
//! }
//! impl NativeType for Mover {}
//!
//! struct Animal {
//!     legs: u32,
//!     mover: Mover,
//! }
//! impl NativeType for Animal {}
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut state = State::new();
//! state
//!     .register::<Mover>("Mover")?
//!     .constructor(|x: f64| Mover { x })?
//!     .method("step", |m: &mut Mover, dx: f64| m.x += dx)?
//!     .property("x", |m: &Mover| m.x, |m: &mut Mover, x: f64| m.x = x)?
//!     .cloneable()?
//!     .build()?;
//! state
//!     .register::<Animal>("Animal")?
//!     .inherits(base_of!(Animal, mover: Mover))?
//!     .constructor(|legs: u32| Animal { legs, mover: Mover { x: 0.0 } })?
//!     .property_readonly("legs", |a: &Animal| a.legs)?
//!     .build()?;
//!
//! let dog = state.call_static("Animal", "new", &[Value::Integer(4)])?.remove(0);
//! state.call_method(&dog, "step", &[Value::Number(2.5)])?;
//! assert_eq!(state.index(&dog, &Value::from("x"))?, Value::Number(2.5));
//! # Ok(())
//! # }
//! ```
//!
//! Nothing reaches the runtime until [`ClassBuilder::build`] runs: the type is
//! in the registry from `register` on, but its dispatch table, inheritance
//! edges and global table are committed together at the end.

use std::any::TypeId;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use nativebind_registry::{BaseSpec, RegistrationError, TypeHash};
use tracing::debug;

use crate::dispatch::{self, Member, Metatable, PropertyBinding};
use crate::error::BindError;
use crate::marshal::{
    ArgumentPack, ConstMethodFn, FromStack, IntoResults, IntoStack, MethodFn, NativeType,
    StaticFn,
};
use crate::stack::CallContext;
use crate::state::State;
use crate::table::Table;
use crate::value::{Function, Value};

/// Where a base sub-object lives inside a derived type `D`.
///
/// Built with [`base_of!`](crate::base_of), which computes the offset from the
/// type layout.
pub struct BaseLayout<D> {
    spec: BaseSpec,
    _derived: PhantomData<fn(&D)>,
}

impl<D: NativeType> BaseLayout<D> {
    /// # Safety
    ///
    /// `offset` must be the byte offset of a field of type `B` inside `D`.
    #[doc(hidden)]
    pub unsafe fn new<B: NativeType>(offset: usize) -> Self {
        Self {
            spec: BaseSpec::of::<B>(offset),
            _derived: PhantomData,
        }
    }

    /// Byte offset of the base sub-object.
    pub fn offset(&self) -> usize {
        self.spec.offset
    }

    pub fn base_type_id(&self) -> TypeId {
        self.spec.type_id
    }
}

impl<D> std::fmt::Debug for BaseLayout<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseLayout")
            .field("base", &self.spec.rust_name)
            .field("offset", &self.spec.offset)
            .finish()
    }
}

/// Describe the field `$field: $base` of `$derived` as an inherited base.
///
/// ```
/// use nativebind::{NativeType, base_of};
///
/// struct Mover;
/// impl NativeType for Mover {}
/// struct Animal {
///     name: String,
///     mover: Mover,
/// }
/// impl NativeType for Animal {}
///
/// let layout = base_of!(Animal, mover: Mover);
/// assert_eq!(layout.offset(), std::mem::offset_of!(Animal, mover));
/// ```
#[macro_export]
macro_rules! base_of {
    ($derived:ty, $field:ident : $base:ty) => {{
        let _field_has_base_type = |d: &$derived| {
            let _: &$base = &d.$field;
        };
        // SAFETY: the closure above proves `$field` is a `$base`.
        unsafe {
            $crate::BaseLayout::<$derived>::new::<$base>(::core::mem::offset_of!($derived, $field))
        }
    }};
}

/// Names reserved on every type's global table.
const CONSTRUCTOR: &str = "new";
const CLONE: &str = "clone";

/// Declares the bindings of one native type.
#[must_use = "a class builder commits nothing until `build` is called"]
pub struct ClassBuilder<'s, T: NativeType> {
    state: &'s mut State,
    hash: TypeHash,
    name: Rc<str>,
    metatable: Metatable,
    statics: Table,
    bases: Vec<BaseSpec>,
    cloneable: bool,
    _type: PhantomData<fn() -> T>,
}

impl State {
    /// Register `T` under `name` and start declaring its bindings.
    ///
    /// Fails with [`RegistrationError::DuplicateRegistration`] if `T` is
    /// already registered, whatever name it was registered under.
    pub fn register<T: NativeType>(
        &mut self,
        name: &str,
    ) -> Result<ClassBuilder<'_, T>, RegistrationError> {
        let hash = self.registry_mut().register::<T>(name)?;
        let key = self
            .registry()
            .get(hash)
            .map(|d| d.qualified_key().to_string())
            .unwrap_or_default();
        let name: Rc<str> = name.into();
        Ok(ClassBuilder {
            metatable: Metatable::new(key, hash, Rc::clone(&name)),
            state: self,
            hash,
            name,
            statics: Table::new(),
            bases: Vec::new(),
            cloneable: false,
            _type: PhantomData,
        })
    }

    /// Declare a base of an already built type.
    pub fn inherit<D: NativeType>(&mut self, base: BaseLayout<D>) -> Result<(), RegistrationError> {
        let derived = self
            .registry()
            .hash_of_type::<D>()
            .ok_or_else(|| RegistrationError::UnregisteredType(std::any::type_name::<D>().into()))?;
        self.registry_mut().declare_inheritance(derived, &[base.spec])
    }

    /// Wrap a native function as a callable value.
    pub fn create_function<Args, F>(&self, name: &str, f: F) -> Value
    where
        Args: ArgumentPack,
        F: StaticFn<Args>,
        F::Output: IntoResults,
    {
        Value::Function(dispatch::free_function(name, f))
    }

    /// Bind a native function as a global.
    pub fn register_function<Args, F>(&mut self, name: &str, f: F)
    where
        Args: ArgumentPack,
        F: StaticFn<Args>,
        F::Output: IntoResults,
    {
        let function = self.create_function(name, f);
        debug!(name, "registering global function");
        self.set_global(name, function);
    }
}

impl<'s, T: NativeType> ClassBuilder<'s, T> {
    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare `base` as an inherited base of `T`.
    ///
    /// The base must already be registered. The edge is committed by
    /// [`build`](Self::build).
    pub fn inherits(mut self, base: BaseLayout<T>) -> Result<Self, RegistrationError> {
        if self.state.registry().hash_of(base.spec.type_id).is_none() {
            return Err(RegistrationError::UnregisteredBase {
                derived: self.name.to_string(),
                base: base.spec.rust_name,
            });
        }
        self.bases.push(base.spec);
        Ok(self)
    }

    /// Install `new`: arguments are marshalled into `f`'s parameters and the
    /// result is moved into an owning handle.
    pub fn constructor<Args, F>(mut self, f: F) -> Result<Self, RegistrationError>
    where
        Args: ArgumentPack,
        F: StaticFn<Args, Output = T>,
    {
        let function = dispatch::static_function(self.hash, CONSTRUCTOR, f);
        self.add_static(CONSTRUCTOR, function)?;
        Ok(self)
    }

    /// Bind a method taking the receiver mutably. Const handles are rejected.
    pub fn method<Args, F>(mut self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        Args: ArgumentPack,
        F: MethodFn<T, Args>,
    {
        let function = dispatch::method::<T, Args, F>(name, f);
        self.add_member(name, Member::Method(function))?;
        Ok(self)
    }

    /// Bind a method taking the receiver by shared reference.
    pub fn method_const<Args, F>(mut self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        Args: ArgumentPack,
        F: ConstMethodFn<T, Args>,
    {
        let function = dispatch::const_method::<T, Args, F>(name, f);
        self.add_member(name, Member::Method(function))?;
        Ok(self)
    }

    /// Bind a method returning a const view into the receiver.
    ///
    /// The returned handle is anchored to the receiver's handle and goes stale
    /// once the receiver is finalized.
    ///
    /// # Safety
    ///
    /// The projected reference must point into memory owned by the receiver
    /// that stays at the same address for the receiver's whole lifetime: a
    /// field, or a boxed value the receiver never replaces.
    pub unsafe fn method_borrow<B, F>(mut self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        B: NativeType,
        F: Fn(&T) -> &B + 'static,
    {
        let function = dispatch::borrow_method::<T, B, F>(name, f);
        self.add_member(name, Member::Method(function))?;
        Ok(self)
    }

    /// Mutable variant of [`method_borrow`](Self::method_borrow).
    ///
    /// # Safety
    ///
    /// Same contract as [`method_borrow`](Self::method_borrow).
    pub unsafe fn method_borrow_mut<B, F>(
        mut self,
        name: &str,
        f: F,
    ) -> Result<Self, RegistrationError>
    where
        B: NativeType,
        F: Fn(&mut T) -> &mut B + 'static,
    {
        let function = dispatch::borrow_method_mut::<T, B, F>(name, f);
        self.add_member(name, Member::Method(function))?;
        Ok(self)
    }

    /// Bind a read/write property.
    pub fn property<V, G, S>(mut self, name: &str, get: G, set: S) -> Result<Self, RegistrationError>
    where
        V: IntoStack + FromStack,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        let binding =
            PropertyBinding::new(dispatch::getter::<T, V, G>(get), Some(dispatch::setter::<T, V, S>(set)));
        self.add_member(name, Member::Property(binding))?;
        Ok(self)
    }

    /// Bind a property scripts can read but not assign.
    pub fn property_readonly<V, G>(mut self, name: &str, get: G) -> Result<Self, RegistrationError>
    where
        V: IntoStack,
        G: Fn(&T) -> V + 'static,
    {
        let binding = PropertyBinding::new(dispatch::getter::<T, V, G>(get), None);
        self.add_member(name, Member::Property(binding))?;
        Ok(self)
    }

    /// Bind a function on the type's global table.
    pub fn function<Args, F>(mut self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        Args: ArgumentPack,
        F: StaticFn<Args>,
        F::Output: IntoResults,
    {
        let function = dispatch::static_function(self.hash, name, f);
        self.add_static(name, function)?;
        Ok(self)
    }

    /// Bind a function working on the raw call frame.
    pub fn function_raw<F>(mut self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: Fn(&mut CallContext<'_>) -> Result<usize, BindError> + 'static,
    {
        self.add_static(name, Function::new(name, f))?;
        Ok(self)
    }

    /// Let scripts copy objects of this type with `clone`.
    pub fn cloneable(mut self) -> Result<Self, RegistrationError>
    where
        T: Clone,
    {
        if self.cloneable {
            return Err(self.duplicate(CLONE));
        }
        self.cloneable = true;
        self.statics.set(CLONE, Value::Function(dispatch::cloner::<T>(self.hash)));
        Ok(self)
    }

    /// Commit inheritance edges, the dispatch table and the type's global table.
    pub fn build(mut self) -> Result<(), RegistrationError> {
        if !self.bases.is_empty() {
            self.state
                .registry_mut()
                .declare_inheritance(self.hash, &self.bases)?;
        }
        if !self.cloneable {
            self.statics.set(CLONE, Value::Function(dispatch::no_clone()));
        }

        debug!(
            type_name = %self.name,
            key = self.metatable.key(),
            members = self.metatable.len(),
            bases = self.bases.len(),
            "binding type"
        );
        let table = Rc::new(RefCell::new(self.statics));
        self.state
            .install_type_table(self.hash, Rc::clone(&self.name), Rc::clone(&table));
        self.state.install_metatable(self.metatable);
        self.state.set_global(&self.name, Value::Table(table));
        Ok(())
    }

    fn add_member(&mut self, name: &str, member: Member) -> Result<(), RegistrationError> {
        debug!(type_name = %self.name, member = name, kind = ?member, "adding member");
        self.metatable.insert(name, member)
    }

    fn add_static(&mut self, name: &str, function: Function) -> Result<(), RegistrationError> {
        if self.statics.contains(name) || name == CLONE {
            return Err(self.duplicate(name));
        }
        debug!(type_name = %self.name, function = name, "adding static function");
        self.statics.set(name, Value::Function(function));
        Ok(())
    }

    fn duplicate(&self, member: &str) -> RegistrationError {
        RegistrationError::DuplicateMember {
            type_name: self.name.to_string(),
            member: member.to_string(),
        }
    }
}
