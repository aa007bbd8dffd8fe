//! Native object bindings for an embedded scripting runtime.
//!
//! `nativebind` exposes Rust types to scripts as opaque objects with methods,
//! properties, constructors and inheritance. The runtime talks to native code
//! through an exchange stack of [`Value`] slots; this crate provides everything
//! between that stack and your types:
//!
//! - a [`TypeRegistry`] of registered types and their inheritance edges
//! - the [marshaller](marshal) converting slots to and from native values
//! - [`ObjectHandle`]s wrapping native objects inside the runtime
//! - the dispatch engine behind `__index`, `__newindex` and `__gc`
//! - the [`ClassBuilder`] used to declare all of the above
//!
//! # Example
//!
//! ```
//! use nativebind::{NativeType, State, Value};
//!
//! #[derive(Clone)]
//! struct Counter {
//!     n: i64,
//! }
//! impl NativeType for Counter {}
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut state = State::new();
//! state
//!     .register::<Counter>("Counter")?
//!     .constructor(|n: i64| Counter { n })?
//!     .method("add", |c: &mut Counter, d: i64| c.n += d)?
//!     .method_const("get", |c: &Counter| c.n)?
//!     .build()?;
//!
//! let counter = state.call_static("Counter", "new", &[Value::Integer(1)])?.remove(0);
//! state.call_method(&counter, "add", &[Value::Integer(41)])?;
//! assert_eq!(state.call_method(&counter, "get", &[])?, vec![Value::Integer(42)]);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod marshal;
pub mod stack;
pub mod state;
pub mod table;
pub mod value;

pub use builder::{BaseLayout, ClassBuilder};
pub use config::BridgeConfig;
pub use dispatch::{Member, Metatable, PropertyBinding};
pub use error::{BindError, RegistrationError, ScriptError};
pub use handle::{HandleFlags, HandleRef, ObjMut, ObjRef, ObjectHandle};
pub use marshal::{
    ArgumentPack, Borrowed, ConstMethodFn, FromStack, InOut, IntoResults, IntoStack, MethodFn,
    NativeType, StaticFn, ValueKind, WriteBack,
};
pub use stack::{CallContext, ExchangeStack};
pub use state::State;
pub use table::{Table, TableKey};
pub use value::{Function, TableRef, Value};

pub use nativebind_registry::{Ancestor, InheritanceEdge, TypeDescriptor, TypeHash, TypeRegistry};
