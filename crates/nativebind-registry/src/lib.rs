//! Native type registry for nativebind.
//!
//! This crate owns the per-runtime table of registered native types:
//!
//! - [`TypeHash`]: deterministic identity derived from a type's qualified key
//! - [`TypeDescriptor`]: display name, qualified key and inheritance edges
//! - [`TypeRegistry`]: registration, lookup and upcast offset resolution
//!
//! It knows nothing about values or dispatch; the main `nativebind` crate
//! builds those on top of it.

mod descriptor;
mod error;
mod registry;
mod type_hash;

pub use descriptor::{Ancestor, BaseSpec, InheritanceEdge, TypeDescriptor};
pub use error::RegistrationError;
pub use registry::TypeRegistry;
pub use type_hash::{TypeHash, qualified_key};
