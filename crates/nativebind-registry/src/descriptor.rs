//! Type metadata records.

use std::any::TypeId;

use crate::TypeHash;

/// A declared base of a registered type.
///
/// `offset` is the constant byte displacement from the start of the derived
/// object to the start of the base sub-object. It comes from layout
/// introspection at registration time and is never derived from a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritanceEdge {
    /// Hash of the base type.
    pub base: TypeHash,
    /// Byte offset of the base sub-object inside the derived object.
    pub offset: usize,
}

/// One entry of a type's resolution order.
///
/// Unlike an [`InheritanceEdge`], an ancestor may be indirect: its offset is
/// the sum of the offsets along the path that reached it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ancestor {
    /// Hash of the ancestor type.
    pub hash: TypeHash,
    /// Accumulated byte offset from the derived object.
    pub offset: usize,
}

/// Describes a base type at the moment an edge to it is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseSpec {
    /// Native identity of the base.
    pub type_id: TypeId,
    /// Native name of the base, for diagnostics.
    pub rust_name: &'static str,
    /// Byte offset of the base sub-object inside the derived object.
    pub offset: usize,
}

impl BaseSpec {
    /// Describe base `B` found `offset` bytes into the derived object.
    pub fn of<B: 'static>(offset: usize) -> Self {
        Self {
            type_id: TypeId::of::<B>(),
            rust_name: std::any::type_name::<B>(),
            offset,
        }
    }
}

/// Per-type metadata: display name, qualified key and inheritance edges.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub(crate) name: String,
    pub(crate) qualified_key: String,
    pub(crate) hash: TypeHash,
    pub(crate) type_id: TypeId,
    pub(crate) rust_name: &'static str,
    pub(crate) edges: Vec<InheritanceEdge>,
}

impl TypeDescriptor {
    /// The name scripts see (the global table name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The metatable key, `"<namespace>.<name>"`.
    pub fn qualified_key(&self) -> &str {
        &self.qualified_key
    }

    /// Hash of the qualified key.
    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    /// Native identity of the registered type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Native type name, as reported by `std::any::type_name`.
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Declared inheritance edges, in declaration order.
    pub fn edges(&self) -> &[InheritanceEdge] {
        &self.edges
    }

    /// Whether at least one base was declared.
    pub fn is_inherited(&self) -> bool {
        !self.edges.is_empty()
    }
}
