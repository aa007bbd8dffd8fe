//! TypeRegistry - per-type metadata and inheritance lookup.
//!
//! # Storage Model
//!
//! - **Types**: every [`TypeDescriptor`] is stored by its [`TypeHash`].
//! - **Native identity**: `TypeId -> TypeHash`, so marshalling code can find the
//!   descriptor of a Rust type without knowing its script name.
//! - **Names**: `display name -> TypeHash`.
//! - **Lineage cache**: resolution orders computed on demand, dropped whenever
//!   an edge is added.
//!
//! # Thread Safety
//!
//! `TypeRegistry` is **not thread-safe**. Registration happens single-threaded
//! before any script runs; afterwards the registry is only read. The lineage
//! cache uses `RefCell`, so the registry is `!Sync`.

use std::any::TypeId;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::descriptor::{Ancestor, BaseSpec, InheritanceEdge, TypeDescriptor};
use crate::{RegistrationError, TypeHash};

/// Registry of every native type exposed to one runtime instance.
#[derive(Debug)]
pub struct TypeRegistry {
    namespace: String,
    types: FxHashMap<TypeHash, TypeDescriptor>,
    by_type_id: FxHashMap<TypeId, TypeHash>,
    by_name: FxHashMap<String, TypeHash>,
    order: Vec<TypeHash>,
    lineage_cache: RefCell<FxHashMap<TypeHash, Rc<[Ancestor]>>>,
}

impl TypeRegistry {
    /// Create an empty registry whose qualified keys use `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            types: FxHashMap::default(),
            by_type_id: FxHashMap::default(),
            by_name: FxHashMap::default(),
            order: Vec::new(),
            lineage_cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// Namespace prefix of every qualified key.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register native type `T` under `name`.
    ///
    /// Returns an error if `T` is already registered (under any name) or if
    /// `name` is taken by another type. The first registration is never
    /// overwritten.
    pub fn register<T: 'static>(&mut self, name: &str) -> Result<TypeHash, RegistrationError> {
        self.register_type_id(name, TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Register a native type by its `TypeId`.
    pub fn register_type_id(
        &mut self,
        name: &str,
        type_id: TypeId,
        rust_name: &'static str,
    ) -> Result<TypeHash, RegistrationError> {
        if let Some(existing) = self.by_type_id.get(&type_id) {
            return Err(RegistrationError::DuplicateRegistration {
                name: name.to_string(),
                rust_name,
                existing: self.types[existing].name.clone(),
            });
        }
        if let Some(existing) = self.by_name.get(name) {
            return Err(RegistrationError::DuplicateName {
                name: name.to_string(),
                existing: self.types[existing].rust_name,
            });
        }

        let (qualified_key, hash) = TypeHash::qualified(&self.namespace, name);
        debug!(name, key = %qualified_key, rust_name, "registering type");

        self.types.insert(
            hash,
            TypeDescriptor {
                name: name.to_string(),
                qualified_key,
                hash,
                type_id,
                rust_name,
                edges: Vec::new(),
            },
        );
        self.by_type_id.insert(type_id, hash);
        self.by_name.insert(name.to_string(), hash);
        self.order.push(hash);
        Ok(hash)
    }

    /// Declare bases for a registered type.
    ///
    /// Every base must already be registered. Edges are appended in the given
    /// order after any previously declared edges.
    pub fn declare_inheritance(
        &mut self,
        derived: TypeHash,
        bases: &[BaseSpec],
    ) -> Result<(), RegistrationError> {
        let derived_name = self
            .types
            .get(&derived)
            .map(|d| d.name.clone())
            .ok_or_else(|| RegistrationError::UnregisteredType(derived.to_string()))?;

        // Validate everything before mutating, so a failed call leaves no partial edges.
        let mut resolved = Vec::with_capacity(bases.len());
        for spec in bases {
            let base = *self.by_type_id.get(&spec.type_id).ok_or_else(|| {
                RegistrationError::UnregisteredBase {
                    derived: derived_name.clone(),
                    base: spec.rust_name,
                }
            })?;
            let base_name = self.types[&base].name.clone();

            let already_declared = self.types[&derived].edges.iter().any(|e| e.base == base)
                || resolved.iter().any(|e: &InheritanceEdge| e.base == base);
            if already_declared {
                return Err(RegistrationError::DuplicateBase {
                    derived: derived_name,
                    base: base_name,
                });
            }
            if base == derived || self.lineage(base).iter().any(|a| a.hash == derived) {
                return Err(RegistrationError::CyclicInheritance {
                    derived: derived_name,
                    base: base_name,
                });
            }

            debug!(derived = %derived_name, base = %base_name, offset = spec.offset, "declaring base");
            resolved.push(InheritanceEdge {
                base,
                offset: spec.offset,
            });
        }

        if let Some(descriptor) = self.types.get_mut(&derived) {
            descriptor.edges.extend(resolved);
        }
        self.lineage_cache.borrow_mut().clear();
        Ok(())
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    /// Look up a type by display name.
    pub fn lookup(&self, name: &str) -> Option<&TypeDescriptor> {
        self.by_name.get(name).and_then(|h| self.types.get(h))
    }

    /// Look up a type by hash.
    pub fn get(&self, hash: TypeHash) -> Option<&TypeDescriptor> {
        self.types.get(&hash)
    }

    /// Hash of a registered native type.
    pub fn hash_of(&self, type_id: TypeId) -> Option<TypeHash> {
        self.by_type_id.get(&type_id).copied()
    }

    /// Hash of registered native type `T`.
    pub fn hash_of_type<T: 'static>(&self) -> Option<TypeHash> {
        self.hash_of(TypeId::of::<T>())
    }

    /// Whether `T` has been registered.
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.by_type_id.contains_key(&TypeId::of::<T>())
    }

    /// Whether the type declared at least one base.
    pub fn is_inherited(&self, hash: TypeHash) -> bool {
        self.types.get(&hash).is_some_and(|d| d.is_inherited())
    }

    /// Declared edges of a type (empty for unknown types).
    pub fn edges(&self, hash: TypeHash) -> &[InheritanceEdge] {
        self.types.get(&hash).map(|d| d.edges()).unwrap_or(&[])
    }

    /// Display name for a hash, or `"?"` for unknown hashes.
    pub fn name_of(&self, hash: TypeHash) -> &str {
        self.types.get(&hash).map(|d| d.name()).unwrap_or("?")
    }

    /// Resolution order used for inherited member lookup.
    ///
    /// The direct edges come first in declaration order, followed by the
    /// lineage of each direct base with offsets accumulated. When an ancestor is
    /// reachable along several paths the first one wins.
    pub fn lineage(&self, hash: TypeHash) -> Rc<[Ancestor]> {
        if let Some(cached) = self.lineage_cache.borrow().get(&hash) {
            return Rc::clone(cached);
        }

        let edges = self.edges(hash);
        let mut lineage: Vec<Ancestor> = Vec::with_capacity(edges.len());
        let push_unique = |ancestor: Ancestor, lineage: &mut Vec<Ancestor>| {
            if ancestor.hash != hash && !lineage.iter().any(|a| a.hash == ancestor.hash) {
                lineage.push(ancestor);
            }
        };

        for edge in edges {
            push_unique(
                Ancestor {
                    hash: edge.base,
                    offset: edge.offset,
                },
                &mut lineage,
            );
        }
        for edge in edges {
            for ancestor in self.lineage(edge.base).iter() {
                push_unique(
                    Ancestor {
                        hash: ancestor.hash,
                        offset: edge.offset + ancestor.offset,
                    },
                    &mut lineage,
                );
            }
        }

        let lineage: Rc<[Ancestor]> = lineage.into();
        self.lineage_cache
            .borrow_mut()
            .insert(hash, Rc::clone(&lineage));
        lineage
    }

    /// Byte offset of the `to` sub-object inside a `from` object.
    ///
    /// `Some(0)` when both are the same type, `None` when `to` is not an
    /// ancestor of `from`.
    pub fn upcast_offset(&self, from: TypeHash, to: TypeHash) -> Option<usize> {
        if from == to {
            return Some(0);
        }
        self.lineage(from)
            .iter()
            .find(|a| a.hash == to)
            .map(|a| a.offset)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type has been registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.order.iter().filter_map(|h| self.types.get(h))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new("nativebind")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    struct Creature {
        _hp: i32,
    }
    struct Mover {
        _x: i64,
    }
    #[allow(dead_code)]
    struct Animal {
        tag: u8,
        creature: Creature,
        mover: Mover,
    }
    #[allow(dead_code)]
    struct Dog {
        animal: Animal,
        bark: u16,
    }

    fn hierarchy() -> (TypeRegistry, TypeHash, TypeHash, TypeHash) {
        let mut registry = TypeRegistry::default();
        let creature = registry.register::<Creature>("Creature").unwrap();
        let mover = registry.register::<Mover>("Mover").unwrap();
        let animal = registry.register::<Animal>("Animal").unwrap();
        registry
            .declare_inheritance(
                animal,
                &[
                    BaseSpec::of::<Creature>(offset_of!(Animal, creature)),
                    BaseSpec::of::<Mover>(offset_of!(Animal, mover)),
                ],
            )
            .unwrap();
        (registry, creature, mover, animal)
    }

    #[test]
    fn register_builds_qualified_key() {
        let mut registry = TypeRegistry::new("zlua");
        let hash = registry.register::<Creature>("Creature").unwrap();
        let descriptor = registry.lookup("Creature").unwrap();
        assert_eq!(descriptor.qualified_key(), "zlua.Creature");
        assert_eq!(descriptor.hash(), hash);
        assert_eq!(registry.hash_of_type::<Creature>(), Some(hash));
        assert!(!descriptor.is_inherited());
    }

    #[test]
    fn duplicate_type_under_other_name_is_rejected() {
        let mut registry = TypeRegistry::default();
        registry.register::<Creature>("Creature").unwrap();
        let err = registry.register::<Creature>("Beast").unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::DuplicateRegistration { ref existing, .. } if existing == "Creature"
        ));
        // First registration intact, second name never created.
        assert!(registry.lookup("Creature").is_some());
        assert!(registry.lookup("Beast").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = TypeRegistry::default();
        registry.register::<Creature>("Thing").unwrap();
        let err = registry.register::<Mover>("Thing").unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateName { .. }));
        assert!(!registry.is_registered::<Mover>());
    }

    #[test]
    fn edges_keep_declaration_order_and_offsets() {
        let (registry, creature, mover, animal) = hierarchy();
        let edges = registry.edges(animal);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].base, creature);
        assert_eq!(edges[0].offset, offset_of!(Animal, creature));
        assert_eq!(edges[1].base, mover);
        assert_eq!(edges[1].offset, offset_of!(Animal, mover));
        assert!(registry.is_inherited(animal));
        assert!(!registry.is_inherited(mover));
    }

    #[test]
    fn unregistered_base_is_rejected() {
        let mut registry = TypeRegistry::default();
        let animal = registry.register::<Animal>("Animal").unwrap();
        let err = registry
            .declare_inheritance(animal, &[BaseSpec::of::<Mover>(0)])
            .unwrap_err();
        assert!(matches!(err, RegistrationError::UnregisteredBase { .. }));
        assert!(registry.edges(animal).is_empty());
    }

    #[test]
    fn duplicate_base_is_rejected() {
        let (mut registry, _, _, animal) = hierarchy();
        let err = registry
            .declare_inheritance(animal, &[BaseSpec::of::<Mover>(offset_of!(Animal, mover))])
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateBase { .. }));
    }

    #[test]
    fn cycles_are_rejected() {
        let (mut registry, _, mover, _) = hierarchy();
        let err = registry
            .declare_inheritance(mover, &[BaseSpec::of::<Animal>(0)])
            .unwrap_err();
        assert!(matches!(err, RegistrationError::CyclicInheritance { .. }));

        let err = registry
            .declare_inheritance(mover, &[BaseSpec::of::<Mover>(0)])
            .unwrap_err();
        assert!(matches!(err, RegistrationError::CyclicInheritance { .. }));
    }

    #[test]
    fn upcast_offset_direct_and_transitive() {
        let (mut registry, creature, mover, animal) = hierarchy();
        let dog = registry.register::<Dog>("Dog").unwrap();
        registry
            .declare_inheritance(dog, &[BaseSpec::of::<Animal>(offset_of!(Dog, animal))])
            .unwrap();

        assert_eq!(registry.upcast_offset(animal, animal), Some(0));
        assert_eq!(
            registry.upcast_offset(animal, mover),
            Some(offset_of!(Animal, mover))
        );
        assert_eq!(
            registry.upcast_offset(dog, mover),
            Some(offset_of!(Dog, animal) + offset_of!(Animal, mover))
        );
        assert_eq!(
            registry.upcast_offset(dog, creature),
            Some(offset_of!(Dog, animal) + offset_of!(Animal, creature))
        );
        assert_eq!(registry.upcast_offset(mover, animal), None);
    }

    #[test]
    fn lineage_lists_direct_bases_first() {
        let (mut registry, creature, mover, animal) = hierarchy();
        let dog = registry.register::<Dog>("Dog").unwrap();
        registry
            .declare_inheritance(dog, &[BaseSpec::of::<Animal>(offset_of!(Dog, animal))])
            .unwrap();

        let order: Vec<TypeHash> = registry.lineage(dog).iter().map(|a| a.hash).collect();
        assert_eq!(order, vec![animal, creature, mover]);
    }

    #[test]
    fn lineage_cache_is_refreshed_by_new_edges() {
        let mut registry = TypeRegistry::default();
        let creature = registry.register::<Creature>("Creature").unwrap();
        let animal = registry.register::<Animal>("Animal").unwrap();
        let dog = registry.register::<Dog>("Dog").unwrap();
        registry
            .declare_inheritance(dog, &[BaseSpec::of::<Animal>(offset_of!(Dog, animal))])
            .unwrap();
        assert_eq!(registry.upcast_offset(dog, creature), None);

        registry
            .declare_inheritance(
                animal,
                &[BaseSpec::of::<Creature>(offset_of!(Animal, creature))],
            )
            .unwrap();
        assert_eq!(
            registry.upcast_offset(dog, creature),
            Some(offset_of!(Dog, animal) + offset_of!(Animal, creature))
        );
    }

    #[test]
    fn iter_follows_registration_order() {
        let (registry, ..) = hierarchy();
        let names: Vec<&str> = registry.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Creature", "Mover", "Animal"]);
        assert_eq!(registry.name_of(TypeHash::EMPTY), "?");
    }
}
