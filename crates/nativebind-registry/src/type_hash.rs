//! Deterministic hash-based type identity.
//!
//! [`TypeHash`] is a 64-bit hash computed from a type's qualified metatable key
//! (`"<namespace>.<Name>"`). The same key always produces the same hash, so a
//! handle only has to carry eight bytes to find its dispatch table again.
//!
//! # Examples
//!
//! ```
//! use nativebind_registry::TypeHash;
//!
//! let a = TypeHash::from_key("nativebind.Animal");
//! let b = TypeHash::from_key("nativebind.Animal");
//! assert_eq!(a, b);
//! assert_ne!(a, TypeHash::from_key("nativebind.Mover"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain marker mixed into every type hash.
const TYPE_DOMAIN: u64 = 0x2fac10b63a6cc57c;

/// A deterministic 64-bit hash identifying a registered type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a qualified metatable key.
    #[inline]
    pub fn from_key(key: &str) -> Self {
        TypeHash(TYPE_DOMAIN ^ xxh64(key.as_bytes(), 0))
    }

    /// Build the qualified key for `name` inside `namespace` and hash it.
    #[inline]
    pub fn qualified(namespace: &str, name: &str) -> (String, Self) {
        let key = qualified_key(namespace, name);
        let hash = Self::from_key(&key);
        (key, hash)
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Format the metatable key for a type: `"<namespace>.<name>"`.
pub fn qualified_key(namespace: &str, name: &str) -> String {
    let mut key = String::with_capacity(namespace.len() + name.len() + 1);
    key.push_str(namespace);
    key.push('.');
    key.push_str(name);
    key
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
