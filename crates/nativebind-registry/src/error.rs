//! Registration errors.
//!
//! These are configuration errors raised while the host declares its bindings.
//! They are never produced once scripts run; a host is expected to treat any of
//! them as a fatal startup failure.

use thiserror::Error;

/// Errors raised while populating the type registry or a type's dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The native type was already registered (possibly under another name).
    #[error("register type <{rust_name}> as '{name}' failed, already registered as '{existing}'")]
    DuplicateRegistration {
        /// The name requested by the second registration.
        name: String,
        /// The native type name.
        rust_name: &'static str,
        /// The name given by the first registration.
        existing: String,
    },

    /// Another native type already uses this display name.
    #[error("type name '{name}' is already used by <{existing}>")]
    DuplicateName {
        /// The contested display name.
        name: String,
        /// Native type name of the current owner.
        existing: &'static str,
    },

    /// A base type must be registered before an edge to it is declared.
    #[error("base type <{base}> of '{derived}' is not registered")]
    UnregisteredBase {
        /// Display name of the derived type.
        derived: String,
        /// Native type name of the missing base.
        base: &'static str,
    },

    /// A type referenced by hash or native type is unknown.
    #[error("type <{0}> is not registered")]
    UnregisteredType(String),

    /// The same base was declared twice for one derived type.
    #[error("'{base}' is already a base of '{derived}'")]
    DuplicateBase {
        /// Display name of the derived type.
        derived: String,
        /// Display name of the base.
        base: String,
    },

    /// The edge would make a type its own ancestor.
    #[error("inheriting '{derived}' from '{base}' would create a cycle")]
    CyclicInheritance {
        /// Display name of the derived type.
        derived: String,
        /// Display name of the base.
        base: String,
    },

    /// A member name was installed twice on the same type.
    #[error("member '{member}' is already defined on '{type_name}'")]
    DuplicateMember {
        /// Display name of the owning type.
        type_name: String,
        /// The duplicated member name.
        member: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_message() {
        let err = RegistrationError::DuplicateRegistration {
            name: "Beast".into(),
            rust_name: "game::Animal",
            existing: "Animal".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("game::Animal"));
        assert!(msg.contains("'Beast'"));
        assert!(msg.contains("already registered as 'Animal'"));
    }

    #[test]
    fn unregistered_base_message() {
        let err = RegistrationError::UnregisteredBase {
            derived: "Animal".into(),
            base: "game::Mover",
        };
        assert!(err.to_string().contains("game::Mover"));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn duplicate_member_message() {
        let err = RegistrationError::DuplicateMember {
            type_name: "Mover".into(),
            member: "step".into(),
        };
        assert_eq!(err.to_string(), "member 'step' is already defined on 'Mover'");
    }
}
