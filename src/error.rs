//! Error types for the binding bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! RegistrationError (nativebind-registry) - startup configuration errors
//! BindError                               - failures inside one dispatch call
//! ScriptError                             - what the runtime sees at the call boundary
//! ```
//!
//! Bound functions return [`BindError`]; [`State::call`](crate::State::call)
//! converts it into a [`ScriptError`] so the native process stays alive and the
//! script can catch and report the failure.

use std::fmt;

use thiserror::Error;

pub use nativebind_registry::RegistrationError;

// ============================================================================
// Dispatch Errors
// ============================================================================

/// Errors raised while marshalling values or dispatching a call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    /// The slot's kind doesn't match the requested conversion.
    #[error("{expected} expected, got {actual}")]
    ArgumentTypeMismatch {
        /// 1-based stack index of the offending slot.
        index: usize,
        expected: String,
        actual: String,
    },

    /// An integer slot does not fit the native integer type.
    #[error("number {value} has no {target} representation")]
    IntegerOverflow {
        /// 1-based stack index of the offending slot.
        index: usize,
        value: i64,
        target: &'static str,
    },

    /// An unsigned native value is too large for an integer slot.
    #[error("{value} does not fit an integer slot")]
    IntegerTooLarge { value: u64 },

    /// Member name not found directly or through any base.
    #[error("'{key}' is not a member of '{type_name}'")]
    NilAccess { type_name: String, key: String },

    /// Mutable access attempted through a const handle.
    #[error("attempt to modify a const '{type_name}'")]
    ConstViolation { type_name: String },

    /// Assignment to a method or a read-only property.
    #[error("member '{key}' of '{type_name}' is not writable")]
    NotWritable { type_name: String, key: String },

    /// The handle (or the object it borrows from) was already finalized.
    #[error("object was already destroyed")]
    StaleHandle,

    /// The object is mutably borrowed by an active call.
    #[error("object is already borrowed")]
    AlreadyBorrowed,

    /// A native type crossed the boundary without being registered.
    #[error("native type <{0}> is not registered")]
    UnregisteredType(&'static str),

    /// Stack index 0, or an index outside the current frame.
    #[error("invalid stack index {0}")]
    InvalidIndex(i32),

    /// Attempted to call a value that is not a function.
    #[error("attempt to call a {0} value")]
    NotCallable(&'static str),

    /// Attempted to index a value that has no members.
    #[error("attempt to index a {0} value")]
    NotIndexable(&'static str),

    /// Table keys must be scalars (no nil or NaN).
    #[error("invalid table key ({0})")]
    InvalidKey(&'static str),

    /// Nested calls went deeper than the configured limit.
    #[error("call depth exceeded ({0})")]
    CallDepthExceeded(usize),

    /// Error reported by native code.
    #[error("{0}")]
    Native(String),

    /// Native code panicked during the call.
    #[error("native panic: {0}")]
    Panic(String),
}

impl BindError {
    /// Create an argument type mismatch error.
    pub fn mismatch(index: usize, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        BindError::ArgumentTypeMismatch {
            index,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// The 1-based argument index the error refers to, if known.
    pub fn arg_index(&self) -> Option<usize> {
        match self {
            BindError::ArgumentTypeMismatch { index, .. }
            | BindError::IntegerOverflow { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<String> for BindError {
    fn from(message: String) -> Self {
        BindError::Native(message)
    }
}

impl From<&str> for BindError {
    fn from(message: &str) -> Self {
        BindError::Native(message.to_string())
    }
}

// ============================================================================
// Boundary Errors
// ============================================================================

/// The recoverable error the runtime receives from a failed native call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    /// 1-based argument index, when the failure is tied to one argument.
    pub arg_index: Option<usize>,
    /// Human-readable message.
    pub message: String,
    kind: BindError,
}

impl ScriptError {
    /// The underlying dispatch error.
    pub fn kind(&self) -> &BindError {
        &self.kind
    }

    /// Consume the error, returning the underlying dispatch error.
    pub fn into_kind(self) -> BindError {
        self.kind
    }
}

impl From<BindError> for ScriptError {
    fn from(err: BindError) -> Self {
        ScriptError {
            arg_index: err.arg_index(),
            message: err.to_string(),
            kind: err,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arg_index {
            Some(index) => write!(f, "bad argument #{} ({})", index, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}
