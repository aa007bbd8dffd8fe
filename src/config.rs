//! Bridge configuration.

/// Default metatable key namespace.
pub const DEFAULT_NAMESPACE: &str = "nativebind";

/// Default limit on nested native calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Configuration for a [`State`](crate::State).
///
/// # Example
///
/// ```
/// use nativebind::{BridgeConfig, State};
///
/// let state = State::with_config(
///     BridgeConfig::default()
///         .namespace("game")
///         .max_call_depth(64),
/// );
/// assert_eq!(state.config().namespace, "game");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Prefix of every metatable key (`"<namespace>.<TypeName>"`).
    pub namespace: String,
    /// Convert panics in bound functions into [`BindError::Panic`](crate::BindError::Panic).
    pub catch_panics: bool,
    /// Maximum nesting of [`State::call`](crate::State::call).
    pub max_call_depth: usize,
}

impl BridgeConfig {
    /// Set the metatable key namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Enable or disable panic catching at the call boundary.
    pub fn catch_panics(mut self, catch: bool) -> Self {
        self.catch_panics = catch;
        self
    }

    /// Set the maximum call nesting depth.
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            catch_panics: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
