//! The runtime state: exchange stack, globals, metatables and type registry.
//!
//! `State` is the minimal runtime-side surface the binding core needs. It
//! owns no interpreter; it implements the protocol a runtime follows when it
//! calls native functions and triggers member access or finalization hooks.
//!
//! # Thread Safety
//!
//! `State` is `!Send` and `!Sync`: values are `Rc`-based and the registry is
//! mutated only through `&mut State` during registration.

use std::any::type_name;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use nativebind_registry::{TypeHash, TypeRegistry};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::config::BridgeConfig;
use crate::dispatch::Metatable;
use crate::error::{BindError, ScriptError};
use crate::marshal::{FromStack, IntoStack, NativeType};
use crate::stack::{CallContext, ExchangeStack};
use crate::table::Table;
use crate::value::{TableRef, Value};

/// Runtime state shared by every call.
pub struct State {
    config: BridgeConfig,
    registry: TypeRegistry,
    stack: ExchangeStack,
    globals: TableRef,
    metatables: FxHashMap<TypeHash, Rc<Metatable>>,
    type_tables: FxHashMap<TypeHash, TableRef>,
    names: FxHashMap<TypeHash, Rc<str>>,
    depth: usize,
}

impl State {
    /// Create a state with the default configuration.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a state with the given configuration.
    pub fn with_config(config: BridgeConfig) -> Self {
        Self {
            registry: TypeRegistry::new(config.namespace.clone()),
            config,
            stack: ExchangeStack::new(),
            globals: Rc::new(RefCell::new(Table::new())),
            metatables: FxHashMap::default(),
            type_tables: FxHashMap::default(),
            names: FxHashMap::default(),
            depth: 0,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The type registry of this state.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// The exchange stack.
    pub fn stack(&self) -> &ExchangeStack {
        &self.stack
    }

    pub(crate) fn stack_mut(&mut self) -> &mut ExchangeStack {
        &mut self.stack
    }

    // ==========================================================================
    // Globals and type tables
    // ==========================================================================

    /// The global table.
    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    /// Read a global; nil when unset.
    pub fn global(&self, name: &str) -> Value {
        self.globals.borrow().get(name)
    }

    /// Write a global; nil removes it.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().set(name, value);
    }

    /// Dispatch table of a registered type.
    pub fn metatable(&self, hash: TypeHash) -> Option<Rc<Metatable>> {
        self.metatables.get(&hash).cloned()
    }

    pub(crate) fn install_metatable(&mut self, metatable: Metatable) {
        self.metatables.insert(metatable.hash(), Rc::new(metatable));
    }

    /// Global table of a registered type (`new`, `clone`, static functions).
    pub fn type_table(&self, hash: TypeHash) -> Option<TableRef> {
        self.type_tables.get(&hash).cloned()
    }

    pub(crate) fn install_type_table(&mut self, hash: TypeHash, name: Rc<str>, table: TableRef) {
        self.names.insert(hash, name);
        self.type_tables.insert(hash, table);
    }

    /// Hash and display name of registered native type `T`.
    pub(crate) fn type_info<T: NativeType>(&self) -> Result<(TypeHash, Rc<str>), BindError> {
        let hash = self
            .registry
            .hash_of_type::<T>()
            .ok_or(BindError::UnregisteredType(type_name::<T>()))?;
        let name = match self.names.get(&hash) {
            Some(name) => Rc::clone(name),
            None => self.registry.name_of(hash).into(),
        };
        Ok((hash, name))
    }

    // ==========================================================================
    // Conversions
    // ==========================================================================

    /// Marshal a native value into a slot value.
    pub fn to_value<T: IntoStack>(&self, value: T) -> Result<Value, BindError> {
        value.into_value(self)
    }

    /// Read a native value out of a slot value.
    pub fn from_value<T: FromStack>(&self, value: &Value) -> Result<T, BindError> {
        T::from_value(value, 1, self)
    }

    /// A frame spanning the whole stack, for host-side push/peek/pop.
    pub fn root_frame(&mut self) -> CallContext<'_> {
        CallContext::new(self, 0)
    }

    // ==========================================================================
    // Calls and hooks
    // ==========================================================================

    /// Call a function value.
    ///
    /// `args` are pushed as a new frame. On return each argument slot is copied
    /// back into `args`, so values written back by the callee are visible to
    /// the caller. The results are returned in push order.
    pub fn call(&mut self, function: &Value, args: &mut [Value]) -> Result<Vec<Value>, ScriptError> {
        self.call_raw(function, args).map_err(ScriptError::from)
    }

    pub(crate) fn call_raw(
        &mut self,
        function: &Value,
        args: &mut [Value],
    ) -> Result<Vec<Value>, BindError> {
        let Value::Function(function) = function else {
            return Err(BindError::NotCallable(function.type_name()));
        };
        if self.depth >= self.config.max_call_depth {
            return Err(BindError::CallDepthExceeded(self.config.max_call_depth));
        }
        trace!(function = function.name(), argc = args.len(), "call");

        let base = self.stack.len();
        for arg in args.iter() {
            self.stack.push(arg.clone());
        }

        self.depth += 1;
        let outcome = if self.config.catch_panics {
            panic::catch_unwind(AssertUnwindSafe(|| {
                function.invoke(&mut CallContext::new(self, base))
            }))
            .unwrap_or_else(|payload| Err(BindError::Panic(panic_message(&*payload))))
        } else {
            function.invoke(&mut CallContext::new(self, base))
        };
        self.depth -= 1;

        let results = outcome.and_then(|count| {
            let available = self.stack.len().saturating_sub(base);
            if count > available {
                return Err(BindError::InvalidIndex(count as i32));
            }
            Ok(self.stack.tail(self.stack.len() - count).to_vec())
        });

        for (i, arg) in args.iter_mut().enumerate() {
            if let Some(value) = self.stack.get(base + i) {
                *arg = value.clone();
            }
        }
        self.stack.truncate(base);
        results
    }

    /// Call a method: look `name` up on `object`, then call it with `object`
    /// as the first argument.
    pub fn call_method(
        &mut self,
        object: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, ScriptError> {
        let method = self.index(object, &Value::from(name))?;
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(object.clone());
        argv.extend_from_slice(args);
        self.call(&method, &mut argv)
    }

    /// Call a static entry of a type's global table, such as `new`.
    pub fn call_static(
        &mut self,
        type_name: &str,
        name: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, ScriptError> {
        let table = self.global(type_name);
        let function = self.index(&table, &Value::from(name))?;
        self.call(&function, &mut args.to_vec())
    }

    /// Read `object[key]`, running the `__index` hook for userdata.
    pub fn index(&mut self, object: &Value, key: &Value) -> Result<Value, ScriptError> {
        match object {
            Value::Table(table) => Ok(table.borrow().get_value(key)?),
            Value::Userdata(handle) => {
                let hook = self.hook(handle.type_hash(), |mt| mt.index_hook())?;
                let results = self.call(&hook, &mut [object.clone(), key.clone()])?;
                Ok(results.into_iter().next().unwrap_or_default())
            }
            other => Err(BindError::NotIndexable(other.type_name()).into()),
        }
    }

    /// Write `object[key] = value`, running the `__newindex` hook for userdata.
    pub fn set_index(
        &mut self,
        object: &Value,
        key: &Value,
        value: Value,
    ) -> Result<(), ScriptError> {
        match object {
            Value::Table(table) => Ok(table.borrow_mut().set_value(key, value)?),
            Value::Userdata(handle) => {
                let hook = self.hook(handle.type_hash(), |mt| mt.newindex_hook())?;
                self.call(&hook, &mut [object.clone(), key.clone(), value])?;
                Ok(())
            }
            other => Err(BindError::NotIndexable(other.type_name()).into()),
        }
    }

    /// Run the `__gc` hook of a userdata, as the runtime's collector would.
    pub fn finalize(&mut self, object: &Value) -> Result<(), ScriptError> {
        let Value::Userdata(handle) = object else {
            return Ok(());
        };
        let hook = self.hook(handle.type_hash(), |mt| mt.gc_hook())?;
        self.call(&hook, &mut [object.clone()])?;
        Ok(())
    }

    fn hook(
        &self,
        hash: TypeHash,
        select: impl FnOnce(&Metatable) -> Value,
    ) -> Result<Value, BindError> {
        self.metatables
            .get(&hash)
            .map(|mt| select(&**mt))
            .ok_or(BindError::NotIndexable("userdata"))
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("namespace", &self.config.namespace)
            .field("types", &self.registry.len())
            .field("stack", &self.stack.len())
            .field("depth", &self.depth)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
