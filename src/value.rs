//! Slot values exchanged with the scripting runtime.
//!
//! A [`Value`] is the content of one exchange-stack slot. Scalars are stored
//! inline; strings, tables, functions and userdata are reference-counted so
//! copying a slot never copies the payload.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::BindError;
use crate::handle::HandleRef;
use crate::stack::CallContext;
use crate::table::Table;

/// Shared, mutable table.
pub type TableRef = Rc<RefCell<Table>>;

/// Signature of every native function the runtime can call.
///
/// The function reads its arguments from the context's frame and returns the
/// number of results it pushed.
pub type NativeCallback = dyn Fn(&mut CallContext<'_>) -> Result<usize, BindError>;

/// A native function value.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    inner: Rc<NativeCallback>,
}

impl Function {
    /// Wrap a native callback.
    pub fn new<F>(name: impl Into<Rc<str>>, f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<usize, BindError> + 'static,
    {
        Self {
            name: name.into(),
            inner: Rc::new(f),
        }
    }

    /// Name given at creation, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke with an already prepared frame.
    pub(crate) fn invoke(&self, ctx: &mut CallContext<'_>) -> Result<usize, BindError> {
        (self.inner)(ctx)
    }

    /// Whether both values wrap the same callback.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

/// One exchange-stack slot.
#[derive(Clone, Default)]
pub enum Value {
    /// The "no value" marker.
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Function(Function),
    Userdata(HandleRef),
}

impl Value {
    /// Runtime type name, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Runtime truthiness: everything except nil and false.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of integer and float slots.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&HandleRef> {
        match self {
            Value::Userdata(h) => Some(h),
            _ => None,
        }
    }

    /// Wrap a table.
    pub fn table(table: Table) -> Self {
        Value::Table(Rc::new(RefCell::new(table)))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Userdata(a), Value::Userdata(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Boolean(v) => write!(f, "Boolean({})", v),
            Value::Integer(v) => write!(f, "Integer({})", v),
            Value::Number(v) => write!(f, "Number({})", v),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Table(t) => write!(f, "Table({:p})", Rc::as_ptr(t)),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Userdata(h) => write!(f, "Userdata({:?})", h.type_hash()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v.into())
    }
}

impl From<Function> for Value {
    fn from(v: Function) -> Self {
        Value::Function(v)
    }
}

impl From<TableRef> for Value {
    fn from(v: TableRef) -> Self {
        Value::Table(v)
    }
}

impl From<HandleRef> for Value {
    fn from(v: HandleRef) -> Self {
        Value::Userdata(v)
    }
}
