//! Character and string conversions.
//!
//! Numbers are accepted wherever text is expected and converted the way the
//! runtime prints them. Nil is not text; use `Option<String>` for the nilable
//! convention.

use std::rc::Rc;

use super::{FromStack, IntoStack, ValueKind};
use crate::error::BindError;
use crate::state::State;
use crate::value::Value;

/// Text view of a string or number slot.
fn coerce(value: &Value, index: usize) -> Result<Rc<str>, BindError> {
    match value {
        Value::String(s) => Ok(Rc::clone(s)),
        Value::Integer(v) => Ok(v.to_string().into()),
        Value::Number(v) if v.is_finite() && v.fract() == 0.0 => Ok(format!("{v:.1}").into()),
        Value::Number(v) => Ok(v.to_string().into()),
        other => Err(BindError::mismatch(
            index,
            ValueKind::Text.expected(),
            other.type_name(),
        )),
    }
}

impl FromStack for String {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
        coerce(value, index).map(|s| s.to_string())
    }
}

impl IntoStack for String {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        Ok(Value::String(self.into()))
    }
}

impl FromStack for Rc<str> {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
        coerce(value, index)
    }
}

impl IntoStack for Rc<str> {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        Ok(Value::String(self))
    }
}

impl IntoStack for &str {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        Ok(Value::String(self.into()))
    }
}

/// The first character of the text; NUL for the empty string.
impl FromStack for char {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
        Ok(coerce(value, index)?.chars().next().unwrap_or('\0'))
    }
}

impl IntoStack for char {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        let mut buf = [0u8; 4];
        Ok(Value::String(self.encode_utf8(&mut buf).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let state = State::new();
        let value = String::from("héllo").into_value(&state).unwrap();
        assert_eq!(String::from_value(&value, 1, &state).unwrap(), "héllo");
    }

    #[test]
    fn numbers_coerce_to_text() {
        let state = State::new();
        assert_eq!(String::from_value(&Value::Integer(42), 1, &state).unwrap(), "42");
        assert_eq!(String::from_value(&Value::Number(1.0), 1, &state).unwrap(), "1.0");
        assert_eq!(String::from_value(&Value::Number(0.5), 1, &state).unwrap(), "0.5");
    }

    #[test]
    fn nil_is_not_text() {
        let state = State::new();
        let err = String::from_value(&Value::Nil, 2, &state).unwrap_err();
        assert_eq!(err, BindError::mismatch(2, "string", "nil"));
        let opt: Option<String> = FromStack::from_value(&Value::Nil, 2, &state).unwrap();
        assert_eq!(opt, None);
    }

    #[test]
    fn char_reads_first_character() {
        let state = State::new();
        assert_eq!(char::from_value(&Value::from("xyz"), 1, &state), Ok('x'));
        assert_eq!(char::from_value(&Value::from(""), 1, &state), Ok('\0'));
        assert_eq!('q'.into_value(&state).unwrap(), Value::from("q"));
    }

    #[test]
    fn borrowed_str_pushes() {
        let state = State::new();
        assert_eq!("abc".into_value(&state).unwrap(), Value::from("abc"));
    }
}
