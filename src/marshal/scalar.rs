//! Integral, floating-point and boolean conversions.

use super::{FromStack, IntoStack, ValueKind};
use crate::error::BindError;
use crate::state::State;
use crate::value::Value;

// ============================================================================
// Integer implementations
// ============================================================================

macro_rules! impl_integral {
    ($($ty:ty),*) => {
        $(
            impl FromStack for $ty {
                const KIND: ValueKind = ValueKind::Integral;

                fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
                    match value {
                        Value::Integer(v) => <$ty>::try_from(*v).map_err(|_| BindError::IntegerOverflow {
                            index,
                            value: *v,
                            target: stringify!($ty),
                        }),
                        other => Err(BindError::mismatch(index, Self::KIND.expected(), other.type_name())),
                    }
                }
            }

            impl IntoStack for $ty {
                fn into_value(self, _state: &State) -> Result<Value, BindError> {
                    Ok(Value::Integer(self as i64))
                }
            }
        )*
    };
}

impl_integral!(i8, i16, i32, i64, isize, u8, u16, u32);

// Full-width unsigned types are range checked both ways: negative slots are
// rejected on read, values above `i64::MAX` are rejected on push.
macro_rules! impl_integral_unsigned {
    ($($ty:ty),*) => {
        $(
            impl FromStack for $ty {
                const KIND: ValueKind = ValueKind::Integral;

                fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
                    match value {
                        Value::Integer(v) => <$ty>::try_from(*v).map_err(|_| BindError::IntegerOverflow {
                            index,
                            value: *v,
                            target: stringify!($ty),
                        }),
                        other => Err(BindError::mismatch(index, Self::KIND.expected(), other.type_name())),
                    }
                }
            }

            impl IntoStack for $ty {
                fn into_value(self, _state: &State) -> Result<Value, BindError> {
                    i64::try_from(self)
                        .map(Value::Integer)
                        .map_err(|_| BindError::IntegerTooLarge { value: self as u64 })
                }
            }
        )*
    };
}

impl_integral_unsigned!(u64, usize);

// ============================================================================
// C-like enums
// ============================================================================

/// Marshal C-like enums as integers through their primitive representation.
///
/// Each `Enum: repr` pair needs `TryFrom<repr>` for the enum and
/// `From<Enum>` for `repr`, which is what `num_enum`'s `TryFromPrimitive` and
/// `IntoPrimitive` derives provide. A slot outside `repr`, or one that names no
/// variant, is an [`IntegerOverflow`](crate::BindError::IntegerOverflow).
///
/// ```
/// use nativebind::{FromStack, IntoStack, State, Value, integral_enum};
/// use num_enum::{IntoPrimitive, TryFromPrimitive};
///
/// #[derive(Debug, Clone, Copy, PartialEq, TryFromPrimitive, IntoPrimitive)]
/// #[repr(u8)]
/// enum Facing {
///     North = 1,
///     South = 2,
/// }
/// integral_enum!(Facing: u8);
///
/// let state = State::new();
/// assert_eq!(Facing::South.into_value(&state), Ok(Value::Integer(2)));
/// assert_eq!(Facing::from_value(&Value::Integer(1), 1, &state), Ok(Facing::North));
/// assert!(Facing::from_value(&Value::Integer(3), 1, &state).is_err());
/// ```
#[macro_export]
macro_rules! integral_enum {
    ($($ty:ty: $repr:ty),+ $(,)?) => {
        $(
            impl $crate::FromStack for $ty {
                const KIND: $crate::ValueKind = $crate::ValueKind::Integral;

                fn from_value(
                    value: &$crate::Value,
                    index: usize,
                    state: &$crate::State,
                ) -> ::std::result::Result<Self, $crate::BindError> {
                    let raw = <$repr as $crate::FromStack>::from_value(value, index, state)?;
                    <$ty as ::std::convert::TryFrom<$repr>>::try_from(raw).map_err(|_| {
                        $crate::BindError::IntegerOverflow {
                            index,
                            value: raw as i64,
                            target: stringify!($ty),
                        }
                    })
                }
            }

            impl $crate::IntoStack for $ty {
                fn into_value(
                    self,
                    state: &$crate::State,
                ) -> ::std::result::Result<$crate::Value, $crate::BindError> {
                    $crate::IntoStack::into_value(<$repr>::from(self), state)
                }
            }
        )+
    };
}

// ============================================================================
// Float implementations
// ============================================================================

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl FromStack for $ty {
                const KIND: ValueKind = ValueKind::Float;

                /// Any number is accepted, integer slots included.
                fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
                    value
                        .as_number()
                        .map(|v| v as $ty)
                        .ok_or_else(|| BindError::mismatch(index, Self::KIND.expected(), value.type_name()))
                }
            }

            impl IntoStack for $ty {
                fn into_value(self, _state: &State) -> Result<Value, BindError> {
                    Ok(Value::Number(self as f64))
                }
            }
        )*
    };
}

impl_float!(f32, f64);

// ============================================================================
// Boolean
// ============================================================================

impl FromStack for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn from_value(value: &Value, index: usize, _state: &State) -> Result<Self, BindError> {
        match value {
            Value::Boolean(b) => Ok(*b),
            other => Err(BindError::mismatch(
                index,
                Self::KIND.expected(),
                other.type_name(),
            )),
        }
    }
}

impl IntoStack for bool {
    fn into_value(self, _state: &State) -> Result<Value, BindError> {
        Ok(Value::Boolean(self))
    }
}
