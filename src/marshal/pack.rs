//! Argument packs and tuple tables.
//!
//! An [`ArgumentPack`] is the ordered, fixed-arity parameter list of a bound
//! function. It is filled from consecutive frame slots, or, when the caller
//! passes a single table and the first parameter cannot take a table itself,
//! from that table's entries `1..=N`. Element `i` of the pack always comes
//! from position `i` of the source, so argument order is preserved.
//!
//! Tuples are also values of their own: a tuple parameter reads a table keyed
//! `1..=N`, and a returned tuple is pushed as one such table.

use std::fmt;

use super::{FromStack, IntoStack, ValueKind};
use crate::error::BindError;
use crate::stack::CallContext;
use crate::state::State;
use crate::table::Table;
use crate::value::{TableRef, Value};

/// A value to store back into an argument position after a call.
pub struct WriteBack {
    produce: Box<dyn FnOnce(&State) -> Result<Value, BindError>>,
}

impl WriteBack {
    pub fn new(f: impl FnOnce(&State) -> Result<Value, BindError> + 'static) -> Self {
        Self {
            produce: Box::new(f),
        }
    }

    /// Marshal the final value.
    pub fn produce(self, state: &State) -> Result<Value, BindError> {
        (self.produce)(state)
    }
}

impl fmt::Debug for WriteBack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBack").finish_non_exhaustive()
    }
}

/// Where the arguments of one call were read from.
#[derive(Debug)]
pub(crate) enum ArgSource {
    /// Consecutive slots starting at this frame index.
    Stack(i32),
    /// Entries `1..=N` of a single table argument.
    Table(TableRef),
}

impl ArgSource {
    /// Store pending write-backs into the positions they were read from.
    pub(crate) fn write_back(
        &self,
        ctx: &mut CallContext<'_>,
        pending: Vec<(usize, WriteBack)>,
    ) -> Result<(), BindError> {
        for (position, pending) in pending {
            let value = pending.produce(ctx.state())?;
            match self {
                ArgSource::Stack(first) => {
                    let index = first + position as i32;
                    if index as usize > ctx.top() {
                        ctx.set_top(index as usize);
                    }
                    ctx.replace(index, value)?;
                }
                ArgSource::Table(table) => table.borrow_mut().set(position as i64 + 1, value),
            }
        }
        Ok(())
    }
}

const fn spreadable(kind: ValueKind) -> bool {
    !matches!(kind, ValueKind::Pack | ValueKind::Dynamic)
}

/// A lone table is spread only when the first parameter could not take it.
const fn leads_with_spreadable(kinds: &[ValueKind]) -> bool {
    match kinds {
        [first, ..] => spreadable(*first),
        [] => false,
    }
}

/// Fixed-arity parameter list of a bound function.
pub trait ArgumentPack: Sized {
    /// Number of parameters.
    const ARITY: usize;

    /// Whether a lone table argument is spread into the parameters.
    const TABLE_FILL: bool;

    /// Read the parameters from slots `first..first + ARITY`.
    fn from_stack(ctx: &CallContext<'_>, first: i32) -> Result<Self, BindError>;

    /// Read the parameters from entries `1..=ARITY` of a table found at `index`.
    fn from_table(table: &Table, index: usize, state: &State) -> Result<Self, BindError>;

    /// Pending write-backs, keyed by 0-based parameter position.
    fn write_backs(&self) -> Vec<(usize, WriteBack)>;

    /// Read the parameters starting at `first`, spreading a lone table if allowed.
    fn collect(ctx: &CallContext<'_>, first: i32) -> Result<(Self, ArgSource), BindError> {
        let provided = (ctx.top() + 1).saturating_sub(first as usize);
        if Self::TABLE_FILL
            && provided == 1
            && let Value::Table(table) = ctx.get(first)
        {
            let args = Self::from_table(&table.borrow(), first as usize, ctx.state())?;
            return Ok((args, ArgSource::Table(table)));
        }
        Ok((Self::from_stack(ctx, first)?, ArgSource::Stack(first)))
    }
}

impl ArgumentPack for () {
    const ARITY: usize = 0;
    const TABLE_FILL: bool = false;

    fn from_stack(_ctx: &CallContext<'_>, _first: i32) -> Result<Self, BindError> {
        Ok(())
    }

    fn from_table(_table: &Table, _index: usize, _state: &State) -> Result<Self, BindError> {
        Ok(())
    }

    fn write_backs(&self) -> Vec<(usize, WriteBack)> {
        Vec::new()
    }
}

// ============================================================================
// Tuple implementations
// ============================================================================

macro_rules! impl_pack {
    ($n:expr; $($A:ident $i:tt),+) => {
        impl<$($A: FromStack),+> ArgumentPack for ($($A,)+) {
            const ARITY: usize = $n;
            const TABLE_FILL: bool = leads_with_spreadable(&[$($A::KIND),+]);

            fn from_stack(ctx: &CallContext<'_>, first: i32) -> Result<Self, BindError> {
                Ok(($(ctx.peek::<$A>(first + $i)?,)+))
            }

            fn from_table(table: &Table, index: usize, state: &State) -> Result<Self, BindError> {
                Ok(($($A::from_value(&table.get($i as i64 + 1), index, state)?,)+))
            }

            fn write_backs(&self) -> Vec<(usize, WriteBack)> {
                let mut pending = Vec::new();
                $(
                    if let Some(write_back) = self.$i.write_back() {
                        pending.push(($i, write_back));
                    }
                )+
                pending
            }
        }

        impl<$($A: FromStack),+> FromStack for ($($A,)+) {
            const KIND: ValueKind = ValueKind::Pack;

            fn from_value(value: &Value, index: usize, state: &State) -> Result<Self, BindError> {
                match value {
                    Value::Table(table) => {
                        let table = table.borrow();
                        <Self as ArgumentPack>::from_table(&table, index, state)
                    }
                    other => Err(BindError::mismatch(index, Self::KIND.expected(), other.type_name())),
                }
            }
        }

        impl<$($A: IntoStack),+> IntoStack for ($($A,)+) {
            fn into_value(self, state: &State) -> Result<Value, BindError> {
                let mut table = Table::new();
                $(table.set($i as i64 + 1, self.$i.into_value(state)?);)+
                Ok(Value::table(table))
            }
        }
    };
}

impl_pack!(1; A 0);
impl_pack!(2; A 0, B 1);
impl_pack!(3; A 0, B 1, C 2);
impl_pack!(4; A 0, B 1, C 2, D 3);
impl_pack!(5; A 0, B 1, C 2, D 3, E 4);
impl_pack!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_pack!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_pack!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_fill_rules() {
        assert!(!<() as ArgumentPack>::TABLE_FILL);
        assert!(<(i32,) as ArgumentPack>::TABLE_FILL);
        assert!(!<(TableRef,) as ArgumentPack>::TABLE_FILL);
        assert!(!<((i32, i32),) as ArgumentPack>::TABLE_FILL);
        assert!(!<(TableRef, i32) as ArgumentPack>::TABLE_FILL);
        assert!(!<(TableRef, Option<i64>) as ArgumentPack>::TABLE_FILL);
        assert!(<(i32, TableRef) as ArgumentPack>::TABLE_FILL);
        assert_eq!(<(i8, i16, i32) as ArgumentPack>::ARITY, 3);
    }

    #[test]
    fn tuple_reads_table_entries_in_order() {
        let state = State::new();
        let table = Value::table(Table::from_sequence([
            Value::Integer(1),
            Value::from("two"),
            Value::Number(3.0),
        ]));
        let (a, b, c): (i32, String, f64) = FromStack::from_value(&table, 1, &state).unwrap();
        assert_eq!((a, b.as_str(), c), (1, "two", 3.0));
    }

    #[test]
    fn tuple_element_errors_point_at_the_table() {
        let state = State::new();
        let table = Value::table(Table::from_sequence([Value::Integer(1)]));
        let err = <(i32, bool) as FromStack>::from_value(&table, 3, &state).unwrap_err();
        assert_eq!(err, BindError::mismatch(3, "boolean", "nil"));
        let err = <(i32, bool) as FromStack>::from_value(&Value::Integer(0), 2, &state).unwrap_err();
        assert_eq!(err, BindError::mismatch(2, "table", "number"));
    }

    #[test]
    fn tuple_pushes_one_table() {
        let state = State::new();
        let value = (7_i64, "x", true).into_value(&state).unwrap();
        let table = value.as_table().unwrap().borrow();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), Value::Integer(7));
        assert_eq!(table.get(2), Value::from("x"));
        assert_eq!(table.get(3), Value::Boolean(true));
    }
}
