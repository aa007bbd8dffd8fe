//! Callable shapes accepted by the binding builder.
//!
//! Closures and function items are bound by their signature:
//!
//! - [`MethodFn`]: `Fn(&mut T, A1, .., An) -> R`
//! - [`ConstMethodFn`]: `Fn(&T, A1, .., An) -> R`
//! - [`StaticFn`]: `Fn(A1, .., An) -> R`
//!
//! with up to eight parameters, each an [`ArgumentPack`] element, and `R` any
//! [`IntoResults`].

use super::{ArgumentPack, FromStack, IntoStack};
use crate::error::BindError;
use crate::stack::CallContext;

/// Return values of bound functions.
///
/// `()` produces no result, any [`IntoStack`] value produces one, and
/// `Result<R, E>` raises `E` as a [`BindError`].
pub trait IntoResults {
    /// Push the results and return how many were pushed.
    fn push_results(self, ctx: &mut CallContext<'_>) -> Result<usize, BindError>;
}

impl IntoResults for () {
    fn push_results(self, _ctx: &mut CallContext<'_>) -> Result<usize, BindError> {
        Ok(0)
    }
}

impl<T: IntoStack> IntoResults for T {
    fn push_results(self, ctx: &mut CallContext<'_>) -> Result<usize, BindError> {
        ctx.push_value(self)?;
        Ok(1)
    }
}

impl<T: IntoResults, E: Into<BindError>> IntoResults for Result<T, E> {
    fn push_results(self, ctx: &mut CallContext<'_>) -> Result<usize, BindError> {
        self.map_err(Into::into)?.push_results(ctx)
    }
}

/// A method taking the receiver mutably.
pub trait MethodFn<T, Args: ArgumentPack>: 'static {
    type Output: IntoResults;

    fn call_method(&self, this: &mut T, args: Args) -> Self::Output;
}

/// A method taking the receiver by shared reference.
pub trait ConstMethodFn<T, Args: ArgumentPack>: 'static {
    type Output: IntoResults;

    fn call_method(&self, this: &T, args: Args) -> Self::Output;
}

/// A free function, constructor or static function.
pub trait StaticFn<Args: ArgumentPack>: 'static {
    type Output;

    fn call_static(&self, args: Args) -> Self::Output;
}

macro_rules! impl_callables {
    ($($A:ident $a:ident),*) => {
        impl<T, F, R, $($A: FromStack),*> MethodFn<T, ($($A,)*)> for F
        where
            F: Fn(&mut T, $($A),*) -> R + 'static,
            R: IntoResults,
        {
            type Output = R;

            fn call_method(&self, this: &mut T, ($($a,)*): ($($A,)*)) -> R {
                (self)(this, $($a),*)
            }
        }

        impl<T, F, R, $($A: FromStack),*> ConstMethodFn<T, ($($A,)*)> for F
        where
            F: Fn(&T, $($A),*) -> R + 'static,
            R: IntoResults,
        {
            type Output = R;

            fn call_method(&self, this: &T, ($($a,)*): ($($A,)*)) -> R {
                (self)(this, $($a),*)
            }
        }

        impl<F, R, $($A: FromStack),*> StaticFn<($($A,)*)> for F
        where
            F: Fn($($A),*) -> R + 'static,
        {
            type Output = R;

            fn call_static(&self, ($($a,)*): ($($A,)*)) -> R {
                (self)($($a),*)
            }
        }
    };
}

impl_callables!();
impl_callables!(A a);
impl_callables!(A a, B b);
impl_callables!(A a, B b, C c);
impl_callables!(A a, B b, C c, D d);
impl_callables!(A a, B b, C c, D d, E e);
impl_callables!(A a, B b, C c, D d, E e, G g);
impl_callables!(A a, B b, C c, D d, E e, G g, H h);
impl_callables!(A a, B b, C c, D d, E e, G g, H h, I i);
