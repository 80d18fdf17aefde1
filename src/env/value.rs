//! Handle-scoped host values

use core::fmt;

use super::{Env, IntoArgs};
use crate::convert::FromLisp;
use crate::error::Result;
use crate::host::RawValue;

/// A host value valid for the lifetime of the env borrow that produced it
///
/// The borrow makes it impossible to keep a `Value` past the entry call;
/// use [`Env::preserve`] to get something that outlives it.
#[derive(Clone, Copy)]
pub struct Value<'e> {
    raw: RawValue,
    env: &'e Env<'e>,
}

impl<'e> Value<'e> {
    #[inline]
    pub(crate) fn new(raw: RawValue, env: &'e Env<'e>) -> Self {
        Self { raw, env }
    }

    #[inline]
    pub fn raw(&self) -> RawValue {
        self.raw
    }

    #[inline]
    pub fn env(&self) -> &'e Env<'e> {
        self.env
    }

    pub fn is_not_nil(&self) -> bool {
        self.env.host().is_not_nil(self.raw)
    }

    /// Host `eq` identity
    pub fn is_eq(&self, other: Value<'_>) -> bool {
        self.env.host().eq(self.raw, other.raw)
    }

    pub fn into_rust<T: FromLisp<'e>>(self) -> Result<T> {
        T::from_lisp(self)
    }

    /// Call this value as a function
    pub fn call<A: IntoArgs<'e>>(self, args: A) -> Result<Value<'e>> {
        self.env.funcall(self, args)
    }

    /// Host type symbol of this value
    pub fn type_of(&self) -> Result<Value<'e>> {
        let raw = self.env.host().type_of(self.raw);
        self.env.check(raw).map(|raw| Value::new(raw, self.env))
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.raw).finish()
    }
}
