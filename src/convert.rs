//! Value conversion between native types and host values
//!
//! Deliberately thin: scalars, strings, options and lists. Anything richer
//! is built by the module on top of `Env::call`.

use std::sync::Arc;

use crate::env::{Env, Value};
use crate::error::{Error, Result};
use crate::global::GlobalRef;

/// Native value that can be turned into a host value
pub trait IntoLisp<'e> {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>>;
}

/// Native value that can be read back from a host value
pub trait FromLisp<'e>: Sized {
    fn from_lisp(value: Value<'e>) -> Result<Self>;
}

impl<'e> IntoLisp<'e> for Value<'e> {
    #[inline]
    fn into_lisp(self, _env: &'e Env<'e>) -> Result<Value<'e>> {
        Ok(self)
    }
}

impl<'e> FromLisp<'e> for Value<'e> {
    #[inline]
    fn from_lisp(value: Value<'e>) -> Result<Self> {
        Ok(value)
    }
}

impl<'e> IntoLisp<'e> for () {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        env.nil()
    }
}

impl<'e> IntoLisp<'e> for bool {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        if self {
            env.t()
        } else {
            env.nil()
        }
    }
}

impl<'e> FromLisp<'e> for bool {
    fn from_lisp(value: Value<'e>) -> Result<Self> {
        Ok(value.is_not_nil())
    }
}

impl<'e> IntoLisp<'e> for i64 {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        let raw = env.host().make_integer(self);
        env.check(raw).map(|raw| Value::new(raw, env))
    }
}

impl<'e> FromLisp<'e> for i64 {
    fn from_lisp(value: Value<'e>) -> Result<Self> {
        let env = value.env();
        let extracted = env.host().extract_integer(value.raw());
        env.check(extracted).map_err(|_| wrong_type("integer", value))
    }
}

macro_rules! impl_integer {
    ($($ty:ty),+) => {
        $(
            impl<'e> IntoLisp<'e> for $ty {
                fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
                    let wide = i64::try_from(self).map_err(|_| Error::WrongType {
                        expected: "fixnum-sized integer",
                        found: self.to_string(),
                    })?;
                    wide.into_lisp(env)
                }
            }

            impl<'e> FromLisp<'e> for $ty {
                fn from_lisp(value: Value<'e>) -> Result<Self> {
                    let wide = i64::from_lisp(value)?;
                    <$ty>::try_from(wide).map_err(|_| Error::WrongType {
                        expected: stringify!($ty),
                        found: wide.to_string(),
                    })
                }
            }
        )+
    };
}

impl_integer!(i8, i16, i32, u8, u16, u32, u64, usize, isize);

impl<'e> IntoLisp<'e> for f64 {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        let raw = env.host().make_float(self);
        env.check(raw).map(|raw| Value::new(raw, env))
    }
}

impl<'e> FromLisp<'e> for f64 {
    fn from_lisp(value: Value<'e>) -> Result<Self> {
        let env = value.env();
        let extracted = env.host().extract_float(value.raw());
        env.check(extracted).map_err(|_| wrong_type("float", value))
    }
}

impl<'e> IntoLisp<'e> for f32 {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        f64::from(self).into_lisp(env)
    }
}

impl<'e, 's> IntoLisp<'e> for &'s str {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        let raw = env.host().make_string(self);
        env.check(raw).map(|raw| Value::new(raw, env))
    }
}

impl<'e> IntoLisp<'e> for String {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        self.as_str().into_lisp(env)
    }
}

impl<'e> FromLisp<'e> for String {
    fn from_lisp(value: Value<'e>) -> Result<Self> {
        let env = value.env();
        match env.host().copy_string_contents(value.raw()) {
            Some(text) => env.check(text).map_err(|_| wrong_type("string", value)),
            None => {
                // Clear whatever the host left pending before reporting.
                let _ = env.check(());
                Err(wrong_type("string", value))
            }
        }
    }
}

impl<'e, T: IntoLisp<'e>> IntoLisp<'e> for Option<T> {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        match self {
            Some(inner) => inner.into_lisp(env),
            None => env.nil(),
        }
    }
}

impl<'e, T: FromLisp<'e>> FromLisp<'e> for Option<T> {
    fn from_lisp(value: Value<'e>) -> Result<Self> {
        if value.is_not_nil() {
            T::from_lisp(value).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Converted to a fresh list
impl<'e, T: IntoLisp<'e>> IntoLisp<'e> for Vec<T> {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        let items = self
            .into_iter()
            .map(|item| item.into_lisp(env))
            .collect::<Result<Vec<_>>>()?;
        env.call("list", items)
    }
}

impl<'e> IntoLisp<'e> for &GlobalRef {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        Ok(self.bind(env))
    }
}

impl<'e> IntoLisp<'e> for Arc<GlobalRef> {
    fn into_lisp(self, env: &'e Env<'e>) -> Result<Value<'e>> {
        Ok(self.bind(env))
    }
}

fn wrong_type(expected: &'static str, value: Value<'_>) -> Error {
    let env = value.env();
    let found = value
        .type_of()
        .and_then(|ty| env.call("symbol-name", (ty,)))
        .ok()
        .and_then(|name| env.host().copy_string_contents(name.raw()));
    let found = match (found, env.check(())) {
        (Some(name), Ok(())) => name,
        _ => "unknown".to_string(),
    };
    Error::WrongType { expected, found }
}
