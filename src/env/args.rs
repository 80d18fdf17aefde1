//! Argument lists for funcall

use smallvec::SmallVec;

use super::{Env, Value};
use crate::convert::IntoLisp;
use crate::error::Result;
use crate::host::RawValue;

/// Marshalled argument vector; short lists stay on the stack
pub type ArgVec = SmallVec<[RawValue; 8]>;

/// Anything that can be passed as the argument list of a funcall
pub trait IntoArgs<'e> {
    fn into_args(self, env: &'e Env<'e>) -> Result<ArgVec>;
}

impl<'e> IntoArgs<'e> for () {
    #[inline]
    fn into_args(self, _env: &'e Env<'e>) -> Result<ArgVec> {
        Ok(ArgVec::new())
    }
}

impl<'e, 's> IntoArgs<'e> for &'s [Value<'e>] {
    fn into_args(self, _env: &'e Env<'e>) -> Result<ArgVec> {
        Ok(self.iter().map(Value::raw).collect())
    }
}

impl<'e> IntoArgs<'e> for Vec<Value<'e>> {
    fn into_args(self, _env: &'e Env<'e>) -> Result<ArgVec> {
        Ok(self.iter().map(Value::raw).collect())
    }
}

macro_rules! impl_tuple_args {
    ($($ty:ident $arg:ident),+) => {
        impl<'e, $($ty: IntoLisp<'e>),+> IntoArgs<'e> for ($($ty,)+) {
            fn into_args(self, env: &'e Env<'e>) -> Result<ArgVec> {
                let ($($arg,)+) = self;
                let mut args = ArgVec::new();
                $(args.push($arg.into_lisp(env)?.raw());)+
                Ok(args)
            }
        }
    };
}

impl_tuple_args!(T1 a1);
impl_tuple_args!(T1 a1, T2 a2);
impl_tuple_args!(T1 a1, T2 a2, T3 a3);
impl_tuple_args!(T1 a1, T2 a2, T3 a3, T4 a4);
impl_tuple_args!(T1 a1, T2 a2, T3 a3, T4 a4, T5 a5);
impl_tuple_args!(T1 a1, T2 a2, T3 a3, T4 a4, T5 a5, T6 a6);
impl_tuple_args!(T1 a1, T2 a2, T3 a3, T4 a4, T5 a5, T6 a6, T7 a7);
impl_tuple_args!(T1 a1, T2 a2, T3 a3, T4 a4, T5 a5, T6 a6, T7 a7, T8 a8);
