//! Typed callback wrappers - Lisp functions behind a uniform invoke
//!
//! Design: one generic wrapper, specialised per argument shape:
//! - `CallbackArgs` describes a closed set of native tuple shapes (arity 0..=5)
//! - `LispCallback<A>` closes over a promoted Lisp function and knows how to
//!   convert an `A` into a funcall
//! - `LazyCallback` erases `A`, so a queue can hold any mix of shapes
//!
//! Dispatch performs a checked downcast of the captured arguments and
//! reports a mismatch explicitly instead of calling with the wrong shape.

#[cfg(test)]
mod tests;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::convert::IntoLisp;
use crate::env::{ArgVec, Env};
use crate::error::Result;
use crate::global::GlobalRef;

/// Captured argument tuple, type-erased for queueing
pub type ErasedArgs = Box<dyn Any + Send>;

/// Native argument shape a Lisp callback can be called with
pub trait CallbackArgs: Send + Sized + 'static {
    const ARITY: usize;

    /// Human-readable shape, for diagnostics
    fn shape() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Recover the typed tuple, `None` on a shape mismatch
    fn from_erased(args: ErasedArgs) -> Option<Self> {
        args.downcast::<Self>().ok().map(|args| *args)
    }

    fn into_lisp_args(self, env: &Env<'_>) -> Result<ArgVec>;
}

impl CallbackArgs for () {
    const ARITY: usize = 0;

    /// Nullary callbacks ignore whatever was captured
    fn from_erased(_args: ErasedArgs) -> Option<Self> {
        Some(())
    }

    fn into_lisp_args(self, _env: &Env<'_>) -> Result<ArgVec> {
        Ok(ArgVec::new())
    }
}

macro_rules! impl_callback_args {
    ($arity:expr => $($ty:ident $arg:ident),+) => {
        impl<$($ty),+> CallbackArgs for ($($ty,)+)
        where
            $($ty: for<'e> IntoLisp<'e> + Send + 'static),+
        {
            const ARITY: usize = $arity;

            fn into_lisp_args(self, env: &Env<'_>) -> Result<ArgVec> {
                let ($($arg,)+) = self;
                let mut args = ArgVec::new();
                $(args.push($arg.into_lisp(env)?.raw());)+
                Ok(args)
            }
        }
    };
}

impl_callback_args!(1 => T1 a1);
impl_callback_args!(2 => T1 a1, T2 a2);
impl_callback_args!(3 => T1 a1, T2 a2, T3 a3);
impl_callback_args!(4 => T1 a1, T2 a2, T3 a3, T4 a4);
impl_callback_args!(5 => T1 a1, T2 a2, T3 a3, T4 a4, T5 a5);

/// Result of dispatching one deferred record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The Lisp function was called
    Delivered,
    /// Captured arguments did not fit; nothing was called
    ShapeMismatch { expected: &'static str, arity: usize },
}

/// Type-erased "Lisp function plus expected argument shape"
pub trait LazyCallback: Send + Sync {
    fn arity(&self) -> usize;

    fn invoke(&self, env: &Env<'_>, args: ErasedArgs) -> Result<Dispatch>;
}

/// Lisp function called with native arguments of shape `A`
pub struct LispCallback<A> {
    function: Arc<GlobalRef>,
    _shape: PhantomData<fn(A)>,
}

impl<A: CallbackArgs> LispCallback<A> {
    pub fn new(function: Arc<GlobalRef>) -> Self {
        Self {
            function,
            _shape: PhantomData,
        }
    }

    pub fn function(&self) -> &Arc<GlobalRef> {
        &self.function
    }
}

impl<A: CallbackArgs> LazyCallback for LispCallback<A> {
    fn arity(&self) -> usize {
        A::ARITY
    }

    fn invoke(&self, env: &Env<'_>, args: ErasedArgs) -> Result<Dispatch> {
        let Some(args) = A::from_erased(args) else {
            return Ok(Dispatch::ShapeMismatch {
                expected: A::shape(),
                arity: A::ARITY,
            });
        };

        let args = args.into_lisp_args(env)?;
        env.funcall_raw(self.function.raw(), &args)?;
        Ok(Dispatch::Delivered)
    }
}

impl<A: CallbackArgs> fmt::Debug for LispCallback<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LispCallback")
            .field("function", &self.function)
            .field("shape", &A::shape())
            .finish()
    }
}

/// A callback plus the arguments it was invoked with, awaiting an env
pub struct DeferredCall {
    callback: Arc<dyn LazyCallback>,
    args: ErasedArgs,
}

impl DeferredCall {
    pub fn new(callback: Arc<dyn LazyCallback>, args: ErasedArgs) -> Self {
        Self { callback, args }
    }

    pub fn arity(&self) -> usize {
        self.callback.arity()
    }

    /// Consume the record against a live env
    pub fn dispatch(self, env: &Env<'_>) -> Result<Dispatch> {
        self.callback.invoke(env, self.args)
    }
}

impl fmt::Debug for DeferredCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCall")
            .field("arity", &self.callback.arity())
            .finish_non_exhaustive()
    }
}
