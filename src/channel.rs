//! Channel - Lisp functions as ordinary native callbacks
//!
//! A closure produced here can be handed to any native API (threads,
//! timers, completion handlers). Calling it never touches the host: it
//! queues a [`DeferredCall`] on the lifecycle coordinator, and the Lisp
//! function runs the next time an env drains the queue.

use std::sync::Arc;

use crate::callback::{CallbackArgs, DeferredCall, ErasedArgs, LazyCallback, LispCallback};
use crate::convert::IntoLisp;
use crate::env::{Env, Value};
use crate::error::Result;
use crate::global::GlobalRef;
use crate::lifecycle::Lifecycle;

#[derive(Clone)]
pub struct Channel {
    lifecycle: Arc<Lifecycle>,
}

macro_rules! arity_callbacks {
    ($($(#[$meta:meta])* $name:ident => ($($ty:ident $arg:ident),*);)+) => {
        $(
            $(#[$meta])*
            pub fn $name<$($ty),*>(&self, function: Arc<GlobalRef>) -> impl Fn($($ty),*) + Send + Sync + 'static
            where
                $($ty: for<'e> IntoLisp<'e> + Send + 'static),*
            {
                let callback: Arc<dyn LazyCallback> = Arc::new(LispCallback::<($($ty,)*)>::new(function));
                let channel = self.clone();
                move |$($arg: $ty),*| channel.submit(Arc::clone(&callback), ($($arg,)*))
            }
        )+
    };
}

impl Channel {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Channel feeding the coordinator `env` belongs to
    pub fn for_env(env: &Env<'_>) -> Self {
        Self::new(Arc::clone(env.lifecycle()))
    }

    #[inline]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Queue `callback` to run later with `args`
    ///
    /// `args` is checked against the callback's shape only when the record
    /// is dispatched.
    pub fn try_register<A: CallbackArgs>(&self, callback: Arc<dyn LazyCallback>, args: A) -> Result<()> {
        self.register_erased(callback, Box::new(args))
    }

    pub fn register_erased(&self, callback: Arc<dyn LazyCallback>, args: ErasedArgs) -> Result<()> {
        self.lifecycle.enqueue_callback(DeferredCall::new(callback, args))
    }

    /// Fire-and-forget registration used by the produced closures; a
    /// rejected record is already logged and counted by the coordinator.
    fn submit<A: CallbackArgs>(&self, callback: Arc<dyn LazyCallback>, args: A) {
        let _ = self.try_register(callback, args);
    }

    /// Closure taking the whole argument tuple at once
    pub fn callback<A: CallbackArgs>(&self, function: Arc<GlobalRef>) -> impl Fn(A) + Send + Sync + 'static {
        let callback: Arc<dyn LazyCallback> = Arc::new(LispCallback::<A>::new(function));
        let channel = self.clone();
        move |args: A| channel.submit(Arc::clone(&callback), args)
    }

    /// Promote `function` and build a closure of shape `A` around it
    pub fn lisp_callback<A: CallbackArgs>(
        &self,
        env: &Env<'_>,
        function: Value<'_>,
    ) -> Result<impl Fn(A) + Send + Sync + 'static> {
        let function = env.preserve(function)?;
        Ok(self.callback::<A>(function))
    }

    arity_callbacks! {
        /// Make a native callback out of a Lisp function.
        ///
        /// Calling the returned closure eventually calls `function` with no
        /// arguments, once an env drains the queue.
        callback0 => ();
        /// One-argument variant of [`Channel::callback0`].
        callback1 => (T1 a1);
        /// Two-argument variant of [`Channel::callback0`].
        callback2 => (T1 a1, T2 a2);
        /// Three-argument variant of [`Channel::callback0`].
        callback3 => (T1 a1, T2 a2, T3 a3);
        /// Four-argument variant of [`Channel::callback0`].
        callback4 => (T1 a1, T2 a2, T3 a3, T4 a4);
        /// Five-argument variant of [`Channel::callback0`].
        callback5 => (T1 a1, T2 a2, T3 a3, T4 a4, T5 a5);
    }
}
