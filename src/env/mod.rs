//! Env - the call-scoped mediator for all host interaction
//!
//! Design: an `Env<'h>` borrows the host for exactly one entry call.
//! 1. Construction registers it as the live env on this thread, flushes the
//!    deferred release queue, then (by default) runs queued callbacks.
//!    Only [`Env::scope`] and the entry glue construct one, so an env can
//!    never be leaked while still registered
//! 2. Every primitive result goes through `check`, which turns a pending
//!    host exit into an [`Error`]
//! 3. Drop flushes deferred releases again and unregisters the env
//!
//! `Env` is neither `Clone` nor `Send`, and every [`Value`] borrows it, so
//! nothing host-scoped can escape the call.

mod args;
mod live;
mod value;

#[cfg(test)]
mod tests;

pub use args::{ArgVec, IntoArgs};
pub use value::Value;

pub(crate) use live::with_live_host;

use std::ffi::CString;
use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::error::{Error, HostExit, Result};
use crate::global::GlobalRef;
use crate::host::{FuncallExit, Host, RawValue};
use crate::lifecycle::{DrainReport, Lifecycle};
use crate::logging::{
    log_env_enter, log_env_exit, log_error_resignalled, log_exit_translated, trace, warn, CHANNEL_TARGET,
    ENTRY_TARGET, ENV_TARGET,
};

const UNPRINTABLE: &str = "#<unprintable>";

pub struct Env<'h> {
    host: &'h dyn Host,
    lifecycle: Arc<Lifecycle>,
    /// Error symbol for native failures, defined on first use
    error_symbol: OnceCell<RawValue>,
    token: u64,
    _not_send: PhantomData<*const ()>,
}

impl<'h> Env<'h> {
    /// Make `host` the live env for the current entry call
    ///
    /// Crate-private: the env must be dropped to leave the live stack, so
    /// callers outside the crate only ever see one through [`Env::scope`]
    /// or the entry glue.
    pub(crate) fn new(host: &'h dyn Host, lifecycle: Arc<Lifecycle>) -> Self {
        let env = Self::open(host, lifecycle);
        env.drain_on_entry();
        env
    }

    /// Register the env and flush deferred releases, without running
    /// queued callbacks
    pub(crate) fn open(host: &'h dyn Host, lifecycle: Arc<Lifecycle>) -> Self {
        let token = live::push(host, &lifecycle);
        let env = Self {
            host,
            lifecycle,
            error_symbol: OnceCell::new(),
            token,
            _not_send: PhantomData,
        };
        log_env_enter(live::depth());

        // Releases accumulated while no env was live go first.
        env.lifecycle.drain_releases(&env);
        env
    }

    /// Run queued callbacks if `drain-on-entry` is set
    pub(crate) fn drain_on_entry(&self) {
        if !self.lifecycle.config().callbacks.drain_on_entry {
            return;
        }
        let report = self.drain_callbacks();
        for failure in &report.failed {
            warn!(target: CHANNEL_TARGET, error = %failure, "deferred callback failed");
        }
    }

    /// Run `body` with a fresh env over `host`
    ///
    /// The env lives exactly as long as `body`; this and the entry glue are
    /// the only ways to obtain one.
    pub fn scope<R>(host: &'h dyn Host, lifecycle: Arc<Lifecycle>, body: impl FnOnce(&Env<'h>) -> R) -> R {
        let env = Env::new(host, lifecycle);
        body(&env)
    }

    #[inline]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    #[inline]
    pub(crate) fn host(&self) -> &dyn Host {
        self.host
    }

    /// Canonical symbol named `name`
    ///
    /// Fails with [`Error::InvalidSymbolName`] for non-ASCII names, before
    /// touching the host.
    pub fn intern(&self, name: &str) -> Result<Value<'_>> {
        let invalid = || Error::InvalidSymbolName { name: name.to_string() };
        if !name.is_ascii() {
            return Err(invalid());
        }
        let c_name = CString::new(name).map_err(|_| invalid())?;

        let raw = self.host.intern(&c_name);
        self.check(raw).map(|raw| Value::new(raw, self))
    }

    /// Call `function` with `args` converted to host values
    pub fn funcall<'e, A: IntoArgs<'e>>(&'e self, function: Value<'e>, args: A) -> Result<Value<'e>> {
        let env: &'e Env<'e> = self;
        let args = args.into_args(env)?;
        self.funcall_raw(function.raw(), &args)
    }

    /// Call the function named `name`
    pub fn call<'e, A: IntoArgs<'e>>(&'e self, name: &str, args: A) -> Result<Value<'e>> {
        let function = self.intern(name)?;
        self.funcall(function, args)
    }

    pub(crate) fn funcall_raw(&self, function: RawValue, args: &[RawValue]) -> Result<Value<'_>> {
        trace!(target: ENV_TARGET, function = ?function, args = args.len(), "funcall");
        let raw = self.host.funcall(function, args);
        self.check(raw).map(|raw| Value::new(raw, self))
    }

    /// Promote `value` so it outlives this env
    pub fn preserve(&self, value: Value<'_>) -> Result<Arc<GlobalRef>> {
        GlobalRef::new(self, value).map(Arc::new)
    }

    /// Raw promotion; only `GlobalRef` pairs this with a release.
    pub(crate) fn retain(&self, value: RawValue) -> Result<RawValue> {
        let raw = self.host.make_global_ref(value);
        let raw = self.check(raw)?;
        if raw.is_null() {
            return Err(Error::host("make_global_ref", "host returned a null reference"));
        }
        Ok(raw)
    }

    pub fn nil(&self) -> Result<Value<'_>> {
        self.intern("nil")
    }

    pub fn t(&self) -> Result<Value<'_>> {
        self.intern("t")
    }

    pub fn is_not_nil(&self, value: Value<'_>) -> bool {
        self.host.is_not_nil(value.raw())
    }

    pub fn eq(&self, a: Value<'_>, b: Value<'_>) -> bool {
        self.host.eq(a.raw(), b.raw())
    }

    /// Run every queued deferred callback against this env
    pub fn drain_callbacks(&self) -> DrainReport {
        self.lifecycle.drain_callbacks(self)
    }

    /// Turn a pending host exit into an error, clearing it
    pub(crate) fn check<T>(&self, result: T) -> Result<T> {
        match self.host.non_local_exit_check() {
            FuncallExit::Return => Ok(result),
            _ => Err(self.take_exit()),
        }
    }

    fn take_exit(&self) -> Error {
        let (status, symbol_raw, data_raw) = self.host.non_local_exit_get();
        self.host.non_local_exit_clear();

        let origin = match status {
            FuncallExit::Return => None,
            _ => self.promote_exit(symbol_raw, data_raw),
        };
        let symbol = self.describe(symbol_raw);
        let data = self.describe(data_raw);

        match status {
            FuncallExit::Signal => {
                log_exit_translated("signal", &symbol);
                Error::Signal { symbol, data, origin }
            }
            FuncallExit::Throw => {
                log_exit_translated("throw", &symbol);
                Error::Throw {
                    tag: symbol,
                    value: data,
                    origin,
                }
            }
            FuncallExit::Return => Error::host("non_local_exit_get", "exit vanished before it could be read"),
        }
    }

    /// Promote both exit values so they survive until re-raised
    ///
    /// Bypasses `check`: a failure here only costs the exact values, and
    /// the error is still described by its printed form.
    fn promote_exit(&self, symbol: RawValue, data: RawValue) -> Option<HostExit> {
        let adopt = |raw: RawValue| {
            let global = self.host.make_global_ref(raw);
            if self.host.has_pending_exit() || global.is_null() {
                self.host.non_local_exit_clear();
                return None;
            }
            Some(Arc::new(GlobalRef::adopt(global, &self.lifecycle)))
        };

        let symbol = adopt(symbol)?;
        let data = adopt(data)?;
        Some(HostExit { symbol, data })
    }

    /// Printed representation via `prin1-to-string`, without recursing
    /// into `check` if printing fails
    fn describe(&self, raw: RawValue) -> String {
        let host = self.host;
        let bail = || {
            host.non_local_exit_clear();
            UNPRINTABLE.to_string()
        };

        let printer = host.intern(c"prin1-to-string");
        if host.has_pending_exit() {
            return bail();
        }
        let printed = host.funcall(printer, &[raw]);
        if host.has_pending_exit() {
            return bail();
        }
        match host.copy_string_contents(printed) {
            Some(text) if !host.has_pending_exit() => text,
            _ => bail(),
        }
    }

    /// Raise `error` in the host as a non-local exit
    ///
    /// Host-originated signals and throws are re-raised with the exact
    /// values the host reported. Without them (the error was built by hand,
    /// or under another lifecycle) the printed symbol and data are used.
    /// Native failures use the configured error symbol with
    /// `(list MESSAGE)` as data. An exit that is already pending is left
    /// alone.
    pub fn signal(&self, error: &Error) {
        if self.host.has_pending_exit() {
            return;
        }
        log_error_resignalled(&error.to_string());

        let raised = match error {
            Error::Signal {
                origin: Some(exit), ..
            } if self.owns(exit) => {
                self.host.non_local_exit_signal(exit.symbol.raw(), exit.data.raw());
                Ok(())
            }
            Error::Throw {
                origin: Some(exit), ..
            } if self.owns(exit) => {
                self.host.non_local_exit_throw(exit.symbol.raw(), exit.data.raw());
                Ok(())
            }
            Error::Signal { symbol, data, .. } => self.raise_signal(symbol, data),
            Error::Throw { tag, value, .. } => self.raise_throw(tag, value),
            _ => self.raise_native(error),
        };

        if let Err(failure) = raised {
            warn!(target: ENTRY_TARGET, error = %failure, "could not build error data; signalling plain `error`");
            self.host.non_local_exit_clear();
            let symbol = self.host.intern(c"error");
            let data = self.host.intern(c"nil");
            self.host.non_local_exit_signal(symbol, data);
        }
    }

    fn owns(&self, exit: &HostExit) -> bool {
        exit.symbol.belongs_to(&self.lifecycle) && exit.data.belongs_to(&self.lifecycle)
    }

    fn raise_native(&self, error: &Error) -> Result<()> {
        let symbol = self.error_symbol()?;
        let data = self.call("list", (error.to_string(),))?;
        self.host.non_local_exit_signal(symbol, data.raw());
        Ok(())
    }

    fn raise_signal(&self, symbol: &str, data: &str) -> Result<()> {
        let symbol = match self.intern(symbol) {
            Ok(symbol) => symbol.raw(),
            Err(_) => self.error_symbol()?,
        };
        let data = self.call("list", (data,))?;
        self.host.non_local_exit_signal(symbol, data.raw());
        Ok(())
    }

    fn raise_throw(&self, tag: &str, value: &str) -> Result<()> {
        let tag = self.intern(tag)?;
        let value = self.host.make_string(value);
        let value = self.check(value)?;
        self.host.non_local_exit_throw(tag.raw(), value);
        Ok(())
    }

    fn error_symbol(&self) -> Result<RawValue> {
        self.error_symbol
            .get_or_try_init(|| {
                let errors = &self.lifecycle.config().errors;
                let symbol = self.intern(&errors.symbol)?;
                self.call("define-error", (symbol, errors.message.as_str()))?;
                Ok(symbol.raw())
            })
            .copied()
    }
}

impl Drop for Env<'_> {
    fn drop(&mut self) {
        // Leave anything we cannot release now for the next env.
        self.lifecycle.drain_releases(self);
        log_env_exit(live::depth());
        live::pop(self.token);
    }
}
