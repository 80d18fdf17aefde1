//! Module entry points - running native bodies under a fresh env
//!
//! Every function the host calls into goes through here: the env is built
//! (flushing deferred work), the body runs, and any native failure, panics
//! included, is turned into a host signal instead of crossing the C
//! boundary. Queued callbacks run inside the same unwind guard as the body.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use crate::env::{Env, Value};
use crate::error::{Error, Result};
use crate::ffi::{emacs_env, emacs_value, RawEnv};
use crate::host::{Host, RawValue};
use crate::lifecycle::Lifecycle;
use crate::logging::{error, log_panic, ENTRY_TARGET};

/// Run `body` under an env for `host`
///
/// Returns the body's value, or `None` after signalling its error to the
/// host. The host ignores the return value while a signal is pending.
pub fn enter<F>(host: &dyn Host, lifecycle: &Arc<Lifecycle>, body: F) -> Option<RawValue>
where
    F: for<'e> FnOnce(&'e Env<'e>) -> Result<Value<'e>>,
{
    let env = Env::open(host, Arc::clone(lifecycle));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        env.drain_on_entry();
        body(&env).map(|value| value.raw())
    }));

    match outcome {
        Ok(Ok(raw)) => Some(raw),
        Ok(Err(err)) => {
            env.signal(&err);
            None
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log_panic(&message);
            env.signal(&Error::Panic(message));
            None
        }
    }
}

/// Entry glue for a raw module function
///
/// # Safety
/// `raw` must be the env pointer the host passed to the currently running
/// module function.
pub unsafe fn run_entry<F>(raw: *mut emacs_env, lifecycle: &Arc<Lifecycle>, body: F) -> emacs_value
where
    F: for<'e> FnOnce(&'e Env<'e>) -> Result<Value<'e>>,
{
    let Some(host) = RawEnv::from_raw(raw) else {
        error!(target: ENTRY_TARGET, "host passed an unusable emacs_env");
        return ptr::null_mut();
    };

    enter(&host, lifecycle, body).map_or(ptr::null_mut(), RawValue::as_ptr)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
