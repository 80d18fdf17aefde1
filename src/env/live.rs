//! Per-thread stack of live envs
//!
//! The host hands out one env per entry call, on its own thread. When the
//! host re-enters the module from inside a funcall, a second env stacks on
//! top of the first; the innermost one is the live env.

use std::cell::{Cell, RefCell};

use crate::host::Host;
use crate::lifecycle::Lifecycle;

#[derive(Clone, Copy)]
struct LiveEnv {
    token: u64,
    host: *const (dyn Host + 'static),
    lifecycle: *const Lifecycle,
}

thread_local! {
    static LIVE: RefCell<Vec<LiveEnv>> = const { RefCell::new(Vec::new()) };
    static NEXT_TOKEN: Cell<u64> = const { Cell::new(1) };
}

/// Register `host` as live on this thread; returns the token for [`pop`]
pub(crate) fn push(host: &dyn Host, lifecycle: &Lifecycle) -> u64 {
    // Safety: the entry is removed by `pop` when the owning Env drops, and
    // Env borrows `host` for its whole lifetime, so the pointer is never
    // read after the borrow ends. Every Env is owned by `Env::scope` or the
    // entry glue, so none can be leaked past its borrow.
    let host: &'static dyn Host = unsafe { std::mem::transmute::<&dyn Host, &'static dyn Host>(host) };

    let token = NEXT_TOKEN.with(|next| {
        let token = next.get();
        next.set(token + 1);
        token
    });

    LIVE.with(|live| {
        live.borrow_mut().push(LiveEnv {
            token,
            host: host as *const (dyn Host + 'static),
            lifecycle: lifecycle as *const Lifecycle,
        })
    });

    token
}

/// Remove the entry registered under `token`
pub(crate) fn pop(token: u64) {
    // During thread teardown the stack may already be gone; nothing to do.
    let _ = LIVE.try_with(|live| live.borrow_mut().retain(|entry| entry.token != token));
}

/// Number of envs live on this thread
pub(crate) fn depth() -> usize {
    LIVE.try_with(|live| live.borrow().len()).unwrap_or(0)
}

/// Run `f` with the innermost live host if it belongs to `lifecycle`
pub(crate) fn with_live_host<R>(lifecycle: &Lifecycle, f: impl FnOnce(&dyn Host) -> R) -> Option<R> {
    let top = LIVE
        .try_with(|live| live.borrow().last().copied())
        .ok()
        .flatten()?;

    if !std::ptr::eq(top.lifecycle, lifecycle) {
        return None;
    }

    // Safety: the entry is still on the stack, so its Env (and the host
    // borrow it holds) is alive on this thread.
    let host = unsafe { &*top.host };
    Some(f(host))
}
