//! Emacs Bridge - lifecycle-safe plumbing for Emacs dynamic modules
//!
//! Native code talks to the editor only through a call-scoped [`Env`].
//! Values that must outlive a call are promoted to [`GlobalRef`]s, and Lisp
//! functions can be turned into ordinary `Send` closures through a
//! [`Channel`]; both defer their host work to the next env, so they are safe
//! to drop or call from any thread.

pub mod callback;
pub mod channel;
pub mod config;
pub mod convert;
pub mod entry;
pub mod env;
pub mod error;
pub mod ffi;
pub mod global;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod mock;

// Re-export commonly used items
pub use callback::{CallbackArgs, DeferredCall, Dispatch, ErasedArgs, LazyCallback, LispCallback};
pub use channel::Channel;
pub use config::{BridgeConfig, MismatchPolicy, OverflowPolicy};
pub use convert::{FromLisp, IntoLisp};
pub use entry::{enter, run_entry};
pub use env::{Env, IntoArgs, Value};
pub use error::{Error, HostExit, Result};
pub use ffi::RawEnv;
pub use global::GlobalRef;
pub use host::{FuncallExit, Host, RawValue};
pub use lifecycle::{DrainReport, Lifecycle, LifecycleStats};
pub use mock::{MockExit, MockHost, MockOp, MockValue};

use std::sync::Arc;

/// Module initialization: logging from the process-wide config
///
/// Call from `emacs_module_init`. Returns the coordinator every entry point
/// should share.
pub fn init() -> Arc<Lifecycle> {
    let lifecycle = Lifecycle::global();
    logging::init(&lifecycle.config().logging);
    logging::info!(
        version = env!("CARGO_PKG_VERSION"),
        capacity = lifecycle.config().callbacks.capacity,
        "emacs bridge initialized"
    );
    lifecycle
}
