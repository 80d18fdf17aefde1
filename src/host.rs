//! Host boundary - the primitive operations a call-scoped host env offers
//!
//! Design: one object-safe trait mirroring the module ABI one-to-one.
//! Implementations are infallible at the type level; failures are left
//! pending on the host and picked up by [`Env::check`](crate::Env).
//!
//! - `RawEnv` (in `ffi`) forwards to a real `emacs_env`
//! - `MockHost` (in `mock`) is an in-process fake for tests

use core::ffi::CStr;
use core::fmt;

use crate::ffi::{emacs_value, emacs_value_tag};

/// Untyped handle-scoped identifier for a host datum
///
/// Meaningless outside the env that produced it unless it came from
/// `make_global_ref`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawValue(emacs_value);

// Safety: a RawValue is never dereferenced on the Rust side. The host only
// interprets it through a live env on the host thread, and global refs are
// valid from any env.
unsafe impl Send for RawValue {}
unsafe impl Sync for RawValue {}

impl RawValue {
    #[inline]
    pub const fn from_ptr(ptr: emacs_value) -> Self {
        Self(ptr)
    }

    #[inline]
    pub const fn as_ptr(self) -> emacs_value {
        self.0
    }

    /// Build a value from an integer identifier (fake hosts)
    #[inline]
    pub fn from_bits(bits: usize) -> Self {
        Self(bits as *mut emacs_value_tag)
    }

    #[inline]
    pub fn bits(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawValue({:#x})", self.bits())
    }
}

/// Outcome of the last host operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncallExit {
    Return,
    Signal,
    Throw,
}

/// Primitive host operations available through one live env
///
/// All values passed in must come from the same host instance. Operations
/// performed while an exit is pending are ignored by the host.
pub trait Host {
    fn intern(&self, name: &CStr) -> RawValue;
    fn funcall(&self, function: RawValue, args: &[RawValue]) -> RawValue;

    fn make_global_ref(&self, value: RawValue) -> RawValue;
    fn free_global_ref(&self, value: RawValue);

    fn non_local_exit_check(&self) -> FuncallExit;
    /// Pending exit plus its symbol/tag and data/value
    fn non_local_exit_get(&self) -> (FuncallExit, RawValue, RawValue);
    fn non_local_exit_clear(&self);
    fn non_local_exit_signal(&self, symbol: RawValue, data: RawValue);
    fn non_local_exit_throw(&self, tag: RawValue, value: RawValue);

    fn type_of(&self, value: RawValue) -> RawValue;
    fn is_not_nil(&self, value: RawValue) -> bool;
    fn eq(&self, a: RawValue, b: RawValue) -> bool;

    fn make_integer(&self, value: i64) -> RawValue;
    fn extract_integer(&self, value: RawValue) -> i64;
    fn make_float(&self, value: f64) -> RawValue;
    fn extract_float(&self, value: RawValue) -> f64;
    fn make_string(&self, contents: &str) -> RawValue;
    /// `None` when `value` is not a string (an exit is left pending)
    fn copy_string_contents(&self, value: RawValue) -> Option<String>;

    #[inline]
    fn has_pending_exit(&self) -> bool {
        self.non_local_exit_check() != FuncallExit::Return
    }
}
