//! Error types for the bridge
//!
//! Every failure that crosses the host boundary is translated into an
//! [`Error`] before it reaches native code. Nothing here is fatal; the
//! entry glue turns an `Err` back into a host signal.

use std::sync::Arc;

use thiserror::Error;

use crate::global::GlobalRef;

pub type Result<T> = std::result::Result<T, Error>;

/// The exact host values behind a translated signal or throw
///
/// Promoted when the exit is read, so re-raising hands the host back its
/// own symbol and data instead of values rebuilt from printed text.
/// Equality compares the referenced host values.
#[derive(Debug, Clone)]
pub struct HostExit {
    /// Error symbol, or the throw tag
    pub symbol: Arc<GlobalRef>,
    /// Signal data, or the thrown value
    pub data: Arc<GlobalRef>,
}

impl PartialEq for HostExit {
    fn eq(&self, other: &Self) -> bool {
        self.symbol.raw() == other.symbol.raw() && self.data.raw() == other.data.raw()
    }
}

impl Eq for HostExit {}

/// Failures surfaced by host interaction and callback dispatch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Symbol names must be plain ASCII without NUL bytes
    #[error("invalid symbol name {name:?}: only ASCII characters are allowed")]
    InvalidSymbolName { name: String },

    /// The host signalled an error during a primitive operation
    #[error("host signalled {symbol}: {data}")]
    Signal {
        symbol: String,
        data: String,
        origin: Option<HostExit>,
    },

    /// A host `throw` reached the module boundary
    #[error("host threw to tag {tag}: {value}")]
    Throw {
        tag: String,
        value: String,
        origin: Option<HostExit>,
    },

    /// A primitive failed without leaving a pending exit behind
    #[error("host operation `{operation}` failed: {reason}")]
    Host {
        operation: &'static str,
        reason: String,
    },

    /// A host value could not be converted to the requested native type
    #[error("wrong type: expected {expected}, found {found}")]
    WrongType { expected: &'static str, found: String },

    /// Captured callback arguments did not match the wrapper's shape
    #[error("callback expected {arity} argument(s) of shape {expected}")]
    ShapeMismatch { expected: &'static str, arity: usize },

    /// The deferred callback queue is at capacity
    #[error("deferred callback queue is full ({capacity} records)")]
    QueueFull { capacity: usize },

    /// The lifecycle coordinator backing a channel or reference is gone
    #[error("lifecycle coordinator has been dropped")]
    Detached,

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Custom(String),

    /// Native code panicked inside an entry point
    #[error("panic in native code: {0}")]
    Panic(String),
}

impl Error {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    pub(crate) fn host(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Host {
            operation,
            reason: reason.into(),
        }
    }

    /// True for errors that originated on the host side of the boundary
    pub fn is_host_exit(&self) -> bool {
        matches!(self, Self::Signal { .. } | Self::Throw { .. })
    }
}
