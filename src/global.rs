//! Global references - host values promoted past a single entry call
//!
//! Each `GlobalRef` owns exactly one promotion and issues exactly one
//! release when dropped: immediately if an env of the same lifecycle is
//! live on the dropping thread, otherwise through the deferred release
//! queue. It is the only type that ever frees a global reference.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::env::{Env, Value};
use crate::error::Result;
use crate::host::RawValue;
use crate::lifecycle::Lifecycle;
use crate::logging::{warn, GLOBAL_REF_TARGET};

pub struct GlobalRef {
    raw: RawValue,
    /// Only used to request the release; never keeps the coordinator alive
    lifecycle: Weak<Lifecycle>,
}

impl GlobalRef {
    pub(crate) fn new(env: &Env<'_>, value: Value<'_>) -> Result<Self> {
        let raw = env.retain(value.raw())?;
        Ok(Self::adopt(raw, env.lifecycle()))
    }

    /// Take ownership of a reference the host has already promoted
    pub(crate) fn adopt(raw: RawValue, lifecycle: &Arc<Lifecycle>) -> Self {
        lifecycle.track_promotion(raw);
        Self {
            raw,
            lifecycle: Arc::downgrade(lifecycle),
        }
    }

    /// True if this reference was promoted under `lifecycle`
    pub(crate) fn belongs_to(&self, lifecycle: &Arc<Lifecycle>) -> bool {
        std::ptr::eq(self.lifecycle.as_ptr(), Arc::as_ptr(lifecycle))
    }

    /// Use the promoted value inside `env`
    #[inline]
    pub fn bind<'e>(&self, env: &'e Env<'e>) -> Value<'e> {
        Value::new(self.raw, env)
    }

    #[inline]
    pub fn raw(&self) -> RawValue {
        self.raw
    }
}

impl Drop for GlobalRef {
    fn drop(&mut self) {
        match self.lifecycle.upgrade() {
            Some(lifecycle) => lifecycle.request_release(self.raw),
            // Module teardown: nothing left that could reach the host.
            None => warn!(target: GLOBAL_REF_TARGET, value = ?self.raw, "lifecycle gone; global reference leaked"),
        }
    }
}

impl fmt::Debug for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalRef").field(&self.raw).finish()
    }
}
