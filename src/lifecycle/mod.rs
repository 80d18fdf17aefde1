//! Lifecycle coordinator - shared state between envs and background code
//!
//! Design: one explicit owner for everything that outlives a single env:
//! 1. Deferred release queue (mutex-guarded, unbounded; dropping a release
//!    would leak a global reference)
//! 2. Deferred callback queue (bounded flume channel with an overflow policy)
//! 3. Outstanding promotion registry and counters for monitoring
//! 4. Optional notifier that pokes the host to re-enter the module
//!
//! Producers (global reference drops, channel closures) may run on any
//! thread; the consumer is always the env on the host thread.


use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use flume::{Receiver, Sender, TrySendError};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::callback::{DeferredCall, Dispatch};
use crate::config::{BridgeConfig, MismatchPolicy, OverflowPolicy};
use crate::entry::panic_message;
use crate::env::{self, Env};
use crate::error::{Error, Result};
use crate::host::{Host, RawValue};
use crate::logging::{
    debug, log_callback_drain, log_callback_dropped, log_callback_mismatch, log_callback_registered, log_panic,
    log_promotion, log_release, log_release_drain, log_release_failed, log_release_queued, warn,
    CHANNEL_TARGET, GLOBAL_REF_TARGET,
};

/// Process-wide coordinator for module entry glue
static GLOBAL: Lazy<Arc<Lifecycle>> = Lazy::new(|| Lifecycle::new(BridgeConfig::from_env()));

type Notifier = Arc<dyn Fn() + Send + Sync>;

pub struct Lifecycle {
    config: BridgeConfig,
    releases: Mutex<VecDeque<RawValue>>,
    callbacks_tx: Sender<DeferredCall>,
    callbacks_rx: Receiver<DeferredCall>,
    /// Global ref -> number of live promotions behind it
    outstanding: DashMap<RawValue, usize>,
    notifier: RwLock<Option<Notifier>>,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    promotions: AtomicU64,
    releases: AtomicU64,
    deferred_releases: AtomicU64,
    release_failures: AtomicU64,
    callbacks_registered: AtomicU64,
    callbacks_delivered: AtomicU64,
    callbacks_mismatched: AtomicU64,
    callbacks_failed: AtomicU64,
    callbacks_dropped: AtomicU64,
}

impl Counters {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Outcome of draining the callback queue once
#[derive(Debug, Default)]
pub struct DrainReport {
    pub delivered: usize,
    pub mismatched: usize,
    pub failed: Vec<Error>,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.mismatched == 0 && self.failed.is_empty()
    }
}

/// Snapshot of queue sizes and totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    pub pending_releases: usize,
    pub pending_callbacks: usize,
    pub outstanding_refs: usize,
    pub promotions: u64,
    pub releases: u64,
    pub deferred_releases: u64,
    /// Frees the host refused; the references are considered leaked
    pub release_failures: u64,
    pub callbacks_registered: u64,
    pub callbacks_delivered: u64,
    pub callbacks_mismatched: u64,
    pub callbacks_failed: u64,
    pub callbacks_dropped: u64,
}

impl Lifecycle {
    /// Build a coordinator; a zero callback capacity is raised to 1
    pub fn new(mut config: BridgeConfig) -> Arc<Self> {
        config.callbacks.capacity = config.callbacks.capacity.max(1);
        let (callbacks_tx, callbacks_rx) = flume::bounded(config.callbacks.capacity);

        debug!(
            capacity = config.callbacks.capacity,
            overflow = ?config.callbacks.overflow,
            "lifecycle coordinator created"
        );

        Arc::new(Self {
            config,
            releases: Mutex::new(VecDeque::new()),
            callbacks_tx,
            callbacks_rx,
            outstanding: DashMap::new(),
            notifier: RwLock::new(None),
            counters: Counters::default(),
        })
    }

    /// Coordinator shared by every entry point of this module
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Called after each successful callback registration
    pub fn set_notifier(&self, notifier: impl Fn() + Send + Sync + 'static) {
        *self.notifier.write() = Some(Arc::new(notifier));
    }

    pub fn clear_notifier(&self) {
        *self.notifier.write() = None;
    }

    // ------------------------------------------------------------------
    // Global references
    // ------------------------------------------------------------------

    pub(crate) fn track_promotion(&self, raw: RawValue) {
        *self.outstanding.entry(raw).or_insert(0) += 1;
        Counters::bump(&self.counters.promotions);
        log_promotion(self.outstanding_refs());
    }

    /// Release now if an env of ours is live on this thread, else queue
    pub(crate) fn request_release(&self, raw: RawValue) {
        let released = env::with_live_host(self, |host| {
            // A pending exit makes the host ignore calls; keep it for later.
            if host.has_pending_exit() {
                return false;
            }
            self.release_now(host, raw, false);
            true
        });

        if released != Some(true) {
            let pending = {
                let mut queue = self.releases.lock();
                queue.push_back(raw);
                queue.len()
            };
            log_release_queued(pending);
        }
    }

    /// Release every queued global reference through `env`
    ///
    /// Skipped while the host has an exit pending, since the host would
    /// silently ignore the calls. If an exit appears mid-drain, the
    /// references not yet freed go back to the front of the queue.
    pub(crate) fn drain_releases(&self, env: &Env<'_>) -> usize {
        let host = env.host();
        if host.has_pending_exit() {
            return 0;
        }

        let mut queued = std::mem::take(&mut *self.releases.lock());
        if queued.is_empty() {
            return 0;
        }

        let mut released = 0;
        while let Some(raw) = queued.pop_front() {
            if host.has_pending_exit() {
                queued.push_front(raw);
                let mut queue = self.releases.lock();
                for raw in queued.into_iter().rev() {
                    queue.push_front(raw);
                }
                log_release_queued(queue.len());
                break;
            }
            if self.release_now(host, raw, true) {
                released += 1;
            }
        }
        log_release_drain(released);
        released
    }

    /// Free `raw` through `host`; false if the host refused
    ///
    /// A refusal is translated on the spot: the exit is cleared, counted
    /// and logged, and the reference is dropped from the registry since no
    /// retry can succeed.
    fn release_now(&self, host: &dyn Host, raw: RawValue, deferred: bool) -> bool {
        host.free_global_ref(raw);
        let failed = host.has_pending_exit();
        if failed {
            let (status, _, _) = host.non_local_exit_get();
            host.non_local_exit_clear();
            Counters::bump(&self.counters.release_failures);
            log_release_failed(status);
        }

        let known = match self.outstanding.get_mut(&raw) {
            Some(mut count) => {
                *count -= 1;
                true
            }
            None => false,
        };
        self.outstanding.remove_if(&raw, |_, count| *count == 0);
        if !known {
            warn!(target: GLOBAL_REF_TARGET, value = ?raw, "released a reference that was never tracked");
        }
        if failed {
            return false;
        }

        Counters::bump(&self.counters.releases);
        if deferred {
            Counters::bump(&self.counters.deferred_releases);
        }
        log_release(deferred);
        true
    }

    pub fn pending_releases(&self) -> usize {
        self.releases.lock().len()
    }

    /// Number of promotions not yet released
    pub fn outstanding_refs(&self) -> usize {
        self.outstanding.iter().map(|entry| *entry.value()).sum()
    }

    // ------------------------------------------------------------------
    // Deferred callbacks
    // ------------------------------------------------------------------

    /// Queue a record for the next env, applying the overflow policy
    pub fn enqueue_callback(&self, call: DeferredCall) -> Result<()> {
        let capacity = self.config.callbacks.capacity;
        let arity = call.arity();

        let mut call = call;
        loop {
            match self.callbacks_tx.try_send(call) {
                Ok(()) => break,
                Err(TrySendError::Full(rejected)) => match self.config.callbacks.overflow {
                    OverflowPolicy::Reject => {
                        Counters::bump(&self.counters.callbacks_dropped);
                        log_callback_dropped("queue full", capacity);
                        return Err(Error::QueueFull { capacity });
                    }
                    OverflowPolicy::DropOldest => {
                        if self.callbacks_rx.try_recv().is_ok() {
                            Counters::bump(&self.counters.callbacks_dropped);
                            log_callback_dropped("evicted oldest", capacity);
                        }
                        call = rejected;
                    }
                },
                // We own the receiver, so this only happens mid-teardown.
                Err(TrySendError::Disconnected(_)) => return Err(Error::Detached),
            }
        }

        Counters::bump(&self.counters.callbacks_registered);
        log_callback_registered(arity, self.callbacks_rx.len());

        let notifier = self.notifier.read().clone();
        if let Some(notify) = notifier {
            notify();
        }
        Ok(())
    }

    /// Dispatch the records queued at the time of the call
    ///
    /// Records registered by the callbacks themselves wait for the next
    /// drain, so a callback that re-registers cannot spin forever.
    pub(crate) fn drain_callbacks(&self, env: &Env<'_>) -> DrainReport {
        let mut report = DrainReport::default();
        let mut raised = 0;
        let policy = self.config.callbacks.on_mismatch;

        for _ in 0..self.callbacks_rx.len() {
            let Ok(call) = self.callbacks_rx.try_recv() else {
                break;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| call.dispatch(env))).unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                log_panic(&message);
                // A panic mid-operation may leave the host's exit set.
                if env.host().has_pending_exit() {
                    env.host().non_local_exit_clear();
                }
                Err(Error::Panic(message))
            });

            match outcome {
                Ok(Dispatch::Delivered) => report.delivered += 1,
                Ok(Dispatch::ShapeMismatch { expected, arity }) => {
                    report.mismatched += 1;
                    match policy {
                        MismatchPolicy::Ignore => {}
                        MismatchPolicy::Warn => log_callback_mismatch(expected, arity),
                        MismatchPolicy::Error => {
                            log_callback_mismatch(expected, arity);
                            report.failed.push(Error::ShapeMismatch { expected, arity });
                        }
                    }
                }
                Err(error) => {
                    warn!(target: CHANNEL_TARGET, error = %error, "deferred callback raised");
                    raised += 1;
                    report.failed.push(error);
                }
            }
        }

        Counters::add(&self.counters.callbacks_delivered, report.delivered);
        Counters::add(&self.counters.callbacks_mismatched, report.mismatched);
        Counters::add(&self.counters.callbacks_failed, raised);

        if report.delivered + report.mismatched + report.failed.len() > 0 {
            log_callback_drain(report.delivered, report.mismatched, report.failed.len());
        }
        report
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks_rx.len()
    }

    pub fn stats(&self) -> LifecycleStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        LifecycleStats {
            pending_releases: self.pending_releases(),
            pending_callbacks: self.pending_callbacks(),
            outstanding_refs: self.outstanding_refs(),
            promotions: load(&self.counters.promotions),
            releases: load(&self.counters.releases),
            deferred_releases: load(&self.counters.deferred_releases),
            release_failures: load(&self.counters.release_failures),
            callbacks_registered: load(&self.counters.callbacks_registered),
            callbacks_delivered: load(&self.counters.callbacks_delivered),
            callbacks_mismatched: load(&self.counters.callbacks_mismatched),
            callbacks_failed: load(&self.counters.callbacks_failed),
            callbacks_dropped: load(&self.counters.callbacks_dropped),
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        let leaked = self.releases.get_mut().len() + self.outstanding_refs();
        if leaked > 0 {
            warn!(leaked, "lifecycle dropped with unreleased global references");
        }
    }
}
