//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactive objects,
//! cells and effects. It owns the current-effect slot, the effect arena and
//! the update scheduler.
//!
//! # How It Works
//!
//! 1. When an effect is created, it registers with the runtime and runs once
//!    to establish its dependencies.
//!
//! 2. When an effect reads a property, the runtime subscribes the effect to
//!    that property's [`Dep`] and records the dep on the effect.
//!
//! 3. When a property is written, the runtime:
//!    a. Collects the property's subscribers in insertion order
//!    b. Queues every subscriber except the effect doing the write
//!    c. Flushes the queue once no effect is executing
//!
//! 4. Before an effect re-runs, its recorded subscriptions are removed and
//!    effects it created during the previous run are disposed. The new run
//!    subscribes afresh, so stale branches stop triggering it.
//!
//! # Explicit handle
//!
//! There is no process-wide state. Every reactive value is created from a
//! `Runtime` and keeps a clone of it; two runtimes are fully independent.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::context::{ActiveEffect, ReactiveContext};
use super::dep::{Dep, EffectId};
use super::scheduler::UpdateScheduler;
use crate::config::Config;

/// The body of an effect.
pub(crate) type EffectFn = Arc<dyn Fn() + Send + Sync>;

/// Arena entry for a registered effect.
struct EffectRecord {
    run: EffectFn,

    /// Effect that was running when this one was created.
    owner: Option<EffectId>,

    /// Dependency sets this effect subscribed to during its last run.
    deps: Mutex<Vec<Weak<Dep>>>,

    /// Effects created during the last run. Disposed before the next one.
    children: Mutex<Vec<EffectId>>,

    disposed: AtomicBool,
    run_count: AtomicUsize,
}

/// Handle to a reactive runtime.
///
/// Cloning is cheap; all clones share the same graph.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: Config,

    /// Effect whose reads are being tracked.
    active: ActiveEffect,

    /// Effect that adopts newly created effects. Usually equal to `active`,
    /// but untracked sections keep the owner and scopes replace it.
    owner: ActiveEffect,

    effects: RwLock<HashMap<EffectId, Arc<EffectRecord>>>,
    scheduler: Mutex<UpdateScheduler>,

    /// Number of effect bodies currently on the call stack.
    depth: AtomicUsize,
}

/// Increments the running-effect depth for the lifetime of the guard.
struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resets the scheduler if a flush unwinds before reaching its end.
struct FlushGuard<'a> {
    scheduler: &'a Mutex<UpdateScheduler>,
    finished: bool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("effect panicked during flush; pending updates discarded");
            self.scheduler.lock().abort_flush();
        }
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let scheduler = UpdateScheduler::new(config.max_effect_runs);
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                active: ActiveEffect::new(),
                owner: ActiveEffect::new(),
                effects: RwLock::new(HashMap::new()),
                scheduler: Mutex::new(scheduler),
                depth: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether both handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The effect currently executing, if any.
    pub fn current_effect(&self) -> Option<EffectId> {
        self.inner.active.current()
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking(&self) -> bool {
        self.current_effect().is_some()
    }

    /// Run `f` with tracking suspended.
    ///
    /// Effects created inside still belong to the running effect.
    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        let _ctx = ReactiveContext::enter(&self.inner.active, None);
        f()
    }

    /// Run `f` untracked, with effects it creates adopted by `owner`.
    pub(crate) fn with_owner<T>(&self, owner: Option<EffectId>, f: impl FnOnce() -> T) -> T {
        let _owner = ReactiveContext::enter(&self.inner.owner, owner);
        let _ctx = ReactiveContext::enter(&self.inner.active, None);
        f()
    }

    /// Subscribe the current effect to `dep`. No-op outside any effect.
    pub fn depend(&self, dep: &Arc<Dep>) {
        let Some(effect) = self.current_effect() else {
            return;
        };

        if dep.subscribe(effect) {
            if let Some(record) = self.record(effect) {
                record.deps.lock().push(Arc::downgrade(dep));
            }
            tracing::trace!(?effect, dep = dep.id(), "subscribed");
        }
    }

    /// Queue every subscriber of `dep` and flush if nothing is running.
    ///
    /// The effect performing the write is never queued by its own write.
    pub fn notify(&self, dep: &Dep) {
        let subscribers = dep.subscribers();
        if subscribers.is_empty() {
            return;
        }

        let current = self.current_effect();
        {
            let mut scheduler = self.inner.scheduler.lock();
            for effect in subscribers {
                if Some(effect) != current {
                    scheduler.enqueue(effect);
                }
            }
        }

        self.flush_if_idle();
    }

    /// Run queued effects until the queue is empty.
    ///
    /// Does nothing if a flush is already in progress further up the stack.
    pub fn flush(&self) {
        if !self.inner.scheduler.lock().begin_flush() {
            return;
        }
        tracing::debug!("flushing pending effects");
        let mut guard = FlushGuard {
            scheduler: &self.inner.scheduler,
            finished: false,
        };

        loop {
            let next = self.inner.scheduler.lock().pop_next();
            let Some(effect) = next else {
                break;
            };
            self.run_effect(effect);
        }

        guard.finished = true;
        let ticks = self.inner.scheduler.lock().end_flush();
        for tick in ticks {
            tick();
        }
    }

    /// Defer `f` until the current flush completes.
    ///
    /// Outside a flush the callback waits for the next one, or for
    /// [`run_ticks`](Self::run_ticks).
    pub fn next_tick<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.scheduler.lock().push_tick(Box::new(f));
    }

    /// Run deferred callbacks now.
    pub fn run_ticks(&self) {
        let ticks = self.inner.scheduler.lock().take_ticks();
        for tick in ticks {
            tick();
        }
    }

    /// Number of live effects in the arena.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.read().len()
    }

    // ------------------------------------------------------------------------
    // Effect arena
    // ------------------------------------------------------------------------

    pub(crate) fn create_effect(&self, run: EffectFn, immediate: bool) -> EffectId {
        let id = EffectId::new();
        let owner = self.inner.owner.current();

        let record = Arc::new(EffectRecord {
            run,
            owner,
            deps: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        self.inner.effects.write().insert(id, record);

        if let Some(parent) = owner.and_then(|owner| self.record(owner)) {
            parent.children.lock().push(id);
        }

        if immediate {
            self.run_effect(id);
        }
        id
    }

    /// Execute an effect within a tracking context.
    pub(crate) fn run_effect(&self, effect: EffectId) {
        let Some(record) = self.record(effect) else {
            return;
        };
        if record.disposed.load(Ordering::SeqCst) {
            return;
        }

        self.dispose_children(&record);
        self.clear_dependencies(effect, &record);

        {
            let _depth = DepthGuard::enter(&self.inner.depth);
            let _owner = ReactiveContext::enter(&self.inner.owner, Some(effect));
            let _ctx = ReactiveContext::enter(&self.inner.active, Some(effect));
            tracing::trace!(?effect, "running effect");
            (record.run)();
        }
        record.run_count.fetch_add(1, Ordering::SeqCst);

        self.flush_if_idle();
    }

    /// Queue an effect as if one of its dependencies changed.
    pub(crate) fn schedule(&self, effect: EffectId) {
        if self.inner.scheduler.lock().enqueue(effect) {
            self.flush_if_idle();
        }
    }

    pub(crate) fn dispose_effect(&self, effect: EffectId) {
        let removed = self.inner.effects.write().remove(&effect);
        let Some(record) = removed else {
            return;
        };

        record.disposed.store(true, Ordering::SeqCst);
        self.clear_dependencies(effect, &record);
        self.dispose_children(&record);
        self.inner.scheduler.lock().remove(effect);

        if let Some(parent) = record.owner.and_then(|owner| self.record(owner)) {
            parent.children.lock().retain(|child| *child != effect);
        }
        tracing::trace!(?effect, "disposed effect");
    }

    pub(crate) fn is_disposed(&self, effect: EffectId) -> bool {
        self.record(effect)
            .map_or(true, |record| record.disposed.load(Ordering::SeqCst))
    }

    pub(crate) fn run_count(&self, effect: EffectId) -> usize {
        self.record(effect)
            .map_or(0, |record| record.run_count.load(Ordering::SeqCst))
    }

    pub(crate) fn dependency_count(&self, effect: EffectId) -> usize {
        self.record(effect).map_or(0, |record| {
            record
                .deps
                .lock()
                .iter()
                .filter(|dep| dep.strong_count() > 0)
                .count()
        })
    }

    fn record(&self, effect: EffectId) -> Option<Arc<EffectRecord>> {
        self.inner.effects.read().get(&effect).cloned()
    }

    fn flush_if_idle(&self) {
        if self.inner.depth.load(Ordering::SeqCst) == 0 {
            self.flush();
        }
    }

    /// Remove the effect from every dependency set it joined last run.
    fn clear_dependencies(&self, effect: EffectId, record: &EffectRecord) {
        let deps = std::mem::take(&mut *record.deps.lock());
        for dep in deps.iter().filter_map(Weak::upgrade) {
            dep.unsubscribe(effect);
        }
    }

    fn dispose_children(&self, record: &EffectRecord) {
        let children = std::mem::take(&mut *record.children.lock());
        for child in children {
            self.dispose_effect(child);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("effects", &self.effect_count())
            .field("current", &self.current_effect())
            .finish()
    }
}
