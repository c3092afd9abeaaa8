//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and re-run once the
//!    runtime is idle.
//!
//! 3. Before re-running, the effect drops its old subscriptions and tracks
//!    new ones during execution.
//!
//! # Lifetime
//!
//! The runtime owns every effect. An [`Effect`] is only a handle: dropping it
//! leaves the effect alive, [`Effect::dispose`] removes it. Effects created
//! while another effect runs are disposed automatically before that effect
//! runs again.
//!
//! # Watchers
//!
//! [`watch`] layers a comparison on top of an effect: the callback fires only
//! when the watched value differs from the previous run. [`watch_effect`] is a
//! plain effect under the name template authors know.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::dep::EffectId;
use super::runtime::Runtime;

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = Ref::new(&rt, 0);
///
/// let effect = Effect::new(&rt, {
///     let count = count.clone();
///     move || println!("Count is: {:?}", count.get())
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// ```
#[derive(Clone)]
pub struct Effect {
    id: EffectId,
    runtime: Runtime,
}

impl Effect {
    /// Create an effect. The function runs immediately to establish
    /// initial dependencies.
    pub fn new<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = runtime.create_effect(Arc::new(run), true);
        Self {
            id,
            runtime: runtime.clone(),
        }
    }

    /// Create an effect without running it.
    ///
    /// It tracks nothing until [`execute`](Self::execute) is called.
    pub fn new_lazy<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = runtime.create_effect(Arc::new(run), false);
        Self {
            id,
            runtime: runtime.clone(),
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Run the effect now, re-tracking its dependencies.
    pub fn execute(&self) {
        self.runtime.run_effect(self.id);
    }

    /// Queue the effect as if a dependency had changed.
    pub fn schedule(&self) {
        self.runtime.schedule(self.id);
    }

    /// Unsubscribe the effect everywhere and stop it from running again.
    pub fn dispose(&self) {
        self.runtime.dispose_effect(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime.is_disposed(self.id)
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.runtime.run_count(self.id)
    }

    /// Number of dependency sets the last run subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.runtime.dependency_count(self.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .field("run_count", &self.run_count())
            .finish()
    }
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Fire the callback on the first run as well.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

/// Watch the result of `getter`.
///
/// `callback` receives the new value and the previous one. It fires whenever
/// a dependency change makes `getter` return something unequal to the
/// previous result, and once on the first run if `options.immediate` is set
/// (with no previous value). The callback itself is not tracked.
pub fn watch<T, G, C>(runtime: &Runtime, getter: G, callback: C, options: WatchOptions) -> Effect
where
    T: PartialEq + Clone + Send + Sync + 'static,
    G: Fn() -> T + Send + Sync + 'static,
    C: Fn(&T, Option<&T>) + Send + Sync + 'static,
{
    let previous: Mutex<Option<T>> = Mutex::new(None);
    let rt = runtime.clone();

    Effect::new(runtime, move || {
        let next = getter();
        let prev = previous.lock().replace(next.clone());

        let fire = match &prev {
            None => options.immediate,
            Some(prev) => *prev != next,
        };
        if fire {
            rt.untracked(|| callback(&next, prev.as_ref()));
        }
    })
}

/// Run `f` now and again whenever anything it read changes.
pub fn watch_effect<F>(runtime: &Runtime, f: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(runtime, f)
}
