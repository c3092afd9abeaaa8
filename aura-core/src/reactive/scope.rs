//! Effect Scopes
//!
//! A scope collects the effects created while it runs so they can be
//! disposed together. Component instances use one per instance: the
//! computed values and watchers made by `setup` live exactly as long as the
//! instance, independent of the render effect that happened to create it.

use super::effect::Effect;
use super::runtime::Runtime;

/// Owner for a group of effects.
#[derive(Debug, Clone)]
pub struct EffectScope {
    anchor: Effect,
}

impl EffectScope {
    /// Create a detached scope. It is not owned by the running effect.
    pub fn new(runtime: &Runtime) -> Self {
        let anchor = runtime.with_owner(None, || Effect::new_lazy(runtime, || {}));
        Self { anchor }
    }

    /// Run `f` untracked; effects it creates belong to this scope.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let runtime = self.anchor.runtime();
        runtime.with_owner(Some(self.anchor.id()), f)
    }

    /// Dispose every effect created inside the scope.
    pub fn dispose(&self) {
        self.anchor.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.anchor.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Ref;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispose_stops_scoped_effects() {
        let rt = Runtime::new();
        let cell = Ref::new(&rt, 0);
        let runs = Arc::new(AtomicI32::new(0));

        let scope = EffectScope::new(&rt);
        let (c, r) = (cell.clone(), runs.clone());
        scope.run(|| {
            Effect::new(&rt, move || {
                c.get();
                r.fetch_add(1, Ordering::SeqCst);
            })
        });

        cell.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        scope.dispose();
        cell.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(scope.is_disposed());
    }

    #[test]
    fn scope_reads_are_untracked() {
        let rt = Runtime::new();
        let cell = Ref::new(&rt, 0);
        let outer_runs = Arc::new(AtomicI32::new(0));
        let scope = EffectScope::new(&rt);

        let (c, r, s) = (cell.clone(), outer_runs.clone(), scope.clone());
        let _outer = Effect::new(&rt, move || {
            s.run(|| c.get());
            r.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(1);
        assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
    }
}
