//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a property is read, the
//! runtime subscribes the current effect to it.
//!
//! # Implementation
//!
//! The slot holds at most one effect. Entering a context saves the previous
//! occupant and installs the new one; dropping the guard restores the saved
//! occupant. Nesting therefore behaves like a stack without keeping one.
//!
//! The slot belongs to a [`Runtime`](super::Runtime) rather than the thread,
//! so two runtimes never see each other's running effects.

use parking_lot::Mutex;

use super::EffectId;

/// The single-slot "current effect" pointer of a runtime.
#[derive(Debug, Default)]
pub struct ActiveEffect {
    slot: Mutex<Option<EffectId>>,
}

impl ActiveEffect {
    pub fn new() -> Self {
        Self::default()
    }

    /// The effect currently executing, if any.
    pub fn current(&self) -> Option<EffectId> {
        *self.slot.lock()
    }

    fn replace(&self, effect: Option<EffectId>) -> Option<EffectId> {
        std::mem::replace(&mut *self.slot.lock(), effect)
    }
}

/// Guard that restores the previous effect when dropped.
///
/// This keeps the slot consistent even if the effect body panics.
pub struct ReactiveContext<'a> {
    active: &'a ActiveEffect,
    current: Option<EffectId>,
    previous: Option<EffectId>,
}

impl<'a> ReactiveContext<'a> {
    /// Make `effect` current until the guard is dropped.
    ///
    /// Passing `None` suspends tracking, which is how untracked reads work.
    pub fn enter(active: &'a ActiveEffect, effect: Option<EffectId>) -> Self {
        let previous = active.replace(effect);
        Self {
            active,
            current: effect,
            previous,
        }
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let popped = self.active.replace(self.previous);

        // Catches guards dropped out of order.
        debug_assert_eq!(
            popped, self.current,
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            self.current, popped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_effect() {
        let active = ActiveEffect::new();
        let id = EffectId::new();

        assert!(active.current().is_none());

        {
            let _ctx = ReactiveContext::enter(&active, Some(id));
            assert_eq!(active.current(), Some(id));
        }

        // Slot is cleared after drop
        assert!(active.current().is_none());
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let active = ActiveEffect::new();
        let id1 = EffectId::new();
        let id2 = EffectId::new();

        {
            let _ctx1 = ReactiveContext::enter(&active, Some(id1));
            assert_eq!(active.current(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(&active, Some(id2));
                assert_eq!(active.current(), Some(id2));
            }

            assert_eq!(active.current(), Some(id1));

            {
                let _untracked = ReactiveContext::enter(&active, None);
                assert!(active.current().is_none());
            }

            assert_eq!(active.current(), Some(id1));
        }

        assert!(active.current().is_none());
    }
}
