//! Dependency sets for the reactive system.
//!
//! Every observed property owns a [`Dep`]: the set of effects whose most
//! recent run read that property. Effects are identified by [`EffectId`].

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use parking_lot::Mutex;

/// Unique identifier for an effect.
///
/// Each effect (render loop, computed, watcher) gets a unique ID when it is
/// registered with a runtime. The ID is what dependency sets store, so an
/// effect can be subscribed to many properties without being cloned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// The subscriber set of a single observed property.
///
/// Membership is idempotent and iteration follows insertion order, which is
/// the order subscribers are notified in.
#[derive(Debug)]
pub struct Dep {
    id: u64,
    subscribers: Mutex<IndexSet<EffectId>>,
}

impl Dep {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            subscribers: Mutex::new(IndexSet::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn subscribe(&self, effect: EffectId) -> bool {
        self.subscribers.lock().insert(effect)
    }

    /// Remove a subscriber, keeping the order of the others.
    pub fn unsubscribe(&self, effect: EffectId) {
        self.subscribers.lock().shift_remove(&effect);
    }

    pub fn contains(&self, effect: EffectId) -> bool {
        self.subscribers.lock().contains(&effect)
    }

    /// Snapshot of the subscribers in notification order.
    pub fn subscribers(&self) -> Vec<EffectId> {
        self.subscribers.lock().iter().copied().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_ids_are_unique() {
        let id1 = EffectId::new();
        let id2 = EffectId::new();
        let id3 = EffectId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscription_is_idempotent() {
        let dep = Dep::new();
        let id = EffectId::new();

        assert!(dep.subscribe(id));
        assert!(!dep.subscribe(id));
        assert_eq!(dep.subscriber_count(), 1);
    }

    #[test]
    fn subscribers_keep_insertion_order() {
        let dep = Dep::new();
        let ids: Vec<_> = (0..4).map(|_| EffectId::new()).collect();
        for id in ids.iter().rev() {
            dep.subscribe(*id);
        }

        dep.unsubscribe(ids[2]);

        assert_eq!(dep.subscribers(), vec![ids[3], ids[1], ids[0]]);
    }
}
