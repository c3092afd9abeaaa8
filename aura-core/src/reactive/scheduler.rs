//! Update Scheduler
//!
//! The scheduler decides when notified effects run. Writes never run
//! subscribers directly: they enqueue them, and the runtime drains the queue
//! once no effect is executing.
//!
//! # Algorithm
//!
//! 1. A write notifies a dependency set. Each subscriber is appended to the
//!    pending queue unless it is already waiting.
//! 2. When the outermost effect finishes (or immediately, if the write came
//!    from outside any effect) the runtime starts a flush.
//! 3. The flush pops effects in queue order and runs them. Writes made by
//!    those effects append to the same queue.
//! 4. An effect popped more than `max_runs` times within one flush is
//!    dropped with a warning. This bounds mutual-trigger loops.
//! 5. When the queue is empty, the flush ends and deferred tick callbacks
//!    are handed back to the runtime.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexSet;

use super::EffectId;

/// Callback deferred until the current flush completes.
pub type Tick = Box<dyn FnOnce() + Send>;

/// Pending-effect queue with a re-entrancy flag and a cascade limit.
pub struct UpdateScheduler {
    /// Effects waiting to run, in notification order.
    pending: VecDeque<EffectId>,

    /// Mirror of `pending` for O(1) duplicate checks.
    queued: IndexSet<EffectId>,

    /// How many times each effect ran in the current flush.
    runs: HashMap<EffectId, usize>,

    /// Whether a flush is in progress.
    flushing: bool,

    /// Per-effect run limit within one flush.
    max_runs: usize,

    /// Callbacks waiting for the flush to end.
    ticks: Vec<Tick>,
}

impl UpdateScheduler {
    /// Create an empty scheduler.
    pub fn new(max_runs: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            queued: IndexSet::new(),
            runs: HashMap::new(),
            flushing: false,
            max_runs: max_runs.max(1),
            ticks: Vec::new(),
        }
    }

    /// Queue an effect. Returns `false` if it was already waiting.
    pub fn enqueue(&mut self, effect: EffectId) -> bool {
        if !self.queued.insert(effect) {
            return false;
        }
        self.pending.push_back(effect);
        true
    }

    /// Drop an effect from the queue (it was disposed).
    pub fn remove(&mut self, effect: EffectId) {
        if self.queued.shift_remove(&effect) {
            self.pending.retain(|id| *id != effect);
        }
    }

    /// Pop the next effect to run, skipping effects over the cascade limit.
    pub fn pop_next(&mut self) -> Option<EffectId> {
        while let Some(effect) = self.pending.pop_front() {
            self.queued.shift_remove(&effect);

            let runs = self.runs.entry(effect).or_insert(0);
            *runs += 1;
            if *runs > self.max_runs {
                tracing::warn!(
                    ?effect,
                    limit = self.max_runs,
                    "effect re-triggered too many times in one flush; dropping update"
                );
                continue;
            }
            return Some(effect);
        }
        None
    }

    /// Mark the start of a flush. Returns `false` if one is already running.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        true
    }

    /// Mark the end of a flush and hand back the deferred callbacks.
    pub fn end_flush(&mut self) -> Vec<Tick> {
        self.flushing = false;
        self.runs.clear();
        std::mem::take(&mut self.ticks)
    }

    /// Abandon a flush that did not complete. Pending effects are dropped;
    /// deferred callbacks stay queued.
    pub fn abort_flush(&mut self) {
        self.flushing = false;
        self.runs.clear();
        self.pending.clear();
        self.queued.clear();
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Defer a callback until the current flush ends.
    pub fn push_tick(&mut self, tick: Tick) {
        self.ticks.push(tick);
    }

    /// Take deferred callbacks outside of a flush.
    pub fn take_ticks(&mut self) -> Vec<Tick> {
        std::mem::take(&mut self.ticks)
    }

    /// Number of effects waiting to run.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_deduplicates() {
        let mut scheduler = UpdateScheduler::default();
        let a = EffectId::new();
        let b = EffectId::new();

        assert!(scheduler.enqueue(a));
        assert!(scheduler.enqueue(b));
        assert!(!scheduler.enqueue(a));
        assert_eq!(scheduler.pending_count(), 2);

        // Queue order is notification order
        assert_eq!(scheduler.pop_next(), Some(a));
        assert_eq!(scheduler.pop_next(), Some(b));
        assert_eq!(scheduler.pop_next(), None);
    }

    #[test]
    fn popped_effect_can_be_queued_again() {
        let mut scheduler = UpdateScheduler::default();
        let a = EffectId::new();

        scheduler.enqueue(a);
        assert_eq!(scheduler.pop_next(), Some(a));
        assert!(scheduler.enqueue(a));
    }

    #[test]
    fn cascade_limit_drops_runaway_effect() {
        let mut scheduler = UpdateScheduler::new(2);
        let a = EffectId::new();
        assert!(scheduler.begin_flush());

        for _ in 0..2 {
            scheduler.enqueue(a);
            assert_eq!(scheduler.pop_next(), Some(a));
        }

        scheduler.enqueue(a);
        assert_eq!(scheduler.pop_next(), None);

        // The counter resets with the next flush
        scheduler.end_flush();
        scheduler.enqueue(a);
        assert_eq!(scheduler.pop_next(), Some(a));
    }

    #[test]
    fn flush_is_not_reentrant() {
        let mut scheduler = UpdateScheduler::default();
        assert!(scheduler.begin_flush());
        assert!(scheduler.is_flushing());
        assert!(!scheduler.begin_flush());
        scheduler.end_flush();
        assert!(!scheduler.is_flushing());
        assert!(scheduler.begin_flush());
    }

    #[test]
    fn aborted_flush_can_restart() {
        let mut scheduler = UpdateScheduler::default();
        let a = EffectId::new();
        assert!(scheduler.begin_flush());
        scheduler.enqueue(a);
        scheduler.push_tick(Box::new(|| {}));

        scheduler.abort_flush();
        assert!(!scheduler.is_flushing());
        assert_eq!(scheduler.pending_count(), 0);
        assert!(scheduler.begin_flush());
        assert_eq!(scheduler.end_flush().len(), 1);
    }

    #[test]
    fn remove_drops_pending_effect() {
        let mut scheduler = UpdateScheduler::default();
        let a = EffectId::new();
        let b = EffectId::new();
        scheduler.enqueue(a);
        scheduler.enqueue(b);

        scheduler.remove(a);

        assert_eq!(scheduler.pop_next(), Some(b));
        assert_eq!(scheduler.pop_next(), None);
    }

    #[test]
    fn ticks_are_returned_at_end_of_flush() {
        use std::sync::atomic::{AtomicI32, Ordering};
        use std::sync::Arc;

        let mut scheduler = UpdateScheduler::default();
        let hits = Arc::new(AtomicI32::new(0));
        let hits_clone = hits.clone();

        scheduler.begin_flush();
        scheduler.push_tick(Box::new(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let ticks = scheduler.end_flush();
        assert_eq!(ticks.len(), 1);
        for tick in ticks {
            tick();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
