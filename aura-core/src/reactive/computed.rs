//! Computed Values
//!
//! A computed value is a cell kept up to date by an effect. The effect reads
//! the getter's dependencies and writes the result into the cell; readers of
//! the cell subscribe to the cell, not to the getter's inputs.
//!
//! Recomputation is eager: it happens as soon as an input changes, whether or
//! not anyone reads the result.

use super::cell::Ref;
use super::effect::Effect;
use super::runtime::Runtime;
use crate::value::Value;

/// Derive a cell from `getter`.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let a = Ref::new(&rt, 1);
/// let b = Ref::new(&rt, 2);
///
/// let sum = computed(&rt, {
///     let (a, b) = (a.clone(), b.clone());
///     move || a.get().to_number() + b.get().to_number()
/// });
/// assert_eq!(sum.get(), Value::from(3));
///
/// a.set(10);
/// assert_eq!(sum.get(), Value::from(12));
/// ```
pub fn computed<V, F>(runtime: &Runtime, getter: F) -> Ref
where
    V: Into<Value>,
    F: Fn() -> V + Send + Sync + 'static,
{
    let cell = Ref::new(runtime, Value::Undefined);

    let target = cell.clone();
    Effect::new(runtime, move || {
        target.set(getter());
    });

    cell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Reactive;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn computed_tracks_inputs() {
        let rt = Runtime::new();
        let a = Ref::new(&rt, 1);
        let b = Ref::new(&rt, 2);

        let (ca, cb) = (a.clone(), b.clone());
        let sum = computed(&rt, move || ca.get().to_number() + cb.get().to_number());
        assert_eq!(sum.get(), Value::from(3));

        a.set(10);
        assert_eq!(sum.get(), Value::from(12));

        b.set(-10);
        assert_eq!(sum.get(), Value::from(0));
    }

    #[test]
    fn computed_changes_once_per_input_write() {
        let rt = Runtime::new();
        let state = Reactive::new(&rt, [("a", 1), ("b", 2), ("unrelated", 0)]);

        let s = state.clone();
        let sum = computed(&rt, move || {
            s.get("a").to_number() + s.get("b").to_number()
        });

        let changes = Arc::new(AtomicI32::new(0));
        let (cell, n) = (sum.clone(), changes.clone());
        let _reader = Effect::new(&rt, move || {
            cell.get();
            n.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        state.set("a", 5);
        assert_eq!(changes.load(Ordering::SeqCst), 2);

        state.set("b", 5);
        assert_eq!(changes.load(Ordering::SeqCst), 3);

        state.set("unrelated", 1);
        assert_eq!(changes.load(Ordering::SeqCst), 3);
        assert_eq!(sum.get(), Value::from(10));
    }

    #[test]
    fn computed_chains() {
        let rt = Runtime::new();
        let base = Ref::new(&rt, 2);

        let b = base.clone();
        let doubled = computed(&rt, move || b.get().to_number() * 2.0);
        let d = doubled.clone();
        let quadrupled = computed(&rt, move || d.get().to_number() * 2.0);

        base.set(3);
        assert_eq!(quadrupled.get(), Value::from(12));
    }
}
