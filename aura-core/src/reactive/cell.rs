//! Reactive Cells
//!
//! A [`Ref`] is a single observed slot addressed through `value`. Three
//! flavours share one type:
//!
//! - `Ref::new` is a one-property [`Reactive`] whose only key is `value`.
//!   In-place mutation through [`Ref::update`] notifies subscribers.
//! - `Ref::shallow` tracks reads and replacements of `value`, but in-place
//!   mutation of the held value is silent. Call [`Ref::trigger`] to announce
//!   such a mutation explicitly.
//! - Field refs, produced by [`to_refs`], forward reads and writes to one
//!   property of an existing reactive object.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::object::Reactive;
use super::runtime::Runtime;
use crate::value::Value;

const VALUE_KEY: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Deep,
    Shallow,
    Field,
}

/// A reactive cell.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = Ref::new(&rt, 0);
///
/// count.set(5);
/// assert_eq!(count.get(), Value::from(5));
/// ```
#[derive(Clone)]
pub struct Ref {
    target: Reactive,
    key: Arc<str>,
    kind: RefKind,
}

impl Ref {
    /// Create a cell holding `initial`.
    pub fn new(runtime: &Runtime, initial: impl Into<Value>) -> Self {
        Self {
            target: Reactive::new(runtime, [(VALUE_KEY, initial.into())]),
            key: Arc::from(VALUE_KEY),
            kind: RefKind::Deep,
        }
    }

    /// Create a cell that only observes replacement of its value.
    pub fn shallow(runtime: &Runtime, initial: impl Into<Value>) -> Self {
        Self {
            kind: RefKind::Shallow,
            ..Self::new(runtime, initial)
        }
    }

    pub(crate) fn field(target: Reactive, key: &str) -> Self {
        Self {
            target,
            key: Arc::from(key),
            kind: RefKind::Field,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        self.target.runtime()
    }

    /// Read the value, subscribing the running effect.
    ///
    /// Field refs unwrap one level when the forwarded property holds a cell.
    pub fn get(&self) -> Value {
        let value = self.target.get(&self.key);
        match self.kind {
            RefKind::Field => value.unwrap_ref(),
            RefKind::Deep | RefKind::Shallow => value,
        }
    }

    /// Read the value without subscribing.
    pub fn get_untracked(&self) -> Value {
        let value = self.target.get_untracked(&self.key);
        match (self.kind, value) {
            (RefKind::Field, Value::Ref(inner)) => inner.get_untracked(),
            (_, value) => value,
        }
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: impl Into<Value>) {
        self.target.set(self.key.as_ref(), value);
    }

    /// Mutate the value in place.
    ///
    /// Notifies subscribers, except on shallow cells.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Value),
    {
        match self.kind {
            RefKind::Shallow => self.target.update_silent(&self.key, f),
            RefKind::Deep | RefKind::Field => self.target.update(&self.key, f),
        }
    }

    /// Notify subscribers without changing the value.
    pub fn trigger(&self) {
        self.target.trigger(&self.key);
    }

    pub fn is_shallow(&self) -> bool {
        self.kind == RefKind::Shallow
    }

    /// Number of effects subscribed to this cell.
    pub fn subscriber_count(&self) -> usize {
        self.target.subscriber_count(&self.key)
    }

    /// Whether both handles address the same slot.
    pub fn ptr_eq(&self, other: &Ref) -> bool {
        self.target.ptr_eq(&other.target) && self.key == other.key
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("kind", &self.kind)
            .field("value", &self.get_untracked())
            .finish()
    }
}

/// Whether `value` is a reactive cell.
pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The cell's current value, or `value` itself if it is not a cell.
pub fn unref(value: &Value) -> Value {
    value.unwrap_ref()
}

/// One forwarding cell per property of `object`.
///
/// Each cell reads and writes the original property, so destructured handles
/// stay reactive.
pub fn to_refs(object: &Reactive) -> IndexMap<String, Ref> {
    object
        .keys()
        .into_iter()
        .map(|key| {
            let cell = Ref::field(object.clone(), &key);
            (key, cell)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter(rt: &Runtime, cell: &Ref) -> Arc<AtomicI32> {
        let runs = Arc::new(AtomicI32::new(0));
        let (c, r) = (cell.clone(), runs.clone());
        let _effect = Effect::new(rt, move || {
            c.get();
            r.fetch_add(1, Ordering::SeqCst);
        });
        runs
    }

    #[test]
    fn unref_and_is_ref() {
        let rt = Runtime::new();
        let cell = Value::from(Ref::new(&rt, 3));

        assert!(is_ref(&cell));
        assert_eq!(unref(&cell), Value::from(3));
        assert!(!is_ref(&Value::from(3)));
        assert_eq!(unref(&Value::from("x")), Value::from("x"));

        // A plain object shaped like a cell is still plain
        let shaped = Value::from(json!({ "value": 1 }));
        assert!(!is_ref(&shaped));
    }

    #[test]
    fn ref_notifies_on_set_and_update() {
        let rt = Runtime::new();
        let cell = Ref::new(&rt, Value::from(vec![1]));
        let runs = counter(&rt, &cell);

        cell.set(Value::from(vec![1, 2]));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        cell.update(|v| {
            if let Value::Array(items) = v {
                items.push(Value::from(3));
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn shallow_ref_ignores_in_place_mutation() {
        let rt = Runtime::new();
        let cell = Ref::shallow(&rt, Value::from(json!({ "n": 1 })));
        let runs = counter(&rt, &cell);

        cell.update(|v| {
            if let Value::Object(map) = v {
                map.insert("n".into(), Value::from(2));
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cell.get_untracked().member("n"), Some(Value::from(2)));

        cell.trigger();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        cell.set(Value::from(json!({ "n": 3 })));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn to_refs_forwards_to_source() {
        let rt = Runtime::new();
        let state = Reactive::new(&rt, [("a", 1), ("b", 2)]);
        let refs = to_refs(&state);
        assert_eq!(refs.keys().collect::<Vec<_>>(), vec!["a", "b"]);

        let a = refs["a"].clone();
        let runs = counter(&rt, &a);

        state.set("a", 10);
        assert_eq!(a.get(), Value::from(10));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        a.set(20);
        assert_eq!(state.get("a"), Value::from(20));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn field_ref_unwraps_nested_cell() {
        let rt = Runtime::new();
        let inner = Ref::new(&rt, "x");
        let state = Reactive::new(&rt, [("name", inner)]);

        let refs = to_refs(&state);
        assert_eq!(refs["name"].get(), Value::from("x"));
    }
}
