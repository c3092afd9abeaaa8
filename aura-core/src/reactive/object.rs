//! Reactive Objects
//!
//! A [`Reactive`] is a string-keyed bag of values observed per property.
//! Reading `name` subscribes the running effect to `name` only; writing
//! `count` notifies only the effects that read `count`.
//!
//! # How Reactive Objects Work
//!
//! 1. On read, the property's dependency set is created if absent, the
//!    running effect subscribes to it, and a clone of the value is returned.
//!
//! 2. On write, the value is stored first, then the property's dependency
//!    set (if anyone ever read the property) is notified.
//!
//! Nested plain values are not observed individually. Mutating inside a
//! property through [`Reactive::update`] counts as a write to that property.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::dep::Dep;
use super::runtime::Runtime;
use crate::value::{Object, Value};

fn next_object_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A reactive object with per-property dependency tracking.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let form = Reactive::new(&rt, [("name", "")]);
///
/// Effect::new(&rt, {
///     let form = form.clone();
///     move || println!("name = {:?}", form.get("name"))
/// });
///
/// form.set("name", "Ada"); // prints: name = "Ada"
/// ```
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ReactiveInner>,
}

struct ReactiveInner {
    id: u64,
    runtime: Runtime,
    values: RwLock<Object>,

    /// Created lazily, the first time a property is read.
    deps: Mutex<HashMap<String, Arc<Dep>>>,
}

impl Reactive {
    /// Create a reactive object from key/value pairs.
    pub fn new<I, K, V>(runtime: &Runtime, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let values = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_object(runtime, values)
    }

    /// Wrap an existing object.
    pub fn from_object(runtime: &Runtime, values: Object) -> Self {
        Self {
            inner: Arc::new(ReactiveInner {
                id: next_object_id(),
                runtime: runtime.clone(),
                values: RwLock::new(values),
                deps: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Read a property, subscribing the running effect to it.
    ///
    /// Missing properties read as `undefined` but are still tracked, so an
    /// effect notices when they are first assigned.
    pub fn get(&self, key: &str) -> Value {
        let dep = self.dep(key);
        self.inner.runtime.depend(&dep);
        self.get_untracked(key)
    }

    /// Read a property without subscribing.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner
            .values
            .read()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Write a property and notify its subscribers.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.inner.values.write().insert(key.clone(), value.into());
        self.trigger(&key);
    }

    /// Mutate a property in place and notify its subscribers.
    pub fn update<F>(&self, key: &str, f: F)
    where
        F: FnOnce(&mut Value),
    {
        self.update_silent(key, f);
        self.trigger(key);
    }

    /// Mutate a property in place without notifying anyone.
    pub(crate) fn update_silent<F>(&self, key: &str, f: F)
    where
        F: FnOnce(&mut Value),
    {
        let mut values = self.inner.values.write();
        let slot = values.entry(key.to_string()).or_default();
        f(slot);
    }

    /// Notify the subscribers of `key`, if the property was ever read.
    pub fn trigger(&self, key: &str) {
        let dep = self.inner.deps.lock().get(key).cloned();
        if let Some(dep) = dep {
            self.inner.runtime.notify(&dep);
        }
    }

    /// Property names, in insertion order. Not tracked.
    pub fn keys(&self) -> Vec<String> {
        self.inner.values.read().keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.values.read().contains_key(key)
    }

    /// Copy of the underlying object. Not tracked.
    pub fn to_object_untracked(&self) -> Object {
        self.inner.values.read().clone()
    }

    /// Number of effects subscribed to `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .deps
            .lock()
            .get(key)
            .map_or(0, |dep| dep.subscriber_count())
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn dep(&self, key: &str) -> Arc<Dep> {
        self.inner
            .deps
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Dep::new()))
            .clone()
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn get_and_set() {
        let rt = Runtime::new();
        let obj = Reactive::new(&rt, [("count", 1)]);

        assert_eq!(obj.get("count"), Value::from(1));
        obj.set("count", 2);
        assert_eq!(obj.get("count"), Value::from(2));
        assert_eq!(obj.get("missing"), Value::Undefined);
    }

    #[test]
    fn properties_are_tracked_independently() {
        let rt = Runtime::new();
        let obj = Reactive::new(&rt, [("a", 0), ("b", 0)]);
        let runs = Arc::new(AtomicI32::new(0));

        let (o, r) = (obj.clone(), runs.clone());
        let _effect = Effect::new(&rt, move || {
            o.get("a");
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        obj.set("b", 5);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        obj.set("a", 5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn write_before_any_read_notifies_nobody() {
        let rt = Runtime::new();
        let obj = Reactive::new(&rt, [("a", 0)]);

        obj.set("a", 1);
        assert_eq!(obj.subscriber_count("a"), 0);
    }

    #[test]
    fn reads_outside_effects_do_not_subscribe() {
        let rt = Runtime::new();
        let obj = Reactive::new(&rt, [("a", 0)]);

        obj.get("a");
        assert_eq!(obj.subscriber_count("a"), 0);
    }

    #[test]
    fn update_mutates_in_place_and_notifies() {
        let rt = Runtime::new();
        let obj = Reactive::new(&rt, [("items", Value::from(vec![1, 2]))]);
        let seen = Arc::new(AtomicI32::new(0));

        let (o, s) = (obj.clone(), seen.clone());
        let _effect = Effect::new(&rt, move || {
            let len = o.get("items").as_array().map_or(0, |items| items.len());
            s.store(len as i32, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        obj.update("items", |items| {
            if let Value::Array(items) = items {
                items.push(Value::from(3));
            }
        });
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn clone_shares_state() {
        let rt = Runtime::new();
        let a = Reactive::new(&rt, [("x", 1)]);
        let b = a.clone();

        a.set("x", 42);
        assert_eq!(b.get("x"), Value::from(42));
        assert!(a.ptr_eq(&b));
    }
}
