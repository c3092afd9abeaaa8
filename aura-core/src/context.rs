//! Component Contexts
//!
//! A [`Context`] is the live name → value table a template renders from:
//! cells, reactive objects, plain values and functions, as returned by a
//! setup function. Unlike a [`Scope`](crate::template::Scope) it is shared
//! and mutable, so two-way bindings and template refs can write back into it.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::reactive::{Reactive, Ref};
use crate::value::{Object, Value};

/// Shared, insertion-ordered table of named values.
#[derive(Clone, Default)]
pub struct Context {
    entries: Arc<RwLock<Object>>,
}

/// Non-owning handle to a [`Context`], for closures stored inside it.
#[derive(Clone)]
pub(crate) struct WeakContext {
    entries: Weak<RwLock<Object>>,
}

impl WeakContext {
    pub(crate) fn upgrade(&self) -> Option<Context> {
        self.entries.upgrade().map(|entries| Context { entries })
    }
}

/// Where a path assignment lands.
enum Anchor<'p> {
    /// A top-level entry of the context.
    Entry(&'p str),
    /// The value held by a cell.
    Cell(Ref),
    /// One property of a reactive object.
    Property(Reactive, &'p str),
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.write().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Copy of every entry, in insertion order.
    pub fn entries(&self) -> Object {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy every entry of `other` into this context, overwriting.
    pub fn extend(&self, other: &Object) {
        let mut entries = self.entries.write();
        for (key, value) in other {
            entries.insert(key.clone(), value.clone());
        }
    }

    pub(crate) fn downgrade(&self) -> WeakContext {
        WeakContext {
            entries: Arc::downgrade(&self.entries),
        }
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// Assign `value` along a dotted path, the way a two-way binding writes
    /// back.
    ///
    /// Cells met along the path are stepped through. The write lands on the
    /// innermost handle: a cell's value, a reactive property, or the context
    /// entry itself, so the matching subscribers are notified. If the final
    /// segment holds a cell, the cell is set instead of being replaced.
    ///
    /// Returns `false` if the path runs through something that cannot hold
    /// properties.
    pub fn assign_path<S: AsRef<str>>(&self, path: &[S], value: Value) -> bool {
        let Some((first, rest)) = path.split_first() else {
            return false;
        };

        let mut anchor = Anchor::Entry(first.as_ref());
        let mut plain: SmallVec<[&str; 4]> = SmallVec::new();
        let mut current = self.get(first.as_ref()).unwrap_or_default();

        for segment in rest {
            let segment = segment.as_ref();
            if let Value::Ref(cell) = &current {
                let inner = cell.get_untracked();
                anchor = Anchor::Cell(cell.clone());
                plain.clear();
                current = inner;
            }
            current = match &current {
                Value::Reactive(object) => {
                    let next = object.get_untracked(segment);
                    anchor = Anchor::Property(object.clone(), segment);
                    plain.clear();
                    next
                }
                Value::Undefined | Value::Null => return false,
                other => {
                    plain.push(segment);
                    other.member(segment).unwrap_or_default()
                }
            };
        }

        if let Value::Ref(cell) = current {
            cell.set(value);
            return true;
        }

        match anchor {
            Anchor::Entry(key) if plain.is_empty() => {
                self.insert(key, value);
                true
            }
            Anchor::Entry(key) => {
                let mut entries = self.entries.write();
                entries
                    .get_mut(key)
                    .is_some_and(|slot| assign_plain(slot, &plain, value))
            }
            Anchor::Cell(cell) if plain.is_empty() => {
                cell.set(value);
                true
            }
            Anchor::Cell(cell) => {
                let mut assigned = false;
                cell.update(|slot| assigned = assign_plain(slot, &plain, value));
                assigned
            }
            Anchor::Property(object, key) if plain.is_empty() => {
                object.set(key, value);
                true
            }
            Anchor::Property(object, key) => {
                let mut assigned = false;
                object.update(key, |slot| assigned = assign_plain(slot, &plain, value));
                assigned
            }
        }
    }
}

/// Write into plain nested data. `path` is non-empty.
fn assign_plain(target: &mut Value, path: &[&str], value: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };

    let mut slot = target;
    for segment in parents {
        let next = match slot {
            Value::Object(map) => map.get_mut(*segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index)),
            _ => None,
        };
        match next {
            Some(next) => slot = next,
            None => return false,
        }
    }

    match slot {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            true
        }
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items[index] = value;
                true
            }
            Ok(index) if index == items.len() => {
                items.push(value);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

impl From<Object> for Context {
    fn from(entries: Object) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.read().iter()).finish()
    }
}
