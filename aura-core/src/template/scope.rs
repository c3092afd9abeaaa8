//! Evaluation scopes.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::value::{Object, Value};

/// The names an expression can see, with their values.
///
/// Scopes are immutable and cheap to clone. Loop bodies and arrow functions
/// get a [`child`](Scope::child) with extra bindings layered on top.
#[derive(Clone, Default)]
pub struct Scope {
    vars: Arc<Object>,
}

impl Scope {
    pub fn new(vars: Object) -> Self {
        Self {
            vars: Arc::new(vars),
        }
    }

    /// Snapshot a live context into plain values.
    ///
    /// Cells are unwrapped, which subscribes the running effect to every
    /// top-level cell. Reactive objects stay handles, so their properties are
    /// tracked only when an expression actually reads them.
    pub fn from_context(ctx: &Context) -> Self {
        let vars = ctx
            .entries()
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::Ref(cell) => cell.get(),
                    other => other,
                };
                (key, value)
            })
            .collect();
        Self::new(vars)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// A new scope with `bindings` added, shadowing existing names.
    pub fn child<I, K>(&self, bindings: I) -> Scope
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut vars = (*self.vars).clone();
        for (key, value) in bindings {
            vars.insert(key.into(), value);
        }
        Self::new(vars)
    }

    pub fn vars(&self) -> &Object {
        &self.vars
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.vars.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Ref, Runtime};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn snapshot_unwraps_cells() {
        let rt = Runtime::new();
        let ctx = Context::new()
            .with("count", Ref::new(&rt, 3))
            .with("label", "x");

        let scope = Scope::from_context(&ctx);
        assert_eq!(scope.get("count"), Some(&Value::from(3)));
        assert_eq!(scope.get("label"), Some(&Value::from("x")));
    }

    #[test]
    fn snapshot_inside_effect_tracks_cells() {
        let rt = Runtime::new();
        let count = Ref::new(&rt, 0);
        let ctx = Context::new().with("count", count.clone());
        let runs = Arc::new(AtomicI32::new(0));

        let (c, r) = (ctx.clone(), runs.clone());
        let _effect = Effect::new(&rt, move || {
            Scope::from_context(&c);
            r.fetch_add(1, Ordering::SeqCst);
        });

        count.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn child_shadows_parent() {
        let parent = Scope::new(Object::from_iter([
            ("item".to_string(), Value::from(1)),
            ("other".to_string(), Value::from(2)),
        ]));
        let child = parent.child([("item", Value::from(10))]);

        assert_eq!(child.get("item"), Some(&Value::from(10)));
        assert_eq!(child.get("other"), Some(&Value::from(2)));
        assert_eq!(parent.get("item"), Some(&Value::from(1)));
    }
}
