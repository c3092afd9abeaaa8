//! Component definitions, setup contexts and live instances.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::context::Context;
use crate::reactive::{EffectScope, Reactive, Runtime};
use crate::value::{Object, Value};

/// Produces a component's context from its setup context.
pub type SetupFn = Arc<dyn Fn(&SetupContext) -> Context + Send + Sync>;

type Hook = Box<dyn FnOnce() + Send>;

/// A reusable piece of template plus the setup function that feeds it.
#[derive(Clone)]
pub struct ComponentDef {
    template: String,
    setup: Option<SetupFn>,
}

impl ComponentDef {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            setup: None,
        }
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&SetupContext) -> Context + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Run the setup function, or produce an empty context if there is none.
    pub fn run_setup(&self, cx: &SetupContext) -> Context {
        match &self.setup {
            Some(setup) => setup(cx),
            None => Context::new(),
        }
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("template", &self.template)
            .field("setup", &self.setup.is_some())
            .finish()
    }
}

/// Mount and unmount callback queues.
///
/// Each queue is drained at most once; callbacks registered after draining
/// wait for the next drain.
#[derive(Clone, Default)]
pub struct Lifecycle {
    mounted: Arc<Mutex<Vec<Hook>>>,
    unmounted: Arc<Mutex<Vec<Hook>>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_mounted<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.mounted.lock().push(Box::new(f));
    }

    pub fn on_unmounted<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.unmounted.lock().push(Box::new(f));
    }

    pub fn run_mounted(&self) {
        let hooks = std::mem::take(&mut *self.mounted.lock());
        for hook in hooks {
            hook();
        }
    }

    pub fn run_unmounted(&self) {
        let hooks = std::mem::take(&mut *self.unmounted.lock());
        for hook in hooks {
            hook();
        }
    }

    pub fn pending_mounted(&self) -> usize {
        self.mounted.lock().len()
    }

    pub fn pending_unmounted(&self) -> usize {
        self.unmounted.lock().len()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("mounted", &self.pending_mounted())
            .field("unmounted", &self.pending_unmounted())
            .finish()
    }
}

/// App-wide provide/inject store.
#[derive(Clone, Default)]
pub struct Provides {
    values: Arc<RwLock<Object>>,
}

impl Provides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn inject(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }
}

impl fmt::Debug for Provides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.read().keys()).finish()
    }
}

/// What a setup function can see.
pub struct SetupContext {
    runtime: Runtime,
    props: Reactive,
    lifecycle: Lifecycle,
    provides: Provides,
}

impl SetupContext {
    pub fn new(runtime: &Runtime, props: Reactive, lifecycle: Lifecycle, provides: Provides) -> Self {
        Self {
            runtime: runtime.clone(),
            props,
            lifecycle,
            provides,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Props passed by the caller. Empty for the root.
    pub fn props(&self) -> &Reactive {
        &self.props
    }

    pub fn on_mounted<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lifecycle.on_mounted(f);
    }

    pub fn on_unmounted<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lifecycle.on_unmounted(f);
    }

    pub fn inject(&self, key: &str) -> Option<Value> {
        self.provides.inject(key)
    }
}

/// Identity of a component instance across renders: expansion order plus
/// component name.
pub type InstanceKey = (usize, String);

/// A live component: its props, its setup result and the scope owning the
/// effects its setup created.
#[derive(Clone)]
pub struct ComponentInstance {
    name: String,
    cid: usize,
    props: Reactive,
    state: Context,
    lifecycle: Lifecycle,
    scope: EffectScope,
}

impl ComponentInstance {
    /// Run `def`'s setup inside a fresh scope, detached from the render that
    /// triggered it.
    pub fn create(
        runtime: &Runtime,
        def: &ComponentDef,
        name: &str,
        cid: usize,
        props: Object,
        provides: &Provides,
    ) -> Self {
        let props = Reactive::from_object(runtime, props);
        let lifecycle = Lifecycle::new();
        let scope = EffectScope::new(runtime);
        let cx = SetupContext::new(runtime, props.clone(), lifecycle.clone(), provides.clone());
        let state = scope.run(|| def.run_setup(&cx));
        tracing::debug!(component = name, cid, "component instance created");

        Self {
            name: name.to_string(),
            cid,
            props,
            state,
            lifecycle,
            scope,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cid(&self) -> usize {
        self.cid
    }

    pub fn key(&self) -> InstanceKey {
        (self.cid, self.name.clone())
    }

    pub fn props(&self) -> &Reactive {
        &self.props
    }

    /// The context returned by setup.
    pub fn state(&self) -> &Context {
        &self.state
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Write changed props. Props no longer passed become `undefined`.
    pub fn update_props(&self, next: &Object) {
        for key in self.props.keys() {
            if !next.contains_key(&key) && !self.props.get_untracked(&key).is_undefined() {
                self.props.set(key, Value::Undefined);
            }
        }
        for (key, value) in next {
            if !self.props.get_untracked(key).strict_eq(value) {
                self.props.set(key.clone(), value.clone());
            }
        }
    }

    /// Run unmount hooks and dispose the instance's effects.
    pub fn unmount(&self) {
        tracing::debug!(component = %self.name, cid = self.cid, "component instance unmounted");
        self.lifecycle.run_unmounted();
        self.scope.dispose();
    }

    pub fn is_unmounted(&self) -> bool {
        self.scope.is_disposed()
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.name)
            .field("cid", &self.cid)
            .finish()
    }
}
