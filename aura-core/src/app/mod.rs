//! Application Bootstrap
//!
//! An [`App`] gathers what a mounted tree needs: a template, a setup
//! function producing the root context, registered components and
//! provided values. [`App::mount`] resolves the target node, runs setup and
//! starts the render loop.
//!
//! ```rust,ignore
//! let app = create_app()
//!     .template(r#"<button @click="count++">{{ count }}</button>"#)
//!     .setup(|cx| Context::new().with("count", Ref::new(cx.runtime(), 0)));
//! let mounted = app.mount(Arc::new(Document::parse(r#"<div id="app"></div>"#)), "#app")?;
//! ```

mod component;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

pub use component::{
    ComponentDef, ComponentInstance, InstanceKey, Lifecycle, Provides, SetupContext, SetupFn,
};

use crate::compiler::CompileOptions;
use crate::config::Config;
use crate::context::Context;
use crate::dom::{Host, NodeId};
use crate::error::{Error, Result};
use crate::reactive::{EffectScope, Reactive, Runtime};
use crate::render::{render_template, Renderer};
use crate::value::{Object, Value};

/// Start building an app on a fresh runtime.
pub fn create_app() -> App {
    App::new()
}

/// An application definition. Mount it any number of times.
#[derive(Clone)]
pub struct App {
    runtime: Runtime,
    template: Option<String>,
    setup: Option<SetupFn>,
    components: IndexMap<String, ComponentDef>,
    provides: Provides,
}

impl App {
    pub fn new() -> Self {
        Self::with_runtime(&Runtime::new())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_runtime(&Runtime::with_config(config))
    }

    pub fn with_runtime(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            template: None,
            setup: None,
            components: IndexMap::new(),
            provides: Provides::new(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Markup to render. Without one, the mount target's own contents are
    /// used.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&SetupContext) -> Context + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    /// Register a component under `name`. Templates may use it as `<Name>`
    /// or `<kebab-name>`.
    pub fn component(mut self, name: impl Into<String>, def: ComponentDef) -> Self {
        self.components.insert(name.into(), def);
        self
    }

    /// Make `value` available to every setup function through `inject`.
    pub fn provide(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.provides.provide(key, value);
        self
    }

    /// Render into the first node of `host` matching `selector`.
    ///
    /// Setup runs once, untracked; effects it creates live until unmount.
    /// Mount hooks run after the first render.
    #[tracing::instrument(level = "debug", skip(self, host))]
    pub fn mount(&self, host: Arc<dyn Host>, selector: &str) -> Result<MountedApp> {
        let root = host
            .query_selector(selector)
            .ok_or_else(|| Error::mount_target_not_found(selector))?;

        let lifecycle = Lifecycle::new();
        let scope = EffectScope::new(&self.runtime);
        let props = Reactive::from_object(&self.runtime, Object::new());
        let cx = SetupContext::new(&self.runtime, props, lifecycle.clone(), self.provides.clone());
        let ctx = scope.run(|| match &self.setup {
            Some(setup) => setup(&cx),
            None => Context::new(),
        });

        let template = match &self.template {
            Some(template) => template.clone(),
            None => host.inner_html(root).trim().to_string(),
        };
        let options = CompileOptions {
            components: self.components.clone(),
            provides: self.provides.clone(),
        };
        let renderer = scope.run(|| render_template(&self.runtime, host, root, &template, &ctx, options));

        lifecycle.run_mounted();
        tracing::debug!(%root, components = self.components.len(), "app mounted");

        Ok(MountedApp {
            root,
            ctx,
            renderer,
            lifecycle,
            scope,
            unmounted: AtomicBool::new(false),
        })
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("template", &self.template)
            .field("setup", &self.setup.is_some())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("provides", &self.provides)
            .finish()
    }
}

/// A running app.
pub struct MountedApp {
    root: NodeId,
    ctx: Context,
    renderer: Renderer,
    lifecycle: Lifecycle,
    scope: EffectScope,
    unmounted: AtomicBool,
}

impl MountedApp {
    /// The node the app renders into.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The root context returned by setup.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn html(&self) -> String {
        self.renderer.html()
    }

    /// Run unmount hooks, stop rendering and dispose every effect created
    /// by setup. Further calls do nothing.
    pub fn unmount(&self) {
        if self.unmounted.swap(true, Ordering::SeqCst) {
            return;
        }
        self.lifecycle.run_unmounted();
        self.renderer.unmount();
        self.scope.dispose();
        tracing::debug!(root = %self.root, "app unmounted");
    }

    pub fn is_unmounted(&self) -> bool {
        self.unmounted.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MountedApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedApp")
            .field("root", &self.root)
            .field("unmounted", &self.is_unmounted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::reactive::{computed, Ref};
    use std::sync::atomic::AtomicI32;

    fn host(markup: &str) -> (Document, Arc<dyn Host>) {
        let doc = Document::parse(markup);
        let host: Arc<dyn Host> = Arc::new(doc.clone());
        (doc, host)
    }

    #[test]
    fn missing_target_is_an_error() {
        let (_, host) = host(r#"<div id="app"></div>"#);
        let err = create_app().template("<p></p>").mount(host, "#nope").unwrap_err();
        assert!(matches!(err, Error::MountTargetNotFound { ref selector } if selector == "#nope"));
        assert!(err.to_string().contains("#nope"));
    }

    #[test]
    fn target_contents_are_the_default_template() {
        let (_, host) = host(r#"<div id="app">  <p>{{ greeting }}</p>  </div>"#);
        let app = create_app().setup(|_| Context::new().with("greeting", "hello"));
        let mounted = app.mount(host, "#app").unwrap();
        assert_eq!(mounted.html(), "<p>hello</p>");
    }

    #[test]
    fn setup_sees_provided_values() {
        let (_, host) = host(r#"<div id="app"></div>"#);
        let app = create_app()
            .provide("theme", "dark")
            .template("<p>{{ theme }}</p>")
            .setup(|cx| Context::new().with("theme", cx.inject("theme").unwrap_or_default()));
        assert_eq!(app.mount(host, "#app").unwrap().html(), "<p>dark</p>");
    }

    #[test]
    fn hooks_run_once_each() {
        let (_, host) = host(r#"<div id="app"></div>"#);
        let mounted = Arc::new(AtomicI32::new(0));
        let unmounted = Arc::new(AtomicI32::new(0));
        let (m, u) = (mounted.clone(), unmounted.clone());
        let app = create_app().template("<p></p>").setup(move |cx| {
            let m = m.clone();
            let u = u.clone();
            cx.on_mounted(move || {
                m.fetch_add(1, Ordering::SeqCst);
            });
            cx.on_unmounted(move || {
                u.fetch_add(1, Ordering::SeqCst);
            });
            Context::new()
        });

        let app = app.mount(host, "#app").unwrap();
        assert_eq!(mounted.load(Ordering::SeqCst), 1);
        app.unmount();
        app.unmount();
        assert_eq!(unmounted.load(Ordering::SeqCst), 1);
        assert!(app.is_unmounted());
    }

    #[test]
    fn unmount_disposes_setup_effects() {
        let (_, host) = host(r#"<div id="app"></div>"#);
        let app = create_app().template("<p>{{ doubled }}</p>").setup(|cx| {
            let count = Ref::new(cx.runtime(), 1);
            let c = count.clone();
            let doubled = computed(cx.runtime(), move || c.get().to_number() * 2.0);
            Context::new().with("count", count).with("doubled", doubled)
        });
        let mounted = app.mount(host, "#app").unwrap();
        assert_eq!(mounted.html(), "<p>2</p>");

        let before = app.runtime().effect_count();
        mounted.unmount();
        assert!(app.runtime().effect_count() < before);
        assert!(mounted.renderer().effect().is_none());
    }
}
