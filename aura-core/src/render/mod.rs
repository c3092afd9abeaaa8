//! Render Loop
//!
//! [`render_template`] binds a template to a host node. Every update
//! recompiles the whole template against the live context and replaces the
//! node's contents; nothing is diffed. The update runs inside an
//! [`Effect`], so any reactive value read while compiling schedules the next
//! update when it changes.
//!
//! One update, in order:
//!
//! 1. Compile, reusing the component instances of the previous update.
//! 2. Replace the host node's contents and mark it `data-aura-mounted`.
//! 3. Write `ref="name"` elements back into the context.
//! 4. Attach event listeners to the new elements.
//! 5. Clear `v-cloak` markers.
//! 6. Defer mount hooks of new instances and unmount of dropped ones until
//!    the current flush completes.

mod events;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

pub use events::bind_events;

use crate::app::{ComponentInstance, InstanceKey};
use crate::compiler::{context_model_handler, model_handler_name, CompileOptions, Compiler};
use crate::context::Context;
use crate::dom::{ElementInfo, Host, NodeId};
use crate::reactive::{Effect, Runtime};
use crate::template::html::{self, Node};
use crate::template::Expression;
use crate::value::Value;

/// A template bound to a host node and kept up to date.
///
/// Cloning yields another handle to the same render loop.
#[derive(Clone)]
pub struct Renderer {
    inner: Arc<RendererInner>,
}

struct RendererInner {
    runtime: Runtime,
    host: Arc<dyn Host>,
    root: NodeId,
    template: Vec<Node>,
    ctx: Context,
    compiler: Compiler,
    instances: Mutex<IndexMap<InstanceKey, ComponentInstance>>,
    effect: Mutex<Option<Effect>>,
    renders: AtomicUsize,
}

/// Render `template` into `root` and keep it in sync with `ctx`.
///
/// Handlers for the template's `v-model` bindings are added to `ctx` first,
/// so they exist before the first update. The first update runs before this
/// returns.
pub fn render_template(
    runtime: &Runtime,
    host: Arc<dyn Host>,
    root: NodeId,
    template: &str,
    ctx: &Context,
    options: CompileOptions,
) -> Renderer {
    let template = html::parse(template);
    register_model_handlers(&template, ctx);

    let inner = Arc::new(RendererInner {
        runtime: runtime.clone(),
        host,
        root,
        template,
        ctx: ctx.clone(),
        compiler: Compiler::new(runtime, options),
        instances: Mutex::new(IndexMap::new()),
        effect: Mutex::new(None),
        renders: AtomicUsize::new(0),
    });

    let weak: Weak<RendererInner> = Arc::downgrade(&inner);
    let effect = Effect::new(runtime, move || {
        if let Some(inner) = weak.upgrade() {
            inner.update();
        }
    });
    *inner.effect.lock() = Some(effect);

    Renderer { inner }
}

/// Add a write-back handler to `ctx` for every `v-model` outside loops.
fn register_model_handlers(nodes: &[Node], ctx: &Context) {
    for node in nodes {
        let Node::Element(el) = node else {
            continue;
        };
        if el.has_attr("v-pre") || el.has_attr("v-for") {
            continue;
        }
        if let Some(attr) = el.attr("v-model") {
            let text = attr.text();
            let source = text.trim();
            let name = model_handler_name(source);
            if !ctx.contains_key(&name) {
                match Expression::parse(source).ok().and_then(|expr| expr.path()) {
                    Some(path) => ctx.insert(name, context_model_handler(ctx, path)),
                    None => {
                        tracing::debug!(source, "v-model needs a property path");
                    }
                }
            }
        }
        register_model_handlers(&el.children, ctx);
    }
}

impl Renderer {
    /// Re-render now, re-tracking dependencies. A no-op after unmount.
    pub fn update(&self) {
        let effect = self.inner.effect.lock().clone();
        if let Some(effect) = effect {
            effect.execute();
        }
    }

    /// Stop updating and unmount every component instance. The last markup
    /// stays in place.
    pub fn unmount(&self) {
        let effect = self.inner.effect.lock().take();
        if let Some(effect) = effect {
            effect.dispose();
        }
        let instances = std::mem::take(&mut *self.inner.instances.lock());
        for instance in instances.into_values() {
            instance.unmount();
        }
        tracing::debug!(root = %self.inner.root, "render loop stopped");
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.effect.lock().is_some()
    }

    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    pub fn context(&self) -> &Context {
        &self.inner.ctx
    }

    /// Current markup of the root node.
    pub fn html(&self) -> String {
        self.inner.host.inner_html(self.inner.root)
    }

    /// Number of completed updates.
    pub fn render_count(&self) -> usize {
        self.inner.renders.load(Ordering::SeqCst)
    }

    /// Live component instances, in expansion order.
    pub fn instances(&self) -> Vec<ComponentInstance> {
        self.inner.instances.lock().values().cloned().collect()
    }

    /// The effect driving updates, until unmount.
    pub fn effect(&self) -> Option<Effect> {
        self.inner.effect.lock().clone()
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("root", &self.inner.root)
            .field("renders", &self.render_count())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

impl RendererInner {
    #[tracing::instrument(level = "debug", skip(self), fields(root = %self.root))]
    fn update(&self) {
        let previous = std::mem::take(&mut *self.instances.lock());
        let output = self.compiler.compile(&self.template, &self.ctx, previous);

        self.host.set_inner_html(self.root, &output.html);
        self.host.set_attribute(self.root, "data-aura-mounted", "1");
        self.assign_refs();
        let listeners = bind_events(
            self.host.as_ref(),
            self.root,
            &self.ctx,
            &output.handlers,
            self.runtime.config(),
        );
        self.clear_cloak();

        for instance in output.dropped {
            self.runtime.next_tick(move || instance.unmount());
        }
        for key in &output.created {
            if let Some(instance) = output.instances.get(key) {
                let lifecycle = instance.lifecycle().clone();
                self.runtime.next_tick(move || lifecycle.run_mounted());
            }
        }
        *self.instances.lock() = output.instances;

        let renders = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(renders, listeners, bytes = output.html.len(), "rendered");
    }

    /// `ref="name"`: a cell entry receives the node, anything else is
    /// replaced by it.
    fn assign_refs(&self) {
        let targets = self
            .host
            .query_all(self.root, &|info: &ElementInfo| info.has_attr("ref"));
        for info in targets {
            let Some(name) = info.attr("ref").filter(|name| !name.is_empty()) else {
                continue;
            };
            match self.ctx.get(name) {
                Some(Value::Ref(cell)) => cell.set(Value::Node(info.id)),
                _ => self.ctx.insert(name, Value::Node(info.id)),
            }
        }
    }

    fn clear_cloak(&self) {
        self.host.remove_attribute(self.root, "v-cloak");
        let cloaked = self
            .host
            .query_all(self.root, &|info: &ElementInfo| info.has_attr("v-cloak"));
        for info in cloaked {
            self.host.remove_attribute(info.id, "v-cloak");
        }
    }
}
