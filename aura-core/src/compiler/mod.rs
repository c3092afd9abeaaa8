//! Directive Compiler
//!
//! Turns a parsed template plus a live [`Context`] into final markup. The
//! directive passes run in a fixed order on every element:
//!
//! 1. `v-pre` fences the element off; it is emitted verbatim.
//! 2. `v-for` repeats the element once per entry of a sequence.
//! 3. `v-once` compiles its subtree untracked and freezes the markup.
//! 4. `v-if` / `v-else-if` / `v-else` chains keep at most one member.
//! 5. Registered components are expanded with their own context.
//! 6. `v-model` is lowered into a value binding plus an input handler.
//! 7. `:attr`, `:class` and `:style` bindings are evaluated.
//! 8. `v-show` hides the element with an inline style.
//! 9. `{{ }}` interpolation and `v-html` fill in content.
//!
//! The passes are tree transforms; markup is produced once at the end.
//!
//! # Failure model
//!
//! Compilation never fails. Expressions that do not parse or evaluate count
//! as `undefined`, loops over non-sequences render nothing, and malformed
//! markup was already degraded to text by the parser.

mod binding;
mod component;
mod interpolate;
mod structural;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;

pub(crate) use binding::{context_model_handler, model_handler_name, parse_shorthand};

use crate::app::{ComponentDef, ComponentInstance, InstanceKey, Provides};
use crate::context::Context;
use crate::reactive::Runtime;
use crate::template::html::{self, Element, Node};
use crate::template::{ExprCache, Scope};
use crate::value::Value;

/// Components nested deeper than this are not expanded.
const MAX_COMPONENT_DEPTH: usize = 64;

/// What templates can refer to beyond their own context.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub components: IndexMap<String, ComponentDef>,
    pub provides: Provides,
}

/// Result of one compilation.
#[derive(Debug, Default)]
pub struct Output {
    pub html: String,
    /// Handlers that live outside the root context: component functions and
    /// cells under their instance prefix, and generated `v-model` handlers.
    pub handlers: IndexMap<String, Value>,
    /// Every component instance in the output, keyed by position.
    pub instances: IndexMap<InstanceKey, ComponentInstance>,
    /// Instances whose setup ran during this compilation.
    pub created: Vec<InstanceKey>,
    /// Instances from the previous compilation with no counterpart now.
    pub dropped: Vec<ComponentInstance>,
}

/// Names a component's setup returned, used to scope its event handlers.
#[derive(Debug, Default)]
struct Locals {
    functions: HashSet<String>,
    cells: HashSet<String>,
}

/// Where compilation currently stands: which names are visible and which
/// component the markup belongs to.
struct Frame<'a> {
    scope: Scope,
    ctx: &'a Context,
    /// `__c{cid}_` inside a component, empty at the root.
    prefix: &'a str,
    locals: &'a Locals,
    /// Caller content for `<slot>`, inside a component.
    slot: Option<&'a [Node]>,
    /// Loop copies are not two-way bindable.
    in_loop: bool,
    depth: usize,
}

impl<'a> Frame<'a> {
    fn looped(&self, scope: Scope) -> Frame<'a> {
        Frame {
            scope,
            ctx: self.ctx,
            prefix: self.prefix,
            locals: self.locals,
            slot: self.slot,
            in_loop: true,
            depth: self.depth,
        }
    }
}

/// Mutable bookkeeping for one compilation.
#[derive(Default)]
struct State {
    previous: IndexMap<InstanceKey, ComponentInstance>,
    instances: IndexMap<InstanceKey, ComponentInstance>,
    created: Vec<InstanceKey>,
    handlers: IndexMap<String, Value>,
    next_cid: usize,
}

/// Compiles templates for one app. Parsed expressions and component
/// templates are cached across compilations.
pub struct Compiler {
    runtime: Runtime,
    options: CompileOptions,
    exprs: ExprCache,
    templates: Mutex<HashMap<String, Arc<Vec<Node>>>>,
}

impl Compiler {
    pub fn new(runtime: &Runtime, options: CompileOptions) -> Self {
        Self {
            runtime: runtime.clone(),
            options,
            exprs: ExprCache::new(),
            templates: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `template` against `ctx`.
    ///
    /// Component instances from `previous` are reused where the same
    /// component appears at the same position; the rest are reported in
    /// [`Output::dropped`]. Reads of reactive values are tracked by the
    /// running effect, if any.
    #[tracing::instrument(level = "debug", skip_all, fields(previous = previous.len()))]
    pub fn compile(
        &self,
        template: &[Node],
        ctx: &Context,
        previous: IndexMap<InstanceKey, ComponentInstance>,
    ) -> Output {
        let mut state = State {
            previous,
            ..State::default()
        };
        let locals = Locals::default();
        let frame = Frame {
            scope: Scope::from_context(ctx),
            ctx,
            prefix: "",
            locals: &locals,
            slot: None,
            in_loop: false,
            depth: 0,
        };

        let nodes = self.nodes(template, &frame, &mut state);
        let html = html::serialize(&nodes);
        tracing::debug!(
            bytes = html.len(),
            instances = state.instances.len(),
            "template compiled"
        );

        Output {
            html,
            handlers: state.handlers,
            instances: state.instances,
            created: state.created,
            dropped: state.previous.into_values().collect(),
        }
    }

    /// Parse and compile markup with no previous instances.
    pub fn compile_str(&self, template: &str, ctx: &Context) -> Output {
        self.compile(&html::parse(template), ctx, IndexMap::new())
    }

    fn eval(&self, source: &str, scope: &Scope) -> Value {
        self.exprs.evaluate(source, scope)
    }

    /// Compile a list of sibling nodes.
    fn nodes(&self, nodes: &[Node], frame: &Frame<'_>, state: &mut State) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        let mut i = 0;
        while i < nodes.len() {
            match &nodes[i] {
                Node::Text(text) => out.push(Node::Text(self.interpolate(text, &frame.scope))),
                Node::Comment(_) | Node::Raw(_) => out.push(nodes[i].clone()),
                Node::Element(el) if el.has_attr("v-pre") => out.push(structural::verbatim(el)),
                Node::Element(el) if el.has_attr("v-for") => {
                    out.extend(self.repeat(el, frame, state));
                }
                Node::Element(el) if el.has_attr("v-if") => {
                    let (chosen, next) = self.if_chain(nodes, i, &frame.scope);
                    if let Some(chosen) = chosen {
                        out.extend(self.nodes(&[Node::Element(chosen)], frame, state));
                    }
                    i = next;
                    continue;
                }
                Node::Element(el) if structural::is_else_branch(el) => {
                    tracing::debug!(tag = %el.tag, "else branch without a preceding v-if dropped");
                }
                Node::Element(el) => out.extend(self.element(el.clone(), frame, state)),
            }
            i += 1;
        }
        out
    }

    /// Passes 3 and 5 to 9 for one element.
    fn element(&self, mut el: Element, frame: &Frame<'_>, state: &mut State) -> Vec<Node> {
        normalize_directives(&mut el);

        // A loop copy carrying its own condition
        if let Some(cond) = el.remove_attr("v-if") {
            if !self.eval(&cond.text(), &frame.scope).is_truthy() {
                return Vec::new();
            }
        }
        if el.remove_attr("v-once").is_some() {
            return self.once(el, frame, state);
        }

        if let Some((name, def)) = self.resolve_component(&el.tag) {
            return vec![self.expand(el, name, def, frame, state)];
        }
        if let Some(slot) = frame.slot {
            if el.tag.eq_ignore_ascii_case("slot") {
                return self.fill_slot(el, slot, frame, state);
            }
        }

        self.bind_attributes(&mut el, frame, state);

        match el.remove_attr("v-html") {
            Some(attr) => el.children = vec![self.raw_html(&attr, &frame.scope)],
            None => el.children = self.nodes(&el.children, frame, state),
        }
        vec![Node::Element(el)]
    }
}

/// `v-bind:x` → `:x`, `v-on:x` → `@x`.
fn normalize_directives(el: &mut Element) {
    for attr in &mut el.attrs {
        if let Some(rest) = attr.name.strip_prefix("v-bind:") {
            attr.name = format!(":{rest}");
        } else if let Some(rest) = attr.name.strip_prefix("v-on:") {
            attr.name = format!("@{rest}");
        }
    }
}

fn pattern(cell: &'static OnceLock<Regex>, src: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(src).expect("static pattern is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Reactive, Ref};
    use crate::value::Function;
    use serde_json::json;

    fn compile(template: &str, ctx: &Context) -> String {
        let rt = Runtime::new();
        Compiler::new(&rt, CompileOptions::default())
            .compile_str(template, ctx)
            .html
    }

    fn data(json: serde_json::Value) -> Context {
        match Value::from(json) {
            Value::Object(map) => Context::from(map),
            _ => Context::new(),
        }
    }

    #[test]
    fn passes_plain_markup_through() {
        let src = r#"<div class="a"><p>Hello</p><br><!-- note --></div>"#;
        assert_eq!(compile(src, &Context::new()), src);
    }

    #[test]
    fn interpolates_and_escapes() {
        let ctx = data(json!({ "name": "<b>", "missing": null }));
        assert_eq!(
            compile("<p>{{ name }}|{{ missing }}|{{ nope.deep }}</p>", &ctx),
            "<p>&lt;b&gt;||</p>"
        );
    }

    #[test]
    fn reads_cells_through_context() {
        let rt = Runtime::new();
        let count = Ref::new(&rt, 2);
        let state = Reactive::new(&rt, [("label", "n")]);
        let ctx = Context::new().with("count", count).with("state", state);
        let compiler = Compiler::new(&rt, CompileOptions::default());
        assert_eq!(
            compiler.compile_str("<p>{{ state.label }}={{ count * 2 }}</p>", &ctx).html,
            "<p>n=4</p>"
        );
    }

    #[test]
    fn v_pre_is_left_alone() {
        let ctx = data(json!({ "x": 1 }));
        assert_eq!(
            compile(r#"<div v-pre><span :title="x">{{ x }}</span></div><p>{{ x }}</p>"#, &ctx),
            r#"<div><span :title="x">{{ x }}</span></div><p>1</p>"#
        );
    }

    #[test]
    fn v_directive_aliases_are_normalized() {
        let ctx = data(json!({ "t": "hi" }))
            .with("go", Function::handler(|| {}));
        assert_eq!(
            compile(r#"<a v-bind:title="t" v-on:click="go">x</a>"#, &ctx),
            r#"<a title="hi" @click="go">x</a>"#
        );
    }

    #[test]
    fn compiling_twice_is_stable() {
        let ctx = data(json!({ "items": [1, 2], "on": true }));
        let src = r#"<ul><li v-for="n in items" :class="{ on }">{{ n }}</li></ul>"#;
        let rt = Runtime::new();
        let compiler = Compiler::new(&rt, CompileOptions::default());
        let first = compiler.compile_str(src, &ctx).html;
        let second = compiler.compile_str(src, &ctx).html;
        assert_eq!(first, second);
        assert_eq!(first, r#"<ul><li class="on">1</li><li class="on">2</li></ul>"#);
    }
}
