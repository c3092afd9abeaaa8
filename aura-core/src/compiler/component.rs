//! Component expansion and slot substitution.

use std::sync::Arc;

use super::{Compiler, Frame, Locals, State, MAX_COMPONENT_DEPTH};
use crate::app::{ComponentDef, ComponentInstance, InstanceKey};
use crate::context::Context;
use crate::escape::to_pascal;
use crate::template::html::{self, Element, Node};
use crate::template::Scope;
use crate::value::{Object, Value};

/// Tag of the inert wrapper around every expanded component.
const WRAPPER_TAG: &str = "aura-c";

impl Compiler {
    /// Find the registered component a tag refers to. `my-card` and `MyCard`
    /// both name a component registered as either.
    pub(super) fn resolve_component(&self, tag: &str) -> Option<(&str, &ComponentDef)> {
        let components = &self.options.components;
        if components.is_empty() {
            return None;
        }
        let pascal = to_pascal(tag);
        components
            .iter()
            .find(|(name, _)| name.as_str() == tag || to_pascal(name) == pascal)
            .map(|(name, def)| (name.as_str(), def))
    }

    /// Replace a component usage with the component's compiled template.
    pub(super) fn expand(
        &self,
        el: Element,
        name: &str,
        def: &ComponentDef,
        frame: &Frame<'_>,
        state: &mut State,
    ) -> Node {
        if frame.depth >= MAX_COMPONENT_DEPTH {
            tracing::warn!(component = name, depth = frame.depth, "component nesting too deep, not expanded");
            return Node::Text(String::new());
        }

        let cid = state.next_cid;
        state.next_cid += 1;
        let key: InstanceKey = (cid, name.to_string());

        // Caller content belongs to the caller, so it is compiled there.
        let slot = if el.children.iter().all(Node::is_blank) {
            Vec::new()
        } else {
            let content = self.nodes(&el.children, frame, state);
            vec![Node::Raw(html::serialize(&content))]
        };

        let props = self.props(&el, &frame.scope);
        let instance = match state.previous.shift_remove(&key) {
            Some(instance) => {
                instance.update_props(&props);
                instance
            }
            None => {
                let instance = ComponentInstance::create(
                    &self.runtime,
                    def,
                    name,
                    cid,
                    props.clone(),
                    &self.options.provides,
                );
                state.created.push(key.clone());
                instance
            }
        };

        let setup = instance.state().entries();
        let ctx = Context::from(frame.ctx.entries());
        ctx.extend(&props);
        ctx.extend(&setup);

        let prefix = format!("__c{cid}_");
        let mut locals = Locals::default();
        for (local, value) in &setup {
            match value {
                Value::Function(_) => locals.functions.insert(local.clone()),
                Value::Ref(_) => locals.cells.insert(local.clone()),
                _ => continue,
            };
            state.handlers.insert(format!("{prefix}{local}"), value.clone());
        }

        let template = self.component_template(name, def);
        let child = Frame {
            scope: Scope::from_context(&ctx),
            ctx: &ctx,
            prefix: &prefix,
            locals: &locals,
            slot: Some(slot.as_slice()),
            in_loop: false,
            depth: frame.depth + 1,
        };
        let children = self.nodes(&template, &child, state);
        tracing::debug!(component = name, cid, "component expanded");
        state.instances.insert(key, instance);

        let mut wrapper = Element::new(WRAPPER_TAG);
        wrapper.set_attr("data-aura-cid", Some(cid.to_string()));
        wrapper.children = children;
        Node::Element(wrapper)
    }

    /// `<slot>` inside a component: the caller's content, or the slot's own
    /// children when the caller passed nothing.
    pub(super) fn fill_slot(&self, el: Element, slot: &[Node], frame: &Frame<'_>, state: &mut State) -> Vec<Node> {
        if slot.is_empty() {
            self.nodes(&el.children, frame, state)
        } else {
            slot.to_vec()
        }
    }

    /// Props from a usage site. `:x` is evaluated in the caller's scope and
    /// skipped when undefined; a bare attribute is `true`.
    fn props(&self, el: &Element, scope: &Scope) -> Object {
        let mut props = Object::new();
        for attr in &el.attrs {
            let name = attr.name.as_str();
            if name.starts_with("v-") || name.starts_with('@') || name == "ref" || name == ":key" {
                continue;
            }
            match name.strip_prefix(':') {
                Some(bound) => {
                    let value = self.eval(&attr.text(), scope);
                    if !value.is_undefined() {
                        props.insert(bound.to_string(), value);
                    }
                }
                None => {
                    let value = match &attr.value {
                        Some(_) => Value::from(attr.text().into_owned()),
                        None => Value::Bool(true),
                    };
                    props.insert(name.to_string(), value);
                }
            }
        }
        props
    }

    fn component_template(&self, name: &str, def: &ComponentDef) -> Arc<Vec<Node>> {
        self.templates
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(html::parse(def.template())))
            .clone()
    }
}
