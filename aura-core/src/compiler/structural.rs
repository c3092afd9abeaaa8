//! Structural directives: `v-pre`, `v-for`, `v-once` and conditional
//! chains.

use std::sync::OnceLock;

use regex::Regex;

use super::{pattern, Compiler, Frame, State};
use crate::escape::escape_html;
use crate::template::html::{self, Element, Node};
use crate::template::Scope;
use crate::value::Value;

/// `item in list`, `(item, i) in list`, `item of list`.
fn loop_header() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(
        &CELL,
        r"^\s*\(?\s*([A-Za-z_$][\w$]*)\s*(?:,\s*([A-Za-z_$][\w$]*)\s*)?\)?\s+(?:in|of)\s+(.+?)\s*$",
    )
}

/// Emit the element as literal markup, minus its `v-pre` marker.
pub(super) fn verbatim(el: &Element) -> Node {
    let mut el = el.clone();
    el.remove_attr("v-pre");
    Node::Raw(html::serialize(&[Node::Element(el)]))
}

pub(super) fn is_else_branch(el: &Element) -> bool {
    el.has_attr("v-else") || el.has_attr("v-else-if")
}

impl Compiler {
    /// `v-once`: compile the element with tracking suspended and freeze the
    /// result as literal markup. Later updates re-evaluate it, but its reads
    /// never schedule one.
    pub(super) fn once(&self, el: Element, frame: &Frame<'_>, state: &mut State) -> Vec<Node> {
        let nodes = self.runtime.untracked(|| self.element(el, frame, state));
        vec![Node::Raw(html::serialize(&nodes))]
    }

    /// Expand a `v-for` element into one copy per entry.
    pub(super) fn repeat(&self, el: &Element, frame: &Frame<'_>, state: &mut State) -> Vec<Node> {
        let mut template = el.clone();
        let header = template
            .remove_attr("v-for")
            .map(|attr| attr.text().into_owned())
            .unwrap_or_default();
        let key = template
            .remove_attr(":key")
            .or_else(|| template.remove_attr("v-bind:key"))
            .map(|attr| attr.text().into_owned());

        let Some(caps) = loop_header().captures(&header) else {
            tracing::debug!(%header, "malformed v-for header");
            return Vec::new();
        };
        let item_name = &caps[1];
        let index_name = caps.get(2).map(|m| m.as_str());

        let items = match self.eval(&caps[3], &frame.scope).unwrap_ref() {
            Value::Array(items) => items,
            other => {
                tracing::debug!(source = &caps[3], value = ?other, "v-for source is not a sequence");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let mut bindings = vec![
                (item_name.to_string(), item),
                ("index".to_string(), Value::from(i)),
            ];
            if let Some(name) = index_name {
                bindings.push((name.to_string(), Value::from(i)));
            }
            let copy_frame = frame.looped(frame.scope.child(bindings));

            let mut copy = template.clone();
            if let Some(key) = &key {
                let value = self.eval(key, &copy_frame.scope);
                let value = if value.is_nullish() { Value::from(i) } else { value };
                copy.set_attr(
                    "data-key",
                    Some(escape_html(&value.to_display_string()).into_owned()),
                );
            }
            out.extend(self.element(copy, &copy_frame, state));
        }
        out
    }

    /// Group the chain starting at `start` and pick its member.
    ///
    /// Returns the chosen member with its directives stripped, and the index
    /// just past the chain. Blank text and comments between members belong
    /// to the chain.
    pub(super) fn if_chain(&self, nodes: &[Node], start: usize, scope: &Scope) -> (Option<Element>, usize) {
        let mut members: Vec<&Element> = Vec::new();
        if let Some(Node::Element(first)) = nodes.get(start) {
            members.push(first);
        }

        let mut end = start + 1;
        let mut i = end;
        while let Some(node) = nodes.get(i) {
            match node {
                node if node.is_blank() => i += 1,
                Node::Element(el) if is_else_branch(el) => {
                    members.push(el);
                    i += 1;
                    end = i;
                    if !el.has_attr("v-else-if") {
                        break;
                    }
                }
                _ => break,
            }
        }

        let chosen = members.into_iter().find(|member| {
            let condition = member.attr("v-if").or_else(|| member.attr("v-else-if"));
            match condition {
                Some(cond) => self.eval(&cond.text(), scope).is_truthy(),
                None => true,
            }
        });

        let chosen = chosen.map(|member| {
            let mut member = member.clone();
            member.remove_attr("v-if");
            member.remove_attr("v-else-if");
            member.remove_attr("v-else");
            member
        });
        (chosen, end)
    }
}
