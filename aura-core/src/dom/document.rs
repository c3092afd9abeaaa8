//! In-memory document.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::{DomEvent, ElementInfo, Host, Listener, ListenerId, NodeId};
use crate::escape::{escape_html, unescape_html};
use crate::template::html::{self, Attr, Element, Node};

/// Arena-backed node tree implementing [`Host`].
///
/// Cloning a `Document` clones the handle; both clones see the same tree.
#[derive(Clone)]
pub struct Document {
    inner: Arc<RwLock<Arena>>,
}

enum NodeData {
    Root,
    Element { tag: String, attrs: Vec<Attr> },
    Text(String),
    Comment(String),
}

struct Registered {
    id: ListenerId,
    kind: String,
    listener: Listener,
}

struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<Registered>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    next_listener: u64,
}

impl Arena {
    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn alloc(&mut self, data: NodeData, parent: Option<NodeId>) -> NodeId {
        let slot = Slot {
            data,
            parent,
            children: Vec::new(),
            listeners: Vec::new(),
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(slot));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    fn append(&mut self, parent: NodeId, nodes: Vec<Node>) {
        for node in nodes {
            let (data, children) = match node {
                Node::Element(Element {
                    tag,
                    attrs,
                    children,
                    ..
                }) => (NodeData::Element { tag, attrs }, children),
                Node::Text(text) | Node::Raw(text) => (NodeData::Text(text), Vec::new()),
                Node::Comment(text) => (NodeData::Comment(text), Vec::new()),
            };
            let id = self.alloc(data, Some(parent));
            if let Some(slot) = self.slot_mut(parent) {
                slot.children.push(id);
            }
            if !children.is_empty() {
                self.append(id, children);
            }
        }
    }

    /// Free `id` and everything below it.
    fn release(&mut self, id: NodeId) {
        let Some(slot) = self.slots.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        self.free.push(id.0);
        for child in slot.children {
            self.release(child);
        }
    }

    fn to_html(&self, id: NodeId) -> Option<Node> {
        let slot = self.slot(id)?;
        Some(match &slot.data {
            NodeData::Root => return None,
            NodeData::Text(text) => Node::Text(text.clone()),
            NodeData::Comment(text) => Node::Comment(text.clone()),
            NodeData::Element { tag, attrs } => Node::Element(Element {
                tag: tag.clone(),
                attrs: attrs.clone(),
                children: self.children_html(id),
                self_closing: false,
            }),
        })
    }

    fn children_html(&self, id: NodeId) -> Vec<Node> {
        self.slot(id)
            .map(|slot| {
                slot.children
                    .iter()
                    .filter_map(|child| self.to_html(*child))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn element(&self, id: NodeId) -> Option<(&str, &[Attr])> {
        match &self.slot(id)?.data {
            NodeData::Element { tag, attrs } => Some((tag, attrs)),
            _ => None,
        }
    }

    fn info(&self, id: NodeId) -> Option<ElementInfo> {
        let (tag, attrs) = self.element(id)?;
        Some(ElementInfo {
            id,
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|a| (a.name.clone(), a.text().into_owned()))
                .collect(),
        })
    }

    fn collect_elements(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(slot) = self.slot(id) else {
            return;
        };
        for child in &slot.children {
            if self.element(*child).is_some() {
                out.push(*child);
            }
            self.collect_elements(*child, out);
        }
    }

    fn text_content(&self, id: NodeId, out: &mut String) {
        let Some(slot) = self.slot(id) else {
            return;
        };
        match &slot.data {
            NodeData::Text(text) => out.push_str(&unescape_html(text)),
            NodeData::Comment(_) => {}
            NodeData::Root | NodeData::Element { .. } => {
                for child in &slot.children {
                    self.text_content(*child, out);
                }
            }
        }
    }

    fn listener_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot.listeners.len())
            .sum()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut arena = Arena::default();
        arena.alloc(NodeData::Root, None);
        Self {
            inner: Arc::new(RwLock::new(arena)),
        }
    }

    pub fn parse(markup: &str) -> Self {
        let doc = Self::new();
        doc.inner.write().append(doc.root(), html::parse(markup));
        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.inner.read().slot(node).is_some()
    }

    /// Markup of the whole document.
    pub fn to_html(&self) -> String {
        self.inner_html(self.root())
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let arena = self.inner.read();
        match arena.to_html(node) {
            Some(node) => html::serialize(&[node]),
            None => html::serialize(&arena.children_html(node)),
        }
    }

    /// Decoded text below `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.inner.read().text_content(node, &mut out);
        out
    }

    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.inner.read().element(node).map(|(tag, _)| tag.to_string())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.read().slot(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .read()
            .slot(node)
            .map(|slot| slot.children.clone())
            .unwrap_or_default()
    }

    /// Every element matching `selector`, in document order.
    pub fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
        let Some(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        let arena = self.inner.read();
        let mut elements = Vec::new();
        arena.collect_elements(self.root(), &mut elements);
        elements
            .into_iter()
            .filter(|id| selector.matches(&arena, *id))
            .collect()
    }

    /// Number of live nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.inner.read().slots.iter().flatten().count()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.read().listener_count()
    }

    /// Deliver `event` to its target and then to each ancestor, until a
    /// listener stops propagation. Returns the event after delivery.
    pub fn dispatch(&self, mut event: DomEvent) -> DomEvent {
        // Listeners may rewrite the tree, so the path and the listener list
        // are fixed before any of them runs.
        let path: Vec<(NodeId, SmallVec<[Listener; 2]>)> = {
            let arena = self.inner.read();
            let mut path = Vec::new();
            let mut current = Some(event.target);
            while let Some(id) = current {
                let Some(slot) = arena.slot(id) else {
                    break;
                };
                let listeners = slot
                    .listeners
                    .iter()
                    .filter(|r| r.kind == event.kind)
                    .map(|r| Arc::clone(&r.listener))
                    .collect();
                path.push((id, listeners));
                current = slot.parent;
            }
            path
        };

        for (id, listeners) in path {
            event.current_target = id;
            for listener in listeners {
                listener(&mut event);
            }
            if event.propagation_stopped() {
                break;
            }
        }
        event
    }

    pub fn click(&self, node: NodeId) -> DomEvent {
        self.dispatch(DomEvent::new("click", node))
    }

    /// Set the element's `value` and fire `input`.
    pub fn input(&self, node: NodeId, value: &str) -> DomEvent {
        self.set_attribute(node, "value", value);
        self.dispatch(DomEvent::new("input", node).with_value(value))
    }

    /// Set the element's `value` and fire `change`.
    pub fn change(&self, node: NodeId, value: &str) -> DomEvent {
        self.set_attribute(node, "value", value);
        self.dispatch(DomEvent::new("change", node).with_value(value))
    }

    pub fn key_down(&self, node: NodeId, key: &str) -> DomEvent {
        self.dispatch(DomEvent::new("keydown", node).with_key(key))
    }

    pub fn key_up(&self, node: NodeId, key: &str) -> DomEvent {
        self.dispatch(DomEvent::new("keyup", node).with_key(key))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl Host for Document {
    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.query_selector_all(selector).into_iter().next()
    }

    fn inner_html(&self, node: NodeId) -> String {
        html::serialize(&self.inner.read().children_html(node))
    }

    fn set_inner_html(&self, node: NodeId, markup: &str) {
        let nodes = html::parse(markup);
        let mut arena = self.inner.write();
        let Some(slot) = arena.slot_mut(node) else {
            return;
        };
        let old = std::mem::take(&mut slot.children);
        for child in old {
            arena.release(child);
        }
        arena.append(node, nodes);
    }

    fn descendants(&self, root: NodeId) -> Vec<ElementInfo> {
        let arena = self.inner.read();
        let mut elements = Vec::new();
        arena.collect_elements(root, &mut elements);
        elements
            .into_iter()
            .filter_map(|id| arena.info(id))
            .collect()
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let arena = self.inner.read();
        let (_, attrs) = arena.element(node)?;
        attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.text().into_owned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut arena = self.inner.write();
        if let Some(Slot {
            data: NodeData::Element { attrs, .. },
            ..
        }) = arena.slot_mut(node)
        {
            let value = Some(escape_html(value).into_owned());
            match attrs.iter_mut().find(|a| a.name == name) {
                Some(attr) => attr.value = value,
                None => attrs.push(Attr::new(name, value)),
            }
        }
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut arena = self.inner.write();
        if let Some(Slot {
            data: NodeData::Element { attrs, .. },
            ..
        }) = arena.slot_mut(node)
        {
            attrs.retain(|a| a.name != name);
        }
    }

    fn add_event_listener(&self, node: NodeId, kind: &str, listener: Listener) -> ListenerId {
        let mut arena = self.inner.write();
        let id = ListenerId(arena.next_listener);
        arena.next_listener += 1;
        if let Some(slot) = arena.slot_mut(node) {
            slot.listeners.push(Registered {
                id,
                kind: kind.to_string(),
                listener,
            });
        }
        id
    }

    fn remove_event_listener(&self, node: NodeId, id: ListenerId) {
        if let Some(slot) = self.inner.write().slot_mut(node) {
            slot.listeners.retain(|r| r.id != id);
        }
    }
}

// ----------------------------------------------------------------------------
// Selectors
// ----------------------------------------------------------------------------

/// One compound selector: `tag#id.class[attr=value]`.
#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

/// Compounds joined by the descendant combinator.
#[derive(Debug)]
struct Selector {
    parts: Vec<Compound>,
}

impl Selector {
    fn parse(src: &str) -> Option<Self> {
        let parts = src
            .split_whitespace()
            .map(Compound::parse)
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(Self { parts })
    }

    fn matches(&self, arena: &Arena, id: NodeId) -> bool {
        let Some((last, ancestors)) = self.parts.split_last() else {
            return false;
        };
        if !last.matches(arena, id) {
            return false;
        }

        let mut remaining = ancestors.iter().rev().peekable();
        let mut current = arena.slot(id).and_then(|slot| slot.parent);
        while let Some(part) = remaining.peek() {
            let Some(node) = current else {
                return false;
            };
            if part.matches(arena, node) {
                remaining.next();
            }
            current = arena.slot(node).and_then(|slot| slot.parent);
        }
        true
    }
}

fn is_selector_delim(c: char) -> bool {
    matches!(c, '#' | '.' | '[')
}

impl Compound {
    fn parse(src: &str) -> Option<Self> {
        let mut compound = Compound::default();
        let tag_len = src.find(is_selector_delim).unwrap_or(src.len());
        let tag = &src[..tag_len];
        if !tag.is_empty() && tag != "*" {
            compound.tag = Some(tag.to_string());
        }

        let mut rest = &src[tag_len..];
        while let Some(first) = rest.chars().next() {
            if first == '[' {
                let end = rest.find(']')?;
                let body = &rest[1..end];
                let (name, value) = match body.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                        (name.trim(), Some(value.to_string()))
                    }
                    None => (body.trim(), None),
                };
                compound.attrs.push((name.to_string(), value));
                rest = &rest[end + 1..];
                continue;
            }

            let body = &rest[1..];
            let len = body.find(is_selector_delim).unwrap_or(body.len());
            if len == 0 {
                return None;
            }
            let name = body[..len].to_string();
            if first == '#' {
                compound.id = Some(name);
            } else {
                compound.classes.push(name);
            }
            rest = &body[len..];
        }
        Some(compound)
    }

    fn matches(&self, arena: &Arena, id: NodeId) -> bool {
        let Some((tag, attrs)) = arena.element(id) else {
            return false;
        };
        let attr = |name: &str| attrs.iter().find(|a| a.name == name).map(Attr::text);

        if let Some(want) = &self.tag {
            if !tag.eq_ignore_ascii_case(want) {
                return false;
            }
        }
        if let Some(want) = &self.id {
            if attr("id").as_deref() != Some(want.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class = attr("class").unwrap_or_default();
            let present: Vec<&str> = class.split_whitespace().collect();
            if !self.classes.iter().all(|c| present.contains(&c.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|(name, want)| match (attr(name), want) {
            (Some(_), None) => true,
            (Some(value), Some(want)) => value == want.as_str(),
            (None, _) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn parse_and_serialize() {
        let doc = Document::parse(r#"<div id="app"><p class="a b">Hi &amp; bye</p></div>"#);
        let app = doc.query_selector("#app").unwrap();
        assert_eq!(doc.inner_html(app), r#"<p class="a b">Hi &amp; bye</p>"#);
        assert_eq!(doc.text_content(app), "Hi & bye");
        assert_eq!(doc.tag_name(app).as_deref(), Some("div"));
    }

    #[test]
    fn selectors() {
        let doc = Document::parse(
            r#"<main><ul id="list"><li class="item done" data-id="1">a</li><li class="item">b</li></ul><button>x</button></main>"#,
        );
        assert_eq!(doc.query_selector_all(".item").len(), 2);
        assert_eq!(doc.query_selector_all("li.item.done").len(), 1);
        assert_eq!(doc.query_selector_all("[data-id]").len(), 1);
        assert_eq!(doc.query_selector_all("[data-id='1']").len(), 1);
        assert_eq!(doc.query_selector_all("#list li").len(), 2);
        assert_eq!(doc.query_selector_all("#list button").len(), 0);
        assert_eq!(doc.query_selector_all("main button").len(), 1);
        assert!(doc.query_selector("#missing").is_none());
    }

    #[test]
    fn replacing_content_frees_nodes_and_listeners() {
        let doc = Document::parse(r#"<div id="app"></div>"#);
        let app = doc.query_selector("#app").unwrap();
        doc.set_inner_html(app, "<button>1</button><span>2</span>");
        let button = doc.query_selector("button").unwrap();
        doc.add_event_listener(button, "click", Arc::new(|_: &mut DomEvent| {}));
        let before = doc.node_count();
        assert_eq!(doc.listener_count(), 1);

        doc.set_inner_html(app, "<button>1</button><span>2</span>");
        assert_eq!(doc.node_count(), before);
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn events_bubble_until_stopped() {
        let doc = Document::parse(r#"<div id="outer"><button id="inner">x</button></div>"#);
        let outer = doc.query_selector("#outer").unwrap();
        let inner = doc.query_selector("#inner").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        doc.add_event_listener(
            outer,
            "click",
            Arc::new(move |event: &mut DomEvent| {
                assert_eq!(event.current_target, outer);
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        doc.click(inner);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let stopper = doc.add_event_listener(inner, "click", Arc::new(|event: &mut DomEvent| event.stop_propagation()));
        doc.click(inner);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        doc.remove_event_listener(inner, stopper);
        doc.click(inner);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn input_sets_value_attribute() {
        let doc = Document::parse(r#"<input id="name">"#);
        let input = doc.query_selector("#name").unwrap();
        let event = doc.input(input, "a\"b");
        assert_eq!(event.value.as_deref(), Some("a\"b"));
        assert_eq!(doc.get_attribute(input, "value").as_deref(), Some("a\"b"));
        assert_eq!(doc.to_html(), r#"<input id="name" value="a&quot;b">"#);
    }

    #[test]
    fn listeners_can_rewrite_the_tree() {
        let doc = Document::parse(r#"<div id="app"><button>go</button></div>"#);
        let app = doc.query_selector("#app").unwrap();
        let button = doc.query_selector("button").unwrap();

        let d = doc.clone();
        doc.add_event_listener(
            button,
            "click",
            Arc::new(move |_: &mut DomEvent| d.set_inner_html(app, "<p>done</p>")),
        );
        doc.click(button);
        assert_eq!(doc.inner_html(app), "<p>done</p>");
    }
}
