//! Mutation Target
//!
//! The renderer never diffs. It writes whole markup strings into a host node
//! and then walks the resulting elements to attach listeners, assign template
//! refs and clear markers. [`Host`] is that contract. [`Document`] is an
//! in-memory implementation with event bubbling, used by the tests and by
//! anything that renders outside a browser.

mod document;

use std::fmt;
use std::sync::Arc;

pub use document::Document;

use crate::value::{Object, Value};

/// Handle to a node inside a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one registered listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// An event travelling from its target up through the ancestors.
#[derive(Debug, Clone)]
pub struct DomEvent {
    pub kind: String,
    pub target: NodeId,
    /// The node whose listener is currently running.
    pub current_target: NodeId,
    /// Key name for keyboard events (`Enter`, `Escape`, `a`, ...).
    pub key: Option<String>,
    /// Current value of the target for input events.
    pub value: Option<String>,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl DomEvent {
    pub fn new(kind: impl Into<String>, target: NodeId) -> Self {
        Self {
            kind: kind.into(),
            target,
            current_target: target,
            key: None,
            value: None,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// The event as a template value: `{ type, key, value, target }`.
    pub fn to_value(&self) -> Value {
        let mut map = Object::new();
        map.insert("type".to_string(), Value::from(self.kind.as_str()));
        map.insert("key".to_string(), Value::from(self.key.clone()));
        map.insert("value".to_string(), Value::from(self.value.clone()));
        map.insert("target".to_string(), Value::Node(self.target));
        Value::Object(map)
    }
}

pub type Listener = Arc<dyn Fn(&mut DomEvent) + Send + Sync>;

/// Snapshot of one element, as seen by a descendant query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    pub id: NodeId,
    pub tag: String,
    /// Attribute names and decoded values. Bare attributes read as `""`.
    pub attrs: Vec<(String, String)>,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }
}

/// The node tree a mounted app renders into.
pub trait Host: Send + Sync {
    /// First element anywhere in the host matching `selector`.
    fn query_selector(&self, selector: &str) -> Option<NodeId>;

    fn inner_html(&self, node: NodeId) -> String;

    /// Replace every child of `node` with the parsed `html`. Listeners on the
    /// replaced nodes are dropped.
    fn set_inner_html(&self, node: NodeId, html: &str);

    /// Every element below `root` in document order, `root` excluded.
    fn descendants(&self, root: NodeId) -> Vec<ElementInfo>;

    /// Descendants of `root` accepted by `predicate`.
    fn query_all(&self, root: NodeId, predicate: &dyn Fn(&ElementInfo) -> bool) -> Vec<ElementInfo> {
        self.descendants(root)
            .into_iter()
            .filter(|info| predicate(info))
            .collect()
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&self, node: NodeId, name: &str);

    fn add_event_listener(&self, node: NodeId, kind: &str, listener: Listener) -> ListenerId;

    fn remove_event_listener(&self, node: NodeId, id: ListenerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_value_exposes_fields() {
        let event = DomEvent::new("keydown", NodeId(3)).with_key("Enter");
        let value = event.to_value();
        assert_eq!(value.member("type"), Some(Value::from("keydown")));
        assert_eq!(value.member("key"), Some(Value::from("Enter")));
        assert_eq!(value.member("value"), Some(Value::Null));
        assert_eq!(value.member("target"), Some(Value::Node(NodeId(3))));
    }

    #[test]
    fn element_info_lookup() {
        let info = ElementInfo {
            id: NodeId(1),
            tag: "button".to_string(),
            attrs: vec![("@click.stop".to_string(), "save".to_string())],
        };
        assert_eq!(info.attr("@click.stop"), Some("save"));
        assert!(!info.has_attr("@click"));
    }
}
