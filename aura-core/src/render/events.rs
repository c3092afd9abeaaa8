//! Event Binder
//!
//! After every render the binder walks the fresh elements and attaches one
//! listener per supported event name. `@click.stop.prevent="save"` reads as
//! event `click`, modifiers `stop` and `prevent`, handler `save`.

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::compiler::parse_shorthand;
use crate::config::Config;
use crate::context::Context;
use crate::dom::{DomEvent, ElementInfo, Host, Listener, NodeId};
use crate::reactive::Ref;
use crate::value::{Function, Value};

/// Key modifiers and the `key` values they accept.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("enter", "Enter"),
    ("tab", "Tab"),
    ("esc", "Escape"),
    ("space", " "),
];

/// Modifiers of one event attribute.
#[derive(Debug, Default, Clone, PartialEq)]
struct Modifiers {
    /// Only when the element itself is the target.
    self_only: bool,
    prevent: bool,
    stop: bool,
    /// Required `key` of keyboard events.
    key: Option<&'static str>,
}

impl Modifiers {
    fn parse<'a>(parts: impl Iterator<Item = &'a str>) -> Self {
        let mut mods = Modifiers::default();
        for part in parts {
            match part {
                "self" => mods.self_only = true,
                "prevent" => mods.prevent = true,
                "stop" => mods.stop = true,
                other => {
                    if let Some((_, key)) = KEY_ALIASES.iter().find(|(alias, _)| *alias == other) {
                        mods.key.get_or_insert(*key);
                    }
                }
            }
        }
        mods
    }

    /// Whether the event passes the guards.
    fn accepts(&self, event: &DomEvent, node: NodeId) -> bool {
        if self.self_only && event.target != node {
            return false;
        }
        match self.key {
            Some(key) => event.key.as_deref() == Some(key),
            None => true,
        }
    }

    fn apply(&self, event: &mut DomEvent) {
        if self.prevent {
            event.prevent_default();
        }
        if self.stop {
            event.stop_propagation();
        }
    }
}

/// What a listener invokes.
#[derive(Clone)]
enum Handler {
    Function(Function),
    /// `count++` / `count--`.
    Step { cell: Ref, delta: f64 },
}

impl Handler {
    fn invoke(&self, event: &DomEvent) {
        match self {
            Handler::Function(f) => {
                f.call(&[event.to_value()]);
            }
            Handler::Step { cell, delta } => {
                if cell.get_untracked().is_undefined() {
                    return;
                }
                let delta = *delta;
                cell.update(|value| *value = Value::from(value.to_number() + delta));
            }
        }
    }
}

/// Resolve a handler expression against the context, then the compiler's
/// handler table.
fn resolve(source: &str, ctx: &Context, handlers: &IndexMap<String, Value>) -> Option<Handler> {
    let source = source.trim();
    let lookup = |name: &str| ctx.get(name).or_else(|| handlers.get(name).cloned());

    if let Some(Value::Function(f)) = lookup(source) {
        return Some(Handler::Function(f));
    }
    let (name, delta) = parse_shorthand(source)?;
    match lookup(name)? {
        Value::Ref(cell) => Some(Handler::Step { cell, delta }),
        _ => None,
    }
}

/// First attribute of `info` for event `kind`: `@kind` or `@kind.mods`.
fn event_attr<'i>(info: &'i ElementInfo, kind: &str) -> Option<(&'i str, &'i str)> {
    info.attrs.iter().find_map(|(name, value)| {
        let rest = name.strip_prefix('@')?.strip_prefix(kind)?;
        (rest.is_empty() || rest.starts_with('.')).then_some((rest, value.as_str()))
    })
}

/// Attach listeners for every configured event attribute below `root`.
/// Returns how many listeners were attached.
pub fn bind_events(
    host: &dyn Host,
    root: NodeId,
    ctx: &Context,
    handlers: &IndexMap<String, Value>,
    config: &Config,
) -> usize {
    let elements = host.query_all(root, &|info: &ElementInfo| {
        info.attrs.iter().any(|(name, _)| name.starts_with('@'))
    });
    let mut bound = 0;

    for kind in &config.event_names {
        for info in &elements {
            let Some((suffix, source)) = event_attr(info, kind) else {
                continue;
            };
            let Some(handler) = resolve(source, ctx, handlers) else {
                if config.warn_unresolved_handlers {
                    tracing::warn!(event = %kind, handler = source, "event handler does not resolve");
                }
                continue;
            };

            let parts: SmallVec<[&str; 4]> = suffix.split('.').filter(|p| !p.is_empty()).collect();
            let mods = Modifiers::parse(parts.into_iter());
            let node = info.id;
            let listener: Listener = Arc::new(move |event: &mut DomEvent| {
                if !mods.accepts(event, node) {
                    return;
                }
                mods.apply(event);
                handler.invoke(event);
            });
            host.add_event_listener(node, kind, listener);
            bound += 1;
        }
    }
    bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::reactive::Runtime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_fn(hits: &Arc<AtomicUsize>) -> Value {
        let hits = hits.clone();
        Value::Function(Function::handler(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn first(doc: &Document, selector: &str) -> NodeId {
        doc.query_selector_all(selector)[0]
    }

    #[test]
    fn modifier_parsing() {
        let mods = Modifiers::parse(["stop", "enter", "prevent", "bogus"].into_iter());
        assert_eq!(
            mods,
            Modifiers {
                self_only: false,
                prevent: true,
                stop: true,
                key: Some("Enter"),
            }
        );
    }

    #[test]
    fn binds_named_function() {
        let doc = Document::parse(r#"<div id="app"><button @click="save">s</button></div>"#);
        let hits = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new().with("save", counter_fn(&hits));
        let root = first(&doc, "#app");

        let bound = bind_events(&doc, root, &ctx, &IndexMap::new(), &Config::default());
        assert_eq!(bound, 1);
        doc.click(first(&doc, "button"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_table_is_consulted_after_context() {
        let doc = Document::parse(r#"<div id="app"><button @click="__c0_inc">s</button></div>"#);
        let hits = Arc::new(AtomicUsize::new(0));
        let handlers = IndexMap::from([("__c0_inc".to_string(), counter_fn(&hits))]);
        let root = first(&doc, "#app");

        bind_events(&doc, root, &Context::new(), &handlers, &Config::default());
        doc.click(first(&doc, "button"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shorthand_steps_a_cell() {
        let rt = Runtime::new();
        let count = Ref::new(&rt, 1);
        let ctx = Context::new().with("count", count.clone());
        let doc = Document::parse(
            r#"<div id="app"><button id="up" @click="count++">+</button><button id="down" @click="count--">-</button></div>"#,
        );
        let root = first(&doc, "#app");

        bind_events(&doc, root, &ctx, &IndexMap::new(), &Config::default());
        doc.click(first(&doc, "#up"));
        doc.click(first(&doc, "#up"));
        doc.click(first(&doc, "#down"));
        assert_eq!(count.get(), Value::from(2));
    }

    #[test]
    fn unresolved_handlers_bind_nothing() {
        let doc = Document::parse(r#"<div id="app"><button @click="nope">x</button><i @click="a + b">y</i></div>"#);
        let root = first(&doc, "#app");
        let ctx = Context::new().with("a", 1);
        assert_eq!(bind_events(&doc, root, &ctx, &IndexMap::new(), &Config::default()), 0);
    }

    #[test]
    fn self_modifier_ignores_bubbled_events() {
        let doc = Document::parse(r#"<div id="app"><div id="outer" @click.self="hit"><span>in</span></div></div>"#);
        let hits = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new().with("hit", counter_fn(&hits));
        bind_events(&doc, first(&doc, "#app"), &ctx, &IndexMap::new(), &Config::default());

        doc.click(first(&doc, "span"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        doc.click(first(&doc, "#outer"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn key_modifier_filters_keys() {
        let doc = Document::parse(r#"<div id="app"><input @keyup.enter="submit"></div>"#);
        let hits = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new().with("submit", counter_fn(&hits));
        bind_events(&doc, first(&doc, "#app"), &ctx, &IndexMap::new(), &Config::default());

        let input = first(&doc, "input");
        doc.key_up(input, "a");
        doc.key_up(input, "Enter");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_and_prevent_apply_before_the_handler() {
        let doc = Document::parse(
            r#"<div id="app"><div id="outer" @click="outer"><a @click.stop.prevent="inner">x</a></div></div>"#,
        );
        let outer = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(AtomicUsize::new(0));
        let ctx = Context::new()
            .with("outer", counter_fn(&outer))
            .with("inner", counter_fn(&inner));
        bind_events(&doc, first(&doc, "#app"), &ctx, &IndexMap::new(), &Config::default());

        let event = doc.click(first(&doc, "a"));
        assert!(event.default_prevented());
        assert_eq!(inner.load(Ordering::SeqCst), 1);
        assert_eq!(outer.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn only_configured_events_bind() {
        let doc = Document::parse(r#"<div id="app"><p @dblclick="x" @clickish="x">p</p></div>"#);
        let ctx = Context::new().with("x", Value::Function(Function::handler(|| {})));
        assert_eq!(bind_events(&doc, first(&doc, "#app"), &ctx, &IndexMap::new(), &Config::default()), 0);
    }

    #[test]
    fn handler_receives_the_event() {
        let doc = Document::parse(r#"<div id="app"><input @input="onInput"></div>"#);
        let seen = Arc::new(parking_lot::Mutex::new(Value::Undefined));
        let s = seen.clone();
        let ctx = Context::new().with(
            "onInput",
            Function::new(move |args| {
                *s.lock() = args.first().and_then(|e| e.member("value")).unwrap_or_default();
                Value::Undefined
            }),
        );
        bind_events(&doc, first(&doc, "#app"), &ctx, &IndexMap::new(), &Config::default());
        doc.input(first(&doc, "input"), "typed");
        assert_eq!(*seen.lock(), Value::from("typed"));
    }
}
