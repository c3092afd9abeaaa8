//! Attribute passes: `v-model` lowering, `:attr` / `:class` / `:style`
//! bindings, `v-show`, and handler scoping inside components.

use std::sync::OnceLock;

use indexmap::IndexSet;
use regex::Regex;

use super::{pattern, Compiler, Frame, State};
use crate::context::Context;
use crate::escape::{escape_html, to_kebab};
use crate::template::html::{Attr, Element};
use crate::template::Expression;
use crate::value::{Function, Value};

fn shorthand() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^\s*([A-Za-z_$][\w$]*)(\+\+|--)\s*$")
}

/// `count++` → `("count", 1.0)`, `count--` → `("count", -1.0)`.
pub(crate) fn parse_shorthand(src: &str) -> Option<(&str, f64)> {
    let caps = shorthand().captures(src)?;
    let delta = if &caps[2] == "++" { 1.0 } else { -1.0 };
    Some((caps.get(1)?.as_str(), delta))
}

/// Context name of the handler generated for `v-model="form.name"`.
pub(crate) fn model_handler_name(source: &str) -> String {
    let flat: String = source
        .trim()
        .chars()
        .map(|c| if c == '.' || c.is_whitespace() { '_' } else { c })
        .collect();
    format!("__vmodel_{flat}")
}

/// Handler writing an input value back along `path` in `ctx`.
///
/// Accepts either the new value as a string or an event object carrying it
/// in `value`.
pub(crate) fn model_handler(ctx: Context, path: Vec<String>) -> Value {
    write_back(move || Some(ctx.clone()), path)
}

/// Like [`model_handler`], for a handler stored inside `ctx` itself.
pub(crate) fn context_model_handler(ctx: &Context, path: Vec<String>) -> Value {
    let ctx = ctx.downgrade();
    write_back(move || ctx.upgrade(), path)
}

fn write_back<F>(target: F, path: Vec<String>) -> Value
where
    F: Fn() -> Option<Context> + Send + Sync + 'static,
{
    Value::Function(Function::new(move |args| {
        let value = match args.first() {
            Some(Value::String(text)) => Value::String(text.clone()),
            Some(event) => event.member("value").unwrap_or_default(),
            None => Value::Undefined,
        };
        if value.is_nullish() {
            return Value::Undefined;
        }
        let Some(ctx) = target() else {
            return Value::Undefined;
        };
        if !ctx.assign_path(&path, value) {
            tracing::debug!(path = %path.join("."), "two-way binding target is not writable");
        }
        Value::Undefined
    }))
}

/// Attributes under construction. Removed entries leave a hole so reserved
/// positions stay valid.
type Slots = Vec<Option<Attr>>;

fn upsert(out: &mut Slots, name: &str, value: Option<String>) {
    match out.iter_mut().flatten().find(|attr| attr.name == name) {
        Some(attr) => attr.value = value,
        None => out.push(Some(Attr::new(name, value))),
    }
}

fn remove(out: &mut Slots, name: &str) {
    for slot in out.iter_mut() {
        if slot.as_ref().is_some_and(|attr| attr.name == name) {
            *slot = None;
        }
    }
}

/// Keep a position for a merged attribute at its first occurrence.
fn reserve(out: &mut Slots, position: &mut Option<usize>, name: &str) {
    if position.is_none() {
        out.push(Some(Attr::new(name, None)));
        *position = Some(out.len() - 1);
    }
}

fn fill(out: &mut Slots, position: Option<usize>, name: &str, value: Option<String>) {
    if let Some(index) = position {
        out[index] = value.map(|value| Attr::new(name, Some(value)));
    }
}

impl Compiler {
    /// Evaluate and lower every attribute of `el` in place.
    pub(super) fn bind_attributes(&self, el: &mut Element, frame: &Frame<'_>, state: &mut State) {
        let mut out: Slots = Vec::with_capacity(el.attrs.len());
        let mut class_at = None;
        let mut classes = IndexSet::new();
        let mut style_at = None;
        let mut declarations = Vec::new();
        let mut hidden = false;

        for attr in std::mem::take(&mut el.attrs) {
            let name = attr.name.clone();
            match name.as_str() {
                "class" => {
                    reserve(&mut out, &mut class_at, "class");
                    classes.extend(attr.text().split_whitespace().map(String::from));
                }
                ":class" => {
                    reserve(&mut out, &mut class_at, "class");
                    class_names(&self.eval(&attr.text(), &frame.scope), &mut classes);
                }
                "style" => {
                    reserve(&mut out, &mut style_at, "style");
                    declarations.extend(
                        attr.text()
                            .split(';')
                            .map(str::trim)
                            .filter(|decl| !decl.is_empty())
                            .map(String::from),
                    );
                }
                ":style" => {
                    reserve(&mut out, &mut style_at, "style");
                    style_declarations(&self.eval(&attr.text(), &frame.scope), &mut declarations);
                }
                "v-show" => hidden |= !self.eval(&attr.text(), &frame.scope).unwrap_ref().is_truthy(),
                ":key" => {}
                "v-model" => self.lower_model(&attr, frame, state, &mut out),
                event if event.starts_with('@') => out.push(Some(self.event_attr(attr, frame))),
                bound if bound.len() > 1 && bound.starts_with(':') => {
                    self.bind_value(&bound[1..], &attr.text(), frame, &mut out);
                }
                _ => {
                    let value = match &attr.value {
                        Some(text) if text.contains("{{") => Some(self.interpolate(text, &frame.scope)),
                        other => other.clone(),
                    };
                    upsert(&mut out, &attr.name, value);
                }
            }
        }

        if hidden {
            reserve(&mut out, &mut style_at, "style");
            declarations.push("display:none".to_string());
        }

        let class_value = (!classes.is_empty()).then(|| {
            let joined = classes.into_iter().collect::<Vec<_>>().join(" ");
            escape_html(&joined).into_owned()
        });
        let style_value =
            (!declarations.is_empty()).then(|| escape_html(&declarations.join(";")).into_owned());
        fill(&mut out, class_at, "class", class_value);
        fill(&mut out, style_at, "style", style_value);

        el.attrs = out.into_iter().flatten().collect();
    }

    /// `:name="source"`.
    fn bind_value(&self, name: &str, source: &str, frame: &Frame<'_>, out: &mut Slots) {
        let value = self.eval(source, &frame.scope).unwrap_ref();
        if self.runtime.config().is_boolean_attribute(name) {
            if value.is_truthy() {
                upsert(out, name, None);
            } else {
                remove(out, name);
            }
            return;
        }
        if value.is_nullish() {
            return;
        }
        upsert(out, name, Some(escape_html(&value.to_display_string()).into_owned()));
    }

    /// `v-model="path"` → `value="…" @input="__vmodel_path"`.
    ///
    /// Loop copies have no writable target, so the binding is dropped there.
    fn lower_model(&self, attr: &Attr, frame: &Frame<'_>, state: &mut State, out: &mut Slots) {
        if frame.in_loop {
            return;
        }
        let text = attr.text();
        let source = text.trim();

        let value = self.eval(source, &frame.scope).unwrap_ref();
        if !value.is_nullish() {
            upsert(out, "value", Some(escape_html(&value.to_display_string()).into_owned()));
        }

        let handler = format!("{}{}", frame.prefix, model_handler_name(source));
        if !frame.ctx.contains_key(&handler) && !state.handlers.contains_key(&handler) {
            let path = Expression::parse(source).ok().and_then(|expr| expr.path());
            match path {
                Some(path) => {
                    state
                        .handlers
                        .insert(handler.clone(), model_handler(frame.ctx.clone(), path));
                }
                None => {
                    tracing::debug!(source, "v-model needs a property path");
                    return;
                }
            }
        }
        out.push(Some(Attr::new("@input", Some(escape_html(&handler).into_owned()))));
    }

    /// Point handlers named by a component at that instance's copies.
    fn event_attr(&self, mut attr: Attr, frame: &Frame<'_>) -> Attr {
        if frame.prefix.is_empty() {
            return attr;
        }
        let handler = attr.text().trim().to_string();
        let local = frame.locals.functions.contains(&handler)
            || parse_shorthand(&handler).is_some_and(|(cell, _)| frame.locals.cells.contains(cell));
        if local {
            let renamed = format!("{}{}", frame.prefix, handler);
            attr.value = Some(escape_html(&renamed).into_owned());
        }
        attr
    }
}

/// Class names from a `:class` value: a string, a sequence, or an object
/// whose truthy keys are included.
fn class_names(value: &Value, out: &mut IndexSet<String>) {
    match value {
        Value::String(text) => out.extend(text.split_whitespace().map(String::from)),
        Value::Array(items) => {
            for item in items {
                class_names(item, out);
            }
        }
        Value::Object(map) => {
            for (name, on) in map {
                if on.unwrap_ref().is_truthy() {
                    out.insert(name.clone());
                }
            }
        }
        Value::Reactive(object) => {
            for name in object.keys() {
                if object.get(&name).unwrap_ref().is_truthy() {
                    out.insert(name);
                }
            }
        }
        Value::Ref(cell) => class_names(&cell.get(), out),
        _ => {}
    }
}

/// `{ fontSize: '2px' }` → `font-size:2px`. Nullish entries are skipped.
fn style_declarations(value: &Value, out: &mut Vec<String>) {
    let entries: Vec<(String, Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Reactive(object) => object
            .keys()
            .into_iter()
            .map(|k| {
                let v = object.get(&k);
                (k, v)
            })
            .collect(),
        Value::Ref(cell) => return style_declarations(&cell.get(), out),
        _ => return,
    };
    for (property, value) in entries {
        let value = value.unwrap_ref();
        if value.is_nullish() {
            continue;
        }
        out.push(format!("{}:{}", to_kebab(&property), value.to_display_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileOptions;
    use crate::reactive::{Reactive, Runtime};
    use serde_json::json;

    fn data(json: serde_json::Value) -> Context {
        match Value::from(json) {
            Value::Object(map) => Context::from(map),
            _ => Context::new(),
        }
    }

    fn compile(template: &str, ctx: &Context) -> String {
        Compiler::new(&Runtime::new(), CompileOptions::default())
            .compile_str(template, ctx)
            .html
    }

    #[test]
    fn shorthand_patterns() {
        assert_eq!(parse_shorthand("count++"), Some(("count", 1.0)));
        assert_eq!(parse_shorthand(" n-- "), Some(("n", -1.0)));
        assert_eq!(parse_shorthand("a + b"), None);
        assert_eq!(parse_shorthand("++n"), None);
    }

    #[test]
    fn model_handler_names() {
        assert_eq!(model_handler_name("form.name"), "__vmodel_form_name");
        assert_eq!(model_handler_name(" text "), "__vmodel_text");
    }

    #[test]
    fn class_merges_static_and_bound() {
        let ctx = data(json!({ "on": true, "off": false }));
        assert_eq!(
            compile(r#"<p class="a b" :class="['b', { c: on, d: off }]">x</p>"#, &ctx),
            r#"<p class="a b c">x</p>"#
        );
    }

    #[test]
    fn class_keeps_position_and_drops_when_empty() {
        let ctx = data(json!({ "cls": "k" }));
        assert_eq!(
            compile(r#"<p id="x" :class="cls" title="t"></p>"#, &ctx),
            r#"<p id="x" class="k" title="t"></p>"#
        );
        assert_eq!(compile(r#"<p :class="{ a: false }"></p>"#, &ctx), "<p></p>");
    }

    #[test]
    fn style_and_v_show_merge() {
        let ctx = data(json!({ "size": "2px" }));
        assert_eq!(
            compile(
                r#"<p style="color: red;" :style="{ fontSize: size, margin: null }" v-show="false">x</p>"#,
                &ctx
            ),
            r#"<p style="color: red;font-size:2px;display:none">x</p>"#
        );
        assert_eq!(compile(r#"<p v-show="true">x</p>"#, &ctx), "<p>x</p>");
    }

    #[test]
    fn boolean_and_nullish_bindings() {
        let ctx = data(json!({ "busy": true, "v": "a\"b", "none": null }));
        assert_eq!(
            compile(r#"<input :disabled="busy" :checked="false" :value="v">"#, &ctx),
            r#"<input disabled value="a&quot;b">"#
        );
        assert_eq!(
            compile(r#"<a :href="none" :title="0" disabled :disabled="!busy"></a>"#, &ctx),
            r#"<a title="0"></a>"#
        );
    }

    #[test]
    fn static_attributes_interpolate() {
        let ctx = data(json!({ "name": "Bo" }));
        assert_eq!(
            compile(r#"<a title="Hi {{ name }}" href="/x"></a>"#, &ctx),
            r#"<a title="Hi Bo" href="/x"></a>"#
        );
    }

    #[test]
    fn v_model_lowers_and_registers_handler() {
        let rt = Runtime::new();
        let form = Reactive::new(&rt, [("name", "x")]);
        let ctx = Context::new().with("form", form.clone());
        let out = Compiler::new(&rt, CompileOptions::default())
            .compile_str(r#"<input v-model="form.name">"#, &ctx);

        assert_eq!(out.html, r#"<input value="x" @input="__vmodel_form_name">"#);
        let Some(Value::Function(handler)) = out.handlers.get("__vmodel_form_name") else {
            panic!("handler not registered");
        };
        handler.call(&[Value::from("abc")]);
        assert_eq!(form.get("name"), Value::from("abc"));

        let event = Value::from(json!({ "type": "input", "value": "def" }));
        handler.call(&[event]);
        assert_eq!(form.get("name"), Value::from("def"));
    }

    #[test]
    fn v_model_prefers_existing_context_handler() {
        let ctx = data(json!({ "text": "" }));
        ctx.insert(model_handler_name("text"), context_model_handler(&ctx, vec!["text".into()]));
        let out = Compiler::new(&Runtime::new(), CompileOptions::default())
            .compile_str(r#"<input v-model="text">"#, &ctx);
        assert_eq!(out.html, r#"<input value="" @input="__vmodel_text">"#);
        assert!(out.handlers.is_empty());
    }

    #[test]
    fn v_model_is_dropped_in_loop_copies() {
        let ctx = data(json!({ "xs": ["a", "b"] }));
        assert_eq!(
            compile(r#"<input v-for="x in xs" v-model="x">"#, &ctx),
            "<input><input>"
        );
    }
}
