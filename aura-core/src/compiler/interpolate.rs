//! `{{ }}` interpolation and `v-html`.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::{pattern, Compiler};
use crate::escape::{escape_html, unescape_html};
use crate::template::html::{Attr, Node};
use crate::template::Scope;

fn mustache() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"\{\{\s*(.+?)\s*\}\}")
}

impl Compiler {
    /// Replace every `{{ expr }}` in markup text with the escaped value.
    /// `null` and `undefined` render as nothing.
    pub(super) fn interpolate(&self, text: &str, scope: &Scope) -> String {
        if !text.contains("{{") {
            return text.to_string();
        }
        mustache()
            .replace_all(text, |caps: &Captures<'_>| {
                // The template is markup, so `a &lt; b` means `a < b`
                let source = unescape_html(&caps[1]);
                let value = self.eval(&source, scope).unwrap_ref();
                if value.is_nullish() {
                    String::new()
                } else {
                    escape_html(&value.to_display_string()).into_owned()
                }
            })
            .into_owned()
    }

    /// `v-html="expr"`: the value as unescaped markup.
    pub(super) fn raw_html(&self, attr: &Attr, scope: &Scope) -> Node {
        let value = self.eval(&attr.text(), scope).unwrap_ref();
        if value.is_nullish() {
            Node::Raw(String::new())
        } else {
            Node::Raw(value.to_display_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{CompileOptions, Compiler};
    use crate::context::Context;
    use crate::reactive::Runtime;
    use crate::value::Value;
    use serde_json::json;

    fn compile(template: &str, data: serde_json::Value) -> String {
        let ctx = match Value::from(data) {
            Value::Object(map) => Context::from(map),
            _ => Context::new(),
        };
        Compiler::new(&Runtime::new(), CompileOptions::default())
            .compile_str(template, &ctx)
            .html
    }

    #[test]
    fn several_mustaches_in_one_text() {
        assert_eq!(
            compile("<p>{{a}} + {{ b }} = {{ a + b }}</p>", json!({ "a": 1, "b": 2 })),
            "<p>1 + 2 = 3</p>"
        );
    }

    #[test]
    fn entity_encoded_operators_in_expressions() {
        assert_eq!(compile("<p>{{ a &lt; b }}</p>", json!({ "a": 1, "b": 2 })), "<p>true</p>");
    }

    #[test]
    fn failing_expressions_render_empty() {
        assert_eq!(compile("<p>[{{ a.b.c }}][{{ ) }}]</p>", json!({})), "<p>[][]</p>");
    }

    #[test]
    fn text_without_mustaches_is_untouched() {
        assert_eq!(compile("<p>a &amp; b</p>", json!({})), "<p>a &amp; b</p>");
    }

    #[test]
    fn v_html_is_not_escaped() {
        let data = json!({ "body": "<em>hi</em>", "none": null });
        assert_eq!(
            compile(r#"<div v-html="body">old</div><div v-html="none">old</div>"#, data),
            "<div><em>hi</em></div><div></div>"
        );
    }
}
