//! Minimal HTML Tree
//!
//! Templates are parsed once into a tree of [`Node`]s. The compiler passes
//! transform the tree and [`serialize`] turns the result back into markup.
//!
//! The parser is forgiving rather than conformant:
//!
//! - Tag names keep their case so `<MyCounter>` can name a component.
//!   Closing tags match case-insensitively.
//! - `<x/>` closes any element, not only void ones.
//! - Text and attribute values are kept in markup form (entities are not
//!   decoded), so unchanged input serializes back verbatim.
//! - An element that is never closed is not an element: its opening tag is
//!   emitted as literal text and its children are hoisted into its parent.
//!   A stray closing tag is literal text as well.

use std::borrow::Cow;

use crate::escape::unescape_html;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// A single attribute. `value` is `None` for bare attributes (`disabled`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: Option<String>,
}

impl Attr {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// The value with entities decoded. Bare attributes read as `""`.
    pub fn text(&self) -> Cow<'_, str> {
        self.value.as_deref().map_or(Cow::Borrowed(""), unescape_html)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Character data in markup form.
    Text(String),
    Comment(String),
    /// Markup emitted verbatim and never processed again.
    Raw(String),
}

impl Node {
    /// Whitespace-only text or a comment.
    pub fn is_blank(&self) -> bool {
        match self {
            Node::Text(text) | Node::Raw(text) => text.trim().is_empty(),
            Node::Comment(_) => true,
            Node::Element(_) => false,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<Attr>,
    pub children: Vec<Node>,
    pub self_closing: bool,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Remove the first attribute called `name`.
    pub fn remove_attr(&mut self, name: &str) -> Option<Attr> {
        let pos = self.attrs.iter().position(|a| a.name == name)?;
        Some(self.attrs.remove(pos))
    }

    /// Replace the attribute's value, or append it. `value` is markup.
    pub fn set_attr(&mut self, name: &str, value: Option<String>) {
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value,
            None => self.attrs.push(Attr::new(name, value)),
        }
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS
            .iter()
            .any(|void| self.tag.eq_ignore_ascii_case(void))
    }

    fn is_raw_text(&self) -> bool {
        RAW_TEXT_ELEMENTS
            .iter()
            .any(|raw| self.tag.eq_ignore_ascii_case(raw))
    }
}

// ----------------------------------------------------------------------------
// Parser
// ----------------------------------------------------------------------------

struct Frame {
    element: Element,
    /// Source of the opening tag, emitted if the element is never closed.
    open_src: String,
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    stack: Vec<Frame>,
}

impl TreeBuilder {
    fn children(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.element.children,
            None => &mut self.root,
        }
    }

    fn push(&mut self, node: Node) {
        let children = self.children();
        if let (Node::Text(text), Some(Node::Text(prev))) = (&node, children.last_mut()) {
            prev.push_str(text);
            return;
        }
        children.push(node);
    }

    fn push_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.push(Node::Text(text.to_string()));
        }
    }

    /// Pop the innermost open element and hoist it as text into its parent.
    fn degrade_top(&mut self) {
        if let Some(frame) = self.stack.pop() {
            self.push(Node::Text(frame.open_src));
            for child in frame.element.children {
                self.push(child);
            }
        }
    }

    fn close(&mut self, tag: &str) -> bool {
        let Some(index) = self
            .stack
            .iter()
            .rposition(|frame| frame.element.tag.eq_ignore_ascii_case(tag))
        else {
            return false;
        };

        while self.stack.len() > index + 1 {
            self.degrade_top();
        }
        if let Some(frame) = self.stack.pop() {
            self.push(Node::Element(frame.element));
        }
        true
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.stack.is_empty() {
            self.degrade_top();
        }
        self.root
    }
}

/// Parse markup into a list of top-level nodes.
pub fn parse(src: &str) -> Vec<Node> {
    let mut builder = TreeBuilder::default();
    let mut pos = 0;

    while pos < src.len() {
        let Some(offset) = src[pos..].find('<') else {
            builder.push_text(&src[pos..]);
            break;
        };
        let lt = pos + offset;
        builder.push_text(&src[pos..lt]);
        let rest = &src[lt..];

        if let Some(body) = rest.strip_prefix("<!--") {
            match body.find("-->") {
                Some(end) => {
                    builder.push(Node::Comment(body[..end].to_string()));
                    pos = lt + 4 + end + 3;
                }
                None => {
                    builder.push_text(rest);
                    pos = src.len();
                }
            }
            continue;
        }

        if rest.starts_with("</") {
            match parse_close_tag(rest) {
                Some((tag, len)) => {
                    if !builder.close(tag) {
                        builder.push_text(&rest[..len]);
                    }
                    pos = lt + len;
                }
                None => {
                    builder.push_text("<");
                    pos = lt + 1;
                }
            }
            continue;
        }

        let Some((element, len)) = parse_open_tag(rest) else {
            builder.push_text("<");
            pos = lt + 1;
            continue;
        };
        pos = lt + len;

        if element.self_closing || element.is_void() {
            builder.push(Node::Element(element));
        } else if element.is_raw_text() {
            match find_raw_text_end(&src[pos..], &element.tag) {
                Some((content_len, close_len)) => {
                    let mut element = element;
                    let content = &src[pos..pos + content_len];
                    if !content.is_empty() {
                        element.children.push(Node::Text(content.to_string()));
                    }
                    builder.push(Node::Element(element));
                    pos += content_len + close_len;
                }
                None => {
                    builder.push_text(&src[lt..]);
                    pos = src.len();
                }
            }
        } else {
            builder.stack.push(Frame {
                element,
                open_src: rest[..len].to_string(),
            });
        }
    }

    builder.finish()
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

/// `</tag >` → (tag, length consumed).
fn parse_close_tag(rest: &str) -> Option<(&str, usize)> {
    let body = &rest[2..];
    let name_len = body.find(|c: char| !is_name_char(c)).unwrap_or(body.len());
    if name_len == 0 {
        return None;
    }
    let after = &body[name_len..];
    let gt = after.find('>')?;
    if !after[..gt].trim().is_empty() {
        return None;
    }
    Some((&body[..name_len], 2 + name_len + gt + 1))
}

/// `<tag a="1" b>` → (element, length consumed).
fn parse_open_tag(rest: &str) -> Option<(Element, usize)> {
    let body = &rest[1..];
    if !body.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let name_len = body.find(|c: char| !is_name_char(c)).unwrap_or(body.len());
    let mut element = Element::new(&body[..name_len]);
    let mut i = 1 + name_len;

    loop {
        i += whitespace_len(&rest[i..]);
        let tail = &rest[i..];
        if tail.is_empty() {
            return None;
        }
        if tail.starts_with("/>") {
            element.self_closing = true;
            return Some((element, i + 2));
        }
        if tail.starts_with('>') {
            return Some((element, i + 1));
        }

        let name_len = tail
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/' | '"' | '\''))
            .unwrap_or(tail.len());
        if name_len == 0 {
            // Stray `/`, `=` or quote
            i += tail.chars().next().map_or(1, char::len_utf8);
            continue;
        }
        let name = tail[..name_len].to_string();
        i += name_len;

        let ws = whitespace_len(&rest[i..]);
        if !rest[i + ws..].starts_with('=') {
            element.attrs.push(Attr::new(name, None));
            continue;
        }
        i += ws + 1;
        i += whitespace_len(&rest[i..]);

        let tail = &rest[i..];
        let value = match tail.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let end = tail[1..].find(quote)?;
                i += end + 2;
                let value = &tail[1..1 + end];
                if quote == '\'' {
                    value.replace('"', "&quot;")
                } else {
                    value.to_string()
                }
            }
            _ => {
                let len = tail
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(tail.len());
                i += len;
                tail[..len].to_string()
            }
        };
        element.attrs.push(Attr::new(name, Some(value)));
    }
}

fn whitespace_len(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// Locate `</tag>` for a raw-text element. Returns (content length, closing
/// tag length).
fn find_raw_text_end(rest: &str, tag: &str) -> Option<(usize, usize)> {
    let needle = format!("</{}", tag.to_ascii_lowercase());
    let lowered = rest.to_ascii_lowercase();
    let start = lowered.find(&needle)?;
    let gt = rest[start..].find('>')?;
    Some((start, gt + 1))
}

// ----------------------------------------------------------------------------
// Serializer
// ----------------------------------------------------------------------------

/// Render nodes back to markup.
pub fn serialize(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) | Node::Raw(text) => out.push_str(text),
        Node::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for attr in &el.attrs {
                out.push(' ');
                out.push_str(&attr.name);
                if let Some(value) = &attr.value {
                    out.push_str("=\"");
                    out.push_str(value);
                    out.push('"');
                }
            }
            out.push('>');
            if el.is_void() {
                return;
            }
            for child in &el.children {
                write_node(out, child);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(nodes: &[Node]) -> &Element {
        nodes
            .iter()
            .find_map(Node::as_element)
            .expect("no element parsed")
    }

    #[test]
    fn parses_nested_elements_and_attributes() {
        let nodes = parse(r#"<div id="a" class='x y' hidden><span v-if="ok">hi</span></div>"#);
        let div = first_element(&nodes);

        assert_eq!(div.tag, "div");
        assert_eq!(div.attr("id").and_then(|a| a.value.as_deref()), Some("a"));
        assert_eq!(div.attr("class").map(|a| a.text()), Some("x y".into()));
        assert_eq!(div.attr("hidden").map(|a| a.value.clone()), Some(None));

        let span = first_element(&div.children);
        assert_eq!(span.attr("v-if").map(|a| a.text()), Some("ok".into()));
        assert_eq!(span.children, vec![Node::Text("hi".into())]);
    }

    #[test]
    fn nested_same_tag_closes_correctly() {
        let src = "<div v-if=\"a\"><div>inner</div></div><div v-else>b</div>";
        let nodes = parse(src);
        assert_eq!(nodes.len(), 2);
        assert_eq!(serialize(&nodes), src);
    }

    #[test]
    fn void_and_self_closing() {
        let nodes = parse(r#"<input :value="x"><slot/><br/>"#);
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|n| n.as_element().is_some()));
        assert_eq!(serialize(&nodes), r#"<input :value="x"><slot></slot><br>"#);
    }

    #[test]
    fn unterminated_element_degrades_to_text() {
        let nodes = parse("<div><p>text</div>");
        let div = first_element(&nodes);
        assert_eq!(
            div.children,
            vec![Node::Text("<p>text".into())]
        );
        assert_eq!(serialize(&parse("<section>open")), "<section>open");
    }

    #[test]
    fn stray_close_tag_is_text() {
        assert_eq!(parse("a</b>c"), vec![Node::Text("a</b>c".into())]);
    }

    #[test]
    fn lone_angle_brackets_are_text() {
        assert_eq!(serialize(&parse("a < b > c")), "a < b > c");
    }

    #[test]
    fn comments_and_raw_text() {
        let src = "<!-- note --><script>if (a < b) {}</script>";
        let nodes = parse(src);
        assert_eq!(nodes[0], Node::Comment(" note ".into()));
        let script = first_element(&nodes);
        assert_eq!(script.children, vec![Node::Text("if (a < b) {}".into())]);
        assert_eq!(serialize(&nodes), src);
    }

    #[test]
    fn single_quoted_values_escape_double_quotes() {
        let nodes = parse(r#"<a title='say "hi"'></a>"#);
        assert_eq!(serialize(&nodes), r#"<a title="say &quot;hi&quot;"></a>"#);
    }

    #[test]
    fn directive_attribute_names() {
        let nodes = parse(r#"<button @click.prevent="save" v-on:keyup.enter="go" :disabled="busy"></button>"#);
        let button = first_element(&nodes);
        let names: Vec<_> = button.attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["@click.prevent", "v-on:keyup.enter", ":disabled"]);
    }
}
