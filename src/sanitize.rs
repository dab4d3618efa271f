//! Allow-list sanitizing of untrusted HTML before conversion.

use crate::format::{is_known_class, TAG_VOCABULARY};
use crate::html::{body, children, parse_fragment, tag_lower};
use markup5ever_rcdom::{Handle, NodeData};

/// Turns arbitrary HTML into HTML that is safe to parse and convert.
pub trait Sanitizer {
    fn sanitize(&self, html: &str) -> String;
}

/// Keeps the tag and class vocabulary the converters understand and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowListSanitizer;

impl Sanitizer for AllowListSanitizer {
    fn sanitize(&self, html: &str) -> String {
        let dom = parse_fragment(html);
        let nodes = match body(&dom) {
            Some(b) => children(&b),
            None => children(&dom.document),
        };
        let mut out = String::with_capacity(html.len());
        for n in &nodes {
            for clean in sanitize_node(n) {
                serialize_node(&mut out, &clean);
            }
        }
        out
    }
}

fn sanitize_href(href: &str) -> Option<String> {
    let h = href.trim();
    if h.is_empty() {
        return None;
    }
    let low = h.to_ascii_lowercase();
    if low.starts_with("javascript:") || low.starts_with("data:") || low.starts_with("vbscript:") {
        return None;
    }
    Some(h.to_string())
}

fn is_drop_content_tag(lower: &str) -> bool {
    matches!(
        lower,
        "script" | "style" | "noscript" | "template" | "iframe" | "object" | "embed" | "svg" | "math"
    )
}

#[derive(Clone, Debug)]
enum OutNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<OutNode>,
    },
    Text(String),
}

fn keep_attrs(tag: &str, node: &Handle) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let NodeData::Element { attrs, .. } = &node.data else {
        return out;
    };
    for a in attrs.borrow().iter() {
        let key = a.name.local.to_string().to_ascii_lowercase();
        match key.as_str() {
            "class" => {
                let kept: Vec<&str> = a.value.split_whitespace().filter(|c| is_known_class(c)).collect();
                if !kept.is_empty() {
                    out.push(("class".to_string(), kept.join(" ")));
                }
            }
            "href" if tag == "a" => {
                if let Some(h) = sanitize_href(&a.value) {
                    out.push(("href".to_string(), h));
                }
            }
            _ => {}
        }
    }
    out
}

fn sanitize_children(node: &Handle) -> Vec<OutNode> {
    children(node).iter().flat_map(sanitize_node).collect()
}

fn sanitize_node(node: &Handle) -> Vec<OutNode> {
    match &node.data {
        NodeData::Text { contents } => vec![OutNode::Text(contents.borrow().to_string())],
        NodeData::Document => sanitize_children(node),
        NodeData::Element { .. } => {
            let tag = tag_lower(node).unwrap_or_default();
            if is_drop_content_tag(&tag) {
                return Vec::new();
            }
            if !TAG_VOCABULARY.contains(&tag.as_str()) {
                return sanitize_children(node);
            }
            vec![OutNode::Element {
                attrs: keep_attrs(&tag, node),
                children: sanitize_children(node),
                tag,
            }]
        }
        NodeData::Doctype { .. } | NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => {
            Vec::new()
        }
    }
}

fn esc_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn esc_attr(s: &str) -> String {
    esc_text(s).replace('"', "&quot;")
}

fn serialize_node(out: &mut String, n: &OutNode) {
    match n {
        OutNode::Text(t) => out.push_str(&esc_text(t)),
        OutNode::Element { tag, attrs, children } => {
            out.push('<');
            out.push_str(tag);
            for (k, v) in attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&esc_attr(v));
                out.push('"');
            }
            if tag == "br" {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for c in children {
                serialize_node(out, c);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(html: &str) -> String {
        AllowListSanitizer.sanitize(html)
    }

    #[test]
    fn strips_unknown_tags_but_keeps_content() {
        let out = clean("<div>Hello<x-foo>World</x-foo><p>Ok</p></div>");
        assert_eq!(out, "<div>HelloWorld<p>Ok</p></div>");
    }

    #[test]
    fn drops_active_content() {
        let out = clean("<p>a<script>alert(1)</script><iframe src=\"x\"></iframe>b</p>");
        assert_eq!(out, "<p>ab</p>");
    }

    #[test]
    fn filters_classes_and_links() {
        let out = clean(r#"<span class="ins fancy" style="color:red">x</span><a href="javascript:alert(1)" onclick="y">l</a><a href=" https://example.org ">m</a>"#);
        assert_eq!(
            out,
            r#"<span class="ins">x</span><a>l</a><a href="https://example.org">m</a>"#
        );
    }

    #[test]
    fn escapes_text_and_keeps_unicode() {
        let out = clean("<p>ϕ &lt;b&gt; &amp; \"q\"</p>");
        assert_eq!(out, "<p>ϕ &lt;b&gt; &amp; \"q\"</p>");
    }

    #[test]
    fn void_line_breaks_survive() {
        assert_eq!(clean("a<br>b"), "a<br/>b");
    }
}
