//! HTML parsing boundary: fragment wrapping and small DOM helpers.

use crate::sanitize::Sanitizer;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Parses an HTML fragment as the body of a minimal UTF-8 document.
pub fn parse_fragment(html: &str) -> RcDom {
    let wrapped = format!(
        "<html><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\"/></head><body>{}</body></html>",
        html
    );
    parse_document(RcDom::default(), Default::default()).one(wrapped.as_str())
}

/// Sanitizes (unless trusted) and parses a fragment.
pub fn prepare(html: &str, trust_html: bool, sanitizer: &dyn Sanitizer) -> RcDom {
    if trust_html {
        parse_fragment(html)
    } else {
        parse_fragment(&sanitizer.sanitize(html))
    }
}

pub fn body(dom: &RcDom) -> Option<Handle> {
    fn find_elem(node: &Handle, name: &str) -> Option<Handle> {
        if let NodeData::Element { name: q, .. } = &node.data {
            if q.local.to_string().eq_ignore_ascii_case(name) {
                return Some(node.clone());
            }
        }
        for c in node.children.borrow().iter() {
            if let Some(x) = find_elem(c, name) {
                return Some(x);
            }
        }
        None
    }

    find_elem(&dom.document, "body")
}

pub fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

pub fn tag_lower(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

/// Attribute value, `None` when absent or not an element.
pub fn attr_get(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.to_string().eq_ignore_ascii_case(name))
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn class_list(node: &Handle) -> Vec<String> {
    attr_get(node, "class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn text_content(node: &Handle) -> String {
    fn walk(node: &Handle, out: &mut String) {
        if let NodeData::Text { contents } = &node.data {
            out.push_str(&contents.borrow());
        }
        for c in node.children.borrow().iter() {
            walk(c, out);
        }
    }

    let mut out = String::new();
    walk(node, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_lands_in_body() {
        let dom = parse_fragment("<p class=\"ins  strike\">Hi <b>there</b></p>");
        let body = body(&dom).unwrap();
        let kids = children(&body);
        assert_eq!(kids.len(), 1);
        assert_eq!(tag_lower(&kids[0]).as_deref(), Some("p"));
        assert_eq!(class_list(&kids[0]), vec!["ins", "strike"]);
        assert_eq!(text_content(&body), "Hi there");
    }

    #[test]
    fn missing_attribute_is_none() {
        let dom = parse_fragment("<a>x</a>");
        let body = body(&dom).unwrap();
        let a = &children(&body)[0];
        assert_eq!(attr_get(a, "href"), None);
        assert!(class_list(a).is_empty());
    }
}
