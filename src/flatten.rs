//! Linear tokenization of HTML for spreadsheet cells.
//!
//! Cells cannot hold lists or nested blocks, so the tree is reduced to a
//! sequence of formatted text runs separated by paragraph boundaries and then
//! regrouped into flat `text:p` elements.

use crate::format::{tag_rule, BreakAfter, FormatContext, FormatFlag, FormatSet};
use crate::html::{attr_get, body, children, class_list, tag_lower};
use crate::styles::StyleRegistry;
use crate::xml::XmlElement;
use log::trace;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub formats: FormatSet,
    pub href: Option<String>,
}

impl Token {
    fn boundary(formats: FormatSet) -> Self {
        Self {
            text: String::new(),
            formats,
            href: None,
        }
    }

    /// A paragraph boundary rather than content.
    pub fn is_break(&self) -> bool {
        self.formats.contains(FormatFlag::Linebreak)
    }
}

pub fn flatten(node: &Handle, ctx: &FormatContext) -> Vec<Token> {
    let mut out = Vec::new();
    flatten_into(node, ctx, &mut out);
    out
}

fn flatten_into(node: &Handle, ctx: &FormatContext, out: &mut Vec<Token>) {
    match &node.data {
        NodeData::Text { contents } => out.push(Token {
            text: contents.borrow().to_string(),
            formats: ctx.flags.clone(),
            href: ctx.href.clone(),
        }),
        NodeData::Element { .. } => {
            let tag = tag_lower(node).unwrap_or_default();
            let inner = ctx.enter(&tag, &class_list(node), attr_get(node, "href"));
            for child in children(node) {
                flatten_into(&child, &inner, out);
            }
            match tag_rule(&tag).break_after {
                BreakAfter::None => {}
                BreakAfter::Plain => out.push(Token::boundary(FormatSet::from_iter([FormatFlag::Linebreak]))),
                BreakAfter::Bold => out.push(Token::boundary(FormatSet::from_iter([
                    FormatFlag::Linebreak,
                    FormatFlag::Bold,
                ]))),
            }
        }
        NodeData::Document => {
            for child in children(node) {
                flatten_into(&child, ctx, out);
            }
        }
        _ => trace!("skipping unsupported node kind"),
    }
}

/// Builds paragraphs from a token stream. Blank runs produce no span. The
/// trailing paragraph is kept when it has content or when it is the only one,
/// so the result is never empty.
pub fn regroup(tokens: &[Token], registry: &mut StyleRegistry) -> Vec<XmlElement> {
    let mut paragraphs = Vec::new();
    let mut current = XmlElement::new("text:p");

    for token in tokens {
        if token.is_break() {
            paragraphs.push(std::mem::replace(&mut current, XmlElement::new("text:p")));
            continue;
        }
        if token.text.trim().is_empty() {
            continue;
        }
        let mut span = XmlElement::new("text:span");
        if !token.formats.is_empty() {
            span.set_attr("text:style-name", registry.resolve(&token.formats));
        }
        span = span.with_text(token.text.as_str());
        match &token.href {
            Some(href) => current.push(
                XmlElement::new("text:a")
                    .with_attr("xlink:href", href.as_str())
                    .with_child(span),
            ),
            None => current.push(span),
        }
    }

    if !current.children.is_empty() || paragraphs.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

/// Flattens the body of a parsed fragment and regroups it, starting from
/// `initial` as the active formatting.
pub fn html_to_paragraphs(dom: &RcDom, initial: FormatSet, registry: &mut StyleRegistry) -> Vec<XmlElement> {
    let ctx = FormatContext::new(initial);
    let tokens: Vec<Token> = match body(dom) {
        Some(b) => children(&b).iter().flat_map(|c| flatten(c, &ctx)).collect(),
        None => flatten(&dom.document, &ctx),
    };
    regroup(&tokens, registry)
}
