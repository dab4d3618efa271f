//! Word-processor documents: pages of converted HTML spliced into a template.
//!
//! The template's `office:text` body is captured once. Every page gets a
//! copy of it with its own text replacements applied, and the paragraph
//! holding the text marker is replaced by the converted HTML blocks queued
//! for that page.

use crate::error::{Error, Result};
use crate::html::{body, prepare};
use crate::layout::PageLayout;
use crate::options::Options;
use crate::sanitize::{AllowListSanitizer, Sanitizer};
use crate::styles::StyleRegistry;
use crate::template::{store_document, OdfPackage, TemplateAccessor, CONTENT_XML};
use crate::text::{paragraph_template, LineNumbering, TextTransformer};
use crate::xml::{XmlDocument, XmlElement, XmlNode, NS_FO, NS_OFFICE, NS_STYLE, NS_TEXT, NS_XLINK};
use log::{debug, trace, warn};
use regex::{NoExpand, Regex};
use std::borrow::Cow;
use std::path::Path;

/// Body children that declare document-wide state; they stay in place once
/// instead of being repeated per page.
const PREAMBLE: &[&str] = &[
    "office:forms",
    "text:tracked-changes",
    "text:variable-decls",
    "text:sequence-decls",
    "text:user-field-decls",
    "text:dde-connection-decls",
    "text:alphabetical-index-auto-mark-file",
    "table:calculation-settings",
    "table:content-validations",
    "table:label-ranges",
];

/// A search pattern and the text that replaces every match. The value is
/// inserted as is; `$1` and friends are not expanded.
#[derive(Debug, Clone)]
pub struct Replacement {
    pattern: Regex,
    value: String,
}

impl Replacement {
    pub fn literal(search: &str, value: impl Into<String>) -> Result<Self> {
        Self::pattern(&regex::escape(search), value)
    }

    pub fn pattern(pattern: &str, value: impl Into<String>) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            value: value.into(),
        })
    }

    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.pattern.replace_all(text, NoExpand(&self.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub html: String,
    pub line_numbered: bool,
}

/// Everything queued for one page.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    index: usize,
    replacements: Vec<Replacement>,
    text_blocks: Vec<TextBlock>,
    numbering: LineNumbering,
}

impl PageContext {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Adds a replacement; a later one for the same pattern takes its place.
    pub fn add_replacement(&mut self, replacement: Replacement) {
        let key = replacement.pattern.as_str();
        match self.replacements.iter_mut().find(|r| r.pattern.as_str() == key) {
            Some(slot) => *slot = replacement,
            None => self.replacements.push(replacement),
        }
    }

    pub fn add_text_block(&mut self, html: impl Into<String>, line_numbered: bool) {
        self.text_blocks.push(TextBlock {
            html: html.into(),
            line_numbered,
        });
    }

    pub fn text_blocks(&self) -> &[TextBlock] {
        &self.text_blocks
    }

    pub fn replace_text(&self, text: &str) -> String {
        let mut out = text.to_string();
        for r in &self.replacements {
            out = r.apply(&out).into_owned();
        }
        out
    }
}

fn marker_regex(marker: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("(?i){}", regex::escape(marker)))?)
}

fn clone_with_replacements(node: &XmlNode, page: &PageContext) -> XmlNode {
    match node {
        XmlNode::Text(t) => XmlNode::Text(page.replace_text(t)),
        XmlNode::Comment(c) => XmlNode::Comment(c.clone()),
        XmlNode::Element(el) => {
            let mut copy = el.shallow_clone();
            copy.children = el
                .children
                .iter()
                .map(|c| clone_with_replacements(c, page))
                .collect();
            copy.into()
        }
    }
}

fn find_anchors(nodes: &[XmlNode], marker: &Regex) -> Vec<Vec<usize>> {
    fn walk(nodes: &[XmlNode], marker: &Regex, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (idx, node) in nodes.iter().enumerate() {
            let XmlNode::Element(el) = node else {
                continue;
            };
            path.push(idx);
            if matches!(el.name.as_str(), "text:p" | "text:h") && marker.is_match(&el.text_content()) {
                out.push(path.clone());
            } else {
                walk(&el.children, marker, path, out);
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(nodes, marker, &mut Vec::new(), &mut out);
    out
}

fn element_at<'n>(nodes: &'n [XmlNode], path: &[usize]) -> Option<&'n XmlElement> {
    let (&first, rest) = path.split_first()?;
    let mut el = nodes.get(first)?.as_element()?;
    for &idx in rest {
        el = el.children.get(idx)?.as_element()?;
    }
    Some(el)
}

/// Sibling list holding the node at `path`, with the node's index in it.
fn slot<'n>(nodes: &'n mut Vec<XmlNode>, path: &[usize]) -> Option<(&'n mut Vec<XmlNode>, usize)> {
    let (&last, parents) = path.split_last()?;
    let mut siblings = nodes;
    for &idx in parents {
        siblings = match siblings.get_mut(idx)? {
            XmlNode::Element(el) => &mut el.children,
            _ => return None,
        };
    }
    Some((siblings, last))
}

/// Turns the queued pages into the body of a content part.
pub struct PageAssembler<'a> {
    options: &'a Options,
    sanitizer: &'a dyn Sanitizer,
    registry: &'a mut StyleRegistry,
    text_marker: Regex,
    dummy_marker: Regex,
}

impl<'a> PageAssembler<'a> {
    pub fn new(options: &'a Options, sanitizer: &'a dyn Sanitizer, registry: &'a mut StyleRegistry) -> Result<Self> {
        Ok(Self {
            options,
            sanitizer,
            registry,
            text_marker: marker_regex(&options.text_marker)?,
            dummy_marker: marker_regex(&options.dummy_marker)?,
        })
    }

    pub fn assemble(&mut self, doc: &mut XmlDocument, pages: &mut [PageContext]) -> Result<()> {
        let path = doc
            .find_paths(NS_OFFICE, "text")
            .into_iter()
            .next()
            .ok_or_else(|| Error::MalformedTemplate("content has no office:text body".to_string()))?;
        let original = match doc.element_at_mut(&path) {
            Some(body) => std::mem::take(&mut body.children),
            None => Vec::new(),
        };

        let mut out = Vec::new();
        let mut captured = Vec::new();
        for node in original {
            let preamble = node
                .as_element()
                .is_some_and(|el| PREAMBLE.contains(&el.name.as_str()));
            if preamble {
                out.push(node);
            } else if node.is_blank() {
                continue;
            } else if self.dummy_marker.is_match(&node.text_content()) {
                trace!("dropping template scaffolding");
            } else {
                captured.push(node);
            }
        }
        debug!("captured {} body nodes for {} pages", captured.len(), pages.len());

        for page in pages.iter_mut() {
            out.extend(self.render_page(&captured, page)?);
        }

        if let Some(body) = doc.element_at_mut(&path) {
            body.children = out;
        }
        Ok(())
    }

    fn render_page(&mut self, captured: &[XmlNode], page: &mut PageContext) -> Result<Vec<XmlNode>> {
        let mut nodes: Vec<XmlNode> = captured
            .iter()
            .map(|n| clone_with_replacements(n, page))
            .collect();
        let anchors = find_anchors(&nodes, &self.text_marker);
        debug!(
            "page {}: {} text blocks, {} anchors",
            page.index,
            page.text_blocks.len(),
            anchors.len()
        );

        let Some((first, rest)) = anchors.split_first() else {
            return Err(Error::MissingAnchor {
                page: page.index,
                marker: self.options.text_marker.clone(),
            });
        };

        if !rest.is_empty() {
            warn!("page {}: {} extra text anchors removed", page.index, rest.len());
        }
        for path in rest.iter().rev() {
            if let Some((siblings, idx)) = slot(&mut nodes, path) {
                siblings.remove(idx);
            }
        }

        let template = element_at(&nodes, first)
            .map(paragraph_template)
            .unwrap_or_else(|| XmlElement::new("text:p"));
        let generated = self.convert_blocks(page, template);
        if let Some((siblings, idx)) = slot(&mut nodes, first) {
            let tail = siblings.split_off(idx + 1);
            siblings.pop();
            siblings.extend(generated);
            siblings.extend(tail);
        }
        Ok(nodes)
    }

    fn convert_blocks(&mut self, page: &mut PageContext, template: XmlElement) -> Vec<XmlNode> {
        let mut out = Vec::new();
        let mut transformer = TextTransformer::new(self.registry, &self.options.paragraph_styles, &mut page.numbering)
            .with_template(template);
        for block in &page.text_blocks {
            let dom = prepare(&block.html, self.options.trust_html, self.sanitizer);
            match body(&dom) {
                Some(b) => out.extend(transformer.html_to_nodes(&b, block.line_numbered)),
                None => warn!("page {}: HTML block without body skipped", page.index),
            }
        }
        out
    }
}

/// A text document under construction.
pub struct TextDocument<T: TemplateAccessor> {
    template: T,
    options: Options,
    sanitizer: Box<dyn Sanitizer>,
    registry: StyleRegistry,
    finished_pages: Vec<PageContext>,
    current: PageContext,
    layout: PageLayout,
}

impl<T: TemplateAccessor> TextDocument<T> {
    pub fn new(template: T, options: Options) -> Self {
        Self {
            template,
            registry: StyleRegistry::from_options(&options),
            options,
            sanitizer: Box::new(AllowListSanitizer),
            finished_pages: Vec::new(),
            current: PageContext::new(0),
            layout: PageLayout::default(),
        }
    }

    pub fn with_sanitizer(mut self, sanitizer: Box<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Replaces `search` literally on the current page.
    pub fn add_replace(&mut self, search: &str, value: &str) -> Result<()> {
        self.current.add_replacement(Replacement::literal(search, value)?);
        Ok(())
    }

    /// Replaces matches of a regular expression on the current page.
    pub fn add_replace_pattern(&mut self, pattern: &str, value: &str) -> Result<()> {
        self.current.add_replacement(Replacement::pattern(pattern, value)?);
        Ok(())
    }

    pub fn add_html_text_block(&mut self, html: &str, line_numbered: bool) {
        self.current.add_text_block(html, line_numbered);
    }

    /// Starts a new page and returns its index.
    pub fn next_page(&mut self) -> usize {
        let next = PageContext::new(self.current.index + 1);
        self.finished_pages.push(std::mem::replace(&mut self.current, next));
        self.current.index
    }

    pub fn page_index(&self) -> usize {
        self.current.index
    }

    pub fn set_margins(&mut self, top: &str, left: &str, right: &str, bottom: &str) {
        self.layout.set_margins(top, left, right, bottom);
    }

    pub fn set_page_orientation(&mut self, width: &str, height: &str, orientation: &str) {
        self.layout.set_page_orientation(width, height, orientation);
    }

    /// Builds the content part without touching the template.
    pub fn create(&mut self) -> Result<String> {
        let xml = self.template.read_part(CONTENT_XML)?;
        let mut doc = XmlDocument::parse(&xml)?;

        let mut pages = self.finished_pages.clone();
        pages.push(self.current.clone());
        PageAssembler::new(&self.options, self.sanitizer.as_ref(), &mut self.registry)?.assemble(&mut doc, &mut pages)?;

        self.registry.apply(&mut doc)?;
        for (prefix, ns) in [("style", NS_STYLE), ("text", NS_TEXT), ("fo", NS_FO), ("xlink", NS_XLINK)] {
            doc.ensure_namespace(prefix, ns);
        }
        doc.to_xml()
    }

    /// Writes the generated parts back and hands the template out again.
    pub fn finish(mut self) -> Result<T> {
        let content = self.create()?;
        store_document(&mut self.template, content, &self.layout)?;
        Ok(self.template)
    }
}

impl TextDocument<OdfPackage> {
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        Ok(Self::new(OdfPackage::open(path)?, options))
    }

    pub fn finish_and_get_document(self) -> Result<Vec<u8>> {
        self.finish()?.into_bytes()
    }
}
