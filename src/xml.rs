//! Owned XML tree used both for template parts and for generated markup.
//!
//! Template parts are small (a `content.xml` rarely exceeds a few hundred
//! kilobytes), so the whole part is materialized, edited, and written back.
//! Names are kept qualified (`text:p`); namespace-aware lookups resolve
//! prefixes through the `xmlns:*` declarations in scope.

use crate::error::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

pub const NS_OFFICE: &str = "urn:oasis:names:tc:opendocument:xmlns:office:1.0";
pub const NS_TEXT: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";
pub const NS_FO: &str = "urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0";
pub const NS_DRAW: &str = "urn:oasis:names:tc:opendocument:xmlns:drawing:1.0";
pub const NS_STYLE: &str = "urn:oasis:names:tc:opendocument:xmlns:style:1.0";
pub const NS_SVG: &str = "urn:oasis:names:tc:opendocument:xmlns:svg-compatible:1.0";
pub const NS_TABLE: &str = "urn:oasis:names:tc:opendocument:xmlns:table:1.0";
pub const NS_CALCEXT: &str = "urn:org:documentfoundation:names:experimental:calc:xmlns:calcext:1.0";
pub const NS_XLINK: &str = "http://www.w3.org/1999/xlink";

const XML_PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Concatenated text of this node and all its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Whitespace-only text or a comment.
    pub fn is_blank(&self) -> bool {
        match self {
            XmlNode::Text(t) => t.trim().is_empty(),
            XmlNode::Comment(_) => true,
            XmlNode::Element(_) => false,
        }
    }
}

impl From<XmlElement> for XmlNode {
    fn from(el: XmlElement) -> Self {
        XmlNode::Element(el)
    }
}

fn collect_text(node: &XmlNode, out: &mut String) {
    match node {
        XmlNode::Text(t) => out.push_str(t),
        XmlNode::Comment(_) => {}
        XmlNode::Element(el) => {
            for c in &el.children {
                collect_text(c, out);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<XmlNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Sets an attribute, replacing an existing one in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(k, _)| k != name);
    }

    pub fn push(&mut self, child: impl Into<XmlNode>) {
        self.children.push(child.into());
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Copy of the element with its attributes but without children.
    pub fn shallow_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            children: Vec::new(),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for c in &self.children {
            collect_text(c, &mut out);
        }
        out
    }

    /// Serializes this element alone, without an XML prolog.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }
}

/// A parsed XML part: the root element plus everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let el = element_from_start(&e)?;
                    attach(&mut stack, &mut root, XmlNode::Element(el));
                }
                Event::End(_) => {
                    if let Some(el) = stack.pop() {
                        attach(&mut stack, &mut root, XmlNode::Element(el));
                    }
                }
                Event::Text(e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(e.unescape()?.into_owned()));
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(XmlNode::Text(String::from_utf8_lossy(&e).into_owned()));
                    }
                }
                Event::Comment(e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(XmlNode::Comment(String::from_utf8_lossy(&e).into_owned()));
                    }
                }
                Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        match root {
            Some(root) => Ok(Self { root }),
            None => Err(crate::Error::MalformedTemplate(
                "XML part has no root element".to_string(),
            )),
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(XML_PROLOG.as_bytes().to_vec());
        write_element(&mut writer, &self.root)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    /// Prefix bound to `ns` on the root element, if any.
    pub fn prefix_for(&self, ns: &str) -> Option<&str> {
        self.root.attrs.iter().find_map(|(k, v)| {
            if v == ns {
                k.strip_prefix("xmlns:")
            } else {
                None
            }
        })
    }

    /// Declares `prefix` on the root element unless it is already declared there.
    pub fn ensure_namespace(&mut self, prefix: &str, ns: &str) {
        let key = format!("xmlns:{prefix}");
        if self.root.attr(&key).is_none() {
            self.root.attrs.push((key, ns.to_string()));
        }
    }

    /// Child-index paths of every element named `(ns, local)`, in document order.
    pub fn find_paths(&self, ns: &str, local: &str) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        let mut scope = Vec::new();
        let mut path = Vec::new();
        collect_paths(&self.root, ns, local, &mut scope, &mut path, &mut out);
        out
    }

    pub fn elements_by_name_ns(&self, ns: &str, local: &str) -> Vec<&XmlElement> {
        self.find_paths(ns, local)
            .iter()
            .filter_map(|p| self.element_at(p))
            .collect()
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&XmlElement> {
        let mut cur = &self.root;
        for &idx in path {
            cur = cur.children.get(idx)?.as_element()?;
        }
        Some(cur)
    }

    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        let mut cur = &mut self.root;
        for &idx in path {
            cur = match cur.children.get_mut(idx)? {
                XmlNode::Element(el) => el,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Calls `f` on every element named `(ns, local)`.
    pub fn for_each_element_mut(&mut self, ns: &str, local: &str, mut f: impl FnMut(&mut XmlElement)) {
        for path in self.find_paths(ns, local) {
            if let Some(el) = self.element_at_mut(&path) {
                f(el);
            }
        }
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if let XmlNode::Element(el) = node {
                if root.is_none() {
                    *root = Some(el);
                }
            }
        }
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement> {
    let mut el = XmlElement::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, el: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        match child {
            XmlNode::Element(c) => write_element(writer, c)?,
            XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
            XmlNode::Comment(c) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(c.as_str())))?
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}

fn push_declarations(el: &XmlElement, scope: &mut Vec<(String, String)>) -> usize {
    let mut pushed = 0;
    for (k, v) in &el.attrs {
        if let Some(prefix) = k.strip_prefix("xmlns:") {
            scope.push((prefix.to_string(), v.clone()));
            pushed += 1;
        } else if k == "xmlns" {
            scope.push((String::new(), v.clone()));
            pushed += 1;
        }
    }
    pushed
}

fn resolve<'s>(scope: &'s [(String, String)], prefix: &str) -> Option<&'s str> {
    scope
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map(|(_, ns)| ns.as_str())
}

fn collect_paths(
    el: &XmlElement,
    ns: &str,
    local: &str,
    scope: &mut Vec<(String, String)>,
    path: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    let pushed = push_declarations(el, scope);
    if el.local_name() == local && resolve(scope, el.prefix().unwrap_or("")) == Some(ns) {
        out.push(path.clone());
    }
    for (idx, child) in el.children.iter().enumerate() {
        if let XmlNode::Element(c) = child {
            path.push(idx);
            collect_paths(c, ns, local, scope, path, out);
            path.pop();
        }
    }
    scope.truncate(scope.len() - pushed);
}
