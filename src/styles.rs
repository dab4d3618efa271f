//! Deduplicated automatic styles generated during a conversion run.
//!
//! Two entry points feed the same store: [`StyleRegistry::resolve`] for text
//! styles derived from a [`FormatSet`], and [`StyleRegistry::intern`] for
//! explicit attribute maps (cells, columns, rows). Both are content-addressed,
//! so registering the same definition twice yields one style.

use crate::error::Result;
use crate::format::{FormatFlag, FormatSet};
use crate::options::Options;
use crate::xml::{XmlDocument, XmlElement, XmlNode, NS_OFFICE};
use log::debug;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleFamily {
    Text,
    TableCell,
    TableColumn,
    TableRow,
}

impl StyleFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            StyleFamily::Text => "text",
            StyleFamily::TableCell => "table-cell",
            StyleFamily::TableColumn => "table-column",
            StyleFamily::TableRow => "table-row",
        }
    }

    const fn short_name(self) -> &'static str {
        match self {
            StyleFamily::Text => "text",
            StyleFamily::TableCell => "cell",
            StyleFamily::TableColumn => "col",
            StyleFamily::TableRow => "row",
        }
    }
}

/// One `style:*-properties` child of a style definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StyleProperties {
    pub element: String,
    pub attrs: Vec<(String, String)>,
}

impl StyleProperties {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            attrs: Vec::new(),
        }
    }

    /// Sets a property; a later value for the same name wins.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredStyle {
    pub name: String,
    pub family: StyleFamily,
    pub parent: Option<String>,
    pub properties: Vec<StyleProperties>,
}

impl RegisteredStyle {
    pub fn to_element(&self) -> XmlElement {
        let mut el = XmlElement::new("style:style")
            .with_attr("style:name", self.name.as_str())
            .with_attr("style:family", self.family.as_str());
        if let Some(parent) = &self.parent {
            el.set_attr("style:parent-style-name", parent.as_str());
        }
        for props in &self.properties {
            let mut p = XmlElement::new(format!("style:{}", props.element));
            for (k, v) in &props.attrs {
                p.set_attr(k.as_str(), v.as_str());
            }
            el.push(p);
        }
        el
    }
}

#[derive(Debug, Clone)]
pub struct StyleRegistry {
    prefix: String,
    color_ins: String,
    color_del: String,
    by_key: HashMap<String, String>,
    family_counts: HashMap<StyleFamily, usize>,
    styles: Vec<RegisteredStyle>,
}

impl StyleRegistry {
    pub fn new(prefix: impl Into<String>, color_ins: impl Into<String>, color_del: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            color_ins: color_ins.into(),
            color_del: color_del.into(),
            by_key: HashMap::new(),
            family_counts: HashMap::new(),
            styles: Vec::new(),
        }
    }

    pub fn from_options(options: &Options) -> Self {
        Self::new(&options.style_prefix, &options.color_ins, &options.color_del)
    }

    /// Text style for a flag combination. Linebreak carries no styling and
    /// is ignored.
    pub fn resolve(&mut self, flags: &FormatSet) -> String {
        let flags = flags.without(FormatFlag::Linebreak);
        let key = format!("text:{}", flags.key());
        if let Some(name) = self.by_key.get(&key) {
            return name.clone();
        }

        let mut name = self.prefix.clone();
        for flag in flags.iter() {
            name.push('_');
            name.push_str(flag.name());
        }
        let style = RegisteredStyle {
            name: name.clone(),
            family: StyleFamily::Text,
            parent: None,
            properties: vec![self.text_properties(&flags)],
        };
        debug!("registering text style {name} for flags {}", flags.key());
        self.styles.push(style);
        self.by_key.insert(key, name.clone());
        name
    }

    /// Registers an explicit definition, reusing an identical earlier one.
    pub fn intern(&mut self, family: StyleFamily, parent: Option<&str>, properties: Vec<StyleProperties>) -> String {
        let key = definition_key(family, parent, &properties);
        if let Some(name) = self.by_key.get(&key) {
            return name.clone();
        }

        let count = self.family_counts.entry(family).or_insert(0);
        let name = format!("{}_{}{}", self.prefix, family.short_name(), count);
        *count += 1;
        self.styles.push(RegisteredStyle {
            name: name.clone(),
            family,
            parent: parent.map(str::to_string),
            properties,
        });
        self.by_key.insert(key, name.clone());
        name
    }

    pub fn styles(&self) -> &[RegisteredStyle] {
        &self.styles
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Appends every registered style to the document's automatic styles,
    /// creating that container in front of `office:body` when the template
    /// lacks one.
    pub fn apply(&self, doc: &mut XmlDocument) -> Result<()> {
        if self.styles.is_empty() {
            return Ok(());
        }
        let elements: Vec<XmlNode> = self
            .styles
            .iter()
            .map(|s| XmlNode::Element(s.to_element()))
            .collect();

        let paths = doc.find_paths(NS_OFFICE, "automatic-styles");
        if paths.is_empty() {
            let prefix = doc.prefix_for(NS_OFFICE).unwrap_or("office").to_string();
            let mut container = XmlElement::new(format!("{prefix}:automatic-styles"));
            container.children = elements;
            let body_name = format!("{prefix}:body");
            let pos = doc
                .root
                .children
                .iter()
                .position(|c| c.as_element().is_some_and(|e| e.name == body_name))
                .unwrap_or(doc.root.children.len());
            doc.root.children.insert(pos, XmlNode::Element(container));
            return Ok(());
        }

        for path in paths {
            if let Some(el) = doc.element_at_mut(&path) {
                el.children.extend(elements.iter().cloned());
            }
        }
        Ok(())
    }

    fn text_properties(&self, flags: &FormatSet) -> StyleProperties {
        let mut props = StyleProperties::new("text-properties");
        for flag in flags.iter() {
            match flag {
                FormatFlag::Insert => {
                    props.set("fo:color", self.color_ins.as_str());
                    props.set("style:text-underline-style", "solid");
                    props.set("style:text-underline-width", "auto");
                    props.set("style:text-underline-color", "font-color");
                }
                FormatFlag::Delete => {
                    props.set("fo:color", self.color_del.as_str());
                    props.set("style:text-line-through-style", "solid");
                    props.set("style:text-line-through-type", "single");
                }
                FormatFlag::Bold => {
                    props.set("fo:font-weight", "bold");
                    props.set("style:font-weight-asian", "bold");
                    props.set("style:font-weight-complex", "bold");
                }
                FormatFlag::Italic => {
                    props.set("fo:font-style", "italic");
                    props.set("style:font-style-asian", "italic");
                    props.set("style:font-style-complex", "italic");
                }
                FormatFlag::Underline => {
                    props.set("style:text-underline-style", "solid");
                    props.set("style:text-underline-width", "auto");
                    props.set("style:text-underline-color", "font-color");
                }
                FormatFlag::Strike => {
                    props.set("style:text-line-through-style", "solid");
                    props.set("style:text-line-through-type", "single");
                }
                FormatFlag::Superscript => props.set("style:text-position", "super 58%"),
                FormatFlag::Subscript => props.set("style:text-position", "sub 58%"),
                FormatFlag::Link | FormatFlag::Indent | FormatFlag::Linebreak => {}
            }
        }
        props
    }
}

fn definition_key(family: StyleFamily, parent: Option<&str>, properties: &[StyleProperties]) -> String {
    let mut parts: Vec<String> = properties
        .iter()
        .flat_map(|p| p.attrs.iter().map(move |(k, v)| format!("{}/{}={}", p.element, k, v)))
        .collect();
    parts.sort();
    format!("{}:{}:{}", family.as_str(), parent.unwrap_or(""), parts.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry() -> StyleRegistry {
        StyleRegistry::from_options(&Options::default())
    }

    #[test]
    fn names_follow_flag_order() {
        let mut reg = registry();
        let name = reg.resolve(&FormatSet::from_iter([FormatFlag::Italic, FormatFlag::Bold]));
        assert_eq!(name, "Html2Odf_bold_italic");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn linebreak_does_not_split_styles() {
        let mut reg = registry();
        let a = reg.resolve(&FormatSet::from_iter([FormatFlag::Bold]));
        let b = reg.resolve(&FormatSet::from_iter([FormatFlag::Bold, FormatFlag::Linebreak]));
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn change_colors_come_from_options() {
        let mut reg = StyleRegistry::new("X", "#00ff00", "#ff0000");
        reg.resolve(&FormatSet::from_iter([FormatFlag::Insert]));
        reg.resolve(&FormatSet::from_iter([FormatFlag::Delete]));
        let ins = &reg.styles()[0].properties[0];
        let del = &reg.styles()[1].properties[0];
        assert!(ins.attrs.contains(&("fo:color".to_string(), "#00ff00".to_string())));
        assert!(del.attrs.contains(&("fo:color".to_string(), "#ff0000".to_string())));
        assert!(del.attrs.contains(&("style:text-line-through-style".to_string(), "solid".to_string())));
    }

    #[test]
    fn interned_definitions_are_shared() {
        let mut reg = registry();
        let a = reg.intern(
            StyleFamily::TableCell,
            Some("Default"),
            vec![StyleProperties::new("table-cell-properties").with("style:vertical-align", "top").with("fo:wrap-option", "wrap")],
        );
        let b = reg.intern(
            StyleFamily::TableCell,
            Some("Default"),
            vec![StyleProperties::new("table-cell-properties").with("fo:wrap-option", "wrap").with("style:vertical-align", "top")],
        );
        let c = reg.intern(
            StyleFamily::TableCell,
            Some("Default"),
            vec![StyleProperties::new("table-cell-properties").with("style:vertical-align", "top")],
        );
        assert_eq!(a, "Html2Odf_cell0");
        assert_eq!(a, b);
        assert_eq!(c, "Html2Odf_cell1");
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn apply_appends_to_automatic_styles() {
        let mut doc = XmlDocument::parse(
            r#"<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0"><office:automatic-styles><style:style style:name="P1"/></office:automatic-styles><office:body/></office:document-content>"#,
        )
        .unwrap();
        let mut reg = registry();
        reg.resolve(&FormatSet::from_iter([FormatFlag::Bold]));
        reg.apply(&mut doc).unwrap();
        let auto = doc.elements_by_name_ns(NS_OFFICE, "automatic-styles");
        assert_eq!(auto[0].children.len(), 2);
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains(r#"<style:style style:name="Html2Odf_bold" style:family="text"><style:text-properties fo:font-weight="bold" style:font-weight-asian="bold" style:font-weight-complex="bold"/></style:style>"#));
    }

    #[test]
    fn apply_creates_missing_container() {
        let mut doc = XmlDocument::parse(
            r#"<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0"><office:scripts/><office:body/></office:document-content>"#,
        )
        .unwrap();
        let mut reg = registry();
        reg.resolve(&FormatSet::from_iter([FormatFlag::Italic]));
        reg.apply(&mut doc).unwrap();
        let names: Vec<&str> = doc.root.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["office:scripts", "office:automatic-styles", "office:body"]);
    }

    fn any_flag() -> impl Strategy<Value = FormatFlag> {
        prop_oneof![
            Just(FormatFlag::Bold),
            Just(FormatFlag::Italic),
            Just(FormatFlag::Underline),
            Just(FormatFlag::Strike),
            Just(FormatFlag::Insert),
            Just(FormatFlag::Delete),
            Just(FormatFlag::Link),
            Just(FormatFlag::Indent),
            Just(FormatFlag::Superscript),
            Just(FormatFlag::Subscript),
        ]
    }

    proptest! {
        #[test]
        fn discovery_order_never_matters(flags in proptest::collection::vec(any_flag(), 0..8)) {
            let mut reg = registry();
            let forward: FormatSet = flags.iter().copied().collect();
            let backward: FormatSet = flags.iter().rev().copied().collect();
            let a = reg.resolve(&forward);
            let b = reg.resolve(&backward);
            let again = reg.resolve(&forward);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&a, &again);
            prop_assert_eq!(reg.len(), 1);
        }
    }
}
