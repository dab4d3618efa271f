//! HTML to ODF text markup for the word-processor path.

use crate::format::{class_flags, classify, tag_rule, FormatFlag, FormatSet, OutputKind, TAG_VOCABULARY};
use crate::html::{attr_get, children, class_list, tag_lower};
use crate::options::ParagraphStyles;
use crate::styles::StyleRegistry;
use crate::xml::{XmlElement, XmlNode};
use log::trace;
use markup5ever_rcdom::{Handle, NodeData};

/// Alternation between the first and the subsequent line-numbered paragraph
/// style. One value lives per page.
#[derive(Debug, Clone, Default)]
pub struct LineNumbering {
    first_used: bool,
}

impl LineNumbering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_style<'s>(&mut self, line_numbered: bool, styles: &'s ParagraphStyles) -> &'s str {
        if !line_numbered {
            return &styles.standard;
        }
        if self.first_used {
            &styles.line_numbered
        } else {
            self.first_used = true;
            &styles.line_numbered_first
        }
    }

    pub fn reset(&mut self) {
        self.first_used = false;
    }
}

/// Paragraph skeleton derived from the anchor paragraph of a template.
/// Extra attributes survive; the style and the identity do not.
pub fn paragraph_template(anchor: &XmlElement) -> XmlElement {
    let mut template = XmlElement::new("text:p");
    if anchor.name == "text:p" {
        template.attrs = anchor
            .attrs
            .iter()
            .filter(|(k, _)| k != "text:style-name" && k != "xml:id")
            .cloned()
            .collect();
    }
    template
}

fn change_markers(flags: &FormatSet) -> FormatSet {
    flags.iter().filter(|f| f.is_change_marker()).collect()
}

fn is_block(node: &XmlNode) -> bool {
    node.as_element()
        .is_some_and(|e| matches!(e.name.as_str(), "text:p" | "text:h" | "text:list"))
}

fn is_list(node: &XmlNode) -> bool {
    node.as_element().is_some_and(|e| e.name == "text:list")
}

fn single_paragraph_child(node: &Handle) -> Option<Handle> {
    let kids = children(node);
    match kids.as_slice() {
        [only] if tag_lower(only).as_deref() == Some("p") => Some(only.clone()),
        _ => None,
    }
}

pub struct TextTransformer<'a> {
    registry: &'a mut StyleRegistry,
    styles: &'a ParagraphStyles,
    numbering: &'a mut LineNumbering,
    template: XmlElement,
}

impl<'a> TextTransformer<'a> {
    pub fn new(registry: &'a mut StyleRegistry, styles: &'a ParagraphStyles, numbering: &'a mut LineNumbering) -> Self {
        Self {
            registry,
            styles,
            numbering,
            template: XmlElement::new("text:p"),
        }
    }

    pub fn with_template(mut self, template: XmlElement) -> Self {
        self.template = template;
        self
    }

    /// Converts the children of a parsed `<body>`. Loose inline content at the
    /// top level ends up in synthesized paragraphs.
    pub fn html_to_nodes(&mut self, body: &Handle, line_numbered: bool) -> Vec<XmlNode> {
        let root = FormatSet::new();
        let mut nodes = Vec::new();
        for child in children(body) {
            nodes.extend(self.transform(&child, line_numbered, false, &root));
        }
        self.wrap_loose(nodes, line_numbered)
    }

    pub fn transform(&mut self, node: &Handle, line_numbered: bool, in_p: bool, inherited: &FormatSet) -> Vec<XmlNode> {
        match &node.data {
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                vec![self.text_leaf(text, inherited)]
            }
            NodeData::Element { .. } => self.element(node, line_numbered, in_p, inherited),
            NodeData::Doctype { .. } => Vec::new(),
            _ => {
                trace!("skipping unsupported node kind");
                Vec::new()
            }
        }
    }

    fn transform_children(&mut self, node: &Handle, line_numbered: bool, in_p: bool, inherited: &FormatSet) -> Vec<XmlNode> {
        let mut out = Vec::new();
        for child in children(node) {
            out.extend(self.transform(&child, line_numbered, in_p, inherited));
        }
        out
    }

    fn element(&mut self, node: &Handle, line_numbered: bool, in_p: bool, inherited: &FormatSet) -> Vec<XmlNode> {
        let tag = tag_lower(node).unwrap_or_default();
        if !TAG_VOCABULARY.contains(&tag.as_str()) {
            trace!("unknown tag <{tag}> treated as span");
        }
        let classes = class_list(node);
        let block_inherited = inherited.union(&change_markers(&class_flags(&classes)));

        match tag_rule(&tag).output {
            OutputKind::Span => {
                let mut span = XmlElement::new("text:span");
                self.set_text_style(&mut span, &classify(&tag, &classes));
                span.children = self.transform_children(node, line_numbered, in_p, inherited);
                Self::hoist_lists(span)
            }
            OutputKind::LineBreak => vec![XmlElement::new("text:line-break").into()],
            OutputKind::Link => {
                let mut link = XmlElement::new("text:a");
                if let Some(href) = attr_get(node, "href").filter(|h| !h.is_empty()) {
                    link.set_attr("xlink:href", href);
                }
                self.set_text_style(&mut link, &classify(&tag, &classes).without(FormatFlag::Link));
                link.children = self.transform_children(node, line_numbered, in_p, inherited);
                Self::hoist_lists(link)
            }
            OutputKind::Paragraph => {
                let mut el = self.base_node(in_p, line_numbered);
                el.children = self.transform_children(node, line_numbered, true, &block_inherited);
                Self::hoist_lists(el)
            }
            OutputKind::Transparent => self.transform_children(node, line_numbered, in_p, &block_inherited),
            OutputKind::Blockquote => {
                let mut el = self.base_node(in_p, line_numbered);
                el.set_attr("text:style-name", self.styles.blockquote(line_numbered));
                let source = single_paragraph_child(node).unwrap_or_else(|| node.clone());
                let inner = block_inherited.union(&change_markers(&class_flags(&class_list(&source))));
                el.children = self.transform_children(&source, line_numbered, true, &inner);
                Self::hoist_lists(el)
            }
            OutputKind::List => {
                let mut list = XmlElement::new("text:list");
                let mut loose = Vec::new();
                for child in children(node) {
                    for out in self.transform(&child, line_numbered, in_p, &block_inherited) {
                        if out.as_element().is_some_and(|e| e.name == "text:list-item") {
                            self.flush_list_item(&mut loose, &mut list, line_numbered);
                            list.push(out);
                        } else {
                            loose.push(out);
                        }
                    }
                }
                self.flush_list_item(&mut loose, &mut list, line_numbered);
                vec![list.into()]
            }
            OutputKind::ListItem => {
                let mut item = XmlElement::new("text:list-item");
                let kids = self.transform_children(node, line_numbered, false, &block_inherited);
                item.children = self.wrap_loose(kids, line_numbered);
                vec![item.into()]
            }
            OutputKind::Heading(level) => {
                let mut el = self.base_node(in_p, line_numbered);
                el.set_attr("text:style-name", self.styles.heading(level));
                el.children = self.transform_children(node, line_numbered, true, &block_inherited);
                Self::hoist_lists(el)
            }
        }
    }

    fn text_leaf(&mut self, text: String, inherited: &FormatSet) -> XmlNode {
        let mut node = XmlNode::Text(text);
        if node.is_blank() {
            return node;
        }
        // Delete innermost, Insert outermost.
        for flag in [FormatFlag::Delete, FormatFlag::Insert] {
            if inherited.contains(flag) {
                let style = self.registry.resolve(&FormatSet::from_iter([flag]));
                node = XmlElement::new("text:span")
                    .with_attr("text:style-name", style)
                    .with_child(node)
                    .into();
            }
        }
        node
    }

    fn set_text_style(&mut self, el: &mut XmlElement, flags: &FormatSet) {
        if !flags.is_empty() {
            el.set_attr("text:style-name", self.registry.resolve(flags));
        }
    }

    fn base_node(&mut self, in_p: bool, line_numbered: bool) -> XmlElement {
        let mut el = if in_p {
            XmlElement::new("text:span")
        } else {
            self.template.clone()
        };
        let style = self.numbering.next_style(line_numbered, self.styles).to_string();
        el.set_attr("text:style-name", style);
        el
    }

    /// Moves every run of inline content between block nodes into a fresh
    /// paragraph. Whitespace-only runs are dropped.
    fn wrap_loose(&mut self, nodes: Vec<XmlNode>, line_numbered: bool) -> Vec<XmlNode> {
        let mut out = Vec::with_capacity(nodes.len());
        let mut run = Vec::new();
        for node in nodes {
            if is_block(&node) {
                self.flush_run(&mut run, &mut out, line_numbered);
                out.push(node);
            } else {
                run.push(node);
            }
        }
        self.flush_run(&mut run, &mut out, line_numbered);
        out
    }

    /// Content of a list outside any `li` goes into a list item of its own.
    fn flush_list_item(&mut self, loose: &mut Vec<XmlNode>, list: &mut XmlElement, line_numbered: bool) {
        if loose.iter().all(XmlNode::is_blank) {
            loose.clear();
            return;
        }
        trace!("wrapping list content outside <li> into a list item");
        let mut item = XmlElement::new("text:list-item");
        item.children = self.wrap_loose(std::mem::take(loose), line_numbered);
        list.push(item);
    }

    /// Splits `el` around its `text:list` children, since lists cannot live
    /// in paragraph content. The pieces keep `el`'s attributes; blank pieces
    /// are dropped.
    fn hoist_lists(el: XmlElement) -> Vec<XmlNode> {
        if !el.children.iter().any(is_list) {
            return vec![el.into()];
        }
        let next = el.shallow_clone();
        let mut piece = el.shallow_clone();
        let mut out = Vec::new();
        for child in el.children {
            if is_list(&child) {
                let done = std::mem::replace(&mut piece, next.clone());
                if !done.children.iter().all(XmlNode::is_blank) {
                    out.push(done.into());
                }
                out.push(child);
            } else {
                piece.push(child);
            }
        }
        if !piece.children.iter().all(XmlNode::is_blank) {
            out.push(piece.into());
        }
        out
    }

    fn flush_run(&mut self, run: &mut Vec<XmlNode>, out: &mut Vec<XmlNode>, line_numbered: bool) {
        if run.iter().all(XmlNode::is_blank) {
            run.clear();
            return;
        }
        let mut p = self.base_node(false, line_numbered);
        p.children = std::mem::take(run);
        out.push(p.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{body, parse_fragment};
    use crate::options::Options;

    fn nodes(html: &str, line_numbered: bool) -> Vec<XmlNode> {
        let dom = parse_fragment(html);
        let body = body(&dom).unwrap();
        let mut registry = StyleRegistry::from_options(&Options::default());
        let styles = ParagraphStyles::default();
        let mut numbering = LineNumbering::new();
        TextTransformer::new(&mut registry, &styles, &mut numbering).html_to_nodes(&body, line_numbered)
    }

    fn render(nodes: &[XmlNode]) -> String {
        nodes
            .iter()
            .map(|n| match n {
                XmlNode::Element(e) => e.to_xml().unwrap(),
                XmlNode::Text(t) => t.clone(),
                XmlNode::Comment(_) => String::new(),
            })
            .collect()
    }

    fn convert(html: &str) -> String {
        render(&nodes(html, false))
    }

    fn paragraph_inside_paragraph(el: &XmlElement, in_p: bool) -> bool {
        let is_p = el.name == "text:p";
        if is_p && in_p {
            return true;
        }
        let below = if el.name == "text:list-item" { false } else { in_p || is_p };
        el.child_elements().any(|c| paragraph_inside_paragraph(c, below))
    }

    fn list_inside_paragraph(el: &XmlElement, in_p: bool) -> bool {
        if el.name == "text:list" && in_p {
            return true;
        }
        let below = if el.name == "text:list-item" {
            false
        } else {
            in_p || matches!(el.name.as_str(), "text:p" | "text:h")
        };
        el.child_elements().any(|c| list_inside_paragraph(c, below))
    }

    #[test]
    fn plain_paragraph() {
        assert_eq!(
            convert("<p>Hello</p>"),
            r#"<text:p text:style-name="Html2Odf_20_Standard">Hello</text:p>"#
        );
    }

    #[test]
    fn insert_wraps_delete() {
        let out = convert("<ins><del>x</del></ins>");
        assert!(out.contains(
            r#"<text:span text:style-name="Html2Odf_ins"><text:span text:style-name="Html2Odf_del">x</text:span></text:span>"#
        ));
    }

    #[test]
    fn inherited_change_classes_layer_on_text() {
        let out = convert(r#"<p class="deleted inserted">x</p>"#);
        assert_eq!(
            out,
            r#"<text:p text:style-name="Html2Odf_20_Standard"><text:span text:style-name="Html2Odf_ins"><text:span text:style-name="Html2Odf_del">x</text:span></text:span></text:p>"#
        );
    }

    #[test]
    fn div_is_transparent() {
        assert_eq!(convert("<div><b>x</b></div>"), convert("<b>x</b>"));
        assert!(!convert("<div><p>a</p></div>").contains("div"));
    }

    #[test]
    fn nested_paragraph_becomes_span() {
        let out = convert("<blockquote><p>a</p><p>b</p></blockquote>");
        assert_eq!(
            out,
            r#"<text:p text:style-name="Html2Odf_20_Blockquote"><text:span text:style-name="Html2Odf_20_Standard">a</text:span><text:span text:style-name="Html2Odf_20_Standard">b</text:span></text:p>"#
        );
    }

    #[test]
    fn blockquote_with_single_paragraph_is_unwrapped() {
        assert_eq!(
            convert("<blockquote><p>q</p></blockquote>"),
            r#"<text:p text:style-name="Html2Odf_20_Blockquote">q</text:p>"#
        );
    }

    #[test]
    fn list_items_hold_only_paragraphs_and_lists() {
        let out = nodes("<ul><li>a <b>b</b><p>c</p>d<ul><li>e</li></ul></li><li> </li></ul>", false);
        let list = out[0].as_element().unwrap();
        assert_eq!(list.name, "text:list");
        let items: Vec<&XmlElement> = list.child_elements().collect();
        assert_eq!(items.len(), 2);
        let kinds: Vec<&str> = items[0].child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(kinds, vec!["text:p", "text:p", "text:p", "text:list"]);
        assert_eq!(items[0].children[0].text_content(), "a b");
        assert!(items[1].children.is_empty());
    }

    #[test]
    fn headings_use_heading_styles() {
        let out = convert("<h1>A</h1><h6>B</h6>");
        assert_eq!(
            out,
            r#"<text:p text:style-name="Html2Odf_20_H1">A</text:p><text:p text:style-name="Html2Odf_20_H4">B</text:p>"#
        );
    }

    #[test]
    fn links_and_breaks() {
        let out = convert(r#"<p><a href="https://example.org">l</a><br><a>m</a></p>"#);
        assert_eq!(
            out,
            r#"<text:p text:style-name="Html2Odf_20_Standard"><text:a xlink:href="https://example.org">l</text:a><text:line-break/><text:a>m</text:a></text:p>"#
        );
    }

    #[test]
    fn unknown_tags_are_spans() {
        let out = convert(r#"<marquee class="strike">x</marquee><span>y</span>"#);
        assert_eq!(
            out,
            r#"<text:p text:style-name="Html2Odf_20_Standard"><text:span text:style-name="Html2Odf_strike">x</text:span><text:span>y</text:span></text:p>"#
        );
    }

    #[test]
    fn line_numbering_alternates_until_reset() {
        let out = render(&nodes("<p>a</p><p>b</p><p>c</p>", true));
        assert_eq!(
            out,
            concat!(
                r#"<text:p text:style-name="Html2Odf_20_LineNumbered_20_First">a</text:p>"#,
                r#"<text:p text:style-name="Html2Odf_20_LineNumbered_20_Standard">b</text:p>"#,
                r#"<text:p text:style-name="Html2Odf_20_LineNumbered_20_Standard">c</text:p>"#
            )
        );

        let styles = ParagraphStyles::default();
        let mut numbering = LineNumbering::new();
        assert_eq!(numbering.next_style(true, &styles), styles.line_numbered_first);
        assert_eq!(numbering.next_style(false, &styles), styles.standard);
        assert_eq!(numbering.next_style(true, &styles), styles.line_numbered);
        numbering.reset();
        assert_eq!(numbering.next_style(true, &styles), styles.line_numbered_first);
    }

    #[test]
    fn loose_text_gets_a_paragraph() {
        assert_eq!(
            convert("loose <i>text</i>"),
            r#"<text:p text:style-name="Html2Odf_20_Standard">loose <text:span text:style-name="Html2Odf_italic">text</text:span></text:p>"#
        );
        assert_eq!(convert("  "), "");
    }

    #[test]
    fn template_attributes_are_kept() {
        let anchor = XmlElement::new("text:p")
            .with_attr("text:style-name", "P9")
            .with_attr("xml:id", "x1")
            .with_attr("text:class-names", "Body");
        let dom = parse_fragment("<p>a</p>");
        let body = body(&dom).unwrap();
        let mut registry = StyleRegistry::from_options(&Options::default());
        let styles = ParagraphStyles::default();
        let mut numbering = LineNumbering::new();
        let out = TextTransformer::new(&mut registry, &styles, &mut numbering)
            .with_template(paragraph_template(&anchor))
            .html_to_nodes(&body, false);
        assert_eq!(
            render(&out),
            r#"<text:p text:class-names="Body" text:style-name="Html2Odf_20_Standard">a</text:p>"#
        );
    }

    #[test]
    fn paragraphs_never_nest() {
        let inputs = [
            "<p>a<b>b</b></p><blockquote>q<p>x</p></blockquote>",
            "<h2>t<span class=\"ins\">u</span></h2><div><div><p>deep</p></div></div>",
            "<ol><li><p>a</p><blockquote><p>b</p></blockquote><h3>c</h3></li></ol>",
            "<blockquote><h1>x</h1><p>y</p></blockquote>",
            "<blockquote><ul><li>a</li></ul></blockquote>",
            "<blockquote>intro<b>x<ol><li>a</li></ol>y</b>tail</blockquote>",
            "<h2>t<ul><li>x</li></ul></h2><ul><li><blockquote><ul><li>z</li></ul></blockquote></li></ul>",
        ];
        for html in inputs {
            for node in nodes(html, true) {
                let el = node.as_element().unwrap();
                assert!(!paragraph_inside_paragraph(el, false), "nested paragraph for {html}");
                assert!(!list_inside_paragraph(el, false), "list inside paragraph for {html}");
            }
        }
    }

    #[test]
    fn lists_split_their_paragraph() {
        let out = nodes("<blockquote>intro<ul><li>a</li></ul>tail</blockquote>", false);
        let shape: Vec<(&str, Option<&str>, String)> = out
            .iter()
            .filter_map(XmlNode::as_element)
            .map(|e| (e.name.as_str(), e.attr("text:style-name"), e.text_content()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("text:p", Some("Html2Odf_20_Blockquote"), "intro".to_string()),
                ("text:list", None, "a".to_string()),
                ("text:p", Some("Html2Odf_20_Blockquote"), "tail".to_string()),
            ]
        );

        let only_list = convert("<blockquote><ul><li>a</li></ul></blockquote>");
        assert!(only_list.starts_with("<text:list>"), "{only_list}");
    }

    #[test]
    fn stray_list_content_gets_an_item() {
        let out = nodes("<ul>stray<li>a</li> <b>bold</b></ul>", false);
        let list = out[0].as_element().unwrap();
        assert!(list.children.iter().all(|c| c.as_element().is_some_and(|e| e.name == "text:list-item")));
        let items: Vec<String> = list
            .child_elements()
            .map(|i| i.text_content().trim().to_string())
            .collect();
        assert_eq!(items, vec!["stray", "a", "bold"]);
        for item in list.child_elements() {
            assert_eq!(item.child_elements().next().map(|p| p.name.as_str()), Some("text:p"));
        }
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            convert("<p>a<!-- c -->b</p>"),
            r#"<text:p text:style-name="Html2Odf_20_Standard">ab</text:p>"#
        );
    }

    #[test]
    fn line_numbered_blockquote_style() {
        assert_eq!(
            render(&nodes("<blockquote>q</blockquote>", true)),
            r#"<text:p text:style-name="Html2Odf_20_Blockquote_20_LineNumbered">q</text:p>"#
        );
    }
}
