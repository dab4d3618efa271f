//! Spreadsheet documents: a sparse cell matrix rendered into the single
//! table of a template.

use crate::error::{Error, Result};
use crate::flatten::html_to_paragraphs;
use crate::format::class_flags;
use crate::html::{body, prepare, text_content};
use crate::layout::PageLayout;
use crate::options::Options;
use crate::sanitize::{AllowListSanitizer, Sanitizer};
use crate::styles::{StyleFamily, StyleProperties, StyleRegistry};
use crate::template::{store_document, OdfPackage, TemplateAccessor, CONTENT_XML};
use crate::xml::{XmlDocument, XmlElement, XmlNode, NS_CALCEXT, NS_FO, NS_OFFICE, NS_STYLE, NS_TABLE, NS_TEXT, NS_XLINK};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Width assumed for columns without an explicit width, in cm.
const DEFAULT_COLUMN_WIDTH_CM: f64 = 2.0;
/// Characters that fit into one centimeter of a line.
const CHARS_PER_CM: f64 = 6.0;
/// Height of one text line, in cm.
const LINE_HEIGHT_CM: f64 = 0.45;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum CellContent {
    Text(String),
    /// Numeric text, used both as display text and as machine value.
    Number(String),
    Html(String),
    Link { href: String, text: String },
}

impl CellContent {
    pub fn number(value: impl ToString) -> Self {
        CellContent::Number(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CellEntry {
    pub row: usize,
    pub col: usize,
    pub content: CellContent,
    /// Classes applied to the whole cell; only meaningful for HTML content.
    #[serde(default)]
    pub css_class: Option<String>,
    /// Cell properties merged into the cell's style, e.g. `fo:wrap-option`.
    #[serde(default)]
    pub style_overrides: BTreeMap<String, String>,
}

impl CellEntry {
    pub fn new(row: usize, col: usize, content: CellContent) -> Self {
        Self {
            row,
            col,
            content,
            css_class: None,
            style_overrides: BTreeMap::new(),
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.css_class = Some(class.into());
        self
    }

    pub fn with_style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.style_overrides.insert(name.into(), value.into());
        self
    }

    fn no_wrap(&self) -> bool {
        self.style_overrides
            .get("fo:wrap-option")
            .is_some_and(|v| v == "no-wrap")
    }
}

/// Explicit style properties of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellStyle {
    pub cell: StyleProperties,
    pub text: StyleProperties,
}

impl CellStyle {
    fn new() -> Self {
        Self {
            cell: StyleProperties::new("table-cell-properties"),
            text: StyleProperties::new("text-properties"),
        }
    }
}

/// Decimal rendering with at most three fractional digits.
pub fn format_length(value: f64) -> String {
    let s = format!("{value:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Raises the minimum height of `row` to `lines`; an unset row counts as one line.
fn raise_row_height(heights: &mut BTreeMap<usize, f64>, row: usize, lines: f64) {
    let current = heights.get(&row).copied().unwrap_or(1.0);
    heights.insert(row, current.max(lines));
}

fn merge_cell_style(styles: &mut BTreeMap<(usize, usize), CellStyle>, row: usize, col: usize, cell: &[(&str, &str)], text: &[(&str, &str)]) {
    let entry = styles.entry((row, col)).or_insert_with(CellStyle::new);
    for (k, v) in cell {
        entry.cell.set(k, *v);
    }
    for (k, v) in text {
        entry.text.set(k, *v);
    }
}

type PreSaveHook = Box<dyn FnMut(&mut XmlDocument)>;

/// A spreadsheet under construction.
pub struct Spreadsheet<T: TemplateAccessor> {
    template: T,
    options: Options,
    sanitizer: Box<dyn Sanitizer>,
    registry: StyleRegistry,
    cells: BTreeMap<(usize, usize), CellEntry>,
    max_row: usize,
    max_col: usize,
    column_widths: BTreeMap<usize, f64>,
    row_heights: BTreeMap<usize, f64>,
    cell_styles: BTreeMap<(usize, usize), CellStyle>,
    layout: PageLayout,
    pre_save_hook: Option<PreSaveHook>,
}

impl<T: TemplateAccessor> Spreadsheet<T> {
    pub fn new(template: T, options: Options) -> Self {
        Self {
            template,
            registry: StyleRegistry::from_options(&options),
            options,
            sanitizer: Box::new(AllowListSanitizer),
            cells: BTreeMap::new(),
            max_row: 0,
            max_col: 0,
            column_widths: BTreeMap::new(),
            row_heights: BTreeMap::new(),
            cell_styles: BTreeMap::new(),
            layout: PageLayout::default(),
            pre_save_hook: None,
        }
    }

    pub fn with_sanitizer(mut self, sanitizer: Box<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn set_cell(&mut self, row: usize, col: usize, content: CellContent) {
        self.insert_cell(CellEntry::new(row, col, content));
    }

    /// Stores a cell, replacing whatever was at its position.
    pub fn insert_cell(&mut self, entry: CellEntry) {
        self.max_row = self.max_row.max(entry.row);
        self.max_col = self.max_col.max(entry.col);
        self.cells.insert((entry.row, entry.col), entry);
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellEntry> {
        self.cells.get(&(row, col))
    }

    pub fn set_column_width(&mut self, col: usize, width_cm: f64) {
        self.column_widths.insert(col, width_cm);
    }

    /// Minimum row height in lines. Never lowers an earlier hint.
    pub fn set_min_row_height(&mut self, row: usize, lines: f64) {
        self.max_row = self.max_row.max(row);
        raise_row_height(&mut self.row_heights, row, lines);
    }

    pub fn min_row_height(&self, row: usize) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }

    /// Merges cell and text properties into the style of one cell.
    pub fn set_cell_style(&mut self, row: usize, col: usize, cell: &[(&str, &str)], text: &[(&str, &str)]) {
        merge_cell_style(&mut self.cell_styles, row, col, cell, text);
    }

    /// Draws a solid black frame of `width_pt` around the given rectangle.
    pub fn draw_border(&mut self, from_row: usize, from_col: usize, to_row: usize, to_col: usize, width_pt: f64) {
        let line = format!("{}pt solid #000000", format_length(width_pt));
        let line = line.as_str();
        for row in from_row..=to_row {
            self.set_cell_style(row, from_col, &[("fo:border-left", line)], &[]);
            self.set_cell_style(row, to_col, &[("fo:border-right", line)], &[]);
        }
        for col in from_col..=to_col {
            self.set_cell_style(from_row, col, &[("fo:border-top", line)], &[]);
            self.set_cell_style(to_row, col, &[("fo:border-bottom", line)], &[]);
        }
    }

    /// Runs on the finished content tree right before it is serialized.
    pub fn set_pre_save_hook(&mut self, hook: impl FnMut(&mut XmlDocument) + 'static) {
        self.pre_save_hook = Some(Box::new(hook));
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

        let tables = doc.find_paths(NS_TABLE, "table");
        let table_path = match tables.as_slice() {
            [only] => only.clone(),
            _ => {
                return Err(Error::MalformedTemplate(format!(
                    "expected exactly one table:table, found {}",
                    tables.len()
                )))
            }
        };

        let mut row_heights = self.row_heights.clone();
        let mut cell_styles = self.cell_styles.clone();
        let mut children: Vec<XmlNode> = Vec::with_capacity(self.max_col + self.max_row + 2);

        for col in 0..=self.max_col {
            let mut column = XmlElement::new("table:table-column");
            if let Some(width) = self.column_widths.get(&col) {
                let name = self.registry.intern(
                    StyleFamily::TableColumn,
                    None,
                    vec![StyleProperties::new("table-column-properties")
                        .with("style:column-width", format!("{}cm", format_length(*width)))],
                );
                column.set_attr("table:style-name", name);
            }
            children.push(column.into());
        }

        let mut rows = Vec::with_capacity(self.max_row + 1);
        for row in 0..=self.max_row {
            let mut cells = Vec::with_capacity(self.max_col + 1);
            for col in 0..=self.max_col {
                let mut cell = XmlElement::new("table:table-cell");
                if let Some(entry) = self.cells.get(&(row, col)).cloned() {
                    self.render_cell(&entry, &mut cell, &mut row_heights, &mut cell_styles);
                }
                cells.push(cell);
            }
            rows.push(cells);
        }
        debug!("rendered {} x {} cells", self.max_row + 1, self.max_col + 1);

        let mut row_elements = Vec::with_capacity(rows.len());
        for row in 0..=self.max_row {
            let mut element = XmlElement::new("table:table-row");
            if let Some(lines) = row_heights.get(&row) {
                let name = self.registry.intern(
                    StyleFamily::TableRow,
                    None,
                    vec![StyleProperties::new("table-row-properties")
                        .with("style:row-height", format!("{}cm", format_length(lines * LINE_HEIGHT_CM)))],
                );
                element.set_attr("table:style-name", name);
            }
            row_elements.push(element);
        }

        for (row, (mut element, cells)) in row_elements.into_iter().zip(rows).enumerate() {
            for (col, mut cell) in cells.into_iter().enumerate() {
                let style = cell_styles.get(&(row, col)).cloned().unwrap_or_else(CellStyle::new);
                let mut props = StyleProperties::new("table-cell-properties").with("style:vertical-align", "top");
                for (k, v) in &style.cell.attrs {
                    props.set(k, v.as_str());
                }
                let mut definition = vec![props];
                if !style.text.attrs.is_empty() {
                    definition.push(style.text);
                }
                let name = self.registry.intern(StyleFamily::TableCell, Some("Default"), definition);
                cell.set_attr("table:style-name", name);
                element.push(cell);
            }
            children.push(element.into());
        }

        if let Some(table) = doc.element_at_mut(&table_path) {
            table.children = children;
        }
        self.registry.apply(&mut doc)?;
        for (prefix, ns) in [
            ("office", NS_OFFICE),
            ("style", NS_STYLE),
            ("text", NS_TEXT),
            ("table", NS_TABLE),
            ("fo", NS_FO),
            ("xlink", NS_XLINK),
            ("calcext", NS_CALCEXT),
        ] {
            doc.ensure_namespace(prefix, ns);
        }
        if let Some(hook) = self.pre_save_hook.as_mut() {
            hook(&mut doc);
        }
        doc.to_xml()
    }

    fn render_cell(
        &mut self,
        entry: &CellEntry,
        cell: &mut XmlElement,
        row_heights: &mut BTreeMap<usize, f64>,
        cell_styles: &mut BTreeMap<(usize, usize), CellStyle>,
    ) {
        let (row, col) = (entry.row, entry.col);
        let overrides: Vec<(&str, &str)> = entry
            .style_overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if !overrides.is_empty() {
            merge_cell_style(cell_styles, row, col, &overrides, &[]);
        }

        match &entry.content {
            CellContent::Text(text) => cell.push(XmlElement::new("text:p").with_text(text.as_str())),
            CellContent::Number(value) => {
                cell.set_attr("office:value-type", "float");
                cell.set_attr("calcext:value-type", "float");
                cell.set_attr("office:value", value.as_str());
                cell.push(XmlElement::new("text:p").with_text(value.as_str()));
            }
            CellContent::Link { href, text } => cell.push(
                XmlElement::new("text:p").with_child(
                    XmlElement::new("text:a")
                        .with_attr("xlink:href", href.as_str())
                        .with_text(text.as_str()),
                ),
            ),
            CellContent::Html(html) => {
                let dom = prepare(html, self.options.trust_html, self.sanitizer.as_ref());
                let classes: Vec<&str> = entry
                    .css_class
                    .as_deref()
                    .map(|c| c.split_whitespace().collect())
                    .unwrap_or_default();
                for p in html_to_paragraphs(&dom, class_flags(&classes), &mut self.registry) {
                    cell.push(p);
                }

                let (wrap, lines) = if entry.no_wrap() {
                    ("no-wrap", 1.0)
                } else {
                    let width = self
                        .column_widths
                        .get(&col)
                        .copied()
                        .unwrap_or(DEFAULT_COLUMN_WIDTH_CM);
                    let chars = body(&dom).map(|b| text_content(&b).chars().count()).unwrap_or(0);
                    ("wrap", chars as f64 / (width * CHARS_PER_CM))
                };
                trace!("cell {row}/{col}: {wrap}, {lines:.2} lines");
                merge_cell_style(cell_styles, row, col, &[("fo:wrap-option", wrap)], &[("fo:hyphenate", "true")]);
                raise_row_height(row_heights, row, lines);
            }
        }
    }

    /// Writes the generated parts back and hands the template out again.
    pub fn finish(mut self) -> Result<T> {
        let content = self.create()?;
        store_document(&mut self.template, content, &self.layout)?;
        Ok(self.template)
    }
}

impl Spreadsheet<OdfPackage> {
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        Ok(Self::new(OdfPackage::open(path)?, options))
    }

    pub fn finish_and_get_document(self) -> Result<Vec<u8>> {
        self.finish()?.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MemoryTemplate;

    const CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:automatic-styles/><office:body><office:spreadsheet><table:table table:name="Sheet1"><table:table-column/><table:table-row><table:table-cell/></table:table-row></table:table></office:spreadsheet></office:body></office:document-content>"#;

    fn sheet() -> Spreadsheet<MemoryTemplate> {
        Spreadsheet::new(MemoryTemplate::new().with_part(CONTENT_XML, CONTENT), Options::default())
    }

    fn render(sheet: &mut Spreadsheet<MemoryTemplate>) -> XmlDocument {
        XmlDocument::parse(&sheet.create().unwrap()).unwrap()
    }

    fn style_props<'d>(doc: &'d XmlDocument, name: &str) -> Vec<&'d XmlElement> {
        doc.elements_by_name_ns(NS_STYLE, "style")
            .into_iter()
            .find(|s| s.attr("style:name") == Some(name))
            .map(|s| s.child_elements().collect())
            .unwrap_or_default()
    }

    #[test]
    fn lengths_are_trimmed() {
        assert_eq!(format_length(2.0), "2");
        assert_eq!(format_length(0.45), "0.45");
        assert_eq!(format_length(1.0 / 3.0), "0.333");
        assert_eq!(format_length(0.0), "0");
    }

    #[test]
    fn number_cells_agree_with_their_text() {
        let mut s = sheet();
        s.set_cell(0, 0, CellContent::Number("42.5".to_string()));
        let doc = render(&mut s);
        let cells = doc.elements_by_name_ns(NS_TABLE, "table-cell");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].attr("office:value"), Some("42.5"));
        assert_eq!(cells[0].attr("office:value-type"), Some("float"));
        assert_eq!(cells[0].attr("calcext:value-type"), Some("float"));
        assert_eq!(cells[0].text_content(), "42.5");
    }

    #[test]
    fn row_heights_never_shrink() {
        let mut s = sheet();
        s.set_min_row_height(3, 2.0);
        s.set_min_row_height(3, 1.0);
        assert_eq!(s.min_row_height(3), Some(2.0));
        s.set_min_row_height(4, 0.5);
        assert_eq!(s.min_row_height(4), Some(1.0));

        let doc = render(&mut s);
        let rows = doc.elements_by_name_ns(NS_TABLE, "table-row");
        assert_eq!(rows.len(), 5);
        let style = rows[3].attr("table:style-name").unwrap();
        let props = style_props(&doc, style);
        assert_eq!(props[0].attr("style:row-height"), Some("0.9cm"));
        assert_eq!(rows[0].attr("table:style-name"), None);
    }

    #[test]
    fn matrix_is_dense() {
        let mut s = sheet();
        s.set_cell(1, 2, CellContent::Text("x".to_string()));
        s.set_column_width(1, 3.5);
        let doc = render(&mut s);
        let columns = doc.elements_by_name_ns(NS_TABLE, "table-column");
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].attr("table:style-name"), None);
        let col_style = columns[1].attr("table:style-name").unwrap();
        assert_eq!(style_props(&doc, col_style)[0].attr("style:column-width"), Some("3.5cm"));
        let rows = doc.elements_by_name_ns(NS_TABLE, "table-row");
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.child_elements().count(), 3);
        }
    }

    #[test]
    fn empty_sheet_has_one_cell() {
        let mut s = sheet();
        let doc = render(&mut s);
        assert_eq!(doc.elements_by_name_ns(NS_TABLE, "table-row").len(), 1);
        assert_eq!(doc.elements_by_name_ns(NS_TABLE, "table-cell").len(), 1);
    }

    #[test]
    fn every_cell_is_top_aligned() {
        let mut s = sheet();
        s.set_cell(0, 1, CellContent::Text("a".to_string()));
        let doc = render(&mut s);
        for cell in doc.elements_by_name_ns(NS_TABLE, "table-cell") {
            let name = cell.attr("table:style-name").unwrap();
            let props = style_props(&doc, name);
            assert_eq!(props[0].attr("style:vertical-align"), Some("top"));
        }
    }

    #[test]
    fn html_cells_wrap_and_grow_rows() {
        let mut s = sheet();
        s.set_column_width(0, 1.0);
        s.set_cell(0, 0, CellContent::Html(format!("<p>{}</p>", "x".repeat(30))));
        s.insert_cell(CellEntry::new(1, 0, CellContent::Html(format!("<p>{}</p>", "y".repeat(30)))).with_style("fo:wrap-option", "no-wrap"));
        let doc = render(&mut s);

        let rows = doc.elements_by_name_ns(NS_TABLE, "table-row");
        let first = style_props(&doc, rows[0].attr("table:style-name").unwrap());
        assert_eq!(first[0].attr("style:row-height"), Some("2.25cm"));
        let second = style_props(&doc, rows[1].attr("table:style-name").unwrap());
        assert_eq!(second[0].attr("style:row-height"), Some("0.45cm"));

        let cells = doc.elements_by_name_ns(NS_TABLE, "table-cell");
        let wrapped = style_props(&doc, cells[0].attr("table:style-name").unwrap());
        assert_eq!(wrapped[0].attr("fo:wrap-option"), Some("wrap"));
        assert_eq!(wrapped[1].attr("fo:hyphenate"), Some("true"));
        let unwrapped = style_props(&doc, cells[1].attr("table:style-name").unwrap());
        assert_eq!(unwrapped[0].attr("fo:wrap-option"), Some("no-wrap"));
    }

    #[test]
    fn html_cells_use_cell_classes() {
        let mut s = sheet();
        s.insert_cell(CellEntry::new(0, 0, CellContent::Html("<p>A</p><p>B</p>".to_string())).with_class("inserted"));
        let doc = render(&mut s);
        let cell = doc.elements_by_name_ns(NS_TABLE, "table-cell")[0];
        let paragraphs: Vec<&XmlElement> = cell.child_elements().collect();
        assert_eq!(paragraphs.len(), 2);
        for p in paragraphs {
            let span = p.child_elements().next().unwrap();
            assert_eq!(span.attr("text:style-name"), Some("Html2Odf_ins"));
        }
    }

    #[test]
    fn trusted_html_comments_are_skipped() {
        let options = Options {
            trust_html: true,
            ..Options::default()
        };
        let mut s = Spreadsheet::new(MemoryTemplate::new().with_part(CONTENT_XML, CONTENT), options);
        s.set_cell(0, 0, CellContent::Html("<p>a<!-- c -->b</p>".to_string()));
        let doc = render(&mut s);
        let cell = doc.elements_by_name_ns(NS_TABLE, "table-cell")[0];
        assert_eq!(cell.text_content(), "ab");
        assert!(!doc.to_xml().unwrap().contains("<!--"));
    }

    #[test]
    fn links_and_borders() {
        let mut s = sheet();
        s.set_cell(0, 0, CellContent::Link {
            href: "mailto:someone@example.org".to_string(),
            text: "someone".to_string(),
        });
        s.set_cell(1, 1, CellContent::Text("b".to_string()));
        s.draw_border(0, 0, 1, 1, 0.5);
        let doc = render(&mut s);

        let links = doc.elements_by_name_ns(NS_TEXT, "a");
        assert_eq!(links[0].attr("xlink:href"), Some("mailto:someone@example.org"));
        assert_eq!(links[0].text_content(), "someone");

        let cells = doc.elements_by_name_ns(NS_TABLE, "table-cell");
        let top_left = style_props(&doc, cells[0].attr("table:style-name").unwrap());
        assert_eq!(top_left[0].attr("fo:border-left"), Some("0.5pt solid #000000"));
        assert_eq!(top_left[0].attr("fo:border-top"), Some("0.5pt solid #000000"));
        assert_eq!(top_left[0].attr("fo:border-right"), None);
        let bottom_right = style_props(&doc, cells[3].attr("table:style-name").unwrap());
        assert_eq!(bottom_right[0].attr("fo:border-right"), Some("0.5pt solid #000000"));
        assert_eq!(bottom_right[0].attr("fo:border-bottom"), Some("0.5pt solid #000000"));
    }

    #[test]
    fn template_must_hold_one_table() {
        let no_table = CONTENT.replace("table:table ", "table:other ").replace("</table:table>", "</table:other>");
        let mut s = Spreadsheet::new(MemoryTemplate::new().with_part(CONTENT_XML, no_table.as_str()), Options::default());
        assert!(matches!(s.create(), Err(Error::MalformedTemplate(_))));

        let two = CONTENT.replace("</table:table>", "</table:table><table:table/>");
        let mut s = Spreadsheet::new(MemoryTemplate::new().with_part(CONTENT_XML, two.as_str()), Options::default());
        assert!(matches!(s.create(), Err(Error::MalformedTemplate(_))));
    }

    #[test]
    fn pre_save_hook_sees_the_tree() {
        let mut s = sheet();
        s.set_pre_save_hook(|doc: &mut XmlDocument| doc.root.set_attr("office:version", "1.3"));
        let xml = s.create().unwrap();
        assert!(xml.contains(r#"office:version="1.3""#));
    }

    #[test]
    fn cells_deserialize_from_json() {
        let entry: CellEntry = serde_json::from_str(
            r#"{"row": 2, "col": 1, "content": {"type": "link", "value": {"href": "https://example.org", "text": "site"}}, "style-overrides": {"fo:wrap-option": "no-wrap"}}"#,
        )
        .unwrap();
        assert_eq!(entry.row, 2);
        assert!(entry.no_wrap());
        assert_eq!(
            entry.content,
            CellContent::Link {
                href: "https://example.org".to_string(),
                text: "site".to_string()
            }
        );
    }
}
