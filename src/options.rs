use serde::{Deserialize, Serialize};

/// Names of the paragraph styles a text template is expected to define.
///
/// The converter only references these names; it never generates the
/// definitions, so a template can restyle headings or line numbering freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ParagraphStyles {
    pub standard: String,
    pub line_numbered_first: String,
    pub line_numbered: String,
    pub blockquote: String,
    pub blockquote_line_numbered: String,
    pub h1: String,
    pub h2: String,
    pub h3: String,
    /// Shared by `h4`, `h5` and `h6`.
    pub h4: String,
}

impl Default for ParagraphStyles {
    fn default() -> Self {
        Self {
            standard: "Html2Odf_20_Standard".to_string(),
            line_numbered_first: "Html2Odf_20_LineNumbered_20_First".to_string(),
            line_numbered: "Html2Odf_20_LineNumbered_20_Standard".to_string(),
            blockquote: "Html2Odf_20_Blockquote".to_string(),
            blockquote_line_numbered: "Html2Odf_20_Blockquote_20_LineNumbered".to_string(),
            h1: "Html2Odf_20_H1".to_string(),
            h2: "Html2Odf_20_H2".to_string(),
            h3: "Html2Odf_20_H3".to_string(),
            h4: "Html2Odf_20_H4".to_string(),
        }
    }
}

impl ParagraphStyles {
    pub fn blockquote(&self, line_numbered: bool) -> &str {
        if line_numbered {
            &self.blockquote_line_numbered
        } else {
            &self.blockquote
        }
    }

    pub fn heading(&self, level: u8) -> &str {
        match level {
            1 => &self.h1,
            2 => &self.h2,
            3 => &self.h3,
            _ => &self.h4,
        }
    }
}

/// Converter configuration, shared by the text and the spreadsheet variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Options {
    /// Skip sanitizing; the caller vouches for the HTML.
    pub trust_html: bool,
    /// Font color of inserted text.
    pub color_ins: String,
    /// Font color of deleted text.
    pub color_del: String,
    /// Prefix of every generated automatic style name.
    pub style_prefix: String,
    /// Template text marking where generated content goes.
    pub text_marker: String,
    /// Template text marking scaffolding that is dropped from the output.
    pub dummy_marker: String,
    pub paragraph_styles: ParagraphStyles,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            trust_html: false,
            color_ins: "#008800".to_string(),
            color_del: "#880000".to_string(),
            style_prefix: "Html2Odf".to_string(),
            text_marker: "{{HTML2ODF:TEXT}}".to_string(),
            dummy_marker: "{{HTML2ODF:DUMMY}}".to_string(),
            paragraph_styles: ParagraphStyles::default(),
        }
    }
}
