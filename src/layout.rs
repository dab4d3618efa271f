//! Page size, orientation and margins patched into `styles.xml`.

use crate::error::Result;
use crate::xml::{XmlDocument, NS_STYLE};
use serde::{Deserialize, Serialize};

/// Overrides for every page layout of a template. Values are ODF lengths
/// such as `20mm` and are written as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PageLayout {
    pub width: Option<String>,
    pub height: Option<String>,
    /// `portrait` or `landscape`.
    pub orientation: Option<String>,
    pub margin_top: Option<String>,
    pub margin_left: Option<String>,
    pub margin_right: Option<String>,
    pub margin_bottom: Option<String>,
}

impl PageLayout {
    pub fn set_margins(&mut self, top: &str, left: &str, right: &str, bottom: &str) {
        self.margin_top = Some(top.to_string());
        self.margin_left = Some(left.to_string());
        self.margin_right = Some(right.to_string());
        self.margin_bottom = Some(bottom.to_string());
    }

    pub fn set_page_orientation(&mut self, width: &str, height: &str, orientation: &str) {
        self.width = Some(width.to_string());
        self.height = Some(height.to_string());
        self.orientation = Some(orientation.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.attributes().next().is_none()
    }

    fn attributes(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        [
            ("fo:page-width", &self.width),
            ("fo:page-height", &self.height),
            ("style:print-orientation", &self.orientation),
            ("fo:margin-top", &self.margin_top),
            ("fo:margin-left", &self.margin_left),
            ("fo:margin-right", &self.margin_right),
            ("fo:margin-bottom", &self.margin_bottom),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().filter(|v| !v.is_empty()).map(|v| (k, v)))
    }

    /// Patches every `style:page-layout-properties`; returns how many were found.
    pub fn apply(&self, doc: &mut XmlDocument) -> usize {
        let mut patched = 0;
        doc.for_each_element_mut(NS_STYLE, "page-layout-properties", |el| {
            for (name, value) in self.attributes() {
                el.set_attr(name, value);
            }
            patched += 1;
        });
        patched
    }

    pub fn apply_to_xml(&self, xml: &str) -> Result<String> {
        let mut doc = XmlDocument::parse(xml)?;
        self.apply(&mut doc);
        doc.to_xml()
    }
}
