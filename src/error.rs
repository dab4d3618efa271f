//! Error type shared by the text and spreadsheet converters.
use thiserror::Error;

/// Errors that abort a conversion run.
///
/// Problems with individual HTML nodes never surface here: unknown tags and
/// unsupported node kinds degrade to a safe default instead.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// XML reading or writing failed
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed attribute inside a template part
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// ZIP container error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A named part is missing from the template
    #[error("Template part not found: {0}")]
    PartNotFound(String),

    /// A template part is not valid UTF-8
    #[error("Invalid UTF-8 in template part {0}")]
    InvalidUtf8(String),

    /// An expected structural element is missing from the template
    #[error("Malformed template: {0}")]
    MalformedTemplate(String),

    /// The template has no insertion point for the generated text
    #[error("Page {page}: template contains no text anchor `{marker}`")]
    MissingAnchor { page: usize, marker: String },

    /// A replacement pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;
