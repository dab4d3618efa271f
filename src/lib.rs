//! Converts sanitized HTML fragments into OpenDocument markup.
//!
//! Two document kinds are supported, both driven by a template document:
//!
//! - [`TextDocument`] fills `.odt` templates page by page, replacing the
//!   paragraph that holds the text marker with converted HTML blocks.
//! - [`Spreadsheet`] renders a sparse matrix of cells into the single table
//!   of an `.ods` template.
//!
//! Formatting that HTML expresses through tags and classes ends up in
//! generated automatic styles, one per distinct combination.

pub mod error;
pub mod flatten;
pub mod format;
pub mod html;
pub mod layout;
pub mod ods;
pub mod odt;
pub mod options;
pub mod sanitize;
pub mod styles;
pub mod template;
pub mod text;
pub mod xml;

pub use error::{Error, Result};
pub use format::{FormatFlag, FormatSet};
pub use layout::PageLayout;
pub use ods::{CellContent, CellEntry, Spreadsheet};
pub use odt::{PageContext, TextDocument};
pub use options::{Options, ParagraphStyles};
pub use sanitize::{AllowListSanitizer, Sanitizer};
pub use styles::StyleRegistry;
pub use template::{MemoryTemplate, OdfPackage, TemplateAccessor};
