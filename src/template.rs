//! Access to the parts of a template document.
//!
//! Converters only read and replace named XML parts; the container format
//! stays behind [`TemplateAccessor`].

use crate::error::{Error, Result};
use crate::layout::PageLayout;
use log::debug;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTENT_XML: &str = "content.xml";
pub const STYLES_XML: &str = "styles.xml";
const MIMETYPE: &str = "mimetype";

pub trait TemplateAccessor {
    fn read_part(&self, name: &str) -> Result<String>;

    fn replace_part(&mut self, name: &str, xml: String) -> Result<()>;

    fn has_part(&self, name: &str) -> bool {
        self.read_part(name).is_ok()
    }
}

/// Parts held as plain strings, for tests and for callers that manage the
/// container themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTemplate {
    parts: BTreeMap<String, String>,
}

impl MemoryTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_part(mut self, name: impl Into<String>, xml: impl Into<String>) -> Self {
        self.parts.insert(name.into(), xml.into());
        self
    }

    pub fn part(&self, name: &str) -> Option<&str> {
        self.parts.get(name).map(String::as_str)
    }
}

impl TemplateAccessor for MemoryTemplate {
    fn read_part(&self, name: &str) -> Result<String> {
        self.parts
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PartNotFound(name.to_string()))
    }

    fn replace_part(&mut self, name: &str, xml: String) -> Result<()> {
        self.parts.insert(name.to_string(), xml);
        Ok(())
    }

    fn has_part(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }
}

/// A ZIP-packaged OpenDocument file (`.odt`, `.ods`).
///
/// Entries keep their original order. On write, `mimetype` goes first and
/// uncompressed, which office suites use to sniff the document type.
#[derive(Debug, Clone, Default)]
pub struct OdfPackage {
    entries: Vec<(String, Vec<u8>)>,
}

impl OdfPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();
            let mut data = Vec::new();
            if !file.is_dir() {
                file.read_to_end(&mut data)?;
            }
            entries.push((name, data));
        }
        debug!("opened package with {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.entry(MIMETYPE).and_then(|d| std::str::from_utf8(d).ok())
    }

    fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        if let Some(mime) = self.entry(MIMETYPE) {
            zip.start_file(MIMETYPE, stored)?;
            zip.write_all(mime)?;
        }
        for (name, data) in &self.entries {
            if name == MIMETYPE {
                continue;
            }
            if name.ends_with('/') {
                zip.add_directory(name.as_str(), deflated)?;
            } else {
                zip.start_file(name.as_str(), deflated)?;
                zip.write_all(data)?;
            }
        }
        Ok(zip.finish()?.into_inner())
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.to_bytes()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

impl TemplateAccessor for OdfPackage {
    fn read_part(&self, name: &str) -> Result<String> {
        let data = self
            .entry(name)
            .ok_or_else(|| Error::PartNotFound(name.to_string()))?;
        String::from_utf8(data.to_vec()).map_err(|_| Error::InvalidUtf8(name.to_string()))
    }

    fn replace_part(&mut self, name: &str, xml: String) -> Result<()> {
        let data = xml.into_bytes();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = data,
            None => self.entries.push((name.to_string(), data)),
        }
        Ok(())
    }

    fn has_part(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }
}

/// Writes a generated content part back, plus `styles.xml` when the page
/// layout was overridden.
pub fn store_document<T: TemplateAccessor>(template: &mut T, content: String, layout: &PageLayout) -> Result<()> {
    template.replace_part(CONTENT_XML, content)?;
    if !layout.is_empty() {
        let styles = template.read_part(STYLES_XML)?;
        template.replace_part(STYLES_XML, layout.apply_to_xml(&styles)?)?;
        debug!("patched page layout in {STYLES_XML}");
    }
    Ok(())
}
