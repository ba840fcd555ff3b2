//! WordprocessingML package access.
//!
//! A [`DocxPackage`] keeps every ZIP part of a `.docx` in order. The main
//! document body is parsed into a [`Body`] and `word/styles.xml` into an
//! [`Element`] tree; all other parts are written back byte-for-byte.

pub mod blocks;
pub mod styles;
pub mod xml;

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;

use crate::archive::{read_bounded, MAX_ENTRY_BYTES};
use crate::error::{DceError, Result};

pub use blocks::{Block, BlockId, Body, Paragraph, Table};
pub use xml::Element;

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const STYLES_PART: &str = "word/styles.xml";

/// An opened `.docx` package.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    parts: Vec<(String, Vec<u8>)>,
    /// `w:document` with its body removed.
    document: Element,
    body_index: usize,
    body: Body,
    styles: Option<Element>,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| DceError::input_format(format!("template is not a ZIP package: {}", e)))?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let data = read_bounded(entry, &name, MAX_ENTRY_BYTES)?;
            parts.push((name, data));
        }

        let doc_xml = parts
            .iter()
            .find(|(n, _)| n == DOCUMENT_PART)
            .map(|(_, d)| d.as_slice())
            .ok_or_else(|| DceError::input_format(format!("{} not found", DOCUMENT_PART)))?;
        let mut document = xml::parse(DOCUMENT_PART, doc_xml)?;
        let body_index = document
            .children
            .iter()
            .position(|n| matches!(n, xml::Node::Element(e) if e.is("w:body")))
            .ok_or_else(|| DceError::input_format("document has no w:body"))?;
        let body = match document.children.remove(body_index) {
            xml::Node::Element(e) => Body::from_element(e),
            xml::Node::Text(_) => return Err(DceError::input_format("document has no w:body")),
        };

        let styles = parts
            .iter()
            .find(|(n, _)| n == STYLES_PART)
            .map(|(_, d)| xml::parse(STYLES_PART, d))
            .transpose()?;

        Ok(Self {
            parts,
            document,
            body_index,
            body,
            styles,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// The styles part, when the package has one.
    pub fn styles_mut(&mut self) -> Option<&mut Element> {
        self.styles.as_mut()
    }

    /// Part names in package order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    /// Serializes the package, keeping part order.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut document = self.document.clone();
        document.children.insert(
            self.body_index.min(document.children.len()),
            xml::Node::Element(self.body.to_element()),
        );
        let document_xml = xml::write(DOCUMENT_PART, &document)?;
        let styles_xml = self
            .styles
            .as_ref()
            .map(|s| xml::write(STYLES_PART, s))
            .transpose()?;

        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            for (name, data) in &self.parts {
                let data = match (name.as_str(), &styles_xml) {
                    (DOCUMENT_PART, _) => document_xml.as_slice(),
                    (STYLES_PART, Some(styles)) => styles.as_slice(),
                    _ => data.as_slice(),
                };
                zip.start_file(name.as_str(), options)?;
                zip.write_all(data)?;
            }
            zip.finish()?;
        }
        Ok(buf)
    }
}
