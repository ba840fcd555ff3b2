//! In-memory view of a DCE archive.
//!
//! An [`ArchiveBundle`] is opened once per request, reads every file entry of
//! a ZIP container into memory (with a decompressed-size bound per entry) and
//! is immutable afterwards: name → bytes lookup plus ordered enumeration.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{DceError, Result};

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
pub const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Reads one entry, failing when it reaches `max_bytes`.
pub(crate) fn read_bounded(mut entry: impl Read, name: &str, max_bytes: u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    (&mut entry).take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        return Err(DceError::input_format(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    bytes: Vec<u8>,
}

/// Ordered, immutable name → bytes collection.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBundle {
    /// File name of the archive itself, used for display-field inference.
    source_name: Option<String>,
    entries: Vec<Entry>,
}

impl ArchiveBundle {
    /// Opens a ZIP archive held in memory. Directory entries are skipped.
    pub fn from_zip_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| DceError::input_format(format!("not a valid ZIP archive: {}", e)))?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let bytes = read_bounded(entry, &name, MAX_ENTRY_BYTES)?;
            entries.push(Entry { name, bytes });
        }
        debug!(entries = entries.len(), "archive opened");
        Ok(Self {
            source_name: None,
            entries,
        })
    }

    /// Reads and opens a ZIP archive from disk, remembering its file name.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut bundle = Self::from_zip_bytes(&bytes)?;
        bundle.source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Ok(bundle)
    }

    /// Builds a bundle from already-extracted entries, in the given order.
    pub fn from_entries<I, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        Self {
            source_name: None,
            entries: entries
                .into_iter()
                .map(|(name, bytes)| Entry {
                    name: name.into(),
                    bytes,
                })
                .collect(),
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Entry names in archive order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.bytes.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Final path component of an entry name (`DCE/Lot 5/DQE.xlsx` → `DQE.xlsx`).
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Lowercased extension of an entry name, without the dot.
pub fn extension(name: &str) -> Option<String> {
    let base = base_name(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, bytes) in files {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(bytes).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn invalid_zip_is_an_input_format_error() {
        let err = ArchiveBundle::from_zip_bytes(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, DceError::InputFormat { .. }));
    }

    #[test]
    fn entries_keep_archive_order() {
        let bytes = zip_of(&[("b.csv", &b"x"[..]), ("a/notes.txt", &b"hello"[..])]);
        let bundle = ArchiveBundle::from_zip_bytes(&bytes).unwrap();
        let names: Vec<&str> = bundle.names().collect();
        assert_eq!(names, vec!["b.csv", "a/notes.txt"]);
        assert_eq!(bundle.get("a/notes.txt"), Some(&b"hello"[..]));
        assert_eq!(bundle.get("missing"), None);
    }

    #[test]
    fn extension_and_base_name() {
        assert_eq!(base_name("DCE/Lot 5/DQE.xlsx"), "DQE.xlsx");
        assert_eq!(extension("DCE/Lot 5/DQE.XLSX").as_deref(), Some("xlsx"));
        assert_eq!(extension("README"), None);
        assert_eq!(extension(".hidden"), None);
    }
}
