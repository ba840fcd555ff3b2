//! Plain-text extraction from archive entries (PDF, DOCX, XLSX, CSV/TXT).
//!
//! The text feeds the keyword classifiers only; line items never go
//! through here. An entry that fails to extract is skipped with a warning,
//! the rest of the archive is still read.

use std::io::Cursor;

use quick_xml::events::Event;
use tracing::{debug, warn};

use crate::archive::{extension, read_bounded, ArchiveBundle, MAX_ENTRY_BYTES};
use crate::error::{DceError, Result};
use crate::tabular::decode_text;

/// Maximum sheets to read from a workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to read per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;

type OoxmlArchive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Extracts text from one entry, dispatching on its extension.
///
/// Returns `Ok(None)` for unsupported entry types.
pub fn extract_text(name: &str, bytes: &[u8]) -> Result<Option<String>> {
    let text = match extension(name).as_deref() {
        Some("pdf") => extract_pdf(name, bytes)?,
        Some("docx") => extract_docx(bytes)?,
        Some("xlsx") | Some("xlsm") => extract_xlsx(bytes)?,
        Some("csv") | Some("txt") => decode_text(bytes),
        _ => return Ok(None),
    };
    Ok(Some(text))
}

fn extract_pdf(name: &str, bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| DceError::input_format(format!("PDF extraction failed for {}: {}", name, e)))
}

fn open_ooxml(bytes: &[u8]) -> Result<OoxmlArchive<'_>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DceError::input_format(format!("not an OOXML package: {}", e)))
}

fn read_part(archive: &mut OoxmlArchive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|_| DceError::input_format(format!("{} not found", name)))?;
    read_bounded(entry, name, MAX_ENTRY_BYTES)
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_ooxml(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    extract_w_t_elements(&xml)
}

/// Concatenates `w:t` text, one line per paragraph.
fn extract_w_t_elements(xml: &[u8]) -> Result<String> {
    let part = "word/document.xml";
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                let text = te.unescape().map_err(|e| DceError::xml(part, e))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_t = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"w:tab" => out.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(DceError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_ooxml(bytes)?;
    let shared_strings = match archive.index_for_name("xl/sharedStrings.xml") {
        Some(_) => read_shared_strings(&read_part(&mut archive, "xl/sharedStrings.xml")?)?,
        None => Vec::new(),
    };
    let mut out = String::new();
    for name in list_worksheet_names(&archive).into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_part(&mut archive, &name)?;
        let cells = extract_xlsx_sheet_cells(&name, &sheet_xml, &shared_strings)?;
        if !out.is_empty() && !cells.is_empty() {
            out.push('\n');
        }
        out.push_str(&cells);
    }
    Ok(out)
}

fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let part = "xl/sharedStrings.xml";
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(|e| DceError::xml(part, e))?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(DceError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &OoxmlArchive<'_>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Shared-string and inline-string cells, space separated.
fn extract_xlsx_sheet_cells(part: &str, xml: &[u8], shared_strings: &[String]) -> Result<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut in_inline_t = false;
    let mut cell_type: Option<Vec<u8>> = None;
    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell_type = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"t")
                        .map(|a| a.value.into_owned());
                }
                b"v" => in_v = true,
                b"t" if cell_type.as_deref() == Some(&b"inlineStr"[..]) => in_inline_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_v || in_inline_t => {
                let v = te.unescape().map_err(|e| DceError::xml(part, e))?;
                let s = v.trim();
                if in_inline_t && !s.is_empty() {
                    cells.push(s.to_string());
                } else if cell_type.as_deref() == Some(&b"s"[..]) {
                    if let Some(text) = s.parse::<usize>().ok().and_then(|i| shared_strings.get(i)) {
                        if !text.trim().is_empty() {
                            cells.push(text.clone());
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_inline_t = false,
                b"c" => cell_type = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DceError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

/// Text gathered from a whole archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveText {
    /// Every entry name, in archive order.
    pub files: Vec<String>,
    /// Extracted text of all supported entries, in archive order.
    pub text: String,
    /// Entries that failed to extract, with the reason.
    pub failures: Vec<(String, String)>,
}

/// Extracts text from every supported entry of the archive.
pub fn extract_archive_text(bundle: &ArchiveBundle) -> ArchiveText {
    let mut out = ArchiveText::default();
    for name in bundle.names() {
        out.files.push(name.to_string());
        let Some(bytes) = bundle.get(name) else {
            continue;
        };
        match extract_text(name, bytes) {
            Ok(Some(text)) => {
                debug!(entry = name, chars = text.len(), "text extracted");
                if !out.text.is_empty() {
                    out.text.push('\n');
                }
                out.text.push_str(&text);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(entry = name, error = %e, "text extraction failed, entry skipped");
                out.failures.push((name.to_string(), e.to_string()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn ooxml(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, xml) in parts {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(xml.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn unsupported_entry_is_skipped() {
        assert_eq!(extract_text("plan.dwg", b"foo").unwrap(), None);
    }

    #[test]
    fn invalid_pdf_returns_error() {
        assert!(extract_text("CCTP.pdf", b"not a pdf").is_err());
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text("CCTP.docx", b"not a zip").unwrap_err();
        assert!(matches!(err, DceError::InputFormat { .. }));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let doc = r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>Menuiseries</w:t></w:r><w:r><w:t xml:space="preserve"> PVC</w:t></w:r></w:p><w:p><w:r><w:t>DTU 36.5</w:t></w:r></w:p></w:body></w:document>"#;
        let bytes = ooxml(&[("word/document.xml", doc)]);
        let text = extract_text("CCTP.docx", &bytes).unwrap().unwrap();
        assert_eq!(text, "Menuiseries PVC\nDTU 36.5\n");
    }

    #[test]
    fn xlsx_shared_and_inline_strings() {
        let shared = r#"<sst><si><t>Désignation</t></si><si><r><t>Fenêtre </t></r><r><t>PVC</t></r></si></sst>"#;
        let sheet = r#"<worksheet><sheetData><row><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>Qté</t></is></c></row><row><c r="A2" t="s"><v>1</v></c><c r="B2"><v>4</v></c></row></sheetData></worksheet>"#;
        let bytes = ooxml(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let text = extract_text("DQE.xlsx", &bytes).unwrap().unwrap();
        assert_eq!(text, "Désignation Qté Fenêtre PVC");
    }

    #[test]
    fn archive_text_collects_and_skips_failures() {
        let bundle = ArchiveBundle::from_entries([
            ("notes.txt", b"Site occupe".to_vec()),
            ("broken.docx", b"nope".to_vec()),
            ("plan.dwg", vec![0u8, 1]),
        ]);
        let text = extract_archive_text(&bundle);
        assert_eq!(text.files.len(), 3);
        assert_eq!(text.text, "Site occupe");
        assert_eq!(text.failures.len(), 1);
        assert_eq!(text.failures[0].0, "broken.docx");
    }
}
