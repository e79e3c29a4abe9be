//! Plain-text extraction from uploaded documents.
//!
//! PDF goes through pdf-extract, DOCX is read straight from the OOXML
//! package, and text/markdown files are read as UTF-8.

use crate::error::{ExtractionFailure, QuarryError, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use std::io::Read;
use std::path::Path;
use tracing::{debug, instrument};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Largest `word/document.xml` we are willing to inflate.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Password-protected OOXML files are wrapped in an OLE compound file.
const OLE_MAGIC: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];

/// Document formats we can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentFormat {
    /// Detect the format from a MIME type, falling back to the file extension.
    pub fn detect(file_name: &str, mime_type: Option<&str>) -> Result<Self> {
        match mime_type.map(|m| m.split(';').next().unwrap_or(m).trim()) {
            Some(MIME_PDF) => return Ok(DocumentFormat::Pdf),
            Some(MIME_DOCX) => return Ok(DocumentFormat::Docx),
            Some("text/plain" | "text/markdown") => return Ok(DocumentFormat::PlainText),
            _ => {}
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "txt" | "md" | "markdown" => Ok(DocumentFormat::PlainText),
            _ => {
                let kind = mime_type
                    .map(str::to_string)
                    .or_else(|| (!extension.is_empty()).then(|| extension.clone()))
                    .unwrap_or_else(|| file_name.to_string());
                Err(ExtractionFailure::UnsupportedFileType(kind).into())
            }
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => MIME_PDF,
            DocumentFormat::Docx => MIME_DOCX,
            DocumentFormat::PlainText => "text/plain",
        }
    }
}

/// Converts a stored file into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text. Encrypted and unreadable files fail with distinct
    /// [`ExtractionFailure`] variants; an empty result is not an error here.
    async fn extract(&self, path: &Path, format: DocumentFormat) -> Result<String>;
}

/// Extractor for PDF, DOCX and plain-text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTextExtractor;

#[async_trait]
impl TextExtractor for FileTextExtractor {
    #[instrument(skip(self))]
    async fn extract(&self, path: &Path, format: DocumentFormat) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        debug!("Extracting {:?} from {} bytes", format, bytes.len());

        // Parsing is CPU-bound and pdf-extract can panic on malformed input.
        tokio::task::spawn_blocking(move || extract_bytes(&bytes, format))
            .await
            .map_err(|e| {
                QuarryError::from(ExtractionFailure::DocumentCorrupted(format!(
                    "parser crashed: {}",
                    e
                )))
            })?
    }
}

/// Extract text from in-memory file contents.
pub fn extract_bytes(bytes: &[u8], format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ExtractionFailure::DocumentCorrupted("missing PDF header".to_string()).into());
    }

    pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("encrypt") || lower.contains("password") || contains(bytes, b"/Encrypt") {
            ExtractionFailure::DocumentProtected.into()
        } else {
            ExtractionFailure::DocumentCorrupted(message).into()
        }
    })
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(&OLE_MAGIC) {
        return Err(ExtractionFailure::DocumentProtected.into());
    }

    let corrupted = |e: String| QuarryError::from(ExtractionFailure::DocumentCorrupted(e));

    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| corrupted(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| corrupted("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| corrupted(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(corrupted("word/document.xml exceeds size limit".to_string()));
    }

    docx_paragraphs(&xml).map_err(corrupted)
}

/// Collect `w:t` runs, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> std::result::Result<String, String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(&te.unescape().map_err(|e| e.to_string())?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => out.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim().to_string())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(DocumentFormat::detect("a.bin", Some(MIME_PDF)).unwrap(), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::detect("Report.DOCX", None).unwrap(), DocumentFormat::Docx);
        assert_eq!(
            DocumentFormat::detect("notes.md", Some("application/octet-stream")).unwrap(),
            DocumentFormat::PlainText
        );
        assert!(matches!(
            DocumentFormat::detect("slides.pptx", None).unwrap_err(),
            QuarryError::Extraction(ExtractionFailure::UnsupportedFileType(ref kind)) if kind == "pptx"
        ));
    }

    #[test]
    fn test_docx_paragraphs() {
        let xml = r#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>world &amp; more</w:t></w:r></w:p>
                <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let text = extract_bytes(&docx_with(xml), DocumentFormat::Docx).unwrap();
        assert_eq!(text, "Hello world & more\nSecond paragraph");
    }

    #[test]
    fn test_protected_and_corrupted_are_distinct() {
        let mut ole = OLE_MAGIC.to_vec();
        ole.extend_from_slice(&[0; 64]);
        assert!(matches!(
            extract_bytes(&ole, DocumentFormat::Docx).unwrap_err(),
            QuarryError::Extraction(ExtractionFailure::DocumentProtected)
        ));
        assert!(matches!(
            extract_bytes(b"definitely not a zip", DocumentFormat::Docx).unwrap_err(),
            QuarryError::Extraction(ExtractionFailure::DocumentCorrupted(_))
        ));
        assert!(matches!(
            extract_bytes(b"not a pdf", DocumentFormat::Pdf).unwrap_err(),
            QuarryError::Extraction(ExtractionFailure::DocumentCorrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_plain_text_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all("Plain notes about Rust.".as_bytes()).unwrap();

        let text = FileTextExtractor
            .extract(file.path(), DocumentFormat::PlainText)
            .await
            .unwrap();
        assert_eq!(text, "Plain notes about Rust.");
    }
}
