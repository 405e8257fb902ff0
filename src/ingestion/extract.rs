//! Text extraction from uploaded payloads, dispatched by declared MIME type.
//!
//! PDF goes through pdf-extract (panic-caught; malformed files can panic
//! the parser), DOCX and PPTX are ZIP archives whose XML parts are walked
//! with quick-xml, plain text is decoded lossily. Audio/video is not
//! handled here: transcription is a provider call owned by the pipeline.

use std::io::Cursor;

/// Maximum extracted text length (100KB). Chunking operates on the
/// truncated text; the stored file keeps its full bytes.
const MAX_EXTRACT_CHARS: usize = 100_000;

/// Supported payload formats, detected by MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// text/plain and friends, decoded lossily as UTF-8
    PlainText,
    /// application/pdf
    Pdf,
    /// application/vnd.openxmlformats-officedocument.wordprocessingml.document
    Docx,
    /// application/vnd.openxmlformats-officedocument.presentationml.presentation
    Pptx,
    /// audio/*, video/mp4, video/mpeg, transcribed via the provider
    Media,
    /// Everything else; ingestion is a logged no-op
    Unsupported,
}

/// Errors that can occur during text extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("Document archive error: {0}")]
    Archive(String),
    #[error("Document XML error: {0}")]
    Xml(String),
}

/// Detect the payload format from the declared MIME type.
pub fn detect_format(mime_type: &str) -> SourceFormat {
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/pdf" => SourceFormat::Pdf,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            SourceFormat::Docx
        }
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            SourceFormat::Pptx
        }
        "video/mp4" | "video/mpeg" => SourceFormat::Media,
        _ if mime.starts_with("text/") => SourceFormat::PlainText,
        _ if mime.starts_with("audio/") => SourceFormat::Media,
        _ => SourceFormat::Unsupported,
    }
}

/// Extract text from a document payload (non-media formats).
///
/// Returns the extracted text, truncated to [`MAX_EXTRACT_CHARS`].
pub fn extract_document(bytes: &[u8], format: SourceFormat) -> Result<String, ExtractError> {
    let raw = match format {
        SourceFormat::PlainText => String::from_utf8_lossy(bytes).into_owned(),
        SourceFormat::Pdf => extract_pdf(bytes)?,
        SourceFormat::Docx => extract_ooxml(bytes, OoxmlKind::Docx)?,
        SourceFormat::Pptx => extract_ooxml(bytes, OoxmlKind::Pptx)?,
        SourceFormat::Media | SourceFormat::Unsupported => {
            return Err(ExtractError::UnsupportedType(format!("{format:?}")));
        }
    };

    Ok(truncate_text(&raw, MAX_EXTRACT_CHARS))
}

// ---------------------------------------------------------------------------
// Format-specific extractors
// ---------------------------------------------------------------------------

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract can panic on malformed PDFs, so wrap in catch_unwind
    let owned = bytes.to_vec();
    let result = std::panic::catch_unwind(move || pdf_extract::extract_text_from_mem(&owned));

    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf(
            "extraction panicked (malformed file)".to_string(),
        )),
    }
}

enum OoxmlKind {
    Docx,
    Pptx,
}

/// DOCX and PPTX are ZIP archives of XML parts. Text lives in `<w:t>` runs
/// (word/document.xml) or `<a:t>` runs (ppt/slides/slideN.xml); both use the
/// local name `t`, so one walker serves both with different part selection.
fn extract_ooxml(bytes: &[u8], kind: OoxmlKind) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::Archive(e.to_string()))?;

    let part_names: Vec<String> = match kind {
        OoxmlKind::Docx => vec!["word/document.xml".to_string()],
        OoxmlKind::Pptx => {
            let mut slides: Vec<String> = (0..archive.len())
                .filter_map(|i| {
                    let name = archive.by_index(i).ok()?.name().to_string();
                    if name.starts_with("ppt/slides/slide") && name.ends_with(".xml") {
                        Some(name)
                    } else {
                        None
                    }
                })
                .collect();
            slides.sort();
            slides
        }
    };

    if part_names.is_empty() {
        return Err(ExtractError::Archive("no text parts in archive".to_string()));
    }

    let mut text = String::new();
    for (part_index, part_name) in part_names.iter().enumerate() {
        let part = archive
            .by_name(part_name)
            .map_err(|e| ExtractError::Archive(format!("{part_name}: {e}")))?;

        if part_index > 0 {
            text.push_str("\n\n");
        }

        let mut reader = quick_xml::Reader::from_reader(std::io::BufReader::new(part));
        let mut buf = Vec::new();
        let mut in_text_tag = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(quick_xml::events::Event::Start(ref e)) => {
                    let local = e.local_name();
                    if local.as_ref() == b"t" {
                        in_text_tag = true;
                    } else if local.as_ref() == b"p" && !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                Ok(quick_xml::events::Event::End(ref e)) => {
                    if e.local_name().as_ref() == b"t" {
                        in_text_tag = false;
                    }
                }
                Ok(quick_xml::events::Event::Text(ref e)) => {
                    if in_text_tag {
                        if let Ok(s) = e.unescape() {
                            text.push_str(&s);
                        }
                    }
                }
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => return Err(ExtractError::Xml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }
    }

    Ok(text)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Truncate text at a safe UTF-8 boundary.
fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    crate::util::truncate_chars(text, max_chars).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("application/pdf"), SourceFormat::Pdf);
        assert_eq!(
            detect_format(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            SourceFormat::Docx
        );
        assert_eq!(
            detect_format(
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            ),
            SourceFormat::Pptx
        );
        assert_eq!(detect_format("text/plain"), SourceFormat::PlainText);
        assert_eq!(
            detect_format("text/plain; charset=utf-8"),
            SourceFormat::PlainText
        );
        assert_eq!(detect_format("audio/mpeg"), SourceFormat::Media);
        assert_eq!(detect_format("video/mp4"), SourceFormat::Media);
        assert_eq!(detect_format("image/png"), SourceFormat::Unsupported);
        assert_eq!(detect_format("application/zip"), SourceFormat::Unsupported);
    }

    #[test]
    fn test_extract_plaintext_lossy() {
        let text = extract_document(b"Hello, world!", SourceFormat::PlainText).unwrap();
        assert_eq!(text, "Hello, world!");

        // Invalid UTF-8 degrades instead of failing.
        let text = extract_document(&[b'o', b'k', 0xFF], SourceFormat::PlainText).unwrap();
        assert!(text.starts_with("ok"));
    }

    #[test]
    fn test_extract_truncation() {
        let big = "x".repeat(150_000);
        let text = extract_document(big.as_bytes(), SourceFormat::PlainText).unwrap();
        assert_eq!(text.chars().count(), 100_000);
    }

    fn build_zip(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in parts {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_extract_docx_text_runs() {
        let document = r#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
                <w:p><w:r><w:t>Second</w:t></w:r><w:r><w:t> paragraph.</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let bytes = build_zip(&[("word/document.xml", document)]);

        let text = extract_document(&bytes, SourceFormat::Docx).unwrap();
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
    }

    #[test]
    fn test_extract_pptx_slides_in_order() {
        let slide = |body: &str| {
            format!(
                r#"<?xml version="1.0"?>
                <p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
                       xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
                  <a:t>{body}</a:t>
                </p:sld>"#
            )
        };
        let s1 = slide("Slide one");
        let s2 = slide("Slide two");
        let bytes = build_zip(&[
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
        ]);

        let text = extract_document(&bytes, SourceFormat::Pptx).unwrap();
        let one = text.find("Slide one").unwrap();
        let two = text.find("Slide two").unwrap();
        assert!(one < two);
    }

    #[test]
    fn test_docx_missing_part_is_error() {
        let bytes = build_zip(&[("word/styles.xml", "<x/>")]);
        assert!(matches!(
            extract_document(&bytes, SourceFormat::Docx).unwrap_err(),
            ExtractError::Archive(_)
        ));
    }

    #[test]
    fn test_media_not_handled_here() {
        assert!(extract_document(b"", SourceFormat::Media).is_err());
    }
}
