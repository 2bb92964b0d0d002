//! Decoding of raw file bytes to text.
//!
//! Word documents are zip archives whose `word/document.xml` holds the
//! paragraphs; PDFs go through text extraction. Everything else must be
//! UTF-8.

use codepilot_core::{AppError, AppResult};
use regex::Regex;
use std::io::{Cursor, Read};
use std::sync::OnceLock;

/// Decode `bytes` according to the extension of `file_path`.
pub fn decode_content(file_path: &str, bytes: &[u8]) -> AppResult<String> {
    let lower = file_path.to_lowercase();
    if lower.ends_with(".docx") {
        return docx_text(file_path, bytes);
    }
    if lower.ends_with(".pdf") {
        return pdf_extract::extract_text_from_mem(bytes).map_err(|e| AppError::Decode {
            path: file_path.to_string(),
            reason: format!("PDF text extraction failed: {}", e),
        });
    }

    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|e| AppError::Decode {
        path: file_path.to_string(),
        reason: format!("not valid UTF-8 ({})", e.utf8_error()),
    })
}

fn docx_text(file_path: &str, bytes: &[u8]) -> AppResult<String> {
    let decode_error = |reason: String| AppError::Decode {
        path: file_path.to_string(),
        reason,
    };

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| decode_error(format!("not a word document: {}", e)))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| decode_error(format!("missing document body: {}", e)))?
        .read_to_string(&mut xml)
        .map_err(|e| decode_error(format!("unreadable document body: {}", e)))?;

    paragraphs_from_xml(&xml)
}

fn tag_pattern() -> AppResult<&'static Regex> {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = TAGS.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r"<[^>]+>")
        .map_err(|e| AppError::Knowledge(format!("Invalid tag pattern: {}", e)))?;
    Ok(TAGS.get_or_init(|| pattern))
}

fn paragraphs_from_xml(xml: &str) -> AppResult<String> {
    let marked = xml
        .replace("</w:p>", "\n")
        .replace("<w:tab/>", "\t")
        .replace("<w:br/>", "\n");
    let stripped = tag_pattern()?.replace_all(&marked, "");
    let text = stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    Ok(text.trim().to_string())
}
