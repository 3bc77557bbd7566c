//! PDF loading: decode a PDF into an ordered page list with token counts.

use crate::document::{Document, Page};
use crate::error::{ExtractError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Load a PDF from disk into a [`Document`]. The path must exist and carry a
/// `.pdf` extension.
pub fn load_pdf(path: &Path) -> Result<Document> {
    if !path.is_file() {
        return Err(ExtractError::DocumentNotFound(path.to_path_buf()));
    }
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(ExtractError::UnsupportedInput(path.to_path_buf()));
    }

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string();

    let pdf = lopdf::Document::load(path)?;
    let pages = extract_pages(&pdf);

    Ok(Document {
        name,
        path: Some(path.to_path_buf()),
        pages,
    })
}

/// Load a PDF from an in-memory byte buffer.
pub fn load_pdf_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Document> {
    let pdf = lopdf::Document::load_mem(bytes)?;
    let pages = extract_pages(&pdf);
    Ok(Document::new(name, pages))
}

fn extract_pages(pdf: &lopdf::Document) -> Vec<Page> {
    let mut pages = Vec::new();
    for (&page_number, _) in pdf.get_pages().iter() {
        // A page whose content stream cannot be decoded becomes an empty
        // page rather than failing the whole document.
        let text = match pdf.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = page_number, error = %e, "page text extraction failed");
                String::new()
            }
        };
        pages.push(Page::new(text));
    }
    debug!(pages = pages.len(), "PDF decoded");
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_rejected() {
        let err = load_pdf(Path::new("/nonexistent/file.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::DocumentNotFound(_)));
    }

    #[test]
    fn test_non_pdf_extension_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text").unwrap();

        let err = load_pdf(&path).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedInput(_)));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(load_pdf_bytes("junk", b"this is not a pdf").is_err());
    }
}
