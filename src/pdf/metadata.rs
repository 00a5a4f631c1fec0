//! PDF metadata extraction

use std::path::Path;

use lopdf::{Document, Object};

use crate::error::{Error, Result};

/// Count pages by reading the Count field from the Pages dictionary.
/// More reliable than get_pages() for documents with nested page trees.
fn count_pages_from_catalog(doc: &Document, path: &Path) -> Result<usize> {
    let unreadable = |reason: &str| Error::UnreadableInput {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(|obj| obj.as_reference())
        .map_err(|_| unreadable("trailer has no catalog reference"))?;

    let catalog = doc
        .get_object(catalog_id)
        .and_then(|obj| obj.as_dict())
        .map_err(|_| unreadable("catalog is not a dictionary"))?;

    let pages_id = catalog
        .get(b"Pages")
        .and_then(|obj| obj.as_reference())
        .map_err(|_| unreadable("catalog has no page tree"))?;

    let pages = doc
        .get_object(pages_id)
        .and_then(|obj| obj.as_dict())
        .map_err(|_| unreadable("page tree root is not a dictionary"))?;

    match pages.get(b"Count") {
        Ok(Object::Integer(n)) if *n >= 0 => Ok(*n as usize),
        _ => Err(unreadable("page tree has no usable Count")),
    }
}

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
}

/// Extract metadata from a PDF file
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata> {
    let doc = load(path)?;
    let page_count = count_pages_from_catalog(&doc, path)?;
    let (title, author) = document_info(&doc);

    Ok(PdfMetadata {
        page_count,
        title,
        author,
    })
}

/// Count the number of pages in a PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    let doc = load(path)?;
    count_pages_from_catalog(&doc, path)
}

/// Read /Title and /Author from a loaded document's Info dictionary.
pub(crate) fn document_info(doc: &Document) -> (Option<String>, Option<String>) {
    let info = doc
        .trailer
        .get(b"Info")
        .and_then(|obj| obj.as_reference())
        .and_then(|id| doc.get_object(id))
        .and_then(|obj| obj.as_dict());

    let info = match info {
        Ok(info) => info,
        Err(_) => return (None, None),
    };

    let string_entry = |key: &[u8]| {
        info.get(key)
            .ok()
            .and_then(|obj| obj.as_str().ok())
            .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
    };

    (string_entry(b"Title"), string_entry(b"Author"))
}

fn load(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(Error::UnreadableInput {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        });
    }
    Document::load(path).map_err(|e| Error::UnreadableInput {
        path: path.to_path_buf(),
        reason: format!("not a readable PDF: {}", e),
    })
}
