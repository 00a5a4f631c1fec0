//! Flatten-and-merge pipeline using lopdf
//!
//! Each input is loaded, flattened, and folded into a single accumulated
//! document; the result is written atomically so the output path never holds
//! a partial document, even when a later input fails or the process dies.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::pdf::flatten::{AppearanceFlattener, Flattener};
use crate::pdf::metadata::document_info;

/// Options for a merge invocation
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Input PDF file paths in the order they should be merged
    pub input_paths: Vec<PathBuf>,
    /// Output PDF file path; its parent directory must exist
    pub output_path: PathBuf,
    /// Replace an existing file at the output path
    pub overwrite: bool,
    /// Copy /Title and /Author from the first input into the output
    pub keep_metadata: bool,
}

impl MergeOptions {
    pub fn new(input_paths: Vec<PathBuf>, output_path: PathBuf) -> Self {
        Self {
            input_paths,
            output_path,
            overwrite: false,
            keep_metadata: false,
        }
    }
}

/// What a successful merge produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// Number of input files processed
    pub inputs: usize,
    /// Total pages in the output document
    pub pages: usize,
}

/// Flatten every input and merge the results into one PDF.
///
/// Uses the built-in appearance flattener. The operation is all-or-nothing:
/// any failure leaves the output path in its pre-call state.
///
/// # Example
///
/// ```no_run
/// use invoice_merge::pdf::{merge_pdfs, MergeOptions};
/// use std::path::PathBuf;
///
/// let options = MergeOptions::new(
///     vec![
///         PathBuf::from("cover-sheet.pdf"),
///         PathBuf::from("invoice.pdf"),
///     ],
///     PathBuf::from("combined.pdf"),
/// );
///
/// merge_pdfs(&options).expect("Failed to merge");
/// ```
pub fn merge_pdfs(options: &MergeOptions) -> Result<MergeSummary> {
    merge_pdfs_with(options, &AppearanceFlattener)
}

/// Like [`merge_pdfs`], with an explicit flattening engine.
///
/// The merge mechanics follow the lopdf merge example: every source
/// document's objects are renumbered above the running maximum id, collected
/// into one object table, and re-rooted under a freshly built page tree.
pub fn merge_pdfs_with(options: &MergeOptions, flattener: &dyn Flattener) -> Result<MergeSummary> {
    if options.input_paths.is_empty() {
        return Err(Error::EmptyMerge);
    }

    // Fail before doing any work when the destination is already taken.
    // The atomic persist below re-checks, so a file appearing in between
    // still cannot be clobbered.
    if !options.overwrite && options.output_path.exists() {
        return Err(Error::OutputConflict(options.output_path.clone()));
    }

    let mut max_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut first_info: Option<(Option<String>, Option<String>)> = None;

    for (index, path) in options.input_paths.iter().enumerate() {
        let mut doc = load_input(path)?;

        flattener.flatten(&mut doc, path)?;

        if options.keep_metadata && index == 0 {
            first_info = Some(document_info(&doc));
        }

        // Renumber objects in this document to avoid conflicts
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let pages = doc.get_pages();
        debug!("{}: {} page(s)", path.display(), pages.len());
        page_ids.extend(pages.into_iter().map(|(_, id)| id));

        objects.extend(doc.objects);
    }

    if page_ids.is_empty() {
        return Err(Error::EmptyMerge);
    }

    let mut merged = assemble(objects, &page_ids, max_id, first_info);

    merged.compress();
    write_atomic(&mut merged, options)?;

    info!(
        "merged {} input(s), {} page(s) into {}",
        options.input_paths.len(),
        page_ids.len(),
        options.output_path.display()
    );

    Ok(MergeSummary {
        inputs: options.input_paths.len(),
        pages: page_ids.len(),
    })
}

/// Open and validate one input document.
fn load_input(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(Error::UnreadableInput {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        });
    }

    let doc = Document::load(path).map_err(|e| Error::UnreadableInput {
        path: path.to_path_buf(),
        reason: format!("not a readable PDF: {}", e),
    })?;

    if doc.is_encrypted() {
        return Err(Error::UnreadableInput {
            path: path.to_path_buf(),
            reason: "document is password protected".to_string(),
        });
    }

    Ok(doc)
}

/// Build the merged document around the collected objects and page ids.
fn assemble(
    objects: BTreeMap<ObjectId, Object>,
    page_ids: &[ObjectId],
    max_id: u32,
    first_info: Option<(Option<String>, Option<String>)>,
) -> Document {
    let mut merged = Document::with_version("1.5");

    // Add all collected objects first, then bump max_id so new_object_id()
    // cannot collide with anything we just inserted.
    merged.objects.extend(objects);
    merged.max_id = max_id - 1;

    let pages_id = merged.new_object_id();

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(page_ids.len() as i64));
    pages_dict.set("Kids", Object::Array(kids));

    let catalog_id = merged.new_object_id();
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));

    merged.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged.objects.insert(pages_id, Object::Dictionary(pages_dict));
    merged.trailer.set("Root", Object::Reference(catalog_id));

    // Every page now belongs to the new page tree
    for &page_id in page_ids {
        if let Ok(Object::Dictionary(ref mut dict)) = merged.get_object_mut(page_id) {
            dict.set("Parent", Object::Reference(pages_id));
        }
    }

    if let Some((title, author)) = first_info {
        if title.is_some() || author.is_some() {
            let mut info = Dictionary::new();
            if let Some(title) = title {
                info.set(
                    "Title",
                    Object::String(title.into_bytes(), StringFormat::Literal),
                );
            }
            if let Some(author) = author {
                info.set(
                    "Author",
                    Object::String(author.into_bytes(), StringFormat::Literal),
                );
            }
            let info_id = merged.add_object(Object::Dictionary(info));
            merged.trailer.set("Info", Object::Reference(info_id));
        }
    }

    merged
}

/// Write the document to a temp file next to the destination, then rename it
/// into place. The destination never holds a partially written document.
fn write_atomic(doc: &mut Document, options: &MergeOptions) -> Result<()> {
    let output = &options.output_path;
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::WriteFailure {
        path: output.clone(),
        source: e,
    })?;

    doc.save_to(tmp.as_file_mut()).map_err(|e| Error::WriteFailure {
        path: output.clone(),
        source: io::Error::new(io::ErrorKind::Other, e.to_string()),
    })?;

    if options.overwrite {
        tmp.persist(output).map_err(|e| Error::WriteFailure {
            path: output.clone(),
            source: e.error,
        })?;
    } else {
        tmp.persist_noclobber(output).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                Error::OutputConflict(output.clone())
            } else {
                Error::WriteFailure {
                    path: output.clone(),
                    source: e.error,
                }
            }
        })?;
    }

    Ok(())
}
