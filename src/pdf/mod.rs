//! PDF manipulation module

pub mod flatten;
pub mod ghostscript;
pub mod merge;
pub mod metadata;

// Re-export commonly used items
pub use flatten::{AppearanceFlattener, Flattener};
pub use ghostscript::GhostscriptFlattener;
pub use merge::{merge_pdfs, merge_pdfs_with, MergeOptions, MergeSummary};
pub use metadata::{count_pages, extract_metadata, PdfMetadata};
