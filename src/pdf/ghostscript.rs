//! External flattening through the Ghostscript toolchain
//!
//! The `pdfwrite` device re-renders a document completely; `-dPrinted`
//! discards AcroForm widgets while keeping their ink. This engine handles
//! documents the in-process flattener cannot, at the cost of requiring a
//! Ghostscript install on PATH.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use lopdf::Document;

use crate::error::{Error, Result};
use crate::pdf::flatten::Flattener;

/// Flattener that shells out to Ghostscript.
#[derive(Debug, Clone)]
pub struct GhostscriptFlattener {
    program: PathBuf,
}

impl GhostscriptFlattener {
    /// Use a specific Ghostscript executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GhostscriptFlattener {
    fn default() -> Self {
        // The official Windows package installs the console binary under a
        // different name than the Unix one.
        let program = if cfg!(windows) { "gswin64c" } else { "gs" };
        Self::new(program)
    }
}

impl Flattener for GhostscriptFlattener {
    fn flatten(&self, doc: &mut Document, source: &Path) -> Result<()> {
        let scratch = tempfile::tempdir().map_err(|e| Error::FlattenFailure {
            path: source.to_path_buf(),
            page: None,
            reason: format!("failed to create scratch directory: {}", e),
        })?;

        let input = scratch.path().join("input.pdf");
        let output = scratch.path().join("flattened.pdf");

        doc.save(&input).map_err(|e| Error::FlattenFailure {
            path: source.to_path_buf(),
            page: None,
            reason: format!("failed to stage document for ghostscript: {}", e),
        })?;

        debug!("running {} on {}", self.program.display(), source.display());

        let status = Command::new(&self.program)
            .arg("-sDEVICE=pdfwrite")
            .arg("-dCompatibilityLevel=1.6")
            .arg("-dPDFSETTINGS=/printer")
            .arg("-dPrinted")
            .arg("-dNOPAUSE")
            .arg("-dQUIET")
            .arg("-dBATCH")
            .arg(format!("-sOutputFile={}", output.display()))
            .arg(&input)
            .status()
            .map_err(|e| Error::FlattenFailure {
                path: source.to_path_buf(),
                page: None,
                reason: format!("failed to launch {}: {}", self.program.display(), e),
            })?;

        if !status.success() {
            return Err(Error::FlattenFailure {
                path: source.to_path_buf(),
                page: None,
                reason: format!("{} exited with {}", self.program.display(), status),
            });
        }

        *doc = Document::load(&output).map_err(|e| Error::FlattenFailure {
            path: source.to_path_buf(),
            page: None,
            reason: format!("ghostscript produced an unreadable document: {}", e),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable_is_flatten_failure() {
        let flattener = GhostscriptFlattener::new("definitely-not-ghostscript");
        let mut doc = Document::with_version("1.5");
        let result = flattener.flatten(&mut doc, Path::new("input.pdf"));
        match result {
            Err(Error::FlattenFailure { path, page, .. }) => {
                assert_eq!(path, Path::new("input.pdf"));
                assert_eq!(page, None);
            }
            other => panic!("expected FlattenFailure, got {:?}", other.map(|_| ())),
        }
    }
}
