//! File enumeration, content-index classification, format-specific text
//! extraction, and structural chunking.

pub mod chunker;
pub mod classify;
pub mod enumerate;
pub mod units;

mod reader_docx;
mod reader_md;
mod reader_pdf;
mod reader_pptx;
mod reader_xlsx;

use std::path::Path;

use thiserror::Error;

use classify::FileKind;
use units::ExtractedDoc;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse {format}: {reason}")]
    Parse { format: &'static str, reason: String },
    #[error("no extractor for `{0}`")]
    Unsupported(String),
}

/// Extract the structural units of a content-indexed file. Any error here
/// means the file is downgraded to metadata-only by the caller.
pub fn extract(path: &Path) -> Result<ExtractedDoc, ExtractError> {
    let ext = classify::extension_of(path);
    match classify::kind_for_extension(&ext) {
        FileKind::Word => reader_docx::read(path),
        FileKind::PowerPoint => reader_pptx::read(path),
        FileKind::Excel => reader_xlsx::read(path),
        FileKind::Pdf => reader_pdf::read(path),
        FileKind::Markdown => reader_md::read(path),
        FileKind::Other => Err(ExtractError::Unsupported(ext)),
    }
}
