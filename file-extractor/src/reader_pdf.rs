//! PDF reader using `lopdf`. One unit per page; pages without extractable
//! text are skipped (the chunk index stays contiguous downstream).

use std::path::Path;

use lopdf::Document;

use crate::units::{DocUnit, ExtractedDoc};
use crate::ExtractError;

fn parse_error(reason: impl ToString) -> ExtractError {
    ExtractError::Parse {
        format: "pdf",
        reason: reason.to_string(),
    }
}

pub fn read(path: &Path) -> Result<ExtractedDoc, ExtractError> {
    let doc = Document::load(path).map_err(parse_error)?;
    let pages = doc.get_pages();

    let mut units = Vec::new();
    for &page_num in pages.keys() {
        let text = match doc.extract_text(&[page_num]) {
            Ok(t) => t,
            // A single unreadable page is skipped, not fatal.
            Err(_) => continue,
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            continue;
        }
        units.push(DocUnit::Page { number: page_num, text });
    }

    Ok(ExtractedDoc { units, author: pdf_author(&doc) })
}

fn pdf_author(doc: &Document) -> Option<String> {
    let info_id = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let info = doc.get_dictionary(info_id).ok()?;
    let author = info.get(b"Author").ok()?;
    let bytes = author.as_str().ok()?;
    let s = String::from_utf8_lossy(bytes).trim().to_string();
    (!s.is_empty()).then_some(s)
}
