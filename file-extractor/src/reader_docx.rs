//! Word (.docx) reader. Parses `word/document.xml` into paragraphs tagged
//! with the running `header_path` built from Heading 1-4 styles, and pulls
//! the author out of `docProps/core.xml`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::units::{DocUnit, ExtractedDoc};
use crate::ExtractError;

const MAX_HEADING_LEVEL: usize = 4;

fn local_name(q: &[u8]) -> &[u8] {
    match q.iter().position(|&b| b == b':') {
        Some(i) => &q[i + 1..],
        None => q,
    }
}

fn attr_val(e: &BytesStart<'_>, key_local: &[u8]) -> Option<String> {
    for a in e.attributes().with_checks(false).flatten() {
        if local_name(a.key.as_ref()) == key_local {
            return Some(String::from_utf8_lossy(&a.value).into_owned());
        }
    }
    None
}

fn parse_error(reason: impl ToString) -> ExtractError {
    ExtractError::Parse {
        format: "docx",
        reason: reason.to_string(),
    }
}

/// "Heading1".."Heading4" (or localized "heading 2" variants) to a level.
fn heading_level(style: &str) -> Option<usize> {
    let lower = style.to_ascii_lowercase();
    let digits = lower.strip_prefix("heading")?.trim();
    let level: usize = digits.parse().ok()?;
    (1..=MAX_HEADING_LEVEL).contains(&level).then_some(level)
}

pub fn read(path: &Path) -> Result<ExtractedDoc, ExtractError> {
    let file = File::open(path)?;
    let mut zip = zip::ZipArchive::new(file).map_err(parse_error)?;

    let mut document_xml = String::new();
    zip.by_name("word/document.xml")
        .map_err(parse_error)?
        .read_to_string(&mut document_xml)?;

    let author = read_core_author(&mut zip);

    let mut reader = Reader::from_str(&document_xml);
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut units: Vec<DocUnit> = Vec::new();
    let mut header_path: Vec<String> = Vec::new();

    let mut in_p = false;
    let mut in_t = false;
    let mut para_text = String::new();
    let mut para_style: Option<String> = None;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"p" => {
                    in_p = true;
                    para_text.clear();
                    para_style = None;
                }
                b"t" => {
                    if in_p {
                        in_t = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"pStyle" && in_p {
                    para_style = attr_val(&e, b"val");
                }
            }
            Ok(Event::Text(t)) => {
                if in_t {
                    if let Ok(cow) = t.unescape() {
                        para_text.push_str(&cow);
                    }
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"t" => in_t = false,
                b"p" => {
                    if in_p {
                        let text = para_text.trim().to_string();
                        if !text.is_empty() {
                            match para_style.as_deref().and_then(heading_level) {
                                Some(level) => {
                                    header_path.truncate(level - 1);
                                    header_path.push(text);
                                }
                                None => units.push(DocUnit::Paragraph {
                                    header_path: header_path.clone(),
                                    text,
                                }),
                            }
                        }
                        in_p = false;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }

    Ok(ExtractedDoc { units, author })
}

/// Best-effort `dc:creator` lookup; a missing or malformed core.xml just
/// leaves the author unset.
fn read_core_author<R: Read + std::io::Seek>(zip: &mut zip::ZipArchive<R>) -> Option<String> {
    let mut core_xml = String::new();
    zip.by_name("docProps/core.xml")
        .ok()?
        .read_to_string(&mut core_xml)
        .ok()?;
    let mut reader = Reader::from_str(&core_xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut in_creator = false;
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                in_creator = local_name(e.name().as_ref()) == b"creator";
            }
            Ok(Event::Text(t)) if in_creator => {
                let text = t.unescape().ok()?.trim().to_string();
                if !text.is_empty() {
                    return Some(text);
                }
            }
            Ok(Event::End(_)) => in_creator = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_levels_parse() {
        assert_eq!(heading_level("Heading1"), Some(1));
        assert_eq!(heading_level("heading 3"), Some(3));
        assert_eq!(heading_level("Heading5"), None);
        assert_eq!(heading_level("Normal"), None);
    }
}
