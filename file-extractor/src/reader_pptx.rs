//! PowerPoint (.pptx) reader. Slide order comes from `presentation.xml`
//! through its relationship map; each slide yields `{number, title?, body}`
//! where the body concatenates all text boxes with the title prepended.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::units::{DocUnit, ExtractedDoc};
use crate::ExtractError;

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

fn attr_val_q(e: &BytesStart<'_>, qname: &[u8]) -> Option<String> {
    for a in e.attributes().with_checks(false).flatten() {
        if a.key.as_ref() == qname {
            return Some(String::from_utf8_lossy(&a.value).into_owned());
        }
    }
    None
}

fn parse_error(reason: impl ToString) -> ExtractError {
    ExtractError::Parse {
        format: "pptx",
        reason: reason.to_string(),
    }
}

pub fn read(path: &Path) -> Result<ExtractedDoc, ExtractError> {
    let file = File::open(path)?;
    let mut zip = zip::ZipArchive::new(file).map_err(parse_error)?;

    // rId -> part path, from the presentation relationships.
    let mut rels_map: HashMap<String, String> = HashMap::new();
    {
        let mut rels_xml = String::new();
        zip.by_name("ppt/_rels/presentation.xml.rels")
            .map_err(parse_error)?
            .read_to_string(&mut rels_xml)?;
        let mut r = Reader::from_str(&rels_xml);
        r.trim_text(false);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match r.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                    if local_name(e.name().as_ref()) == b"Relationship" {
                        if let (Some(id), Some(mut target)) =
                            (attr_val(&e, b"Id"), attr_val(&e, b"Target"))
                        {
                            if !target.starts_with("ppt/") {
                                target = format!("ppt/{target}");
                            }
                            rels_map.insert(id, target);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(parse_error(e)),
                _ => {}
            }
        }
    }

    // Slide order from presentation.xml (p:sldId r:id).
    let mut slide_targets: Vec<String> = Vec::new();
    {
        let mut pres_xml = String::new();
        zip.by_name("ppt/presentation.xml")
            .map_err(parse_error)?
            .read_to_string(&mut pres_xml)?;
        let mut r = Reader::from_str(&pres_xml);
        r.trim_text(false);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match r.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                    if local_name(e.name().as_ref()) == b"sldId" {
                        if let Some(rid) = attr_val_q(&e, b"r:id") {
                            if let Some(t) = rels_map.get(&rid) {
                                slide_targets.push(t.clone());
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(parse_error(e)),
                _ => {}
            }
        }
    }

    let mut units = Vec::new();
    for (i, target) in slide_targets.iter().enumerate() {
        let number = (i as u32) + 1;
        let mut slide_xml = String::new();
        match zip.by_name(target) {
            Ok(mut f) => {
                f.read_to_string(&mut slide_xml)?;
            }
            Err(_) => continue,
        }
        let (title, paragraphs) = parse_slide(&slide_xml)?;
        if title.is_none() && paragraphs.is_empty() {
            continue;
        }
        let mut body_parts: Vec<String> = Vec::new();
        if let Some(t) = &title {
            body_parts.push(t.clone());
        }
        body_parts.extend(paragraphs);
        units.push(DocUnit::Slide {
            number,
            title,
            body: body_parts.join("\n"),
        });
    }

    Ok(ExtractedDoc { units, author: None })
}

/// Walk one slide part collecting the title placeholder text and every
/// other paragraph, including table cells rendered as tab-joined rows.
fn parse_slide(xml: &str) -> Result<(Option<String>, Vec<String>), ExtractError> {
    let mut r = Reader::from_str(xml);
    r.trim_text(false);
    let mut buf = Vec::new();

    let mut in_sp = false;
    let mut is_title_shape = false;
    let mut in_tx = false;
    let mut in_p = false;
    let mut in_t = false;
    let mut cur_text = String::new();
    let mut shape_paras: Vec<String> = Vec::new();
    let mut slide_title: Option<String> = None;
    let mut paragraphs: Vec<String> = Vec::new();

    let mut in_tr = false;
    let mut in_tc = false;
    let mut cell_text = String::new();
    let mut row_cells: Vec<String> = Vec::new();

    loop {
        buf.clear();
        match r.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"sp" => {
                    in_sp = true;
                    is_title_shape = false;
                    shape_paras.clear();
                }
                b"ph" => {
                    if let Some(t) = attr_val(&e, b"type") {
                        let lt = t.to_ascii_lowercase();
                        if lt == "title" || lt == "ctrtitle" {
                            is_title_shape = true;
                        }
                    }
                }
                b"txBody" => in_tx = true,
                b"p" => {
                    if in_tx {
                        in_p = true;
                        cur_text.clear();
                    }
                }
                b"t" => {
                    if in_tx && in_p {
                        in_t = true;
                    }
                }
                b"tr" => {
                    in_tr = true;
                    row_cells.clear();
                }
                b"tc" => {
                    if in_tr {
                        in_tc = true;
                        cell_text.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"ph" {
                    if let Some(t) = attr_val(&e, b"type") {
                        let lt = t.to_ascii_lowercase();
                        if lt == "title" || lt == "ctrtitle" {
                            is_title_shape = true;
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if in_t {
                    if let Ok(cow) = t.unescape() {
                        if in_tc {
                            cell_text.push_str(&cow);
                        } else {
                            cur_text.push_str(&cow);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"t" => in_t = false,
                b"p" => {
                    if in_tx && in_p {
                        let text = cur_text.trim().to_string();
                        if !text.is_empty() && !in_tc {
                            shape_paras.push(text);
                        }
                        in_p = false;
                    }
                }
                b"txBody" => {
                    if in_tx {
                        if in_sp && is_title_shape && slide_title.is_none() {
                            slide_title = shape_paras.iter().find(|s| !s.trim().is_empty()).cloned();
                        } else {
                            paragraphs.append(&mut shape_paras);
                        }
                        shape_paras.clear();
                        in_tx = false;
                    }
                }
                b"sp" => {
                    in_sp = false;
                    is_title_shape = false;
                }
                b"tc" => {
                    if in_tc {
                        row_cells.push(cell_text.trim().to_string());
                        in_tc = false;
                    }
                }
                b"tr" => {
                    if in_tr {
                        let line = row_cells.join("\t");
                        if !line.trim().is_empty() {
                            paragraphs.push(line);
                        }
                        in_tr = false;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
    }

    Ok((slide_title, paragraphs))
}
