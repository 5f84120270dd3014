//! Structural chunker. Universal limits: 1000 chars per chunk with a
//! 100-char overlap; location metadata is mandatory and repeated on every
//! split piece.

use search_model::ChunkLocation;
use tracing::warn;

use crate::units::{DocUnit, ExtractedDoc};

pub const MAX_CHUNK_CHARS: usize = 1000;
pub const CHUNK_OVERLAP: usize = 100;

/// A chunk before tokenization/embedding. `chunk_index` is assigned later,
/// after per-chunk drops, so the stored sequence stays dense.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftChunk {
    pub text: String,
    pub location: ChunkLocation,
}

/// Apply the per-format chunking rules to an extracted document.
pub fn chunk_document(doc: &ExtractedDoc) -> Vec<DraftChunk> {
    let mut out: Vec<DraftChunk> = Vec::new();
    let mut section_path: Option<Vec<String>> = None;
    let mut section_buf: Vec<&str> = Vec::new();

    for unit in &doc.units {
        // Any non-paragraph unit closes the open section.
        if !matches!(unit, DocUnit::Paragraph { .. }) {
            flush_section(&mut section_path, &mut section_buf, &mut out);
        }
        match unit {
            DocUnit::Paragraph { header_path, text } => {
                if section_path.as_ref() != Some(header_path) {
                    flush_section(&mut section_path, &mut section_buf, &mut out);
                    section_path = Some(header_path.clone());
                }
                section_buf.push(text.as_str());
            }
            DocUnit::Slide { number, title, body } => {
                for piece in split_text(body, MAX_CHUNK_CHARS, CHUNK_OVERLAP) {
                    out.push(DraftChunk {
                        text: piece,
                        location: ChunkLocation::Slide {
                            slide: *number,
                            slide_title: title.clone(),
                        },
                    });
                }
            }
            DocUnit::Sheet { name, header, rows, footer } => {
                chunk_sheet(name, header, rows, footer.as_deref(), &mut out);
            }
            DocUnit::Page { number, text } => {
                for piece in split_text(text, MAX_CHUNK_CHARS, CHUNK_OVERLAP) {
                    out.push(DraftChunk {
                        text: piece,
                        location: ChunkLocation::Page { page: *number },
                    });
                }
            }
            DocUnit::Email { subject, sender, date, body } => {
                for piece in split_text(body, MAX_CHUNK_CHARS, CHUNK_OVERLAP) {
                    out.push(DraftChunk {
                        text: piece,
                        location: ChunkLocation::Email {
                            subject: subject.clone(),
                            sender: sender.clone(),
                            date: date.clone(),
                        },
                    });
                }
            }
        }
    }
    flush_section(&mut section_path, &mut section_buf, &mut out);

    // Chunks that somehow miss required metadata are discarded, never stored.
    out.retain(|c| match c.location.validate() {
        Ok(()) => true,
        Err(reason) => {
            warn!(%reason, "discarding chunk with invalid location metadata");
            false
        }
    });
    out
}

fn flush_section(
    path: &mut Option<Vec<String>>,
    buf: &mut Vec<&str>,
    out: &mut Vec<DraftChunk>,
) {
    let Some(header_path) = path.take() else {
        buf.clear();
        return;
    };
    let text = buf.join("\n");
    buf.clear();
    for piece in split_text(&text, MAX_CHUNK_CHARS, CHUNK_OVERLAP) {
        out.push(DraftChunk {
            text: piece,
            location: ChunkLocation::Section {
                header_path: header_path.clone(),
            },
        });
    }
}

/// One sheet becomes one chunk when it fits, otherwise row groups with the
/// Markdown header repeated and `row_range` covering each group. The
/// truncation footer lands on the last chunk.
fn chunk_sheet(
    name: &str,
    header: &[String],
    rows: &[(u32, String)],
    footer: Option<&str>,
    out: &mut Vec<DraftChunk>,
) {
    let header_text = header.join("\n");
    let full_len = char_len(&header_text)
        + rows.iter().map(|(_, l)| char_len(l) + 1).sum::<usize>()
        + footer.map(|f| char_len(f) + 1).unwrap_or(0);

    let range_of = |group: &[(u32, String)]| -> String {
        match (group.first(), group.last()) {
            (Some((a, _)), Some((b, _))) => format!("{a}-{b}"),
            _ => "1-1".to_string(),
        }
    };

    if full_len <= MAX_CHUNK_CHARS {
        let mut lines: Vec<&str> = header.iter().map(String::as_str).collect();
        lines.extend(rows.iter().map(|(_, l)| l.as_str()));
        if let Some(f) = footer {
            lines.push(f);
        }
        out.push(DraftChunk {
            text: lines.join("\n"),
            location: ChunkLocation::Sheet {
                sheet: name.to_string(),
                row_range: range_of(rows),
            },
        });
        return;
    }

    let mut groups: Vec<Vec<(u32, String)>> = Vec::new();
    let mut group: Vec<(u32, String)> = Vec::new();
    let mut group_len = char_len(&header_text);
    for (row_num, line) in rows {
        let line_len = char_len(line) + 1;
        if !group.is_empty() && group_len + line_len > MAX_CHUNK_CHARS {
            groups.push(std::mem::take(&mut group));
            group_len = char_len(&header_text);
        }
        group.push((*row_num, line.clone()));
        group_len += line_len;
    }
    if !group.is_empty() {
        groups.push(group);
    }

    let last = groups.len().saturating_sub(1);
    for (i, group) in groups.iter().enumerate() {
        let mut lines: Vec<&str> = header.iter().map(String::as_str).collect();
        lines.extend(group.iter().map(|(_, l)| l.as_str()));
        if i == last {
            if let Some(f) = footer {
                lines.push(f);
            }
        }
        out.push(DraftChunk {
            text: lines.join("\n"),
            location: ChunkLocation::Sheet {
                sheet: name.to_string(),
                row_range: range_of(group),
            },
        });
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Length-split with overlap, preferring a paragraph break and then a
/// sentence break in the second half of the window.
pub fn split_text(text: &str, max: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if text.trim().is_empty() {
        return Vec::new();
    }
    if chars.len() <= max {
        return vec![text.trim().to_string()];
    }

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let hard_end = (start + max).min(chars.len());
        let mut end = hard_end;
        if hard_end < chars.len() {
            if let Some(p) = rfind_para_break(&chars, start, hard_end) {
                if p > start + max / 2 {
                    end = p + 2;
                }
            }
            if end == hard_end {
                if let Some(p) = rfind_sentence_break(&chars, start, hard_end) {
                    if p > start + max / 2 {
                        end = p + 1;
                    }
                }
            }
        }
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            out.push(piece);
        }
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap);
    }
    out
}

fn rfind_para_break(chars: &[char], start: usize, end: usize) -> Option<usize> {
    (start..end.saturating_sub(1))
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i + 1] == '\n')
}

fn rfind_sentence_break(chars: &[char], start: usize, end: usize) -> Option<usize> {
    (start..end)
        .rev()
        .find(|&i| matches!(chars[i], '.' | '!' | '?' | '。'))
}
