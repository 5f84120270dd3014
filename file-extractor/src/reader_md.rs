//! Markdown (.md) reader. Splits by header hierarchy; each block carries
//! its heading trail. Files are decoded as UTF-8 with an EUC-KR fallback.

use std::path::Path;

use tracing::debug;

use crate::units::{DocUnit, ExtractedDoc};
use crate::ExtractError;

pub fn read(path: &Path) -> Result<ExtractedDoc, ExtractError> {
    let bytes = std::fs::read(path)?;
    let text = decode(&bytes);
    Ok(ExtractedDoc {
        units: parse(&text),
        author: None,
    })
}

fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            debug!("markdown file is not UTF-8, falling back to EUC-KR");
            let (decoded, _, _) = encoding_rs::EUC_KR.decode(bytes);
            decoded.into_owned()
        }
    }
}

fn heading_of(line: &str) -> Option<(usize, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    rest.strip_prefix(' ').map(|title| (hashes, title.trim()))
}

fn parse(text: &str) -> Vec<DocUnit> {
    let mut units = Vec::new();
    let mut header_path: Vec<String> = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut in_fence = false;

    let mut flush = |header_path: &[String], block: &mut Vec<&str>, units: &mut Vec<DocUnit>| {
        let text = block.join("\n").trim().to_string();
        block.clear();
        if !text.is_empty() {
            units.push(DocUnit::Paragraph {
                header_path: header_path.to_vec(),
                text,
            });
        }
    };

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            block.push(line);
            continue;
        }
        if !in_fence {
            if let Some((level, title)) = heading_of(line) {
                flush(&header_path, &mut block, &mut units);
                header_path.truncate(level - 1);
                header_path.push(title.to_string());
                continue;
            }
            if line.trim().is_empty() {
                flush(&header_path, &mut block, &mut units);
                continue;
            }
        }
        block.push(line);
    }
    flush(&header_path, &mut block, &mut units);
    units
}
