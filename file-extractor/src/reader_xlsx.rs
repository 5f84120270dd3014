//! Excel (.xlsx) reader using `calamine`. Each sheet is rendered as a
//! Markdown table over the first 50 rows, columns capped at 30, with a
//! truncation footer when rows were dropped.

use std::path::Path;

use calamine::Reader;

use crate::units::{DocUnit, ExtractedDoc};
use crate::ExtractError;

const MAX_ROWS: usize = 50;
const MAX_COLS: usize = 30;

fn parse_error(reason: impl ToString) -> ExtractError {
    ExtractError::Parse {
        format: "xlsx",
        reason: reason.to_string(),
    }
}

pub fn read(path: &Path) -> Result<ExtractedDoc, ExtractError> {
    let mut workbook = calamine::open_workbook_auto(path).map_err(parse_error)?;
    let names: Vec<String> = workbook.sheet_names();

    let mut units = Vec::new();
    for name in &names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => return Err(parse_error(e)),
        };
        let total_rows = range.height() as u64;

        let mut header: Vec<String> = Vec::new();
        let mut rows: Vec<(u32, String)> = Vec::new();
        for (row_idx, row) in range.rows().take(MAX_ROWS).enumerate() {
            let mut cells: Vec<String> = row.iter().take(MAX_COLS).map(cell_to_string).collect();
            while let Some(last) = cells.last() {
                if last.trim().is_empty() {
                    cells.pop();
                } else {
                    break;
                }
            }
            if cells.is_empty() {
                continue;
            }
            let line = format!("| {} |", cells.join(" | "));
            if header.is_empty() {
                let sep = format!("| {} |", vec!["---"; cells.len()].join(" | "));
                header = vec![line, sep];
            } else {
                rows.push(((row_idx as u32) + 1, line));
            }
        }
        if header.is_empty() {
            continue;
        }
        let footer = (total_rows > MAX_ROWS as u64)
            .then(|| format!("(Table truncated: total rows = {total_rows})"));
        units.push(DocUnit::Sheet {
            name: name.clone(),
            header,
            rows,
            footer,
        });
    }

    Ok(ExtractedDoc { units, author: None })
}

fn cell_to_string(c: &calamine::Data) -> String {
    use calamine::Data as D;
    match c {
        D::Empty => String::new(),
        D::String(s) => s.trim().to_string(),
        D::Float(f) => {
            if f.is_nan() {
                String::new()
            } else if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        D::Int(i) => i.to_string(),
        D::Bool(b) => {
            if *b {
                "TRUE".into()
            } else {
                "FALSE".into()
            }
        }
        D::Error(_) => String::new(),
        other => format!("{other}"),
    }
}
