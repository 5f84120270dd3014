//! Typed extraction units. Each reader produces the unit shape carrying the
//! location the chunker must preserve.

/// Output of one extractor run over a file.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDoc {
    pub units: Vec<DocUnit>,
    /// Document author when the format records one.
    pub author: Option<String>,
}

/// One structural unit of extracted text.
#[derive(Debug, Clone, PartialEq)]
pub enum DocUnit {
    /// Word / Markdown paragraph with its running heading trail.
    Paragraph {
        header_path: Vec<String>,
        text: String,
    },
    /// Presentation slide; `body` already has the title prepended.
    Slide {
        number: u32,
        title: Option<String>,
        body: String,
    },
    /// Spreadsheet sheet rendered as a Markdown table.
    Sheet {
        name: String,
        /// Header row plus separator line, prepended to every chunk.
        header: Vec<String>,
        /// (1-based sheet row number, rendered line) for each non-empty row.
        rows: Vec<(u32, String)>,
        /// Truncation note when the sheet exceeds the row cap.
        footer: Option<String>,
    },
    /// PDF page with extractable text.
    Page { number: u32, text: String },
    /// Connector-supplied email body.
    Email {
        subject: Option<String>,
        sender: Option<String>,
        date: Option<String>,
        body: String,
    },
}
