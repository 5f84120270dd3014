//! Extension-based classification. Decided once per file; the only later
//! transition is a downgrade to metadata-only on extraction failure.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Word,
    Excel,
    PowerPoint,
    Pdf,
    Markdown,
    Other,
}

/// Extensions whose content is extracted, chunked, and embedded.
/// `.txt` stays metadata-only in 2.0.
pub const CONTENT_INDEXED_EXTENSIONS: &[&str] = &[".docx", ".xlsx", ".pptx", ".pdf", ".md"];

/// Lowercase extension including the dot, or empty when absent.
pub fn extension_of(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => String::new(),
    }
}

pub fn kind_for_extension(ext: &str) -> FileKind {
    match ext {
        ".docx" => FileKind::Word,
        ".xlsx" => FileKind::Excel,
        ".pptx" => FileKind::PowerPoint,
        ".pdf" => FileKind::Pdf,
        ".md" | ".markdown" => FileKind::Markdown,
        _ => FileKind::Other,
    }
}

pub fn is_content_indexed(ext: &str) -> bool {
    CONTENT_INDEXED_EXTENSIONS.contains(&ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extensions_are_lowercased() {
        assert_eq!(extension_of(&PathBuf::from("/a/Report.DOCX")), ".docx");
        assert_eq!(extension_of(&PathBuf::from("/a/noext")), "");
    }

    #[test]
    fn supported_set_matches_v2() {
        for ext in [".docx", ".xlsx", ".pptx", ".pdf", ".md"] {
            assert!(is_content_indexed(ext), "{ext} should be content-indexed");
        }
        for ext in [".txt", ".zip", ".doc", ".xls", ".png", ""] {
            assert!(!is_content_indexed(ext), "{ext} should be metadata-only");
        }
    }

    #[test]
    fn markdown_alias_maps_to_same_kind() {
        assert_eq!(kind_for_extension(".markdown"), FileKind::Markdown);
        assert_eq!(kind_for_extension(".md"), FileKind::Markdown);
    }
}
