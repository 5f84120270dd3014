//! Shared record schemas for the local search engine.
//!
//! Every persisted record carries `schema_version = "2.0"`; readers refuse
//! data written under a different version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Version stamp embedded in every persisted record.
pub const SCHEMA_VERSION: &str = "2.0";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Stable identifier of an indexed file. A path change yields a new id;
/// a content change at the same path keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Identifier of a single chunk. Never reused across reindexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Where a file came from. Only `Local` is produced by this crate family;
/// the remaining variants are reserved for connector-supplied items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Local,
    Outlook,
    Onedrive,
    Sharepoint,
    Gdrive,
}

/// How a file matched a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Lexical,
    Hybrid,
}

/// Change-detection tuple for incremental indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size_bytes: u64,
    /// UTC epoch seconds.
    pub modified_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Fingerprint {
    /// True when any component differs; drives the manifest diff.
    pub fn differs_from(&self, other: &Fingerprint) -> bool {
        self.size_bytes != other.size_bytes
            || self.modified_at != other.modified_at
            || self.hash != other.hash
    }
}

/// Indexing outcome recorded on the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub chunk_count: u32,
    pub last_indexed_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
}

/// One record per file. The primary unit of search results.
///
/// `content_indexed = true` iff the file has chunks in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub file_id: FileId,
    pub source: SourceType,
    pub content_indexed: bool,
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: f64,
    pub modified_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub fingerprint: Fingerprint,
    pub index_stats: IndexStats,
}

/// Location metadata attached to a chunk. The variant is determined by the
/// source file's extraction type; required fields differ per variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkLocation {
    /// PDF page, 1-based.
    Page { page: u32 },
    /// Presentation slide, 1-based.
    Slide {
        slide: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slide_title: Option<String>,
    },
    /// Spreadsheet sheet with the 1-based data row span, e.g. "1-50".
    Sheet { sheet: String, row_range: String },
    /// Word/Markdown heading trail. Empty for text before the first heading.
    Section { header_path: Vec<String> },
    /// Connector-supplied email body.
    Email {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<String>,
    },
}

impl ChunkLocation {
    /// Check the per-variant required metadata. Invalid chunks must never
    /// reach a store.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ChunkLocation::Page { page } => {
                if *page == 0 {
                    return Err("page must be a positive integer".into());
                }
            }
            ChunkLocation::Slide { slide, .. } => {
                if *slide == 0 {
                    return Err("slide must be a positive integer".into());
                }
            }
            ChunkLocation::Sheet { sheet, row_range } => {
                if sheet.trim().is_empty() {
                    return Err("sheet name is empty".into());
                }
                if !is_row_range(row_range) {
                    return Err(format!("row_range `{row_range}` is not N-M"));
                }
            }
            // header_path may be empty but must exist, which the type ensures.
            ChunkLocation::Section { .. } => {}
            ChunkLocation::Email { .. } => {}
        }
        Ok(())
    }

    /// Key used to prefer evidences with distinct locations.
    pub fn distinct_key(&self) -> String {
        match self {
            ChunkLocation::Page { page } => format!("page:{page}"),
            ChunkLocation::Slide { slide, .. } => format!("slide:{slide}"),
            ChunkLocation::Sheet { sheet, row_range } => format!("sheet:{sheet}:{row_range}"),
            ChunkLocation::Section { header_path } => format!("section:{}", header_path.join("/")),
            ChunkLocation::Email { subject, .. } => {
                format!("email:{}", subject.as_deref().unwrap_or(""))
            }
        }
    }
}

fn is_row_range(s: &str) -> bool {
    let mut parts = s.splitn(2, '-');
    let a = parts.next().unwrap_or("");
    let b = parts.next().unwrap_or("");
    !a.is_empty()
        && !b.is_empty()
        && a.bytes().all(|c| c.is_ascii_digit())
        && b.bytes().all(|c| c.is_ascii_digit())
}

/// One searchable chunk. Only content-indexed files have these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    /// Dense 0-based sequence within the file.
    pub chunk_index: u32,
    pub text: String,
    /// L2-normalized, fixed dimension for a given model.
    pub embedding: Vec<f32>,
    /// Lexical tokens. May be empty.
    pub tokens: Vec<String>,
    pub location: ChunkLocation,
}

impl ChunkRecord {
    /// Validation applied before any store insert.
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("text is empty".into());
        }
        if self.embedding.is_empty() {
            return Err("embedding is empty".into());
        }
        self.location.validate()
    }
}

/// Score breakdown shown next to an evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceScores {
    #[serde(rename = "final")]
    pub final_score: f32,
    pub dense: f32,
    pub lexical: f32,
}

/// Byte span inside a snippet that matched a query token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
}

/// Query-time explanation of why a file matched. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_id: String,
    pub file_id: FileId,
    pub summary: String,
    /// 200-500 chars around the densest match region.
    pub snippet: String,
    pub highlights: Vec<HighlightSpan>,
    pub scores: EvidenceScores,
    pub location: ChunkLocation,
}

/// A single file in a search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHit {
    pub file: FileRecord,
    pub score: f32,
    pub match_type: MatchType,
    pub content_available: bool,
    pub evidences: Vec<Evidence>,
}

/// Complete response for one query; rendered by the UI verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub elapsed_ms: u64,
    pub results: Vec<FileHit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Incremental-indexing state for one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_id: FileId,
    pub fingerprint: Fingerprint,
    pub last_indexed_at: f64,
    pub content_indexed: bool,
}

/// Authoritative map from absolute path to indexing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub files: BTreeMap<String, ManifestEntry>,
    pub last_updated_at: f64,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            files: BTreeMap::new(),
            last_updated_at: 0.0,
        }
    }
}

/// A file seen by the enumerator, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    /// Absolute path.
    pub path: String,
    pub filename: String,
    /// Lowercase extension including the dot, or empty.
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: f64,
    pub modified_at: f64,
}

impl ScannedFile {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            size_bytes: self.size_bytes,
            modified_at: self.modified_at,
            hash: None,
        }
    }
}
