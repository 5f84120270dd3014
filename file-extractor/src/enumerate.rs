//! Recursive directory walk with the exclusion rules of the 2.0 release.

use std::path::Path;
use std::time::SystemTime;

use search_model::ScannedFile;
use tracing::debug;
use walkdir::WalkDir;

/// Directory names never descended into.
const SKIP_DIRECTORIES: &[&str] = &[
    "$recycle.bin",
    "appdata",
    "programdata",
    "windows",
    "program files",
    "program files (x86)",
    "__pycache__",
    "node_modules",
    ".git",
    ".svn",
    ".hg",
    "venv",
    ".venv",
    "temp",
    "tmp",
    "cache",
    ".cache",
];

const SKIP_FILE_SUFFIXES: &[&str] = &[".tmp", ".temp", ".bak", ".swp", ".swo"];

#[derive(Debug, Clone)]
pub struct EnumerateOptions {
    /// Hidden files are excluded by default; the toggle is OFF in 2.0.
    pub include_hidden: bool,
    pub max_file_size_bytes: Option<u64>,
}

impl Default for EnumerateOptions {
    fn default() -> Self {
        Self {
            include_hidden: false,
            max_file_size_bytes: None,
        }
    }
}

fn skip_directory(name: &str, opts: &EnumerateOptions) -> bool {
    (name.starts_with('.') && !opts.include_hidden)
        || SKIP_DIRECTORIES.contains(&name.to_ascii_lowercase().as_str())
}

fn skip_file(name: &str, opts: &EnumerateOptions) -> bool {
    if name.starts_with("~$") {
        return true;
    }
    if name.starts_with('.') && !opts.include_hidden {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    SKIP_FILE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

fn epoch_seconds(t: std::io::Result<SystemTime>) -> f64 {
    t.ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Walk every root and return the eligible files, sorted by path.
/// Unreadable entries are skipped, never fatal.
pub fn enumerate_roots(roots: &[impl AsRef<Path>], opts: &EnumerateOptions) -> Vec<ScannedFile> {
    let mut out = Vec::new();
    for root in roots {
        let walker = WalkDir::new(root.as_ref()).follow_links(false).into_iter();
        let filtered = walker.filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            if e.file_type().is_dir() {
                // Never filter out the root itself.
                e.depth() == 0 || !skip_directory(&name, opts)
            } else {
                true
            }
        });
        for entry in filtered {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if skip_file(&name, opts) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            if let Some(max) = opts.max_file_size_bytes {
                if meta.len() > max {
                    continue;
                }
            }
            out.push(ScannedFile {
                path: entry.path().to_string_lossy().to_string(),
                filename: name,
                extension: crate::classify::extension_of(entry.path()),
                size_bytes: meta.len(),
                created_at: epoch_seconds(meta.created()),
                modified_at: epoch_seconds(meta.modified()),
            });
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_recursively_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("z.md"), "z").unwrap();
        std::fs::write(tmp.path().join("sub/a.md"), "a").unwrap();

        let files = enumerate_roots(&[tmp.path()], &EnumerateOptions::default());
        assert_eq!(files.len(), 2);
        assert!(files[0].path < files[1].path);
        assert!(files.iter().all(|f| f.modified_at > 0.0));
    }

    #[test]
    fn excludes_office_temp_hidden_and_tmp_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("~$report.docx"), "lock").unwrap();
        std::fs::write(tmp.path().join(".hidden.md"), "h").unwrap();
        std::fs::write(tmp.path().join("draft.tmp"), "t").unwrap();
        std::fs::write(tmp.path().join("kept.md"), "k").unwrap();

        let files = enumerate_roots(&[tmp.path()], &EnumerateOptions::default());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "kept.md");
    }

    #[test]
    fn skips_system_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("node_modules")).unwrap();
        std::fs::write(tmp.path().join("node_modules/pkg.md"), "x").unwrap();
        std::fs::write(tmp.path().join("note.md"), "y").unwrap();

        let files = enumerate_roots(&[tmp.path()], &EnumerateOptions::default());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "note.md");
    }

    #[test]
    fn include_hidden_toggle() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".note.md"), "h").unwrap();
        let opts = EnumerateOptions { include_hidden: true, ..Default::default() };
        let files = enumerate_roots(&[tmp.path()], &opts);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn max_size_filter() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("big.md"), vec![b'x'; 100]).unwrap();
        std::fs::write(tmp.path().join("small.md"), b"x").unwrap();
        let opts = EnumerateOptions { max_file_size_bytes: Some(10), ..Default::default() };
        let files = enumerate_roots(&[tmp.path()], &opts);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "small.md");
    }
}
