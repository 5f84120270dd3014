//! Self-test for the no-egress contract. The engine performs no network
//! I/O by construction; this check refuses configurations that would point
//! any resource at a remote endpoint.

use crate::error::EngineError;
use crate::EngineContext;

/// Verify that every configured resource is a local filesystem path. Any
/// URL-shaped value is refused with an actionable message.
pub fn self_test(ctx: &EngineContext) -> Result<(), EngineError> {
    let mut checked: Vec<(String, String)> = vec![
        ("data directory".into(), ctx.dirs.data_dir().display().to_string()),
        ("manifest".into(), ctx.dirs.manifest_path().display().to_string()),
        ("chunk store".into(), ctx.dirs.chunks_db_path().display().to_string()),
        ("bm25 index".into(), ctx.dirs.bm25_path().display().to_string()),
        ("settings".into(), ctx.dirs.settings_path().display().to_string()),
    ];
    if let Ok(settings) = ctx.settings.lock() {
        for folder in &settings.indexed_folders {
            checked.push(("indexed folder".into(), folder.clone()));
        }
    }
    checked.push((
        "embedding model".into(),
        ctx.embedder.info().embedding_model_id.clone(),
    ));

    for (what, value) in checked {
        if looks_remote(&value) {
            return Err(EngineError::Offline(format!(
                "{what} points at a remote endpoint ({value}); only local paths are allowed"
            )));
        }
    }
    Ok(())
}

fn looks_remote(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    ["http://", "https://", "ftp://", "ws://", "wss://"]
        .iter()
        .any(|scheme| lower.contains(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_paths_pass_and_urls_fail() {
        assert!(!looks_remote("/home/user/.local/share/LocalFinderX/data"));
        assert!(!looks_remote(r"C:\Users\me\AppData\Roaming\LocalFinderX"));
        assert!(looks_remote("https://example.com/embed"));
        assert!(looks_remote("HTTP://example.com"));
    }
}
