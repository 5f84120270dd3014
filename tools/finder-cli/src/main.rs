use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use finder_service::engine::{SearchEngine, SearchMode};
use finder_service::orchestrator::{
    CancelToken, IndexingOptions, IndexingOrchestrator, ProgressEvent,
};
use finder_service::paths::AppDirs;
use finder_service::retriever::SearchFilters;
use finder_service::EngineContext;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "finder", about = "Local, offline hybrid file search")]
struct Cli {
    /// Override the app-data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index one or more folders incrementally.
    Index {
        roots: Vec<PathBuf>,
        #[arg(long)]
        include_hidden: bool,
    },
    /// Search the index and print the response as JSON.
    Search {
        query: String,
        /// FAST, SMART, or ASSIST.
        #[arg(long, default_value = "SMART")]
        mode: String,
        /// Restrict to extensions, e.g. --ext .docx --ext .pdf
        #[arg(long = "ext")]
        extensions: Vec<String>,
        /// Restrict to folders with these path prefixes.
        #[arg(long = "folder")]
        folders: Vec<String>,
    },
    /// Verify the offline guarantee for the current configuration.
    SelfTest,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let dirs = AppDirs::resolve(cli.data_dir.as_deref()).context("resolving app-data directory")?;
    let ctx = EngineContext::open(dirs).context("opening engine")?;

    match cli.command {
        Command::Index { roots, include_hidden } => {
            if roots.is_empty() {
                anyhow::bail!("at least one folder is required");
            }
            let options = IndexingOptions {
                include_hidden,
                max_file_size_bytes: Some(
                    ctx.settings
                        .lock()
                        .map(|s| s.indexing.max_file_size_mb * 1024 * 1024)
                        .unwrap_or(100 * 1024 * 1024),
                ),
            };
            let cancel = CancelToken::new();
            let mut on_progress = |event: ProgressEvent| match event {
                ProgressEvent::Started { files_total } => {
                    eprintln!("indexing {files_total} file(s)...");
                }
                ProgressEvent::Progress { files_total, done, failed, current_path } => {
                    eprintln!("[{done}/{files_total}] ({failed} failed) {current_path}");
                }
                ProgressEvent::FileFailed { path, error } => {
                    eprintln!("failed: {path}: {error}");
                }
                ProgressEvent::Cancelled => eprintln!("cancelled"),
            };
            let summary = IndexingOrchestrator::new(ctx).index_roots(
                &roots,
                &options,
                Some(&cancel),
                Some(&mut on_progress),
            )?;
            println!(
                "total={} content_indexed={} metadata_only={} failed={} removed={}",
                summary.total,
                summary.content_indexed,
                summary.metadata_only,
                summary.failed,
                summary.removed
            );
        }
        Command::Search { query, mode, extensions, folders } => {
            let mode = SearchMode::from_name(&mode)
                .with_context(|| format!("unknown mode `{mode}` (use FAST, SMART, or ASSIST)"))?;
            let filters = SearchFilters {
                extensions: (!extensions.is_empty())
                    .then(|| extensions.iter().map(|e| e.to_ascii_lowercase()).collect()),
                folder_prefixes: (!folders.is_empty()).then_some(folders),
                ..Default::default()
            };
            let response = SearchEngine::new(ctx).search(&query, mode, &filters);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::SelfTest => {
            finder_service::offline::self_test(&ctx)?;
            println!("offline self-test passed");
        }
    }
    Ok(())
}
