//! ragsync - document question answering with incremental indexing
//!
//! Entry point for the `ragsync` command line.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ragsync::observability::{init_tracing, TracingConfig};
use ragsync::rag::{AnthropicClient, RagChain, Searcher};
use ragsync::tracker::{format_size, FileOutcome, FileStatus, IndexSynchronizer, SyncMode, SyncReport};
use ragsync::{Config, Error, Result};
use tokio_util::sync::CancellationToken;

/// ragsync - ask questions about a folder of documents
#[derive(Parser, Debug)]
#[command(name = "ragsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory for the `SQLite` database
    #[arg(short, long, global = true, env = "RAGSYNC_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Directory indexed when no path is given
    #[arg(long, global = true, env = "RAGSYNC_DOCUMENTS_DIR", default_value = "./source_documents")]
    documents_dir: PathBuf,

    /// Name of the document collection
    #[arg(long, global = true, env = "RAGSYNC_COLLECTION", default_value = "documents")]
    collection: String,

    /// Target chunk size in characters
    #[arg(long, global = true, env = "RAGSYNC_CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Overlap between chunks in characters
    #[arg(long, global = true, env = "RAGSYNC_CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Files larger than this many megabytes are skipped
    #[arg(long, global = true, env = "RAGSYNC_MAX_FILE_SIZE_MB", default_value = "50")]
    max_file_size_mb: u64,

    /// Walk subdirectories, honouring .gitignore
    #[arg(short, long, global = true, env = "RAGSYNC_RECURSIVE")]
    recursive: bool,

    /// Files processed concurrently
    #[arg(long, global = true, env = "RAGSYNC_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Language model used by `ask`
    #[arg(long, global = true, env = "RAGSYNC_MODEL", default_value = "claude-3-haiku-20240307")]
    model: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RAGSYNC_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, global = true, env = "RAGSYNC_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index new and modified files, drop deleted ones
    Directory {
        /// Directory to synchronize (defaults to the documents directory)
        path: Option<PathBuf>,
    },
    /// Index one file unless it is unchanged
    File {
        /// File to index
        path: PathBuf,
    },
    /// Re-index every file regardless of changes
    Force {
        /// Directory to re-index (defaults to the documents directory)
        path: Option<PathBuf>,
    },
    /// Show index and tracking figures
    Status,
    /// Remove every chunk and tracked file
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Check tracked chunk counts against the index
    Audit {
        /// Repair orphaned chunks and mismatched records
        #[arg(long)]
        fix: bool,
    },
    /// Show the chunks most similar to a query
    Search {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Number of results (capped at the configured maximum)
        #[arg(short)]
        k: Option<usize>,
    },
    /// Answer a question from the indexed documents
    Ask {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config {
            data_dir: self.data_dir.clone(),
            documents_dir: self.documents_dir.clone(),
            collection_name: self.collection.clone(),
            log_level: self.log_level.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            max_file_size_mb: self.max_file_size_mb,
            recursive: self.recursive,
            model: self.model.clone(),
            ..Config::default()
        };
        if let Some(concurrency) = self.concurrency {
            config.sync_concurrency = concurrency;
        }
        config
    }
}

/// Failures that mean the tool could not start or its stores are broken.
const fn is_setup_failure(error: &Error) -> bool {
    matches!(
        error,
        Error::Config(_) | Error::Storage(_) | Error::Internal(_)
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(&TracingConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
    });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_setup_failure(&e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::SUCCESS
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config();
    config.validate()?;
    tracing::debug!(?config, "Configuration loaded");

    // The credential is checked before any store is touched.
    let llm = match &cli.command {
        Command::Ask { .. } => Some(AnthropicClient::from_config(&config)?),
        _ => None,
    };

    let documents_dir = config.documents_dir.clone();
    let sync = IndexSynchronizer::open(config)?;

    match cli.command {
        Command::Directory { path } => {
            let dir = path.unwrap_or(documents_dir);
            run_pass(&sync, &dir, SyncMode::Incremental).await
        }
        Command::Force { path } => {
            let dir = path.unwrap_or(documents_dir);
            run_pass(&sync, &dir, SyncMode::Force).await
        }
        Command::File { path } => {
            let outcome = sync.index_single_file(&path, false).await?;
            print_outcome(&outcome);
            Ok(())
        }
        Command::Status => print_status(&sync).await,
        Command::Clear { yes } => {
            if !yes && !confirm("Delete every indexed chunk and tracked file?")? {
                println!("Aborted.");
                return Ok(());
            }
            sync.clear().await?;
            println!("Index cleared.");
            Ok(())
        }
        Command::Audit { fix } => {
            let report = if fix {
                sync.reconcile().await?
            } else {
                sync.audit().await?
            };
            print_audit(&report);
            Ok(())
        }
        Command::Search { query, k } => {
            let searcher = Searcher::new(sync.index(), sync.config());
            let query = query.join(" ");
            let hits = searcher.search(&query, k).await?;
            if hits.is_empty() {
                println!("No results found.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("\n{}. Source: {}", i + 1, hit.metadata.source);
                println!("   Distance: {:.4}", hit.distance);
                println!("   Content Preview: {}", truncate_text(&hit.content, 200));
            }
            Ok(())
        }
        Command::Ask { question } => {
            let Some(llm) = llm else {
                return Err(Error::internal("language model not initialized"));
            };
            let chain = RagChain::new(Arc::new(llm), sync.config());
            let searcher = Searcher::new(sync.index(), sync.config()).with_chain(chain);

            match searcher.ask(&question.join(" ")).await? {
                None => println!("No relevant information found to answer the question."),
                Some(answer) => {
                    println!("{}\n", answer.answer);
                    println!("Sources:");
                    for (i, hit) in answer.sources.iter().enumerate() {
                        println!("  [{}] {} (distance {:.4})", i + 1, hit.metadata.source, hit.distance);
                    }
                }
            }
            Ok(())
        }
    }
}

async fn run_pass(sync: &IndexSynchronizer, dir: &Path, mode: SyncMode) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let report = sync.sync_directory(dir, mode, &cancel).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("Found {} document(s)", report.candidates);
    if !report.mode.is_force() {
        println!(
            "  new: {}, modified: {}, unchanged: {}",
            report.count(FileStatus::New),
            report.count(FileStatus::Modified),
            report.count(FileStatus::Unchanged)
        );
    }

    for outcome in &report.processed {
        print_outcome(outcome);
    }
    for path in &report.deleted {
        println!("  removed {path}");
    }
    for failure in &report.failures {
        println!("  failed {}: {}", failure.path.display(), failure.error);
    }

    if report.is_noop() {
        println!("Index is up to date.");
    } else {
        println!(
            "Indexed {} file(s): +{} chunk(s), -{} chunk(s), {} deleted, {} failed",
            report.processed.len(),
            report.chunks_added,
            report.chunks_removed,
            report.deleted.len(),
            report.failures.len()
        );
    }
    if report.cancelled {
        println!("Cancelled before completion; run again to finish.");
    }
}

fn print_outcome(outcome: &FileOutcome) {
    if outcome.skipped {
        println!(
            "  {} is unchanged ({} chunk(s))",
            outcome.path.display(),
            outcome.chunk_count
        );
    } else {
        println!(
            "  [{}] {}: {} chunk(s)",
            outcome.status,
            outcome.path.display(),
            outcome.chunk_count
        );
    }
}

async fn print_status(sync: &IndexSynchronizer) -> Result<()> {
    let status = sync.status().await?;
    let tracking = &status.tracking;

    println!("Collection: {}", status.collection);
    println!("Total chunks: {}", status.chunk_count);
    println!("Unique files: {}", status.unique_files);
    println!("Storage: {}", status.storage.display());
    println!();
    println!("Tracked files: {}", tracking.tracked_files);
    println!("Total chunks: {}", tracking.total_chunks);
    println!("Total size: {}", format_size(tracking.total_size));
    if let Some(at) = tracking
        .last_indexed_at
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
    {
        println!("Last indexed: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if !tracking.extensions.is_empty() {
        println!("File types:");
        for (extension, count) in &tracking.extensions {
            println!("  {extension}: {count}");
        }
    }
    Ok(())
}

fn print_audit(report: &ragsync::tracker::AuditReport) {
    for mismatch in &report.mismatches {
        println!(
            "  count mismatch {}: recorded {}, stored {}",
            mismatch.file_path, mismatch.recorded, mismatch.actual
        );
    }
    for (file_id, count) in &report.orphaned {
        println!("  orphaned file id {file_id}: {count} chunk(s)");
    }
    for path in &report.missing_sources {
        println!("  source missing: {path}");
    }

    if report.is_consistent() {
        println!("Index and tracking records agree.");
    } else if report.repaired {
        println!("Repaired; run `ragsync directory` to re-index affected files.");
    } else {
        println!("Inconsistent; run `ragsync audit --fix` to repair.");
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Cut `text` to at most `max` characters, marking the cut with "...".
fn truncate_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
