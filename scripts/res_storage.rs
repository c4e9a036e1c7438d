//! Command-line front end for the resource store.
//!
//! Loads a TOML store configuration, opens the file-backed metadata index next
//! to it, and runs one operation. Results go to stdout, logs to stderr.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use storage_index::{JsonFileIndex, ResourceRecord};
use storage_resource::{DeleteOutcome, Passphrase, ReconcileReport, ResourceStore, StoreConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Encrypted at-rest resource storage")]
struct Args {
    /// Store configuration file (TOML).
    #[arg(long, value_name = "FILE")]
    config: PathBuf,

    /// Overrides the passphrase from the configuration file.
    #[arg(long, env = "RES_STORAGE_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy a file into the store and print its id.
    Store { file: PathBuf },
    /// Write the content of a resource to a file, or stdout.
    Get {
        id: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Save a resource under its original filename.
    Download {
        id: String,
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,
    },
    /// Remove a resource and its record.
    Delete { id: String },
    /// Print the metadata record of a resource as JSON.
    Metadata { id: String },
    /// Compare blobs on disk against the index.
    Reconcile {
        /// Remove orphaned blobs and dangling records.
        #[arg(long)]
        repair: bool,
    },
}

fn open_store(config_path: &Path, passphrase: Option<String>) -> Result<ResourceStore> {
    let mut config = StoreConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(passphrase) = passphrase.filter(|p| !p.is_empty()) {
        config.passphrase = Passphrase::from(passphrase.as_str());
    }
    let index = JsonFileIndex::open(config.index_path());
    ResourceStore::builder()
        .with_config(config)
        .with_index(Arc::new(index))
        .build()
        .context("opening resource store")
}

fn run(args: Args) -> Result<()> {
    let store = open_store(&args.config, args.passphrase)?;
    let mut stdout = io::stdout().lock();
    match args.command {
        Command::Store { file } => {
            let id = store
                .store(&file)
                .with_context(|| format!("storing {}", file.display()))?;
            writeln!(stdout, "{id}")?;
        }
        Command::Get { id, output } => {
            let content = store.retrieve(&id)?;
            match output {
                Some(path) => {
                    ensure_parent(&path)?;
                    fs::write(&path, &content)
                        .with_context(|| format!("writing {}", path.display()))?;
                }
                None => stdout.write_all(&content)?,
            }
        }
        Command::Download { id, output_dir } => {
            let download = store.download(&id)?;
            // Only the final component of the recorded name is trusted.
            let name = Path::new(&download.filename)
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(&download.id));
            let path = output_dir.join(name);
            ensure_parent(&path)?;
            fs::write(&path, &download.content)
                .with_context(|| format!("writing {}", path.display()))?;
            let summary = json!({
                "id": download.id,
                "path": path.display().to_string(),
                "mimetype": download.mimetype,
                "content_disposition": download.content_disposition(),
                "bytes": download.len(),
            });
            writeln!(stdout, "{summary}")?;
        }
        Command::Delete { id } => match store.delete(&id)? {
            DeleteOutcome::Denied => bail!("blob for {id} could not be removed; record kept"),
            outcome => writeln!(stdout, "{id} {}", outcome_label(outcome))?,
        },
        Command::Metadata { id } => {
            let record = store.metadata(&id)?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&record_json(&record))?)?;
        }
        Command::Reconcile { repair } => {
            let report = store.reconcile(repair)?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&report_json(&report))?)?;
            if !report.is_consistent() && !repair {
                bail!("storage is inconsistent; rerun with --repair to fix");
            }
        }
    }
    Ok(())
}

fn outcome_label(outcome: DeleteOutcome) -> &'static str {
    match outcome {
        DeleteOutcome::Removed => "removed",
        DeleteOutcome::AlreadyAbsent => "already-absent",
        DeleteOutcome::Denied => "denied",
    }
}

fn record_json(record: &ResourceRecord) -> Value {
    json!({
        "id": record.id,
        "filename": record.filename,
        "path": record.path,
        "mimetype": record.mimetype,
        "content_hash": record.content_hash,
        "encrypted": record.is_encrypted(),
        "access_count": record.access_count,
        "created_at": timestamp(record.created_at),
        "last_accessed_at": record.last_accessed_at.map(timestamp),
    })
}

fn report_json(report: &ReconcileReport) -> Value {
    json!({
        "consistent": report.is_consistent(),
        "repaired": report.repaired,
        "pending_removed": display_all(&report.pending_removed),
        "orphaned_blobs": display_all(&report.orphaned_blobs),
        "dangling_records": report.dangling_records,
        "duplicate_records": report.duplicate_records,
    })
}

fn display_all(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

fn timestamp(at: SystemTime) -> String {
    humantime::format_rfc3339_seconds(at).to_string()
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() {
    init_tracing();
    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
