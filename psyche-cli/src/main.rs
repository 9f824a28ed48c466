//! `psyche`: inspect and administer a psyche SQLite record store.
//!
//! ```bash
//! psyche --db psyche.db create user sam.json
//! psyche --db psyche.db apply user sam delta.json
//! psyche --db psyche.db memory user sam --from 2025-06-01T00:00:00Z --limit 5
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing::info;

use psyche_core::retry::{RetryPolicy, apply_with_retry};
use psyche_core::store::{RecordStore, SqliteStore};
use psyche_core::{Delta, PsycheConfig, RecordKind, RecordRef, StateEngine, TimeWindow};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database file.
    #[arg(long, default_value = "psyche.db")]
    db: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a record from a JSON file and store it.
    Create {
        /// Record shape.
        kind: Kind,
        /// JSON file holding the full record.
        file: PathBuf,
    },
    /// Print a stored record and its version.
    Read {
        /// Record shape.
        kind: Kind,
        /// Agent name or username.
        id: String,
    },
    /// Apply a delta from a JSON file.
    Apply {
        /// Record shape.
        kind: Kind,
        /// Agent name or username.
        id: String,
        /// JSON file holding the delta.
        file: PathBuf,
        /// Pin the delta to the current version and retry on conflict or
        /// outage.
        #[arg(long)]
        retry: bool,
    },
    /// List memories inside a time window.
    Memory {
        /// Record shape.
        kind: Kind,
        /// Agent name or username.
        id: String,
        /// Window start (RFC 3339, inclusive).
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Window end (RFC 3339, inclusive).
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Maximum number of entries.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List stored records.
    List {
        /// Only records of this shape.
        #[arg(long)]
        kind: Option<Kind>,
    },
    /// Run SQLite's integrity check and verify record checksums.
    Check,
    /// Back up the database.
    Backup {
        /// Destination file. Without it a rotating backup is written next to
        /// the database.
        #[arg(long)]
        dest: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Agent,
    User,
}

impl From<Kind> for RecordKind {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Agent => Self::Agent,
            Kind::User => Self::User,
        }
    }
}

fn init_tracing(json: bool, default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PsycheConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PsycheConfig::default(),
    };
    init_tracing(args.json, &config.general.log_level);

    let store = SqliteStore::open(&args.db, &config.persistence)
        .with_context(|| format!("opening {}", args.db.display()))?;
    let engine = StateEngine::new(Arc::new(store), config.engine.clone());

    let result = run(&engine, args.command, &config).await;
    engine.shutdown().await;
    result
}

async fn run(
    engine: &StateEngine<SqliteStore>,
    command: Command,
    config: &PsycheConfig,
) -> anyhow::Result<()> {
    match command {
        Command::Create { kind, file } => {
            let candidate = read_json(&file)?;
            let rref = engine.create_record(kind.into(), &candidate).await?;
            info!(record = %rref, "Created");
            print(&json!({"created": rref.to_string()}))
        }
        Command::Read { kind, id } => {
            let loaded = engine.read_record(&RecordRef::new(kind.into(), id)).await?;
            print(&json!({
                "version": loaded.version.0,
                "record": loaded.record.to_json()?,
            }))
        }
        Command::Apply {
            kind,
            id,
            file,
            retry,
        } => {
            let rref = RecordRef::new(kind.into(), id);
            let delta = Delta::from_json(&read_json(&file)?)?;
            let applied = if retry {
                let policy = RetryPolicy::from_config(&config.engine);
                apply_with_retry(engine, &rref, policy, |_| Ok(delta.clone())).await?
            } else {
                engine.apply_delta(&rref, delta).await?
            };
            let changes: Vec<Value> = applied
                .changes
                .iter()
                .map(|c| {
                    json!({
                        "trait": format!("{}.{}", c.matrix.field_name(), c.name),
                        "previous": c.previous,
                        "value": c.value,
                        "was_clamped": c.was_clamped,
                    })
                })
                .collect();
            print(&json!({
                "version": applied.version.0,
                "changes": changes,
                "memory_appended": applied.memory_appended,
            }))
        }
        Command::Memory {
            kind,
            id,
            from,
            to,
            limit,
        } => {
            let window = TimeWindow { from, to };
            if window.is_empty() {
                bail!("--from is after --to");
            }
            let hits = engine
                .query_memory(&RecordRef::new(kind.into(), id), window, limit)
                .await?;
            print(&serde_json::to_value(hits)?)
        }
        Command::List { kind } => {
            let refs = engine.store().list(kind.map(RecordKind::from)).await?;
            let names: Vec<String> = refs.iter().map(ToString::to_string).collect();
            print(&json!(names))
        }
        Command::Check => {
            let store = engine.store();
            let integrity_ok = store.integrity_check()?;
            let mismatches: Vec<String> = store
                .checksum_mismatches()?
                .iter()
                .map(ToString::to_string)
                .collect();
            print(&json!({
                "integrity_ok": integrity_ok,
                "records": store.count()?,
                "checksum_mismatches": mismatches,
            }))?;
            if !integrity_ok || !mismatches.is_empty() {
                bail!("store check failed");
            }
            Ok(())
        }
        Command::Backup { dest } => {
            let written = match dest {
                Some(dest) => {
                    engine.store().backup(&dest)?;
                    Some(dest)
                }
                None => engine.store().create_rotating_backup()?,
            };
            match written {
                Some(path) => print(&json!({"backup": path.display().to_string()})),
                None => bail!("backups are disabled (persistence.backup_count = 0)"),
            }
        }
    }
}
