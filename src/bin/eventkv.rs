//! eventkv command-line tool
//!
//! Inspect and maintain an event store directory.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use eventkv::{CompactionPolicy, Config, Event, EventStore, Filter, StoreError, WalSyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// eventkv store tool
#[derive(Parser, Debug)]
#[command(name = "eventkv")]
#[command(about = "Embedded event store for signed-event relays")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./eventkv_data")]
    data_dir: PathBuf,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "64")]
    memtable_mb: usize,

    /// Maximum number of events one query may return
    #[arg(long, default_value = "500")]
    max_limit: usize,

    /// Compact after this many deletions (0 disables)
    #[arg(long, default_value = "256")]
    compact_every: u64,

    /// fsync the WAL after every write
    #[arg(long)]
    sync_every_write: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save events from newline-delimited JSON files ("-" reads stdin)
    Ingest {
        /// Input files
        files: Vec<PathBuf>,

        /// Skip events whose id does not match their content
        #[arg(long)]
        verify_ids: bool,
    },

    /// Print events matching a JSON filter, one per line
    Query {
        /// Filter, e.g. '{"kinds":[1],"limit":10}'
        filter: String,
    },

    /// Count events matching a JSON filter
    Count {
        /// Filter, e.g. '{"authors":["..."]}'
        filter: String,
    },

    /// Delete an event by hex id
    Delete {
        /// Event id
        id: String,
    },

    /// Rebuild every index from the raw records
    Reindex,

    /// Merge all tables and reclaim space held by deleted events
    Compact,

    /// Show storage statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,eventkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> eventkv::Result<()> {
    let compaction = match args.compact_every {
        0 => CompactionPolicy::Disabled,
        count => CompactionPolicy::EveryNDeletions { count },
    };
    let sync = if args.sync_every_write {
        WalSyncStrategy::EveryWrite
    } else {
        WalSyncStrategy::EveryNEntries { count: 100 }
    };

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .max_limit(args.max_limit)
        .wal_sync_strategy(sync)
        .compaction(compaction)
        .build();

    let store = EventStore::open(config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Commands::Ingest { files, verify_ids } => {
            let mut stats = IngestStats::default();
            for file in &files {
                ingest_file(&store, file, verify_ids, &mut stats)?;
            }
            writeln!(
                out,
                "saved {} duplicate {} rejected {}",
                stats.saved, stats.duplicates, stats.rejected
            )?;
        }
        Commands::Query { filter } => {
            let filter = Filter::from_json(&filter)?;
            let mut stream = store.query_events(&filter)?;
            for event in stream.by_ref() {
                writeln!(out, "{}", event.to_json()?)?;
            }
            for e in stream.errors() {
                tracing::warn!("partial results: {}", e);
            }
        }
        Commands::Count { filter } => {
            let filter = Filter::from_json(&filter)?;
            writeln!(out, "{}", store.count_events(&filter)?)?;
        }
        Commands::Delete { id } => {
            if store.delete_by_id(&id)? {
                writeln!(out, "deleted {}", id)?;
            } else {
                writeln!(out, "not found {}", id)?;
            }
        }
        Commands::Reindex => {
            writeln!(out, "indexed {}", store.reindex()?)?;
        }
        Commands::Compact => {
            let engine = store.engine()?;
            let before = engine.sstable_count();
            engine.compact()?;
            writeln!(out, "tables {} -> {}", before, engine.sstable_count())?;
        }
        Commands::Stats => {
            let engine = store.engine()?;
            let snapshot = engine.snapshot();
            writeln!(out, "data dir:        {}", engine.data_dir().display())?;
            writeln!(out, "sstables:        {}", snapshot.table_count())?;
            writeln!(out, "memtable bytes:  {}", engine.memtable_size())?;
            writeln!(out, "memtable keys:   {}", engine.memtable_entry_count())?;
            writeln!(out, "last sequence:   {}", engine.last_seq())?;
            writeln!(out, "events:          {}", store.count_events(&Filter::default())?)?;
        }
    }

    store.close()
}

#[derive(Default)]
struct IngestStats {
    saved: u64,
    duplicates: u64,
    rejected: u64,
}

fn ingest_file(
    store: &EventStore,
    path: &PathBuf,
    verify_ids: bool,
    stats: &mut IngestStats,
) -> eventkv::Result<()> {
    let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(path)?))
    };

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = match Event::from_json(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("{}:{}: {}", path.display(), n + 1, e);
                stats.rejected += 1;
                continue;
            }
        };
        if verify_ids && !event.has_valid_id() {
            tracing::warn!("{}:{}: id does not match content", path.display(), n + 1);
            stats.rejected += 1;
            continue;
        }
        match store.save_event(&event) {
            Ok(()) => stats.saved += 1,
            Err(StoreError::Duplicate) => stats.duplicates += 1,
            Err(StoreError::InvalidEvent(reason)) => {
                tracing::warn!("{}:{}: {}", path.display(), n + 1, reason);
                stats.rejected += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
