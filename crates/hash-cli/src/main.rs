//! Command-line tool for inspecting and editing a persistent hash index.
//!
//! Each invocation opens the database file, runs one command against the
//! named index and flushes the buffer pool before exiting.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use buffer::{BufferPool, SharedBufferPool};
use clap::{Parser, Subcommand};
use common::{Config, PageId, RecordId, pretty};
use hash::HashIndex;
use log::info;
use types::{SearchKey, Value};

const DEFAULT_INDEX: &str = "default";

#[derive(Parser, Debug)]
#[command(name = "hashidx", about = "Static hash index over a paged file")]
struct Args {
    /// Database file (allocation metadata is kept beside it)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Name of the index to operate on
    #[arg(long, default_value = DEFAULT_INDEX)]
    index: String,

    /// Buffer pool capacity in pages
    #[arg(long)]
    pool_pages: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert a (key, record id) entry, creating the index if needed
    Insert { key: String, page: u64, slot: u16 },
    /// Delete a (key, record id) entry
    Delete { key: String, page: u64, slot: u16 },
    /// Print the record ids stored under a key
    Scan { key: String },
    /// Print entry counts per bucket
    Summary {
        /// Render allocated buckets as a table
        #[arg(long)]
        table: bool,
    },
    /// Delete the index and free its pages
    Drop,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config = config_from(&args);
    let pool = BufferPool::open(&config)
        .with_context(|| format!("opening {}", config.db_path.display()))?
        .into_shared();

    run(&pool, &args.index, args.command)?;

    pool.borrow_mut().flush().context("flushing buffer pool")?;
    info!("flushed {}", config.db_path.display());
    Ok(())
}

fn config_from(args: &Args) -> Config {
    let defaults = Config::default();
    Config::builder()
        .db_path(args.db.clone().unwrap_or(defaults.db_path))
        .buffer_pool_pages(args.pool_pages.unwrap_or(defaults.buffer_pool_pages))
        .build()
}

impl Command {
    /// Only inserts may create a missing index.
    fn creates_index(&self) -> bool {
        matches!(self, Command::Insert { .. })
    }
}

fn run(pool: &SharedBufferPool, name: &str, command: Command) -> Result<()> {
    let registered = pool.borrow().disk().get_file_entry(name).is_some();
    if !registered && !command.creates_index() {
        bail!("no index named '{name}'");
    }

    let mut index = HashIndex::open(pool.clone(), Some(name))
        .with_context(|| format!("opening index '{name}'"))?;

    match command {
        Command::Insert { key, page, slot } => {
            let rid = RecordId::new(PageId(page), slot);
            index.insert_entry(parse_key(&key), rid)?;
            println!("inserted {key} -> {}", pretty::format_record_id(&rid));
        }
        Command::Delete { key, page, slot } => {
            let rid = RecordId::new(PageId(page), slot);
            index.delete_entry(&parse_key(&key), rid)?;
            println!("deleted {key} -> {}", pretty::format_record_id(&rid));
        }
        Command::Scan { key } => {
            let key = parse_key(&key);
            let rids = index.open_scan(key.clone())?.collect_rids()?;
            for rid in &rids {
                println!("{}", pretty::format_record_id(rid));
            }
            println!("{} match(es) for {}", rids.len(), pretty::format_value(key.value()));
        }
        Command::Summary { table } => {
            let summary = index.summary()?;
            if table {
                println!("{}", summary.to_table(pretty::TableStyleKind::Modern));
                println!("Total : {}", summary.total());
            } else {
                println!("{summary}");
            }
        }
        Command::Drop => {
            index.delete_file()?;
            println!("dropped index '{name}'");
        }
    }
    Ok(())
}

/// Integers first, then booleans, anything else is text.
fn parse_key(raw: &str) -> SearchKey {
    let value = if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(b) = raw.parse::<bool>() {
        Value::Bool(b)
    } else {
        Value::Text(raw.to_string())
    };
    SearchKey(value)
}
