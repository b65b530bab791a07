pub mod config;
pub mod export;
pub mod model;
pub mod portal;
pub mod search;
pub mod storage;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use export::{ExportFormat, ExportOptions, export_results};
use portal::resolve_hits;
use search::index::OwnerType;
use search::query::page_bounds;
use storage::sqlite::SqliteStorage;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "IDEASBOX_LOG";

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "ideasbox",
    version,
    about = "Content catalog and search index for ideasbox kiosks"
)]
pub struct Cli {
    /// Path to the SQLite database (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to the config file (defaults to the XDG config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the index across contents, books and documents
    Search {
        /// Query; a trailing `*` matches word prefixes
        text: String,

        /// Only publicly visible owners
        #[arg(long)]
        public: bool,

        /// Restrict to one owner type (content, book, document)
        #[arg(long = "type", value_parser = parse_owner_type)]
        owner_type: Option<OwnerType>,

        #[arg(long, value_enum, default_value_t = ExportFormat::Markdown)]
        format: ExportFormat,

        /// Results per page (defaults to the configured page size)
        #[arg(long)]
        limit: Option<usize>,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Recompute every index row from the stored owners
    Reindex,
    /// Print index row counts as JSON
    Stats,
}

fn parse_owner_type(raw: &str) -> Result<OwnerType, String> {
    raw.parse::<OwnerType>().map_err(|e| e.to_string())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config);
    execute(cli, &config)
}

/// Runs one parsed command against the configured database.
pub fn execute(cli: Cli, config: &AppConfig) -> Result<()> {
    let db_path = config.resolve_db_path(cli.db);
    tracing::debug!(db = %db_path.display(), "opening storage");

    match cli.command {
        Commands::Search {
            text,
            public,
            owner_type,
            format,
            limit,
            page,
        } => {
            let storage = SqliteStorage::open(&db_path)?;
            let (limit, offset) = page_bounds(page, limit.unwrap_or(config.search.page_size))?;
            let mut results = storage
                .search()
                .search(public.then_some(true), Some(&text))
                .limit(limit)
                .offset(offset);
            if let Some(t) = owner_type {
                results = results.owner_type(t);
            }
            let rows = results.fetch()?;
            let hits = resolve_hits(&storage, &rows)?;
            let options = ExportOptions {
                include_visibility: !public,
                query: Some(text),
                ..ExportOptions::default()
            };
            print!("{}", export_results(&hits, format, &options));
        }
        Commands::Reindex => {
            let mut storage = SqliteStorage::open(&db_path)?;
            let report = storage.reindex_all()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Stats => {
            let storage = SqliteStorage::open(&db_path)?;
            let stats = storage.search().stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => AppConfig::load_from(p),
        None => AppConfig::load(),
    };
    config.context("loading configuration")
}

/// Installs the stderr logger. A second call is a no-op.
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(config.log_filter.as_deref().unwrap_or("warn"))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
