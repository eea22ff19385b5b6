//! Tally report CLI
//!
//! Runs filter requests and reports against a directory of JSON tables
//! (`<data_dir>/<table>.json`) and prints the result as JSON.
//!
//! # CLI Commands
//!
//! - `query <request.json>` - Execute a filter request
//! - `time-report <request.json> --user <id>` - Generate a time report
//! - `project-report <request.json> --user <id>` - Generate a project report
//! - `check-config` - Validate configuration and print a summary
//!
//! # Configuration
//!
//! The CLI reads configuration from:
//! 1. `--config <path>`
//! 2. `TALLY_CONFIG` environment variable (path to TOML file)
//! 3. `./tally.toml` in current directory
//! 4. Default configuration
//!
//! Environment overrides apply on top of any of these.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_reports::{
    cache::{MemoryCacheStore, ReportCache},
    source::{JsonFileTableStore, TableRowSource},
    Config, FilterRequest, ProjectReportRequest, QueryEngine, ReportService, TimeReportRequest,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "tally")]
#[command(version)]
#[command(about = "Filter, group and aggregate time-tracking data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (overrides TALLY_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override data directory path
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a filter request read from a JSON file
    Query {
        /// Request file
        request: PathBuf,
    },

    /// Generate a time report
    TimeReport {
        /// Request file
        request: PathBuf,

        /// Requesting user id (part of the cache key)
        #[arg(short, long)]
        user: String,
    },

    /// Generate a project report
    ProjectReport {
        /// Request file
        request: PathBuf,

        /// Requesting user id (part of the cache key)
        #[arg(short, long)]
        user: String,
    },

    /// Validate configuration without running anything
    CheckConfig,
}

// =============================================================================
// Setup
// =============================================================================

fn load_config(cli: &Cli) -> tally_reports::Result<Config> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("TALLY_CONFIG").map(PathBuf::from))
        .or_else(|| {
            let local = PathBuf::from("tally.toml");
            local.exists().then_some(local)
        });

    let mut config = match path {
        Some(path) => Config::from_file_with_env(path)?,
        None => Config::from_env()?,
    };
    if let Some(data_dir) = &cli.data_dir {
        config.sources.data_dir = data_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_service(config: &Config) -> ReportService {
    let store = JsonFileTableStore::new(config.sources.data_dir.clone());
    let source = TableRowSource::new(
        Arc::new(store),
        config.sources.table_config(),
        config.sources.policy,
    );
    let engine = QueryEngine::with_config(Arc::new(source), config.query.executor_config());

    let cache_config = config.cache.cache_config();
    let cache_store = MemoryCacheStore::new(cache_config.max_entries);
    ReportService::new(engine, ReportCache::new(Arc::new(cache_store), cache_config))
}

async fn read_request(path: &Path) -> tally_reports::Result<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

// =============================================================================
// Command Handlers
// =============================================================================

fn cmd_check_config(config: &Config) {
    println!("Configuration is valid!");
    println!();
    println!("Sources:");
    println!("  Data directory: {:?}", config.sources.data_dir);
    println!("  Missing-table policy: {}", config.sources.policy);
    let tables = config.sources.table_config();
    for source in tally_reports::DataSource::ALL {
        println!(
            "  {}: {}",
            source,
            tables.table_for(source).unwrap_or("(not configured)")
        );
    }
    println!();
    println!("Cache:");
    println!("  Enabled: {}", config.cache.enabled);
    println!("  TTL: {}s", config.cache.ttl_seconds);
    println!("  Max entries: {}", config.cache.max_entries);
    println!();
    println!("Query:");
    println!("  Default page limit: {}", config.query.default_page_limit);
    println!("  Log level: {}", config.logging.level);
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config);
    info!("Starting tally v{}", env!("CARGO_PKG_VERSION"));
    debug!(data_dir = ?config.sources.data_dir, policy = %config.sources.policy, "Configuration loaded");

    let service = build_service(&config);

    let output = match &cli.command {
        Commands::Query { request } => {
            let request = FilterRequest::from_json(&read_request(request).await?)?;
            service.engine().execute_query(&request).await?.to_json_pretty()
        },
        Commands::TimeReport { request, user } => {
            let request: TimeReportRequest = serde_json::from_str(&read_request(request).await?)?;
            let report = service.generate_time_report(&request, user).await?;
            serde_json::to_string_pretty(&report)?
        },
        Commands::ProjectReport { request, user } => {
            let request: ProjectReportRequest =
                serde_json::from_str(&read_request(request).await?)?;
            let report = service.generate_project_report(&request, user).await?;
            serde_json::to_string_pretty(&report)?
        },
        Commands::CheckConfig => {
            cmd_check_config(&config);
            return Ok(());
        },
    };

    println!("{}", output);
    Ok(())
}
