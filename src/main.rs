//! Cake-Crawler main entry point
//!
//! This is the command-line interface for the crawler and the
//! single-file downloader.

use cake_crawler::config::{load_config, validate, Config};
use cake_crawler::crawler::Crawler;
use cake_crawler::network::{format_file_size, DownloadInfo, HttpEngine};
use cake_crawler::processor::AnchorProcessor;
use cake_crawler::{CrawlError, UrlSet};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Cake-Crawler: a bounded concurrent web crawler
///
/// Crawls from a start URL, following anchors until no new link has
/// shown up for the idle timeout. Every request goes through a shared
/// connection-limited engine with constant-delay retries.
#[derive(Parser, Debug)]
#[command(name = "cake-crawler")]
#[command(version)]
#[command(about = "A bounded concurrent web crawler", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl from a start URL and print statistics
    Crawl {
        /// URL the crawl starts from
        #[arg(value_name = "URL")]
        url: String,

        /// Path to TOML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Maximum number of concurrent requests
        #[arg(long, value_name = "N")]
        max_connections: Option<usize>,

        /// Seconds without a new link before the crawl winds down
        #[arg(long, value_name = "SECS")]
        idle_timeout: Option<u64>,

        /// Follow links to every host, not only the start URL's
        #[arg(long)]
        all_hosts: bool,
    },

    /// Download a single URL into a file
    Download {
        /// URL to download
        #[arg(value_name = "URL")]
        url: String,

        /// Destination directory, created when missing
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,

        /// File name (defaults to the last segment of the URL path)
        #[arg(short, long)]
        name: Option<String>,

        /// Replace the file if it already exists
        #[arg(long)]
        overwrite: bool,

        /// Path to TOML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Crawl {
            url,
            config,
            max_connections,
            idle_timeout,
            all_hosts,
        } => {
            let config = apply_overrides(
                read_config(config.as_deref())?,
                max_connections,
                idle_timeout,
                all_hosts,
            )?;
            handle_crawl(url, config).await?;
        }
        Command::Download {
            url,
            dir,
            name,
            overwrite,
            config,
        } => {
            let config = read_config(config.as_deref())?;
            handle_download(url, dir, name, overwrite, config).await?;
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("cake_crawler=info,warn"),
            1 => EnvFilter::new("cake_crawler=debug,info"),
            2 => EnvFilter::new("cake_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file if one was given, defaults otherwise
fn read_config(path: Option<&Path>) -> Result<Config, CrawlError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

/// Applies the crawl flags on top of the loaded configuration
///
/// The merged result goes through the same validation as a config file.
fn apply_overrides(
    mut config: Config,
    max_connections: Option<usize>,
    idle_timeout: Option<u64>,
    all_hosts: bool,
) -> Result<Config, CrawlError> {
    if let Some(max) = max_connections {
        config.engine.max_connections = max;
    }
    if let Some(secs) = idle_timeout {
        config.crawler.idle_timeout_secs = secs;
    }
    if all_hosts {
        config.crawler.same_host_only = false;
    }

    if let Err(e) = validate(&config) {
        tracing::error!("Invalid command-line options: {}", e);
        return Err(e.into());
    }
    Ok(config)
}

/// Handles the crawl subcommand
async fn handle_crawl(url: String, config: Config) -> Result<(), CrawlError> {
    let processor = if config.crawler.same_host_only {
        AnchorProcessor::same_host(&url)?
    } else {
        AnchorProcessor::new()
    };

    let engine = Arc::new(HttpEngine::from_config(config.engine.to_engine_config()));
    tracing::info!(
        "Starting crawl of {} (max connections: {}, idle timeout: {}s)",
        url,
        engine.config().max_connections,
        config.crawler.idle_timeout_secs
    );

    let mut crawler = Crawler::builder()
        .start_link(url)
        .processor(Arc::new(processor))
        .filter(Arc::new(UrlSet::new("crawl")))
        .engine(engine)
        .config(config.crawler.to_crawler_config())
        .build()?;

    let stats = crawler.start().await;
    println!("{}", stats);

    Ok(())
}

/// Handles the download subcommand
async fn handle_download(
    url: String,
    dir: PathBuf,
    name: Option<String>,
    overwrite: bool,
    config: Config,
) -> Result<(), CrawlError> {
    let name = match name {
        Some(name) => name,
        None => file_name_from_url(&url)?,
    };

    let engine = HttpEngine::from_config(config.engine.to_engine_config());
    let info = DownloadInfo::new(url, dir, name)
        .overwrite(overwrite)
        .with_header("User-Agent", config.crawler.user_agent_policy().pick());

    let result = engine.download(&info).await;
    let path = result.file_full_name.clone();
    match result.into_result() {
        Ok(size) => {
            println!("✓ {} ({})", path.display(), format_file_size(size));
            Ok(())
        }
        Err(e) => {
            tracing::error!("Download failed: {}", e);
            Err(e.into())
        }
    }
}

/// Picks a file name from the last non-empty path segment of a URL
fn file_name_from_url(url: &str) -> Result<String, url::ParseError> {
    let parsed = url::Url::parse(url)?;
    let name = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("index.html");
    Ok(name.to_string())
}
