// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use log::{error, info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use pahedl::app_config::{Config, LogLevel};
use pahedl::bulk::ArchiveStrategy;
use pahedl::errors::ServiceError;
use pahedl::Controller;

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// CLI wrapper for ArchiveStrategy to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliArchiveStrategy {
    /// Stage payloads on disk, archive store-only
    Disk,
    /// Stage the whole archive in memory, deflate-compressed
    Memory,
}

impl From<CliArchiveStrategy> for ArchiveStrategy {
    fn from(cli_strategy: CliArchiveStrategy) -> Self {
        match cli_strategy {
            CliArchiveStrategy::Disk => ArchiveStrategy::DiskStaged,
            CliArchiveStrategy::Memory => ArchiveStrategy::MemoryStaged,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the origin catalog by name
    Search {
        /// Title to search for
        query: String,
    },

    /// Resolve the direct media link for one episode
    Resolve {
        /// Anime id as returned by search
        id: String,

        /// Episode number, 1-based
        episode: i64,
    },

    /// Resolve a range of episodes and create a download session
    Bulk {
        /// Anime id as returned by search
        id: String,

        /// First episode of the range
        from: i64,

        /// Last episode of the range, inclusive
        to: i64,
    },

    /// Download a session's episodes into a ZIP archive
    Archive {
        /// Session id as returned by bulk
        session_id: String,

        /// Output path; defaults to the archive's own filename
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to stage archive contents
        #[arg(long, value_enum, default_value = "disk")]
        staging: CliArchiveStrategy,
    },

    /// Show cache store counters
    Stats,
}

/// pahedl - anime episode link resolution and bulk downloads
///
/// Searches the origin catalog, resolves episodes to direct media
/// URLs, and packages whole episode ranges as ZIP archives. Resolved
/// links and session cookies are cached locally between runs.
#[derive(Parser, Debug)]
#[command(name = "pahedl")]
#[command(version = "1.0.0")]
#[command(about = "Anime episode link resolver and bulk downloader")]
#[command(long_about = "pahedl resolves anime episodes to direct media URLs and bundles them into ZIP archives.

EXAMPLES:
    pahedl search \"one piece\"                # Find an anime and its id
    pahedl resolve OP1234 7                    # Direct link for episode 7
    pahedl bulk OP1234 1 24                    # Resolve a range, get a session id
    pahedl archive <session-id>                # Download the session as a ZIP
    pahedl archive <session-id> --staging memory
    pahedl stats                               # Cache store counters

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a
    different file with --config. If the file doesn't exist, a default
    one is created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

/// Colored stderr logger
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let color = Self::color_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} [{}] {}\x1B[0m",
                color,
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Start at info; the level is re-applied once the config is loaded.
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    let config_path = PathBuf::from(&cli.config_path);
    let mut config = Config::load_or_default(&config_path)?;
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            info!("Could not write default config: {}", e);
        }
    }

    if let Some(cmd_log_level) = cli.log_level {
        config.log_level = cmd_log_level.into();
    }
    log::set_max_level(config.log_level.to_level_filter());

    config.validate()?;

    let controller = Controller::new(&config).context("Failed to initialize")?;

    if let Err(e) = run_command(&controller, cli.command).await {
        error!("{}", e.to_response().message);
        std::process::exit(1);
    }

    Ok(())
}

async fn run_command(controller: &Controller, command: Commands) -> Result<(), ServiceError> {
    match command {
        Commands::Search { query } => {
            let results = controller.search(&query).await?;
            print_json(&results)?;
        }

        Commands::Resolve { id, episode } => {
            let link = controller.resolve_episode(&id, episode).await?;
            print_json(&link)?;
        }

        Commands::Bulk { id, from, to } => {
            let outcome = controller.resolve_range(&id, from, to).await?;
            info!(
                "Resolved {}/{} episodes; session {}",
                outcome.total_fetched, outcome.total_requested, outcome.session_id
            );
            print_json(&outcome)?;
        }

        Commands::Archive {
            session_id,
            output,
            staging,
        } => {
            let archive = controller
                .archive_session(&session_id, staging.into())
                .await?;

            let path = output.unwrap_or_else(|| PathBuf::from(&archive.filename));
            write_archive(archive, &path).await?;
            info!("Archive written to {:?}", path);
        }

        Commands::Stats => {
            let stats = controller.stats()?;
            println!("{}", stats);
        }
    }

    Ok(())
}

async fn write_archive(
    archive: pahedl::bulk::ArchiveStream,
    path: &std::path::Path,
) -> Result<(), ServiceError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create output file {:?}", path))
        .map_err(ServiceError::from)?;

    let mut stream = archive.stream;
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .context("Archive stream failed")
            .map_err(ServiceError::from)?;
        file.write_all(&chunk)
            .await
            .context("Failed to write archive chunk")
            .map_err(ServiceError::from)?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .context("Failed to flush output file")
        .map_err(ServiceError::from)?;
    info!("Wrote {} bytes", written);
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ServiceError> {
    let json = serde_json::to_string_pretty(value)
        .context("Failed to render output")
        .map_err(ServiceError::from)?;
    println!("{}", json);
    Ok(())
}
