//! Bookhub CLI application entry point
//!
//! This is the main executable for bookhub. It wires the filesystem and zip
//! collaborators, the sled database and the configuration into a `BookHub`
//! and exposes it on the command line.
//!
//! # Usage
//!
//! ```bash
//! # Open a folder or archive
//! bookhub open ~/comics/vol1.zip
//!
//! # Open an archive at a given page and list its pages
//! bookhub open ~/comics/vol1.zip/page012.png --pages
//!
//! # Reopen where you left off
//! bookhub open ~/comics/vol1.zip --resume
//!
//! # Manage history and bookmarks
//! bookhub history list
//! bookhub bookmark folder Comics
//! bookhub bookmark add "Comics/Vol 1" ~/comics/vol1.zip
//! bookhub open "bookmark:/Comics/Vol 1"
//! ```
//!
//! # Configuration
//!
//! Configuration is stored in the user's config directory
//! (`~/.config/bookhub/config.toml` on Linux) and created on first run.

use bookhub::{
    BookHubError,
    book::fs::{FsArchiveOpener, FsBookFactory},
    cli::{Cli, Commands},
    commands,
    config::BookHubConfig,
    db::Database,
    hub::{BookHub, Collaborators},
};
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::Arc;

type Result<T> = std::result::Result<T, BookHubError>;

/// Minimal stderr logger for the `log` facade
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "error".red().bold(),
            Level::Warn => "warn".yellow().bold(),
            Level::Info => "info".green(),
            Level::Debug => "debug".blue(),
            Level::Trace => "trace".dimmed(),
        };
        eprintln!("{level} {}: {}", record.target().dimmed(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Open the database selected by `--db` or the configuration
fn open_database(cli: &Cli, config: &BookHubConfig) -> Result<Arc<Database>> {
    let path = match &cli.db {
        Some(path) => path.clone(),
        None => config.database_path_or_default()?,
    };
    log::debug!("opening database at {}", path.display());
    Ok(Arc::new(Database::open(path)?.with_history_limit(config.history.limit)))
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_level());

    let config = BookHubConfig::load()?;
    let quiet = cli.quiet;

    match &cli.command {
        Commands::Config { command } => commands::config(&config, command)?,
        Commands::History { command } => {
            let db = open_database(&cli, &config)?;
            commands::history(&db, command, quiet)?;
            db.flush()?;
        }
        Commands::Bookmark { command } => {
            let db = open_database(&cli, &config)?;
            commands::bookmark(&db, command, quiet)?;
            db.flush()?;
        }
        Commands::Open(args) => {
            let db = open_database(&cli, &config)?;
            let hub = BookHub::new(
                Collaborators {
                    opener: Arc::new(FsArchiveOpener::new()),
                    factory: Arc::new(FsBookFactory::new()),
                    history: Arc::clone(&db) as _,
                    bookmarks: Arc::clone(&db) as _,
                },
                config,
            )?;
            let result = commands::open(&hub, args, quiet);
            hub.shutdown();
            db.flush()?;
            result?;
        }
    }

    Ok(())
}
