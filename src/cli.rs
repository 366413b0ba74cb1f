//! Command-line interface definitions and parsing
//!
//! This module defines the complete CLI structure for bookhub using the `clap` crate.
//!
//! # Commands
//!
//! - **open**: Load a folder, archive or bookmark as a book and report the result
//! - **history**: List, remove or clear persisted history entries
//! - **bookmark**: Manage the bookmark tree
//! - **config**: Inspect the configuration file
//!
//! # Examples
//!
//! ```no_run
//! use bookhub::cli::{Cli, Commands};
//!
//! let cli = Cli::parse_args();
//! if let Commands::Open(args) = &cli.command {
//!     let options = args.load_options();
//!     println!("{options:?}");
//! }
//! ```

use crate::address::{QueryAddress, QueryScheme};
use crate::load::LoadOptions;
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

/// Main CLI structure for parsing command-line arguments
#[derive(Parser, Debug)]
#[command(name = "bookhub")]
#[command(about = "Open folders and archives as books", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database directory (overrides config)
    #[arg(long = "db", value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Suppress informational output (only print results)
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print debug logging to stderr
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Parse command line arguments
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level selected by `--quiet` / `--verbose`
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open a folder, archive, page or bookmark as a book
    #[command(visible_alias = "o")]
    Open(OpenArgs),

    /// Manage reading history
    #[command(visible_alias = "h")]
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Manage bookmarks
    #[command(visible_alias = "bm")]
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommands,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Arguments of the `open` command
#[derive(Args, Debug, Clone, Default)]
pub struct OpenArgs {
    /// Location to open (`/path`, `/path/archive.zip/page.png`, `bookmark:/name`)
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Start at this entry inside the book
    #[arg(short = 'e', long = "entry", value_name = "NAME")]
    pub entry: Option<String>,

    /// Start at the first page
    #[arg(long = "first", conflicts_with = "last")]
    pub first: bool,

    /// Start at the last page
    #[arg(long = "last")]
    pub last: bool,

    /// Fold sub-folders into the page list
    #[arg(short = 'r', long = "recursive", conflicts_with = "no_recursive")]
    pub recursive: bool,

    /// Never fold sub-folders, even if history says so
    #[arg(long = "no-recursive")]
    pub no_recursive: bool,

    /// Restore every saved setting, including the page
    #[arg(long = "resume")]
    pub resume: bool,

    /// Do not move the book to the top of the history
    #[arg(long = "keep-history-order")]
    pub keep_history_order: bool,

    /// Re-read folder and archive listings
    #[arg(long = "ignore-cache")]
    pub ignore_cache: bool,

    /// Treat PATH as a book even if it looks like a page
    #[arg(long = "book", conflicts_with = "page")]
    pub book: bool,

    /// Treat PATH as a page of its parent book
    #[arg(long = "page")]
    pub page: bool,

    /// Move to this page after opening
    #[arg(short = 'g', long = "goto", value_name = "INDEX")]
    pub goto: Option<usize>,

    /// Print the page list
    #[arg(long = "pages")]
    pub pages: bool,

    /// Print events as JSON lines
    #[arg(long = "json")]
    pub json: bool,
}

impl OpenArgs {
    /// Parsed location
    #[must_use]
    pub fn address(&self) -> QueryAddress {
        QueryAddress::parse(&self.path)
    }

    /// Load flags selected on the command line
    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        let flags = [
            (self.first, LoadOptions::FIRST_PAGE),
            (self.last, LoadOptions::LAST_PAGE),
            (self.recursive, LoadOptions::RECURSIVE),
            (self.no_recursive, LoadOptions::NOT_RECURSIVE),
            (self.resume, LoadOptions::RESUME),
            (self.keep_history_order, LoadOptions::KEEP_HISTORY_ORDER),
            (self.ignore_cache, LoadOptions::IGNORE_CACHE),
            (self.book, LoadOptions::IS_BOOK),
            (self.page, LoadOptions::IS_PAGE),
        ];
        flags
            .into_iter()
            .filter(|(set, _)| *set)
            .fold(LoadOptions::NONE, |options, (_, flag)| options | flag)
    }
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommands {
    /// List history entries, newest first
    #[command(visible_alias = "ls")]
    List {
        /// Print entries as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Remove the entry for a book
    #[command(visible_alias = "rm")]
    Remove {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Remove every entry
    Clear {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
}

/// Bookmark management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum BookmarkCommands {
    /// Bookmark a location (`NAME` may be nested: `Comics/Vol 1`)
    Add {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "TARGET")]
        target: String,
    },

    /// Create a bookmark folder
    Folder {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// List the bookmark tree
    #[command(visible_alias = "ls")]
    List,

    /// Remove a bookmark or folder with its contents
    #[command(visible_alias = "rm")]
    Remove {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the configuration file path
    Path,
}

/// `bookmark:` address for a bookmark name
///
/// Accepts both `Comics/Vol 1` and `bookmark:/Comics/Vol 1`.
#[must_use]
pub fn bookmark_address(name: &str) -> QueryAddress {
    let address = QueryAddress::parse(name);
    if address.scheme() == QueryScheme::Bookmark {
        return address;
    }
    QueryAddress::new(QueryScheme::Bookmark, format!("/{}", name.trim_start_matches('/')))
}
