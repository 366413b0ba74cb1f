//! Bookhub - the book-loading core of an image and archive viewer
//!
//! This library turns a user-supplied location (a folder, an archive, a
//! bookmark or a path inside an archive) into the single currently-open book,
//! merging per-book session settings from history, bookmarks and defaults.
//! Loads are serialized on one worker and a newer request always supersedes
//! an older one.

use thiserror::Error;

pub mod address;
pub mod book;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod hub;
pub mod load;
pub mod memento;
pub mod store;

#[cfg(test)]
pub mod testing;

/// Error enum, contains all failure states of the program
#[derive(Debug, Error)]
pub enum BookHubError {
    /// Database error
    #[error("Database error: {0}")]
    DbError(#[from] db::DbError),
    /// Address resolution error
    #[error("Address error: {0}")]
    AddressError(#[from] address::AddressError),
    /// Archive or book error
    #[error("Book error: {0}")]
    BookError(#[from] book::BookError),
    /// Load pipeline error
    #[error("Load error: {0}")]
    LoadError(#[from] hub::LoadError),
    /// Represents a configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ::config::ConfigError),
    /// Represents an I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// JSON output failed
    #[error("Serialization error: {0}")]
    SerializeError(#[from] serde_json::Error),
    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
