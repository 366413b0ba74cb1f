//! Address resolution error types
//!
//! - **`CannotOpenFolder`**: a bookmark folder was requested as a book
//! - **`BookmarkNotFound`**: the bookmark path does not exist
//! - **`UnsupportedScheme`**: the scheme names a tree node, not a book
//! - **`Entry`**: the archive-entry lookup failed
//! - **`Canceled`**: the owning load was superseded mid-resolution

use crate::book::BookError;
use crate::db::DbError;
use thiserror::Error;

/// Errors produced while resolving a query into a book address
#[derive(Debug, Error)]
pub enum AddressError {
    /// Bookmark folders are not directly openable
    #[error("Cannot open bookmark folder: {0}")]
    CannotOpenFolder(String),

    /// No bookmark node exists at the path
    #[error("Bookmark not found: {0}")]
    BookmarkNotFound(String),

    /// Scheme cannot be opened as a book
    #[error("Cannot open {0} as a book")]
    UnsupportedScheme(String),

    /// Archive entry could not be opened
    #[error("{0}")]
    Entry(#[from] BookError),

    /// Bookmark store lookup failed
    #[error("Bookmark store error: {0}")]
    Store(#[from] DbError),

    /// Resolution was canceled
    #[error("Address resolution canceled")]
    Canceled,
}

impl AddressError {
    /// Whether this error only signals cancellation
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled | Self::Entry(BookError::Canceled))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
