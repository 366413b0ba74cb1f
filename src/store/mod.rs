//! Persisted stores consumed by the loading core
//!
//! The orchestrator only needs a narrow view of history and bookmarks:
//!
//! - **`HistoryStore`**: upsert mementos, probe membership, fetch the record
//!   used for setting merge, and keep the startup resume pointer
//! - **`BookmarkStore`**: dereference bookmark paths and probe membership
//!
//! `db::Database` implements both on top of sled.

use crate::address::QueryAddress;
use crate::db::DbError;
use crate::memento::SessionMemento;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub address: QueryAddress,
    /// Containing folder at the time the entry was made
    pub place: QueryAddress,
    pub memento: SessionMemento,
    pub last_accessed: DateTime<Utc>,
    /// Monotonic ordering key, larger is newer
    pub sequence: u64,
}

/// Node of the bookmark tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookmarkNode {
    /// Grouping node, not openable as a book
    Folder { name: String },
    /// Bookmark pointing at a real location
    Entry { name: String, target: QueryAddress },
}

impl BookmarkNode {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Folder { name } | Self::Entry { name, .. } => name,
        }
    }

    #[must_use]
    pub const fn is_folder(&self) -> bool {
        matches!(self, Self::Folder { .. })
    }
}

/// Whether the opened book came from a bookmark, history or neither
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookMementoType {
    None,
    Bookmark,
    History,
}

/// History persistence used by the orchestrator
pub trait HistoryStore: Send + Sync {
    /// Insert or update the entry for `memento.path`
    ///
    /// With `preserve_order` an existing entry keeps its position.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the entry cannot be written.
    fn add(&self, memento: &SessionMemento, place: &QueryAddress, preserve_order: bool) -> Result<(), DbError>;

    fn contains(&self, address: &QueryAddress) -> bool;

    /// Entry for `address` whose memento can be applied
    fn get_valid(&self, address: &QueryAddress) -> Option<HistoryEntry>;

    /// Remember (or clear) the book to reopen at next startup
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the pointer cannot be written.
    fn set_resume_pointer(&self, address: Option<&QueryAddress>) -> Result<(), DbError>;
}

/// Bookmark lookup used by the resolver and the memento classification
pub trait BookmarkStore: Send + Sync {
    /// Node stored at a `bookmark:` address
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the node cannot be read or decoded.
    fn find_node(&self, query: &QueryAddress) -> Result<Option<BookmarkNode>, DbError>;

    /// Whether any bookmark targets `address`
    fn contains(&self, address: &QueryAddress) -> bool;
}
