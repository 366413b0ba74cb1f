//! Database wrapper module for bookhub
//!
//! Provides persisted history and bookmarks using sled as the embedded
//! database backend.
//!
//! Uses multiple sled trees:
//! - `history`: book address -> `HistoryEntry`
//! - `bookmarks`: `bookmark:` path -> `BookmarkNode`
//! - `state`: small singletons such as the resume pointer
//!
//! History lookups made by the loading core go through a `moka` cache that is
//! invalidated on every write. A write counter lets a lookup that raced a
//! write drop the value it just cached.

use crate::address::{QueryAddress, QueryScheme};
use crate::memento::SessionMemento;
use crate::store::{BookmarkNode, BookmarkStore, HistoryEntry, HistoryStore};
use chrono::Utc;
use moka::sync::Cache;
use sled::{Db, Tree};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod error;
pub mod types;

pub use error::DbError;
pub use types::AddressKey;

use types::{decode_record, encode_record};

const RESUME_POINTER_KEY: &[u8] = b"resume_pointer";
const HISTORY_CACHE_CAPACITY: u64 = 256;

/// Database wrapper that encapsulates all database operations
pub struct Database {
    db: Db,
    history: Tree,
    bookmarks: Tree,
    state: Tree,
    history_limit: usize,
    history_cache: Cache<String, Option<HistoryEntry>>,
    history_writes: AtomicU64,
}

impl Database {
    /// Opens or creates a database at the specified path
    ///
    /// # Examples
    /// ```no_run
    /// use bookhub::db::Database;
    /// let db = Database::open("my_db").unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the database cannot be opened or if the internal trees cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let db = sled::open(path)?;
        let history = db.open_tree("history")?;
        let bookmarks = db.open_tree("bookmarks")?;
        let state = db.open_tree("state")?;
        Ok(Self {
            db,
            history,
            bookmarks,
            state,
            history_limit: 0,
            history_cache: Cache::new(HISTORY_CACHE_CAPACITY),
            history_writes: AtomicU64::new(0),
        })
    }

    /// Bound the number of history entries (0 = unbounded)
    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Insert or update the history entry for `memento.path`
    ///
    /// A new entry (or an update without `preserve_order`) becomes the newest
    /// one. With `preserve_order` an existing entry keeps its timestamp and
    /// position and only its memento is replaced.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if encoding or database operations fail.
    pub fn add_history(
        &self,
        memento: &SessionMemento,
        place: &QueryAddress,
        preserve_order: bool,
    ) -> Result<HistoryEntry, DbError> {
        if memento.path.is_empty() {
            return Err(DbError::InvalidInput("History memento has no path".to_string()));
        }
        let address = QueryAddress::parse(&memento.path);
        let key: Vec<u8> = AddressKey::new(&address).into();

        let existing = match self.history.get(&key)? {
            Some(bytes) => Some(decode_record::<HistoryEntry>(&bytes)?),
            None => None,
        };

        let entry = match existing {
            Some(previous) if preserve_order => HistoryEntry {
                memento: memento.clone(),
                place: place.clone(),
                ..previous
            },
            _ => HistoryEntry {
                address: address.clone(),
                place: place.clone(),
                memento: memento.clone(),
                last_accessed: Utc::now(),
                sequence: self.db.generate_id()?,
            },
        };

        self.history.insert(key, encode_record(&entry)?)?;
        self.history_changed(Some(&address));
        self.trim_history()?;
        Ok(entry)
    }

    /// Get the history entry for `address`
    ///
    /// # Errors
    ///
    /// Returns `DbError` if database operations or decoding fail.
    pub fn get_history(&self, address: &QueryAddress) -> Result<Option<HistoryEntry>, DbError> {
        let key: Vec<u8> = AddressKey::new(address).into();
        match self.history.get(key)? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All history entries, newest first
    ///
    /// # Errors
    ///
    /// Returns `DbError` if iteration or decoding fails.
    pub fn list_history(&self) -> Result<Vec<HistoryEntry>, DbError> {
        let mut entries = Vec::new();
        for result in &self.history {
            let (_, value) = result?;
            entries.push(decode_record::<HistoryEntry>(&value)?);
        }
        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(entries)
    }

    /// Remove the history entry for `address`
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the database operation fails.
    pub fn remove_history(&self, address: &QueryAddress) -> Result<bool, DbError> {
        let key: Vec<u8> = AddressKey::new(address).into();
        let removed = self.history.remove(key)?.is_some();
        self.history_changed(Some(address));
        Ok(removed)
    }

    /// Remove every history entry
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the database operation fails.
    pub fn clear_history(&self) -> Result<(), DbError> {
        self.history.clear()?;
        self.history_changed(None);
        Ok(())
    }

    #[must_use]
    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    /// Record a history write and drop the affected cache entries
    fn history_changed(&self, address: Option<&QueryAddress>) {
        self.history_writes.fetch_add(1, Ordering::SeqCst);
        match address {
            Some(address) => self.history_cache.invalidate(&address.to_string()),
            None => self.history_cache.invalidate_all(),
        }
    }

    fn trim_history(&self) -> Result<(), DbError> {
        if self.history_limit == 0 || self.history.len() <= self.history_limit {
            return Ok(());
        }
        let entries = self.list_history()?;
        for stale in entries.iter().skip(self.history_limit) {
            self.remove_history(&stale.address)?;
        }
        Ok(())
    }

    /// Create a bookmark folder at a `bookmark:` path
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidInput` for non-bookmark paths or a missing parent folder.
    pub fn add_bookmark_folder(&self, path: &QueryAddress) -> Result<(), DbError> {
        let name = self.check_bookmark_path(path)?;
        self.put_bookmark(path, &BookmarkNode::Folder { name })
    }

    /// Create (or replace) a bookmark pointing at `target`
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidInput` for non-bookmark paths, bookmark targets
    /// or a missing parent folder.
    pub fn add_bookmark(&self, path: &QueryAddress, target: &QueryAddress) -> Result<(), DbError> {
        if target.scheme() == QueryScheme::Bookmark {
            return Err(DbError::InvalidInput(format!("Bookmark target cannot be a bookmark: {target}")));
        }
        let name = self.check_bookmark_path(path)?;
        self.put_bookmark(
            path,
            &BookmarkNode::Entry {
                name,
                target: target.clone(),
            },
        )
    }

    /// Get the node stored at `path`
    ///
    /// # Errors
    ///
    /// Returns `DbError` if database operations or decoding fail.
    pub fn get_bookmark(&self, path: &QueryAddress) -> Result<Option<BookmarkNode>, DbError> {
        let key: Vec<u8> = AddressKey::new(path).into();
        match self.bookmarks.get(key)? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove a bookmark node and everything below it
    ///
    /// # Errors
    ///
    /// Returns `DbError::NotFound` if nothing is stored at `path`.
    pub fn remove_bookmark(&self, path: &QueryAddress) -> Result<usize, DbError> {
        let key = AddressKey::new(path);
        let own_key: Vec<u8> = key.clone().into();
        if self.bookmarks.remove(&own_key)?.is_none() {
            return Err(DbError::NotFound(path.to_string()));
        }
        let mut removed = 1;
        for result in self.bookmarks.scan_prefix(key.child_prefix()) {
            let (child, _) = result?;
            self.bookmarks.remove(child)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// All bookmark nodes in path order
    ///
    /// # Errors
    ///
    /// Returns `DbError` if iteration or decoding fails.
    pub fn list_bookmarks(&self) -> Result<Vec<(QueryAddress, BookmarkNode)>, DbError> {
        let mut nodes = Vec::new();
        for result in &self.bookmarks {
            let (key, value) = result?;
            let address = AddressKey::from_bytes(&key)?.into_inner();
            nodes.push((address, decode_record(&value)?));
        }
        Ok(nodes)
    }

    /// Book to reopen at startup
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the stored pointer cannot be read.
    pub fn resume_pointer(&self) -> Result<Option<QueryAddress>, DbError> {
        match self.state.get(RESUME_POINTER_KEY)? {
            Some(bytes) => Ok(Some(AddressKey::from_bytes(&bytes)?.into_inner())),
            None => Ok(None),
        }
    }

    /// Flush pending writes to disk
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the flush fails.
    pub fn flush(&self) -> Result<(), DbError> {
        self.db.flush()?;
        Ok(())
    }

    /// Clear all trees
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the database operation fails.
    pub fn clear(&self) -> Result<(), DbError> {
        self.history.clear()?;
        self.bookmarks.clear()?;
        self.state.clear()?;
        self.history_changed(None);
        Ok(())
    }

    fn check_bookmark_path(&self, path: &QueryAddress) -> Result<String, DbError> {
        if path.scheme() != QueryScheme::Bookmark {
            return Err(DbError::InvalidInput(format!("{path} is not a bookmark path")));
        }
        let name = path
            .leaf_name()
            .ok_or_else(|| DbError::InvalidInput(format!("{path} has no name")))?
            .to_string();
        if let Some(parent) = path.parent().filter(|p| !is_bookmark_root(p)) {
            match self.get_bookmark(&parent)? {
                Some(node) if node.is_folder() => {}
                Some(_) => {
                    return Err(DbError::InvalidInput(format!("{parent} is not a bookmark folder")));
                }
                None => return Err(DbError::InvalidInput(format!("Missing bookmark folder: {parent}"))),
            }
        }
        Ok(name)
    }

    fn put_bookmark(&self, path: &QueryAddress, node: &BookmarkNode) -> Result<(), DbError> {
        let key: Vec<u8> = AddressKey::new(path).into();
        self.bookmarks.insert(key, encode_record(node)?)?;
        Ok(())
    }
}

fn is_bookmark_root(path: &QueryAddress) -> bool {
    path.is_empty() || path.path() == "/"
}

impl HistoryStore for Database {
    fn add(&self, memento: &SessionMemento, place: &QueryAddress, preserve_order: bool) -> Result<(), DbError> {
        self.add_history(memento, place, preserve_order).map(|_| ())
    }

    fn contains(&self, address: &QueryAddress) -> bool {
        let key: Vec<u8> = AddressKey::new(address).into();
        self.history.contains_key(key).unwrap_or(false)
    }

    fn get_valid(&self, address: &QueryAddress) -> Option<HistoryEntry> {
        let cache_key = address.to_string();
        if let Some(cached) = self.history_cache.get(&cache_key) {
            return cached;
        }
        let writes = self.history_writes.load(Ordering::SeqCst);
        let entry = match self.get_history(address) {
            Ok(entry) => entry.filter(|e| e.memento.is_for(address)),
            Err(e) => {
                log::warn!("Ignoring unreadable history entry for {address}: {e}");
                None
            }
        };
        self.history_cache.insert(cache_key.clone(), entry.clone());
        if self.history_writes.load(Ordering::SeqCst) != writes {
            self.history_cache.invalidate(&cache_key);
        }
        entry
    }

    fn set_resume_pointer(&self, address: Option<&QueryAddress>) -> Result<(), DbError> {
        match address {
            Some(address) => {
                let bytes: Vec<u8> = AddressKey::new(address).into();
                self.state.insert(RESUME_POINTER_KEY, bytes)?;
            }
            None => {
                self.state.remove(RESUME_POINTER_KEY)?;
            }
        }
        Ok(())
    }
}

impl BookmarkStore for Database {
    fn find_node(&self, query: &QueryAddress) -> Result<Option<BookmarkNode>, DbError> {
        self.get_bookmark(query)
    }

    fn contains(&self, address: &QueryAddress) -> bool {
        self.bookmarks.iter().values().any(|value| {
            value
                .ok()
                .and_then(|bytes| decode_record::<BookmarkNode>(&bytes).ok())
                .is_some_and(|node| matches!(node, BookmarkNode::Entry { target, .. } if &target == address))
        })
    }
}
