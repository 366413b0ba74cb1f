//! Query resolution
//!
//! Turns whatever the user pointed at (a folder, an archive, a page inside an
//! archive, a bookmark) into the book to open, the page to start at and the
//! place the folder list should show.

use super::{AddressError, QueryAddress, QueryScheme};
use crate::book::{ArchiveEntryOpener, ArchiveEntryView, BookError};
use crate::config::ArchiveRecursionMode;
use crate::hub::CancellationToken;
use crate::load::LoadOptions;
use crate::store::{BookmarkNode, BookmarkStore};
use log::debug;
use std::sync::Arc;

/// Outcome of resolving a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBookAddress {
    /// Page to open the book at, if one was targeted
    pub entry_name: Option<String>,
    /// Canonical book location
    pub address: QueryAddress,
    /// Containing folder or archive shown in the folder list
    pub place: QueryAddress,
    /// What the user pointed at (after bookmark dereference, before page split)
    pub source_address: QueryAddress,
}

/// Resolves queries against the archive-entry and bookmark collaborators
#[derive(Clone)]
pub struct AddressResolver {
    opener: Arc<dyn ArchiveEntryOpener>,
    bookmarks: Arc<dyn BookmarkStore>,
}

impl AddressResolver {
    #[must_use]
    pub fn new(opener: Arc<dyn ArchiveEntryOpener>, bookmarks: Arc<dyn BookmarkStore>) -> Self {
        Self { opener, bookmarks }
    }

    /// Resolve `query` into a book address
    ///
    /// `source_query` overrides the recorded source address; `entry_name`
    /// names the start page explicitly and skips the page split.
    ///
    /// # Errors
    ///
    /// - `AddressError::CannotOpenFolder` for a bookmark folder
    /// - `AddressError::BookmarkNotFound` for a dangling bookmark path
    /// - `AddressError::UnsupportedScheme` for tree-only schemes
    /// - `AddressError::Entry` when the archive entry cannot be opened
    /// - `AddressError::Canceled` when `cancel` fires
    pub fn resolve(
        &self,
        query: &QueryAddress,
        source_query: Option<&QueryAddress>,
        entry_name: Option<&str>,
        mode: ArchiveRecursionMode,
        options: LoadOptions,
        cancel: &CancellationToken,
    ) -> Result<ResolvedBookAddress, AddressError> {
        checkpoint(cancel)?;
        let entry_name = entry_name.filter(|name| !name.is_empty());

        let query = match query.scheme() {
            QueryScheme::Pagemark => {
                let root = QueryAddress::pagemark_root();
                return Ok(ResolvedBookAddress {
                    entry_name: entry_name.map(str::to_string),
                    place: root.clone(),
                    source_address: source_query.cloned().unwrap_or_else(|| query.clone()),
                    address: root,
                });
            }
            QueryScheme::Bookmark => {
                let target = self.dereference_bookmark(query)?;
                checkpoint(cancel)?;
                target
            }
            QueryScheme::Root | QueryScheme::QuickAccess => {
                return Err(AddressError::UnsupportedScheme(query.to_string()));
            }
            QueryScheme::File | QueryScheme::Archive | QueryScheme::Playlist => query.clone(),
        };
        let source_address = source_query.cloned().unwrap_or_else(|| query.clone());

        let entry = self.open_entry(&query, cancel)?;

        let (address, entry_name, book_entry, targeted_page) = if let Some(name) = entry_name {
            (query, Some(name.to_string()), entry, true)
        } else if entry.is_book() || options.contains(LoadOptions::IS_BOOK) {
            (query, None, entry, false)
        } else {
            let parent = query
                .parent()
                .ok_or_else(|| AddressError::Entry(BookError::NotFound(query.to_string())))?;
            let leaf = query.leaf_name().map(str::to_string);
            let book_entry = self.open_entry(&parent, cancel)?;
            (parent, leaf, book_entry, true)
        };

        let place = place_of(&address, &book_entry, targeted_page, mode);
        debug!("resolved {source_address} -> {address} (entry {entry_name:?}, place {place})");

        Ok(ResolvedBookAddress {
            entry_name,
            address,
            place,
            source_address,
        })
    }

    fn dereference_bookmark(&self, query: &QueryAddress) -> Result<QueryAddress, AddressError> {
        match self.bookmarks.find_node(query)? {
            Some(BookmarkNode::Entry { target, .. }) => Ok(target),
            Some(BookmarkNode::Folder { .. }) => Err(AddressError::CannotOpenFolder(query.to_string())),
            None => Err(AddressError::BookmarkNotFound(query.to_string())),
        }
    }

    fn open_entry(&self, address: &QueryAddress, cancel: &CancellationToken) -> Result<ArchiveEntryView, AddressError> {
        let entry = self.opener.open(address, cancel).map_err(|e| match e {
            BookError::Canceled => AddressError::Canceled,
            other => AddressError::Entry(other),
        })?;
        checkpoint(cancel)?;
        Ok(entry)
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), AddressError> {
    cancel.check().map_err(|_| AddressError::Canceled)
}

fn place_of(
    address: &QueryAddress,
    book_entry: &ArchiveEntryView,
    targeted_page: bool,
    mode: ArchiveRecursionMode,
) -> QueryAddress {
    match mode {
        ArchiveRecursionMode::IncludeSubArchives => book_entry
            .root_archive()
            .and_then(QueryAddress::parent)
            .or_else(|| address.parent())
            .unwrap_or_else(|| address.clone()),
        ArchiveRecursionMode::IncludeSubDirectories if targeted_page => address.clone(),
        ArchiveRecursionMode::IncludeSubDirectories => address.parent().unwrap_or_else(|| address.clone()),
    }
}
