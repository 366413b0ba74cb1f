//! Collaborator boundary for archive entries and book construction
//!
//! The loading core never decodes pages itself. It talks to two collaborators:
//!
//! - **`ArchiveEntryOpener`**: turns a path into an [`ArchiveEntryView`] so the
//!   resolver can tell books (directories, archives) from pages
//! - **`BookFactory`**: builds a [`Book`] for a resolved address
//!
//! [`fs`] provides filesystem and zip implementations of both.

pub mod fs;

use crate::address::{QueryAddress, ResolvedBookAddress};
use crate::config::ArchiveRecursionMode;
use crate::hub::CancellationToken;
use crate::load::StartPageSpec;
use crate::memento::{SessionMemento, SortMode};
use std::sync::Arc;
use thiserror::Error;

/// Image extensions that need a platform codec which may be missing
pub const CODEC_EXTENSIONS: &[&str] = &["heic", "heif", "hif", "avif"];

/// Errors raised by the archive and book collaborators
#[derive(Debug, Error)]
pub enum BookError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive could not be read
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Path or archive entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Page image format cannot be decoded
    #[error("Unsupported image format '{extension}': {path}")]
    UnsupportedImage { path: String, extension: String },

    /// Operation was canceled
    #[error("Operation canceled")]
    Canceled,
}

impl BookError {
    /// Extension of an undecodable image that a platform codec would handle
    #[must_use]
    pub fn missing_codec_extension(&self) -> Option<&str> {
        match self {
            Self::UnsupportedImage { extension, .. }
                if CODEC_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()) =>
            {
                Some(extension.as_str())
            }
            _ => None,
        }
    }
}

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Filesystem directory or directory inside an archive
    Directory,
    /// Archive file (zip, cbz, playlist)
    Archive,
    /// Single page
    Page,
}

/// Resolved view of a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntryView {
    pub address: QueryAddress,
    pub kind: EntryKind,
    /// Entry exists directly on the filesystem (not inside an archive)
    pub is_file_system: bool,
    /// Archives containing this entry, outermost first
    pub archive_chain: Vec<QueryAddress>,
}

impl ArchiveEntryView {
    /// Directories and archives open as books
    #[must_use]
    pub const fn is_book(&self) -> bool {
        matches!(self.kind, EntryKind::Directory | EntryKind::Archive)
    }

    #[must_use]
    pub const fn is_archive(&self) -> bool {
        matches!(self.kind, EntryKind::Archive)
    }

    /// Outermost archive containing this entry
    #[must_use]
    pub fn root_archive(&self) -> Option<&QueryAddress> {
        self.archive_chain.first()
    }
}

/// State of the displayed view pages, reported by a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContents {
    /// Entry name of the first displayed page
    pub page: Option<String>,
    pub index: usize,
    /// Every view page reports ready
    pub all_ready: bool,
    /// The sequence reached its first or last page
    pub is_page_terminated: bool,
}

/// Callback invoked whenever the displayed contents change
pub type ContentListener = Arc<dyn Fn(&ViewContents) + Send + Sync>;

/// Parameters handed to [`BookFactory::construct`]
#[derive(Debug, Clone, PartialEq)]
pub struct BookCreateSetting {
    pub start_page: StartPageSpec,
    pub is_recursive_folder: bool,
    pub recursion_mode: ArchiveRecursionMode,
    pub sort_mode: SortMode,
    /// Bypass any cached folder or archive listing
    pub ignore_cache: bool,
}

/// An opened book instance
pub trait Book: Send + Sync {
    /// Address the book was built from
    fn path(&self) -> &QueryAddress;

    /// Entry names of all pages, in display order
    fn pages(&self) -> Vec<String>;

    fn page_count(&self) -> usize;

    /// Source folds sub-folders into the page list
    fn is_recursive_folder(&self) -> bool;

    /// Number of direct sub-folders (directories or archives)
    fn sub_folder_count(&self) -> usize;

    /// Book lives inside another archive
    fn is_inner_archive(&self) -> bool;

    /// Register the content-change listener, replacing any previous one
    fn set_content_listener(&self, listener: ContentListener);

    /// Begin producing view contents at the start page
    fn start(&self);

    /// Entry name of the page currently shown
    fn current_page(&self) -> Option<String>;

    /// Show the page at `index`, clamped to the last page
    ///
    /// Notifies the content listener and returns the new contents, or `None`
    /// for an empty, unstarted or disposed book.
    fn move_to(&self, index: usize) -> Option<ViewContents>;

    /// Snapshot of the session settings including the current page
    fn memento(&self) -> SessionMemento;

    /// Release resources; must tolerate being called on an unstarted book
    fn dispose(&self);
}

/// Builds books from resolved addresses
pub trait BookFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns `BookError` for unsupported formats, I/O failures or cancellation.
    fn construct(
        &self,
        address: &ResolvedBookAddress,
        setting: &BookCreateSetting,
        memento: &SessionMemento,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Book>, BookError>;
}

/// Opens archive-entry views for paths
pub trait ArchiveEntryOpener: Send + Sync {
    /// # Errors
    ///
    /// Returns `BookError::NotFound` when nothing exists at the path, or
    /// `BookError::Canceled` when `cancel` fires during I/O.
    fn open(&self, address: &QueryAddress, cancel: &CancellationToken) -> Result<ArchiveEntryView, BookError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_codec_extension() {
        let heif = BookError::UnsupportedImage {
            path: "/a/b.HEIC".into(),
            extension: "HEIC".into(),
        };
        assert_eq!(heif.missing_codec_extension(), Some("HEIC"));

        let other = BookError::UnsupportedImage {
            path: "/a/b.xyz".into(),
            extension: "xyz".into(),
        };
        assert_eq!(other.missing_codec_extension(), None);
        assert_eq!(BookError::Canceled.missing_codec_extension(), None);
    }

    #[test]
    fn test_entry_view_classification() {
        let view = ArchiveEntryView {
            address: QueryAddress::file("/c/outer.zip/inner.zip"),
            kind: EntryKind::Archive,
            is_file_system: false,
            archive_chain: vec![QueryAddress::file("/c/outer.zip")],
        };
        assert!(view.is_book());
        assert!(view.is_archive());
        assert_eq!(view.root_archive(), Some(&QueryAddress::file("/c/outer.zip")));
    }
}
