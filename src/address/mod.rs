//! Location identity for the loading pipeline
//!
//! A [`QueryAddress`] names a location (a scheme plus a normalized path) and is the
//! unit of identity used by requests, history keys and bookmark targets.
//!
//! # Textual form
//!
//! ```text
//! /comics/vol1.zip              → File
//! archive:/comics/vol1.zip/a    → Archive
//! bookmark:/Favorites/vol1      → Bookmark
//! pagemark:                     → Pagemark root
//! playlist:/lists/today.bhpl    → Playlist
//! ```
//!
//! Backslashes are normalized to `/` and trailing separators are trimmed, so
//! `C:\comics\` and `C:/comics` compare equal.

pub mod error;
pub mod resolver;

pub use error::AddressError;
pub use resolver::{AddressResolver, ResolvedBookAddress};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheme of a [`QueryAddress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryScheme {
    /// Plain filesystem path (directories, archives and pages)
    #[default]
    File,
    /// Location addressed inside archive content
    Archive,
    /// Node of the bookmark tree
    Bookmark,
    /// Synthetic pagemark collection
    Pagemark,
    /// Ad-hoc playlist of files
    Playlist,
    /// Quick-access shortcut node
    QuickAccess,
    /// Virtual root of the folder tree
    Root,
}

impl QueryScheme {
    const ALL: [Self; 7] = [
        Self::File,
        Self::Archive,
        Self::Bookmark,
        Self::Pagemark,
        Self::Playlist,
        Self::QuickAccess,
        Self::Root,
    ];

    /// Prefix used in the textual form (empty for `File`)
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::File => "",
            Self::Archive => "archive:",
            Self::Bookmark => "bookmark:",
            Self::Pagemark => "pagemark:",
            Self::Playlist => "playlist:",
            Self::QuickAccess => "quickaccess:",
            Self::Root => "root:",
        }
    }

    /// Whether paths of this scheme live on the filesystem
    #[must_use]
    pub const fn is_file_like(self) -> bool {
        matches!(self, Self::File | Self::Archive | Self::Playlist)
    }
}

/// Immutable location identity (scheme + normalized path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct QueryAddress {
    scheme: QueryScheme,
    path: String,
}

impl QueryAddress {
    /// Create an address, normalizing the path
    #[must_use]
    pub fn new(scheme: QueryScheme, path: impl AsRef<str>) -> Self {
        Self {
            scheme,
            path: normalize(path.as_ref()),
        }
    }

    /// Filesystem address
    #[must_use]
    pub fn file(path: impl AsRef<str>) -> Self {
        Self::new(QueryScheme::File, path)
    }

    /// Root of the pagemark collection
    #[must_use]
    pub fn pagemark_root() -> Self {
        Self::new(QueryScheme::Pagemark, "")
    }

    /// Parse the textual form (`bookmark:/a/b`, `/plain/path`, ...)
    ///
    /// Anything without a known scheme prefix is a `File` path, which keeps
    /// drive-letter paths such as `C:\comics` working.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        for scheme in QueryScheme::ALL {
            let prefix = scheme.prefix();
            if prefix.is_empty() {
                continue;
            }
            if let Some(rest) = strip_prefix_ignore_case(text, prefix) {
                return Self::new(scheme, rest);
            }
        }
        Self::file(text)
    }

    #[must_use]
    pub const fn scheme(&self) -> QueryScheme {
        self.scheme
    }

    /// Normalized path without the scheme prefix
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path component, if any
    #[must_use]
    pub fn leaf_name(&self) -> Option<&str> {
        let trimmed = self.path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(index) if index + 1 < trimmed.len() => Some(&trimmed[index + 1..]),
            Some(_) => None,
            None if trimmed.is_empty() || is_drive_root(trimmed) => None,
            None => Some(trimmed),
        }
    }

    /// Parent location within the same scheme
    ///
    /// Returns `None` at a root (`/`, `C:`, or an empty path).
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let path = self.path.as_str();
        if path.is_empty() || path == "/" || is_drive_root(path) {
            return None;
        }
        let parent = match path.rfind('/') {
            Some(0) => "/",
            Some(index) => &path[..index],
            None if self.scheme == QueryScheme::File => return None,
            None => "",
        };
        Some(Self::new(self.scheme, parent))
    }

    /// Append a child component
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_start_matches(['/', '\\']);
        if self.path.is_empty() {
            return Self::new(self.scheme, name);
        }
        if self.path.ends_with('/') {
            return Self::new(self.scheme, format!("{}{name}", self.path));
        }
        Self::new(self.scheme, format!("{}/{name}", self.path))
    }

    /// Whether `other` is this address or lies below it
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        if self.scheme != other.scheme {
            return false;
        }
        if self.path == other.path {
            return true;
        }
        let base = self.path.trim_end_matches('/');
        other
            .path
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Whether the path is a UNC share path (`//server/share`)
    #[must_use]
    pub fn is_unc(&self) -> bool {
        self.scheme.is_file_like() && self.path.starts_with("//")
    }
}

impl fmt::Display for QueryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.scheme.prefix(), self.path)
    }
}

impl From<&str> for QueryAddress {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

fn normalize(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    let unc = normalized.starts_with("//");
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    if unc {
        normalized.insert(0, '/');
    }
    while normalized.len() > 1 && normalized.ends_with('/') && !is_drive_root(&normalized[..normalized.len() - 1]) {
        normalized.pop();
    }
    if normalized.len() == 3 && normalized.ends_with('/') && is_drive_root(&normalized[..2]) {
        normalized.pop();
    }
    normalized
}

fn is_drive_root(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}
