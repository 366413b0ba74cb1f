//! Load options and the pure policy derived from them
//!
//! [`LoadOptions`] is a flag set covering independent axes of a load request:
//! recursion, start page, reload semantics, history behavior, same-place
//! short-circuit and address-kind hints. The policy functions turn it into the
//! concrete decisions the orchestrator needs:
//!
//! - [`effective_recursive`]: whether sub-folders are folded into the book
//! - [`effective_start_page`]: which page the book opens at
//!
//! Neither function touches I/O or shared state.

bitflags::bitflags! {
    /// Flag set describing a load request
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LoadOptions: u32 {
        const NONE = 0;
        /// Force recursive folder traversal
        const RECURSIVE = 1;
        /// Force non-recursive traversal
        const NOT_RECURSIVE = 1 << 1;
        /// Recursive when no saved setting exists
        const DEFAULT_RECURSIVE = 1 << 2;
        const FIRST_PAGE = 1 << 3;
        const LAST_PAGE = 1 << 4;
        /// Reopen the current book
        const RELOAD = 1 << 5;
        /// Bypass cached folder and archive listings
        const IGNORE_CACHE = 1 << 6;
        /// Do not move the history entry to the front
        const KEEP_HISTORY_ORDER = 1 << 7;
        /// Ask the history list to select the book
        const SELECT_HISTORY_MAYBE = 1 << 8;
        /// Ask the folder list to select the book
        const SELECT_FOLDER_LIST_MAYBE = 1 << 9;
        /// Restore the complete saved session
        const RESUME = 1 << 10;
        /// Do nothing when the same book is already open
        const SKIP_SAME_PLACE = 1 << 11;
        /// Caller asserts the path is a book
        const IS_BOOK = 1 << 12;
        /// Caller hint that the path is a page. Resolution probes the
        /// filesystem either way; the flag is only checked against `IS_BOOK`.
        const IS_PAGE = 1 << 13;
        /// Reset the remembered last page of a named start entry
        const IS_RESET_LAST_PAGE = 1 << 14;
    }
}

/// Page a book opens at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPageSpec {
    First,
    Last,
    /// Explicit entry; `reset_last` drops the remembered last page
    Named { name: String, reset_last: bool },
}

impl StartPageSpec {
    /// Entry name for `Named`, `None` otherwise
    #[must_use]
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Self::Named { name, .. } => Some(name),
            Self::First | Self::Last => None,
        }
    }
}

/// Recursive flag after applying the explicit recursion flags
#[must_use]
pub const fn effective_recursive(saved: bool, options: LoadOptions) -> bool {
    if options.contains(LoadOptions::NOT_RECURSIVE) {
        false
    } else if options.contains(LoadOptions::RECURSIVE) {
        true
    } else {
        saved
    }
}

/// Start page from the page flags and an optional entry name
///
/// `FIRST_PAGE` wins over `LAST_PAGE`, and both win over `entry_name`.
#[must_use]
pub fn effective_start_page(entry_name: Option<&str>, options: LoadOptions) -> StartPageSpec {
    if options.contains(LoadOptions::FIRST_PAGE) {
        return StartPageSpec::First;
    }
    if options.contains(LoadOptions::LAST_PAGE) {
        return StartPageSpec::Last;
    }
    match entry_name.filter(|name| !name.is_empty()) {
        Some(name) => StartPageSpec::Named {
            name: name.to_string(),
            reset_last: options.contains(LoadOptions::IS_RESET_LAST_PAGE),
        },
        None => StartPageSpec::First,
    }
}
