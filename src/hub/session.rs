//! The currently open book
//!
//! A [`SessionHandle`] owns a constructed book together with the address it was
//! resolved from and the options it was loaded with. The hub disposes the
//! outgoing book explicitly while it holds the session lock; dropping a handle
//! that was never disposed (rollback, retry) disposes it then. Either way the
//! book is disposed exactly once, even while readers still hold clones.

use crate::address::{QueryAddress, ResolvedBookAddress};
use crate::book::Book;
use crate::load::LoadOptions;
use crate::memento::SessionMemento;
use std::sync::atomic::{AtomicBool, Ordering};

/// Live book plus its identity
pub struct SessionHandle {
    id: u64,
    book: Box<dyn Book>,
    address: ResolvedBookAddress,
    options: LoadOptions,
    disposed: AtomicBool,
}

impl SessionHandle {
    #[must_use]
    pub fn new(id: u64, book: Box<dyn Book>, address: ResolvedBookAddress, options: LoadOptions) -> Self {
        Self {
            id,
            book,
            address,
            options,
            disposed: AtomicBool::new(false),
        }
    }

    /// Unique per hub; used to route content events to the right session
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn book(&self) -> &dyn Book {
        self.book.as_ref()
    }

    #[must_use]
    pub const fn resolved(&self) -> &ResolvedBookAddress {
        &self.address
    }

    /// Canonical book address
    #[must_use]
    pub const fn address(&self) -> &QueryAddress {
        &self.address.address
    }

    #[must_use]
    pub const fn options(&self) -> LoadOptions {
        self.options
    }

    #[must_use]
    pub const fn is_keep_history_order(&self) -> bool {
        self.options.contains(LoadOptions::KEEP_HISTORY_ORDER)
    }

    /// Memento reflecting the book's current state
    #[must_use]
    pub fn memento(&self) -> SessionMemento {
        let mut memento = self.book.memento();
        memento.path = self.address.address.to_string();
        memento
    }

    /// Dispose the book now; later calls and the eventual drop are no-ops
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!("disposing session #{} ({})", self.id, self.address.address);
        self.book.dispose();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBook;

    fn resolved(path: &str) -> ResolvedBookAddress {
        let address = QueryAddress::file(path);
        ResolvedBookAddress {
            entry_name: None,
            place: address.parent().unwrap_or_else(|| address.clone()),
            source_address: address.clone(),
            address,
        }
    }

    #[test]
    fn test_drop_disposes_exactly_once() {
        let book = MockBook::new("/comics/vol1.zip", &["a.jpg"]);
        let probe = book.probe();
        let handle = SessionHandle::new(1, Box::new(book), resolved("/comics/vol1.zip"), LoadOptions::NONE);
        assert_eq!(probe.dispose_count(), 0);

        drop(handle);
        assert_eq!(probe.dispose_count(), 1);
    }

    #[test]
    fn test_explicit_dispose_is_not_repeated_on_drop() {
        let book = MockBook::new("/comics/vol1.zip", &["a.jpg"]);
        let probe = book.probe();
        let handle = SessionHandle::new(1, Box::new(book), resolved("/comics/vol1.zip"), LoadOptions::NONE);

        handle.dispose();
        handle.dispose();
        assert!(handle.is_disposed());
        assert_eq!(probe.dispose_count(), 1);

        drop(handle);
        assert_eq!(probe.dispose_count(), 1);
    }

    #[test]
    fn test_memento_is_bound_to_resolved_address() {
        let book = MockBook::new("/somewhere/else", &["a.jpg"]);
        let handle = SessionHandle::new(
            7,
            Box::new(book),
            resolved("/comics/vol1.zip"),
            LoadOptions::KEEP_HISTORY_ORDER,
        );
        assert_eq!(handle.memento().path, "/comics/vol1.zip");
        assert!(handle.is_keep_history_order());
        assert_eq!(handle.id(), 7);
    }
}
