//! Typed notifications emitted by the book hub
//!
//! Every notification is a [`BookHubEvent`] variant delivered to each
//! subscriber through its own channel. Delivery is fire-and-forget: a
//! subscriber that dropped its receiver is pruned on the next emit.

use crate::address::QueryAddress;
use crate::store::BookMementoType;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// Pending offer to reopen a page-less folder recursively
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecursiveOpenRequest {
    pub address: QueryAddress,
    pub sub_folder_count: usize,
    /// Load generation that produced the offer
    pub generation: u64,
}

/// Notification emitted by the hub
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BookHubEvent {
    /// A load command started; no I/O has happened yet
    LoadStarting { path: String },
    LoadingStateChanged { is_loading: bool, path: Option<String> },
    /// The current book is about to be released
    BookChanging { address: Option<QueryAddress> },
    /// A book was committed (`Some`) or the hub became bookless (`None`)
    BookChanged {
        address: Option<QueryAddress>,
        memento_type: BookMementoType,
    },
    /// Nothing to show; the message is user-facing
    EmptyResult { message: String },
    /// The history list should select `address`
    HistoryListSync { address: QueryAddress },
    /// The folder list should show `place` and select `select`
    FolderListSync {
        place: QueryAddress,
        select: QueryAddress,
        is_focus: bool,
    },
    /// The displayed address changed
    AddressChanged { address: QueryAddress },
    /// Ask whether to reopen recursively
    ConfirmRecursive { request: RecursiveOpenRequest },
    /// The view should drop its contents
    ViewCleared,
    /// The current book was recorded in history
    HistoryAdded { address: QueryAddress },
    /// A page needs an image codec the platform lacks
    CodecRequired { extension: String, store_uri: String },
}

/// Observer registry
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<BookHubEvent>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer
    pub fn subscribe(&self) -> Receiver<BookHubEvent> {
        let (sender, receiver) = mpsc::channel();
        self.lock().push(sender);
        receiver
    }

    /// Deliver `event` to every live observer
    pub fn emit(&self, event: BookHubEvent) {
        log::debug!("event: {event:?}");
        self.lock().retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<BookHubEvent>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
