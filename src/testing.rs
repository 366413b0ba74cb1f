//! Testing utilities for bookhub
//!
//! This module provides test doubles for every collaborator of the loading
//! core plus a `TestDb` wrapper for temporary database management.
//!
//! Doubles are cheap to clone and share their state, so a test can keep one
//! clone for assertions while the hub owns another.
//!
//! Only available when compiled with `cfg(test)`.

use crate::address::{QueryAddress, ResolvedBookAddress};
use crate::book::{
    ArchiveEntryOpener, ArchiveEntryView, Book, BookCreateSetting, BookError, BookFactory, ContentListener, EntryKind,
    ViewContents,
};
use crate::db::{Database, DbError};
use crate::hub::{BookHubEvent, CancellationToken};
use crate::load::StartPageSpec;
use crate::memento::SessionMemento;
use crate::store::{BookmarkNode, BookmarkStore, HistoryEntry, HistoryStore};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Wrapper for a temporary test database that cleans up on drop
///
/// # Examples
/// ```ignore
/// let test_db = TestDb::new();
/// let db = test_db.db();
/// assert_eq!(db.history_count(), 0);
/// ```
pub struct TestDb {
    db: Database,
    // declared last so the database closes before the directory goes away
    dir: TempDir,
}

impl TestDb {
    /// Create a new empty database in a temporary directory
    ///
    /// # Panics
    /// Panics if the directory or the database cannot be created.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::open(dir.path().join("db")).expect("Failed to open test database");
        Self { db, dir }
    }

    #[must_use]
    pub const fn db(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Blocks a collaborator call until released or canceled
#[derive(Debug, Clone, Default)]
pub struct Gate {
    entered: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl Gate {
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    /// Wait until a call reached the gate
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.entered.load(Ordering::SeqCst) {
                return true;
            }
            thread::sleep(POLL);
        }
        false
    }

    fn pass(&self, cancel: &CancellationToken) -> Result<(), BookError> {
        self.entered.store(true, Ordering::SeqCst);
        loop {
            if self.released.load(Ordering::SeqCst) {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(BookError::Canceled);
            }
            thread::sleep(POLL);
        }
    }
}

#[derive(Default)]
struct OpenerState {
    entries: HashMap<QueryAddress, EntryKind>,
    gates: HashMap<QueryAddress, Gate>,
    opens: usize,
}

/// In-memory [`ArchiveEntryOpener`]
///
/// The archive chain of an entry is every registered archive containing it.
#[derive(Clone, Default)]
pub struct MockArchiveOpener {
    state: Arc<Mutex<OpenerState>>,
}

impl MockArchiveOpener {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn directory(self, path: &str) -> Self {
        self.register(path, EntryKind::Directory)
    }

    #[must_use]
    pub fn archive(self, path: &str) -> Self {
        self.register(path, EntryKind::Archive)
    }

    #[must_use]
    pub fn page(self, path: &str) -> Self {
        self.register(path, EntryKind::Page)
    }

    /// Block opens of `path` until the returned gate is released
    pub fn gate(&self, path: &str) -> Gate {
        let gate = Gate::default();
        lock(&self.state).gates.insert(QueryAddress::parse(path), gate.clone());
        gate
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).opens
    }

    fn register(self, path: &str, kind: EntryKind) -> Self {
        lock(&self.state).entries.insert(QueryAddress::parse(path), kind);
        self
    }
}

impl ArchiveEntryOpener for MockArchiveOpener {
    fn open(&self, address: &QueryAddress, cancel: &CancellationToken) -> Result<ArchiveEntryView, BookError> {
        let gate = {
            let mut state = lock(&self.state);
            state.opens += 1;
            state.gates.get(address).cloned()
        };
        if let Some(gate) = gate {
            gate.pass(cancel)?;
        }

        let state = lock(&self.state);
        let kind = *state
            .entries
            .get(address)
            .ok_or_else(|| BookError::NotFound(address.to_string()))?;
        let mut archive_chain: Vec<QueryAddress> = state
            .entries
            .iter()
            .filter(|(path, kind)| **kind == EntryKind::Archive && *path != address && path.contains(address))
            .map(|(path, _)| path.clone())
            .collect();
        archive_chain.sort_by_key(|path| path.path().len());

        Ok(ArchiveEntryView {
            address: address.clone(),
            kind,
            is_file_system: archive_chain.is_empty(),
            archive_chain,
        })
    }
}

/// Observations about a [`MockBook`] that outlive the book
#[derive(Debug, Clone, Default)]
pub struct BookProbe {
    disposed: Arc<AtomicUsize>,
    started: Arc<AtomicBool>,
}

impl BookProbe {
    pub fn dispose_count(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MockBookState {
    index: usize,
    started: bool,
    listener: Option<ContentListener>,
}

/// Scriptable [`Book`]
pub struct MockBook {
    path: QueryAddress,
    pages: Vec<String>,
    sub_folder_count: usize,
    is_recursive_folder: bool,
    is_inner_archive: bool,
    ready: bool,
    start_index: usize,
    memento: SessionMemento,
    state: Mutex<MockBookState>,
    probe: BookProbe,
}

impl MockBook {
    pub fn new(path: &str, pages: &[&str]) -> Self {
        let path = QueryAddress::parse(path);
        Self {
            memento: SessionMemento::for_address(&SessionMemento::default(), &path),
            path,
            pages: pages.iter().map(|page| (*page).to_string()).collect(),
            sub_folder_count: 0,
            is_recursive_folder: false,
            is_inner_archive: false,
            ready: true,
            start_index: 0,
            state: Mutex::new(MockBookState::default()),
            probe: BookProbe::default(),
        }
    }

    #[must_use]
    pub fn with_sub_folders(mut self, count: usize) -> Self {
        self.sub_folder_count = count;
        self
    }

    #[must_use]
    pub const fn recursive(mut self, recursive: bool) -> Self {
        self.is_recursive_folder = recursive;
        self
    }

    #[must_use]
    pub const fn inner_archive(mut self, inner: bool) -> Self {
        self.is_inner_archive = inner;
        self
    }

    /// Report contents that never become ready
    #[must_use]
    pub const fn never_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    #[must_use]
    pub fn with_memento(mut self, memento: SessionMemento) -> Self {
        self.memento = memento;
        self
    }

    #[must_use]
    pub const fn start_at(mut self, index: usize) -> Self {
        self.start_index = index;
        self
    }

    pub fn probe(&self) -> BookProbe {
        self.probe.clone()
    }

    fn show(&self, index: usize, is_page_terminated: bool) -> ViewContents {
        let listener = {
            let mut state = lock(&self.state);
            state.index = index;
            state.listener.clone()
        };
        let contents = ViewContents {
            page: self.pages.get(index).cloned(),
            index,
            all_ready: self.ready,
            is_page_terminated,
        };
        if let Some(listener) = listener {
            listener(&contents);
        }
        contents
    }
}

impl Book for MockBook {
    fn path(&self) -> &QueryAddress {
        &self.path
    }

    fn pages(&self) -> Vec<String> {
        self.pages.clone()
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn is_recursive_folder(&self) -> bool {
        self.is_recursive_folder
    }

    fn sub_folder_count(&self) -> usize {
        self.sub_folder_count
    }

    fn is_inner_archive(&self) -> bool {
        self.is_inner_archive
    }

    fn set_content_listener(&self, listener: ContentListener) {
        lock(&self.state).listener = Some(listener);
    }

    fn start(&self) {
        lock(&self.state).started = true;
        self.probe.started.store(true, Ordering::SeqCst);
        if !self.pages.is_empty() {
            self.show(self.start_index.min(self.pages.len() - 1), false);
        }
    }

    fn current_page(&self) -> Option<String> {
        let index = lock(&self.state).index;
        self.pages.get(index).cloned()
    }

    fn move_to(&self, index: usize) -> Option<ViewContents> {
        if !lock(&self.state).started {
            return None;
        }
        let last = self.pages.len().checked_sub(1)?;
        Some(self.show(index.min(last), index > last))
    }

    fn memento(&self) -> SessionMemento {
        let mut memento = self.memento.clone();
        memento.page = self.current_page().unwrap_or_default();
        memento
    }

    fn dispose(&self) {
        lock(&self.state).listener = None;
        self.probe.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shape of the books a [`MockBookFactory`] builds for one address
#[derive(Debug, Clone, Default)]
pub struct MockBookSpec {
    pub pages: Vec<String>,
    /// Pages when opened recursively; `pages` when `None`
    pub recursive_pages: Option<Vec<String>>,
    pub sub_folder_count: usize,
    pub is_inner_archive: bool,
    pub never_ready: bool,
}

impl MockBookSpec {
    pub fn pages(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|page| (*page).to_string()).collect(),
            ..Self::default()
        }
    }
}

type ErrorFn = Arc<dyn Fn() -> BookError + Send + Sync>;

/// A construction seen by [`MockBookFactory`]
#[derive(Debug, Clone)]
pub struct Construction {
    pub address: ResolvedBookAddress,
    pub setting: BookCreateSetting,
    pub memento: SessionMemento,
}

#[derive(Default)]
struct FactoryState {
    specs: HashMap<QueryAddress, MockBookSpec>,
    errors: HashMap<QueryAddress, ErrorFn>,
    gates: HashMap<QueryAddress, Gate>,
    constructions: Vec<Construction>,
    probes: Vec<BookProbe>,
}

/// Scriptable [`BookFactory`] producing [`MockBook`]s
#[derive(Clone, Default)]
pub struct MockBookFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockBookFactory {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn book(self, path: &str, pages: &[&str]) -> Self {
        self.book_with(path, MockBookSpec::pages(pages))
    }

    #[must_use]
    pub fn book_with(self, path: &str, spec: MockBookSpec) -> Self {
        lock(&self.state).specs.insert(QueryAddress::parse(path), spec);
        self
    }

    /// Fail every construction of `path`
    #[must_use]
    pub fn fail(self, path: &str, error: impl Fn() -> BookError + Send + Sync + 'static) -> Self {
        lock(&self.state)
            .errors
            .insert(QueryAddress::parse(path), Arc::new(error));
        self
    }

    /// Block constructions of `path` until the returned gate is released
    pub fn gate(&self, path: &str) -> Gate {
        let gate = Gate::default();
        lock(&self.state).gates.insert(QueryAddress::parse(path), gate.clone());
        gate
    }

    pub fn constructions(&self) -> Vec<Construction> {
        lock(&self.state).constructions.clone()
    }

    pub fn probes(&self) -> Vec<BookProbe> {
        lock(&self.state).probes.clone()
    }
}

impl BookFactory for MockBookFactory {
    fn construct(
        &self,
        address: &ResolvedBookAddress,
        setting: &BookCreateSetting,
        memento: &SessionMemento,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Book>, BookError> {
        let gate = {
            let mut state = lock(&self.state);
            state.constructions.push(Construction {
                address: address.clone(),
                setting: setting.clone(),
                memento: memento.clone(),
            });
            state.gates.get(&address.address).cloned()
        };
        if let Some(gate) = gate {
            gate.pass(cancel)?;
        }

        let mut state = lock(&self.state);
        if let Some(error) = state.errors.get(&address.address) {
            return Err(error());
        }
        let spec = state
            .specs
            .get(&address.address)
            .cloned()
            .ok_or_else(|| BookError::NotFound(address.address.to_string()))?;

        let pages = match (&spec.recursive_pages, setting.is_recursive_folder) {
            (Some(pages), true) => pages.clone(),
            _ => spec.pages.clone(),
        };
        let start_index = match &setting.start_page {
            StartPageSpec::First => 0,
            StartPageSpec::Last => pages.len().saturating_sub(1),
            StartPageSpec::Named { name, .. } => pages.iter().position(|page| page == name).unwrap_or(0),
        };
        let page_refs: Vec<&str> = pages.iter().map(String::as_str).collect();
        let mut book = MockBook::new(&address.address.to_string(), &page_refs)
            .with_sub_folders(spec.sub_folder_count)
            .recursive(setting.is_recursive_folder)
            .inner_archive(spec.is_inner_archive)
            .with_memento(memento.clone())
            .start_at(start_index);
        if spec.never_ready {
            book = book.never_ready();
        }
        state.probes.push(book.probe());
        Ok(Box::new(book))
    }
}

#[derive(Default)]
struct HistoryState {
    entries: HashMap<QueryAddress, HistoryEntry>,
    resume: Option<QueryAddress>,
    adds: usize,
    sequence: u64,
    fail_writes: bool,
}

/// In-memory [`HistoryStore`]
#[derive(Clone, Default)]
pub struct MemoryHistory {
    state: Arc<Mutex<HistoryState>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without counting it as a write
    #[must_use]
    pub fn with_entry(self, memento: SessionMemento, place: &str) -> Self {
        {
            let mut state = lock(&self.state);
            state.sequence += 1;
            let address = QueryAddress::parse(&memento.path);
            let entry = HistoryEntry {
                address: address.clone(),
                place: QueryAddress::parse(place),
                memento,
                last_accessed: Utc::now(),
                sequence: state.sequence,
            };
            state.entries.insert(address, entry);
        }
        self
    }

    pub fn entry(&self, address: &QueryAddress) -> Option<HistoryEntry> {
        lock(&self.state).entries.get(address).cloned()
    }

    pub fn add_count(&self) -> usize {
        lock(&self.state).adds
    }

    pub fn resume_pointer(&self) -> Option<QueryAddress> {
        lock(&self.state).resume.clone()
    }

    /// Make every write fail
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }
}

impl HistoryStore for MemoryHistory {
    fn add(&self, memento: &SessionMemento, place: &QueryAddress, preserve_order: bool) -> Result<(), DbError> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(DbError::InvalidInput("history is read-only".into()));
        }
        state.adds += 1;
        state.sequence += 1;
        let sequence = state.sequence;
        let address = QueryAddress::parse(&memento.path);
        let entry = match state.entries.remove(&address) {
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
                sequence,
            },
        };
        state.entries.insert(address, entry);
        Ok(())
    }

    fn contains(&self, address: &QueryAddress) -> bool {
        lock(&self.state).entries.contains_key(address)
    }

    fn get_valid(&self, address: &QueryAddress) -> Option<HistoryEntry> {
        self.entry(address).filter(|entry| entry.memento.is_for(address))
    }

    fn set_resume_pointer(&self, address: Option<&QueryAddress>) -> Result<(), DbError> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(DbError::InvalidInput("history is read-only".into()));
        }
        state.resume = address.cloned();
        Ok(())
    }
}

/// In-memory [`BookmarkStore`]
#[derive(Clone, Default)]
pub struct MemoryBookmarks {
    nodes: Arc<Mutex<HashMap<QueryAddress, BookmarkNode>>>,
}

impl MemoryBookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn folder(self, path: &str) -> Self {
        let address = QueryAddress::parse(path);
        let name = address.leaf_name().unwrap_or_default().to_string();
        lock(&self.nodes).insert(address, BookmarkNode::Folder { name });
        self
    }

    #[must_use]
    pub fn entry(self, path: &str, target: &str) -> Self {
        let address = QueryAddress::parse(path);
        let name = address.leaf_name().unwrap_or_default().to_string();
        let node = BookmarkNode::Entry {
            name,
            target: QueryAddress::parse(target),
        };
        lock(&self.nodes).insert(address, node);
        self
    }
}

impl BookmarkStore for MemoryBookmarks {
    fn find_node(&self, query: &QueryAddress) -> Result<Option<BookmarkNode>, DbError> {
        Ok(lock(&self.nodes).get(query).cloned())
    }

    fn contains(&self, address: &QueryAddress) -> bool {
        lock(&self.nodes)
            .values()
            .any(|node| matches!(node, BookmarkNode::Entry { target, .. } if target == address))
    }
}

/// Short name of an event, for ordering assertions
pub fn event_kind(event: &BookHubEvent) -> &'static str {
    match event {
        BookHubEvent::LoadStarting { .. } => "LoadStarting",
        BookHubEvent::LoadingStateChanged { is_loading: true, .. } => "Loading(true)",
        BookHubEvent::LoadingStateChanged { is_loading: false, .. } => "Loading(false)",
        BookHubEvent::BookChanging { .. } => "BookChanging",
        BookHubEvent::BookChanged { address: Some(_), .. } => "BookChanged",
        BookHubEvent::BookChanged { address: None, .. } => "BookChanged(None)",
        BookHubEvent::EmptyResult { .. } => "EmptyResult",
        BookHubEvent::HistoryListSync { .. } => "HistoryListSync",
        BookHubEvent::FolderListSync { .. } => "FolderListSync",
        BookHubEvent::AddressChanged { .. } => "AddressChanged",
        BookHubEvent::ConfirmRecursive { .. } => "ConfirmRecursive",
        BookHubEvent::ViewCleared => "ViewCleared",
        BookHubEvent::HistoryAdded { .. } => "HistoryAdded",
        BookHubEvent::CodecRequired { .. } => "CodecRequired",
    }
}

/// Events already delivered to `receiver`
pub fn drain_events(receiver: &Receiver<BookHubEvent>) -> Vec<BookHubEvent> {
    receiver.try_iter().collect()
}

/// Collect events up to and including the first one matching `stop`
///
/// # Panics
/// Panics if no matching event arrives within `timeout`.
pub fn collect_until(
    receiver: &Receiver<BookHubEvent>,
    timeout: Duration,
    stop: impl Fn(&BookHubEvent) -> bool,
) -> Vec<BookHubEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok(event) => {
                let done = stop(&event);
                events.push(event);
                if done {
                    return events;
                }
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                panic!("no matching event within {timeout:?}; got {events:?}")
            }
        }
    }
}
