//! Book loading orchestration
//!
//! [`BookHub`] owns the currently open book and serializes every load and
//! unload through a [`CommandQueue`]. A load walks through
//!
//! ```text
//! Idle → Resolving → ApplyingSettings → ConstructingBook → AwaitingFirstContent → Committed
//!                                                               ↘ Failed / Canceled
//! ```
//!
//! and always returns to `Idle`. Requesting a new load cancels every load still
//! in flight, so the newest request wins. Observers receive [`BookHubEvent`]s
//! through [`BookHub::subscribe`].

pub mod cancel;
pub mod error;
pub mod events;
pub mod history;
pub mod queue;
pub mod session;

pub use cancel::{CancellationToken, Canceled, ReadyNotifier, ReadySignal, WaitError};
pub use error::LoadError;
pub use events::{BookHubEvent, EventBus, RecursiveOpenRequest};
pub use history::{HistoryRecorder, HistorySession};
pub use queue::{CommandHandle, CommandOutcome, CommandQueue};
pub use session::SessionHandle;

use crate::address::{AddressResolver, QueryAddress, ResolvedBookAddress};
use crate::book::{ArchiveEntryOpener, Book, BookCreateSetting, BookFactory, ContentListener, ViewContents};
use crate::config::BookHubConfig;
use crate::load::{LoadOptions, effective_recursive, effective_start_page};
use crate::memento::{SessionMemento, SettingMerger};
use crate::store::{BookMementoType, BookmarkStore, HistoryStore};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

const COMMAND_THREAD_NAME: &str = "bookhub-command";

/// Progress of the load pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Resolving,
    ApplyingSettings,
    ConstructingBook,
    AwaitingFirstContent,
    Committed,
    Failed,
    Canceled,
}

/// External collaborators wired into a hub
#[derive(Clone)]
pub struct Collaborators {
    pub opener: Arc<dyn ArchiveEntryOpener>,
    pub factory: Arc<dyn BookFactory>,
    pub history: Arc<dyn HistoryStore>,
    pub bookmarks: Arc<dyn BookmarkStore>,
}

/// Parameters of one load command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub path: QueryAddress,
    /// Recorded as the source address instead of `path`
    pub source_path: Option<QueryAddress>,
    pub start_entry: Option<String>,
    pub options: LoadOptions,
    pub refresh_folder_list: bool,
}

impl LoadRequest {
    #[must_use]
    pub fn new(path: QueryAddress) -> Self {
        Self {
            path,
            source_path: None,
            start_entry: None,
            options: LoadOptions::NONE,
            refresh_folder_list: false,
        }
    }

    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.start_entry = Some(entry.into());
        self
    }

    #[must_use]
    pub const fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: QueryAddress) -> Self {
        self.source_path = Some(source);
        self
    }

    #[must_use]
    pub const fn with_refresh_folder_list(mut self, refresh: bool) -> Self {
        self.refresh_folder_list = refresh;
        self
    }
}

#[derive(Default)]
struct SessionState {
    unit: Option<Arc<SessionHandle>>,
    history_entry: bool,
    history_removed: bool,
    page_change_count: u32,
}

impl SessionState {
    fn reset_flags(&mut self) {
        self.history_entry = false;
        self.history_removed = false;
        self.page_change_count = 0;
    }

    fn current(&self, session_id: u64) -> Option<&Arc<SessionHandle>> {
        self.unit.as_ref().filter(|unit| unit.id() == session_id)
    }
}

struct Shared {
    session: Mutex<SessionState>,
    events: EventBus,
    config: RwLock<Arc<BookHubConfig>>,
    resolver: AddressResolver,
    factory: Arc<dyn BookFactory>,
    history: Arc<dyn HistoryStore>,
    bookmarks: Arc<dyn BookmarkStore>,
    enabled: AtomicBool,
    outstanding: Mutex<Vec<CancellationToken>>,
    generation: AtomicU64,
    next_session_id: AtomicU64,
    state: Mutex<LoadState>,
    codec_notified: AtomicBool,
}

/// Book-loading orchestrator
pub struct BookHub {
    shared: Arc<Shared>,
    queue: CommandQueue,
}

impl BookHub {
    /// Create a hub and start its command worker
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the worker thread cannot be spawned.
    pub fn new(collaborators: Collaborators, config: BookHubConfig) -> std::io::Result<Arc<Self>> {
        let Collaborators {
            opener,
            factory,
            history,
            bookmarks,
        } = collaborators;

        let shared = Arc::new(Shared {
            session: Mutex::new(SessionState::default()),
            events: EventBus::new(),
            config: RwLock::new(Arc::new(config)),
            resolver: AddressResolver::new(opener, Arc::clone(&bookmarks)),
            factory,
            history,
            bookmarks,
            enabled: AtomicBool::new(true),
            outstanding: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            next_session_id: AtomicU64::new(1),
            state: Mutex::new(LoadState::Idle),
            codec_notified: AtomicBool::new(false),
        });

        Ok(Arc::new(Self {
            shared,
            queue: CommandQueue::new(COMMAND_THREAD_NAME)?,
        }))
    }

    /// Register an observer for hub events
    pub fn subscribe(&self) -> Receiver<BookHubEvent> {
        self.shared.events.subscribe()
    }

    /// Queue a load of `path`
    ///
    /// Returns `None` when loading is disabled, `path` is `None`, or
    /// `SKIP_SAME_PLACE` is set and `path` is already open.
    pub fn request_load(
        &self,
        path: Option<&QueryAddress>,
        start_entry: Option<&str>,
        options: LoadOptions,
        refresh_folder_list: bool,
    ) -> Option<CommandHandle> {
        let mut request = LoadRequest::new(path?.clone())
            .with_options(options)
            .with_refresh_folder_list(refresh_folder_list);
        request.start_entry = start_entry.map(str::to_string);
        self.submit(request)
    }

    /// Queue a fully specified load
    pub fn submit(&self, request: LoadRequest) -> Option<CommandHandle> {
        debug_assert!(
            !request.options.contains(LoadOptions::IS_BOOK | LoadOptions::IS_PAGE),
            "IS_BOOK and IS_PAGE are exclusive"
        );
        if !self.is_enabled() {
            debug!("loading disabled, ignoring request for {}", request.path);
            return None;
        }
        if request.options.contains(LoadOptions::SKIP_SAME_PLACE)
            && self.current_address().as_ref() == Some(&request.path)
        {
            debug!("{} is already open", request.path);
            return None;
        }

        let cancel = self.shared.replace_outstanding();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        Some(self.queue.enqueue_cancellable("load", cancel, move || {
            shared.execute_load(&request, &token, generation)
        }))
    }

    /// Queue an unload of the current book
    ///
    /// Cancels every load still in flight.
    pub fn request_unload(&self, clear_view: bool, message: Option<String>) -> CommandHandle {
        self.shared.cancel_outstanding();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        self.queue
            .enqueue("unload", move || shared.execute_unload(clear_view, message))
    }

    /// Reopen the current book at its current position
    pub fn request_reload(&self) -> Option<CommandHandle> {
        let unit = self.shared.current_unit()?;
        let mut options = LoadOptions::RELOAD | LoadOptions::IS_BOOK | LoadOptions::RESUME;
        if unit.is_keep_history_order() {
            options |= LoadOptions::KEEP_HISTORY_ORDER;
        }
        self.submit(LoadRequest::new(unit.address().clone()).with_options(options))
    }

    /// Open the place containing the current book
    pub fn request_load_parent(&self) -> Option<CommandHandle> {
        let unit = self.shared.current_unit()?;
        let resolved = unit.resolved();
        let mut request = LoadRequest::new(resolved.place.clone())
            .with_options(LoadOptions::IS_BOOK | LoadOptions::SKIP_SAME_PLACE)
            .with_refresh_folder_list(true);
        request.start_entry = resolved.address.leaf_name().map(str::to_string);
        self.submit(request)
    }

    /// Accept a recursive-open offer
    ///
    /// Returns `None` when a newer load already superseded the offer.
    pub fn confirm_recursive(&self, request: &RecursiveOpenRequest) -> Option<CommandHandle> {
        if request.generation != self.shared.generation.load(Ordering::SeqCst) {
            debug!("recursive open offer for {} is stale", request.address);
            return None;
        }
        self.submit(
            LoadRequest::new(request.address.clone()).with_options(LoadOptions::RECURSIVE | LoadOptions::RELOAD),
        )
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Replace the configuration used by later commands
    pub fn set_config(&self, config: BookHubConfig) {
        let mut slot = match self.shared.config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Arc::new(config);
    }

    #[must_use]
    pub fn config(&self) -> Arc<BookHubConfig> {
        self.shared.config()
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        *lock(&self.shared.state)
    }

    /// Commands queued or running
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.queue.pending_count()
    }

    #[must_use]
    pub fn current_address(&self) -> Option<QueryAddress> {
        self.shared.current_unit().map(|unit| unit.address().clone())
    }

    #[must_use]
    pub fn current_resolved(&self) -> Option<ResolvedBookAddress> {
        self.shared.current_unit().map(|unit| unit.resolved().clone())
    }

    #[must_use]
    pub fn current_memento(&self) -> Option<SessionMemento> {
        self.shared.current_unit().map(|unit| unit.memento())
    }

    /// Run `f` against the current book
    ///
    /// The session lock is not held while `f` runs, so `f` may drive the book.
    pub fn with_current_book<R>(&self, f: impl FnOnce(&dyn Book) -> R) -> Option<R> {
        self.shared.current_unit().map(|unit| f(unit.book()))
    }

    /// Note that `address` was deleted from history
    ///
    /// The current session stops recording if it is that book.
    pub fn mark_history_removed(&self, address: &QueryAddress) {
        let mut state = self.shared.lock_session();
        if state.unit.as_ref().is_some_and(|unit| unit.address() == address) {
            state.history_removed = true;
        }
    }

    /// Stop the worker after draining queued commands
    pub fn shutdown(&self) {
        self.shared.cancel_outstanding();
        self.queue.shutdown();
    }
}

impl Shared {
    fn config(&self) -> Arc<BookHubConfig> {
        match self.config.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.session)
    }

    fn current_unit(&self) -> Option<Arc<SessionHandle>> {
        self.lock_session().unit.clone()
    }

    fn set_state(&self, next: LoadState) {
        let mut state = lock(&self.state);
        if *state != next {
            debug!("load state {:?} -> {next:?}", *state);
            *state = next;
        }
    }

    fn cancel_outstanding(&self) {
        for token in lock(&self.outstanding).drain(..) {
            token.cancel();
        }
    }

    fn replace_outstanding(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut outstanding = lock(&self.outstanding);
        for previous in outstanding.drain(..) {
            previous.cancel();
        }
        outstanding.push(token.clone());
        token
    }

    fn retire(&self, token: &CancellationToken) {
        lock(&self.outstanding).retain(|t| !t.same_as(token));
    }

    fn execute_load(self: &Arc<Self>, request: &LoadRequest, cancel: &CancellationToken, generation: u64) -> CommandOutcome {
        if cancel.is_cancelled() {
            debug!("load of {} canceled before start", request.path);
            self.retire(cancel);
            return CommandOutcome::Canceled;
        }

        let config = self.config();
        let path = request.path.to_string();
        self.events.emit(BookHubEvent::LoadStarting { path: path.clone() });
        self.events.emit(BookHubEvent::LoadingStateChanged {
            is_loading: true,
            path: Some(path.clone()),
        });

        let outcome = match self.load(request, &config, cancel, generation) {
            Ok(()) => CommandOutcome::Completed,
            Err(error) => {
                self.clear_resume_pointer();
                if error.is_canceled() {
                    debug!("load of {path} canceled");
                    self.set_state(LoadState::Canceled);
                    CommandOutcome::Canceled
                } else {
                    warn!("load of {path} failed: {error}");
                    self.set_state(LoadState::Failed);
                    let message = self.report_failure(&path, &error, &config);
                    CommandOutcome::Failed(message)
                }
            }
        };

        self.set_state(LoadState::Idle);
        self.events.emit(BookHubEvent::LoadingStateChanged {
            is_loading: false,
            path: None,
        });
        self.retire(cancel);
        outcome
    }

    fn load(
        self: &Arc<Self>,
        request: &LoadRequest,
        config: &BookHubConfig,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<(), LoadError> {
        let options = request.options;
        let resume = self.release_current(config);

        self.set_state(LoadState::Resolving);
        let resolved = self.resolver.resolve(
            &request.path,
            request.source_path.as_ref(),
            request.start_entry.as_deref(),
            config.book.archive_recursion_mode,
            options,
            cancel,
        )?;

        self.events.emit(BookHubEvent::AddressChanged {
            address: resolved.address.clone(),
        });
        if request.refresh_folder_list || options.contains(LoadOptions::SELECT_FOLDER_LIST_MAYBE) {
            self.events.emit(BookHubEvent::FolderListSync {
                place: resolved.place.clone(),
                select: select_in_place(&resolved.place, &resolved.source_address)
                    .unwrap_or_else(|| resolved.address.clone()),
                is_focus: request.refresh_folder_list,
            });
        }
        if options.contains(LoadOptions::SELECT_HISTORY_MAYBE) {
            self.events.emit(BookHubEvent::HistoryListSync {
                address: resolved.address.clone(),
            });
        }

        self.set_state(LoadState::ApplyingSettings);
        let persisted = self.history.get_valid(&resolved.address).map(|entry| entry.memento);
        let merger = SettingMerger::new(config.default_memento.clone(), config.history.memento_filter.clone());
        let mut memento = merger.merge(&resolved.address, resume.as_ref(), persisted.as_ref(), options);
        memento.is_recursive_folder = effective_recursive(memento.is_recursive_folder, options);

        let start_entry = resolved
            .entry_name
            .clone()
            .or_else(|| (!memento.page.is_empty()).then(|| memento.page.clone()));
        let mut setting = BookCreateSetting {
            start_page: effective_start_page(start_entry.as_deref(), options),
            is_recursive_folder: memento.is_recursive_folder,
            recursion_mode: config.book.archive_recursion_mode,
            sort_mode: memento.sort_mode,
            ignore_cache: options.contains(LoadOptions::IGNORE_CACHE),
        };

        self.set_state(LoadState::ConstructingBook);
        let mut unit = self.construct(&resolved, &setting, &memento, options, cancel)?;
        if config.book.is_auto_recursive
            && !unit.book().is_recursive_folder()
            && unit.book().sub_folder_count() == 1
        {
            debug!("{} holds a single folder, reopening recursively", resolved.address);
            drop(unit);
            setting.is_recursive_folder = true;
            memento.is_recursive_folder = true;
            unit = self.construct(&resolved, &setting, &memento, options, cancel)?;
        }

        self.set_state(LoadState::AwaitingFirstContent);
        let (notifier, signal) = ReadySignal::channel();
        unit.book().set_content_listener(self.content_listener(unit.id(), notifier));
        unit.book().start();
        if unit.book().page_count() > 0 {
            match signal.wait(cancel) {
                Ok(()) => {}
                Err(WaitError::Canceled) => return Err(LoadError::Canceled),
                Err(WaitError::Abandoned) => {
                    debug!("{} dropped its content listener before becoming ready", resolved.address);
                }
            }
        }

        self.commit(unit, config, cancel, generation)
    }

    fn construct(
        &self,
        resolved: &ResolvedBookAddress,
        setting: &BookCreateSetting,
        memento: &SessionMemento,
        options: LoadOptions,
        cancel: &CancellationToken,
    ) -> Result<SessionHandle, LoadError> {
        let book = self
            .factory
            .construct(resolved, setting, memento, cancel)
            .map_err(|source| LoadError::Construction {
                path: resolved.address.to_string(),
                source,
            })?;
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let unit = SessionHandle::new(id, book, resolved.clone(), options);
        if cancel.is_cancelled() {
            return Err(LoadError::Canceled);
        }
        Ok(unit)
    }

    fn commit(
        self: &Arc<Self>,
        unit: SessionHandle,
        config: &BookHubConfig,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<(), LoadError> {
        let unit = Arc::new(unit);
        {
            let mut state = self.lock_session();
            if cancel.is_cancelled() {
                return Err(LoadError::Canceled);
            }
            state.unit = Some(Arc::clone(&unit));
            state.reset_flags();
        }
        self.set_state(LoadState::Committed);

        let address = unit.address().clone();
        if let Err(e) = self.history.set_resume_pointer(Some(&address)) {
            warn!("Failed to store resume pointer for {address}: {e}");
        }
        self.events.emit(BookHubEvent::BookChanged {
            address: Some(address.clone()),
            memento_type: self.memento_type(&address),
        });

        let book = unit.book();
        info!("opened {address} ({} pages)", book.page_count());
        if book.page_count() == 0 {
            self.events.emit(BookHubEvent::EmptyResult {
                message: format!("There are no pages in {address}"),
            });
            let sub_folder_count = book.sub_folder_count();
            if sub_folder_count > 0 && !book.is_recursive_folder() && config.book.is_confirm_recursive {
                self.events.emit(BookHubEvent::ConfirmRecursive {
                    request: RecursiveOpenRequest {
                        address,
                        sub_folder_count,
                        generation,
                    },
                });
            }
        } else {
            let contents = ViewContents {
                page: book.current_page(),
                index: 0,
                all_ready: true,
                is_page_terminated: false,
            };
            self.on_view_contents_changed(unit.id(), &contents);
        }
        Ok(())
    }

    /// Emit `BookChanging` and release the current book
    ///
    /// Returns the outgoing memento as the resume candidate.
    fn release_current(&self, config: &BookHubConfig) -> Option<SessionMemento> {
        let current = self.current_unit().map(|unit| unit.address().clone());
        self.events.emit(BookHubEvent::BookChanging { address: current });

        // Readers may still hold clones of the handle, so the book is disposed
        // here rather than left to the last drop.
        let (unit, memento, flush) = {
            let mut state = self.lock_session();
            let flush = state.history_entry && !state.history_removed;
            state.reset_flags();
            let unit = state.unit.take()?;
            let memento = unit.memento();
            unit.dispose();
            (unit, memento, flush)
        };

        if flush && HistoryRecorder::new(&config.history).allows_update(unit.is_keep_history_order()) {
            self.record_history(&unit, &memento);
        }
        debug!("released {}", unit.address());
        Some(memento)
    }

    fn execute_unload(&self, clear_view: bool, message: Option<String>) -> CommandOutcome {
        let config = self.config();
        let released = self.release_current(&config);
        self.events.emit(BookHubEvent::BookChanged {
            address: None,
            memento_type: BookMementoType::None,
        });
        if clear_view {
            self.events.emit(BookHubEvent::ViewCleared);
        }
        if let Some(message) = message {
            self.events.emit(BookHubEvent::EmptyResult { message });
        }
        if let Some(memento) = released {
            info!("unloaded {}", memento.path);
        }
        CommandOutcome::Completed
    }

    fn report_failure(&self, path: &str, error: &LoadError, config: &BookHubConfig) -> String {
        let message = match error {
            LoadError::Address(e) => format!("Cannot open {path}: {e}"),
            other => other.to_string(),
        };
        self.events.emit(BookHubEvent::BookChanged {
            address: None,
            memento_type: BookMementoType::None,
        });
        self.events.emit(BookHubEvent::EmptyResult {
            message: message.clone(),
        });
        if let Some(extension) = error.missing_codec_extension()
            && !self.codec_notified.swap(true, Ordering::SeqCst)
        {
            self.events.emit(BookHubEvent::CodecRequired {
                extension: extension.to_string(),
                store_uri: config.codec_store_uri.clone(),
            });
        }
        message
    }

    fn clear_resume_pointer(&self) {
        if let Err(e) = self.history.set_resume_pointer(None) {
            warn!("Failed to clear resume pointer: {e}");
        }
    }

    fn memento_type(&self, address: &QueryAddress) -> BookMementoType {
        if self.bookmarks.contains(address) {
            BookMementoType::Bookmark
        } else if self.history.contains(address) {
            BookMementoType::History
        } else {
            BookMementoType::None
        }
    }

    fn content_listener(self: &Arc<Self>, session_id: u64, notifier: ReadyNotifier) -> ContentListener {
        let shared: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |contents: &ViewContents| {
            if contents.all_ready {
                notifier.notify();
            }
            if let Some(shared) = shared.upgrade() {
                shared.on_view_contents_changed(session_id, contents);
            }
        })
    }

    fn on_view_contents_changed(&self, session_id: u64, contents: &ViewContents) {
        let (unit, session) = {
            let mut state = self.lock_session();
            let Some(unit) = state.current(session_id).cloned() else {
                return;
            };
            state.page_change_count = state.page_change_count.saturating_add(1);
            let session = HistorySession {
                page_count: unit.book().page_count(),
                page_change_count: state.page_change_count,
                is_page_terminated: contents.is_page_terminated,
                history_entry: state.history_entry,
                history_removed: state.history_removed,
                keep_history_order: unit.is_keep_history_order(),
                is_inner_archive: unit.book().is_inner_archive(),
                is_unc: unit.address().is_unc(),
            };
            (unit, session)
        };

        let config = self.config();
        if !HistoryRecorder::new(&config.history).should_record(&session) {
            return;
        }
        if self.record_history(&unit, &unit.memento()) {
            let first = {
                let mut state = self.lock_session();
                state.current(session_id).is_some() && !std::mem::replace(&mut state.history_entry, true)
            };
            if first {
                self.events.emit(BookHubEvent::HistoryAdded {
                    address: unit.address().clone(),
                });
            }
        }
    }

    fn record_history(&self, unit: &SessionHandle, memento: &SessionMemento) -> bool {
        match self
            .history
            .add(memento, &unit.resolved().place, unit.is_keep_history_order())
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to record history for {}: {e}", unit.address());
                false
            }
        }
    }
}

/// Child of `place` on the way down to `target`
fn select_in_place(place: &QueryAddress, target: &QueryAddress) -> Option<QueryAddress> {
    if place == target || !place.contains(target) {
        return None;
    }
    let mut current = target.clone();
    loop {
        let parent = current.parent()?;
        if &parent == place {
            return Some(current);
        }
        current = parent;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
