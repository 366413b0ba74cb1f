//! Single-consumer command queue
//!
//! Load and unload bodies run one at a time, in submission order, on a
//! dedicated worker thread. The queue itself never cancels anything: a newer
//! command does not displace an older one. Cancellation travels through the
//! `CancellationToken` each command captures. The only extra control is
//! [`CommandHandle::abandon`], which makes a not-yet-started command skip its
//! body.
//!
//! Panics inside a command are caught and reported as `Failed`; the worker
//! keeps serving the queue.

use super::cancel::CancellationToken;
use log::debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Final result of a queued command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed,
    /// The command ran and failed; the message is user-facing
    Failed(String),
    /// Superseded or abandoned before it could finish
    Canceled,
}

impl CommandOutcome {
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

type Job = Box<dyn FnOnce() -> CommandOutcome + Send + 'static>;

struct QueuedCommand {
    id: u64,
    name: String,
    abandoned: Arc<AtomicBool>,
    job: Job,
    done: Sender<CommandOutcome>,
}

struct HandleState {
    receiver: Receiver<CommandOutcome>,
    outcome: Option<CommandOutcome>,
}

/// Completion handle returned by [`CommandQueue::enqueue`]
pub struct CommandHandle {
    id: u64,
    name: String,
    abandoned: Arc<AtomicBool>,
    cancel: Option<CancellationToken>,
    state: Mutex<HandleState>,
}

impl CommandHandle {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancellation token threaded through the command, if it has one
    #[must_use]
    pub const fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Skip the command if it has not started, and cancel it if it has
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }

    /// Block until the command finishes
    pub fn wait(&self) -> CommandOutcome {
        let mut state = self.lock_state();
        if let Some(outcome) = &state.outcome {
            return outcome.clone();
        }
        let outcome = state.receiver.recv().unwrap_or(CommandOutcome::Canceled);
        state.outcome = Some(outcome.clone());
        outcome
    }

    /// Wait up to `timeout`; `None` while the command is still pending
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CommandOutcome> {
        let mut state = self.lock_state();
        if let Some(outcome) = &state.outcome {
            return Some(outcome.clone());
        }
        let outcome = match state.receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => CommandOutcome::Canceled,
        };
        state.outcome = Some(outcome.clone());
        Some(outcome)
    }

    fn lock_state(&self) -> MutexGuard<'_, HandleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// FIFO queue served by one worker thread
pub struct CommandQueue {
    sender: Mutex<Option<Sender<QueuedCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
}

impl CommandQueue {
    /// Start the worker thread
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the thread cannot be spawned.
    pub fn new(thread_name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<QueuedCommand>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run_worker(&receiver, &worker_pending))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            next_id: AtomicU64::new(1),
            pending,
        })
    }

    /// Queue a command body
    pub fn enqueue<F>(&self, name: &str, job: F) -> CommandHandle
    where
        F: FnOnce() -> CommandOutcome + Send + 'static,
    {
        self.push(name, None, Box::new(job))
    }

    /// Queue a command body bound to a cancellation token
    pub fn enqueue_cancellable<F>(&self, name: &str, cancel: CancellationToken, job: F) -> CommandHandle
    where
        F: FnOnce() -> CommandOutcome + Send + 'static,
    {
        self.push(name, Some(cancel), Box::new(job))
    }

    /// Commands queued or running
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Stop accepting commands, drain the queue and join the worker
    pub fn shutdown(&self) {
        drop(lock(&self.sender).take());
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                log::warn!("command worker terminated abnormally");
            }
        }
    }

    fn push(&self, name: &str, cancel: Option<CancellationToken>, job: Job) -> CommandHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let abandoned = Arc::new(AtomicBool::new(false));
        let (done, receiver) = mpsc::channel();

        let handle = CommandHandle {
            id,
            name: name.to_string(),
            abandoned: Arc::clone(&abandoned),
            cancel,
            state: Mutex::new(HandleState {
                receiver,
                outcome: None,
            }),
        };

        let command = QueuedCommand {
            id,
            name: name.to_string(),
            abandoned,
            job,
            done,
        };

        let sender = lock(&self.sender);
        match sender.as_ref() {
            Some(sender) => {
                self.pending.fetch_add(1, Ordering::SeqCst);
                if let Err(mpsc::SendError(command)) = sender.send(command) {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    let _ = command.done.send(CommandOutcome::Canceled);
                }
            }
            None => {
                let _ = command.done.send(CommandOutcome::Canceled);
            }
        }
        debug!("queued command #{id} ({name})");
        handle
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(receiver: &Receiver<QueuedCommand>, pending: &AtomicUsize) {
    for command in receiver {
        let QueuedCommand {
            id,
            name,
            abandoned,
            job,
            done,
        } = command;

        let outcome = if abandoned.load(Ordering::SeqCst) {
            debug!("skipping abandoned command #{id} ({name})");
            CommandOutcome::Canceled
        } else {
            debug!("running command #{id} ({name})");
            catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|_| CommandOutcome::Failed(format!("Command '{name}' panicked")))
        };

        pending.fetch_sub(1, Ordering::SeqCst);
        // the caller may have dropped its handle
        let _ = done.send(outcome);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
