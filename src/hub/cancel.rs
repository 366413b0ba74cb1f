//! Cooperative cancellation and the first-content rendezvous
//!
//! - **`CancellationToken`**: one per load command, cloned into every step that
//!   may block (archive open, book construction, ready wait)
//! - **`ReadySignal`**: per-load one-shot completed by the content listener when
//!   the first view contents are ready

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Marker error for a canceled operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Operation canceled")]
pub struct Canceled;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// # Errors
    ///
    /// Returns `Canceled` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), Canceled> {
        if self.is_cancelled() { Err(Canceled) } else { Ok(()) }
    }

    /// Whether two tokens share the same flag
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Why a ready wait ended without the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    Canceled,
    /// Every sender was dropped before completing
    Abandoned,
}

/// One-shot "first content ready" signal
///
/// The sending half lives inside the content listener and fires at most once;
/// the receiving half is awaited by the load command.
pub struct ReadySignal {
    receiver: Receiver<()>,
}

/// Completing half of a [`ReadySignal`]
#[derive(Clone)]
pub struct ReadyNotifier {
    sender: Arc<Mutex<Option<SyncSender<()>>>>,
}

impl ReadySignal {
    #[must_use]
    pub fn channel() -> (ReadyNotifier, Self) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (
            ReadyNotifier {
                sender: Arc::new(Mutex::new(Some(sender))),
            },
            Self { receiver },
        )
    }

    /// Block until notified or canceled
    ///
    /// # Errors
    ///
    /// Returns `WaitError::Canceled` when `cancel` fires first, or
    /// `WaitError::Abandoned` when the notifier was dropped unused.
    pub fn wait(&self, cancel: &CancellationToken) -> Result<(), WaitError> {
        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::Canceled);
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(WaitError::Abandoned),
            }
        }
    }
}

impl ReadyNotifier {
    /// Complete the signal; later calls are no-ops
    pub fn notify(&self) {
        let mut slot = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = slot.take() {
            // capacity 1 and a single send, so only a dropped receiver can fail
            if let Err(TrySendError::Disconnected(())) = sender.try_send(()) {
                log::debug!("ready signal completed after its load stopped waiting");
            }
        }
    }

    #[must_use]
    pub fn is_notified(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}
