//! History eligibility for the current session
//!
//! Each view-contents change of the current book asks the recorder whether the
//! session now qualifies for a history entry. Once it does, every later change
//! upserts the entry so the stored memento follows the reader's position.

use crate::config::HistoryConfig;

/// Per-session inputs for [`HistoryRecorder::should_record`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistorySession {
    pub page_count: usize,
    /// View-contents changes since the book opened
    pub page_change_count: u32,
    pub is_page_terminated: bool,
    /// An entry was already made for this session
    pub history_entry: bool,
    /// The book was deleted from history after it opened
    pub history_removed: bool,
    pub keep_history_order: bool,
    pub is_inner_archive: bool,
    pub is_unc: bool,
}

/// Decides when the current session enters history
#[derive(Debug, Clone)]
pub struct HistoryRecorder<'a> {
    config: &'a HistoryConfig,
}

impl<'a> HistoryRecorder<'a> {
    #[must_use]
    pub const fn new(config: &'a HistoryConfig) -> Self {
        Self { config }
    }

    /// Page changes required before recording
    ///
    /// Browsing from the history list with forced updates still needs at least
    /// one navigation, so a threshold of 0 becomes 1 in that mode.
    #[must_use]
    pub const fn entry_threshold(&self, keep_history_order: bool) -> i64 {
        let threshold = self.config.entry_page_count as i64;
        if keep_history_order && self.config.is_force_update_history && threshold <= 0 {
            1
        } else {
            threshold
        }
    }

    /// Whether updates are allowed at all for a session
    #[must_use]
    pub const fn allows_update(&self, keep_history_order: bool) -> bool {
        !keep_history_order || self.config.is_force_update_history
    }

    /// Whether the session should be written to history now
    #[must_use]
    pub const fn should_record(&self, session: &HistorySession) -> bool {
        if !self.allows_update(session.keep_history_order) {
            return false;
        }
        if session.page_count == 0 || session.history_removed {
            return false;
        }
        let threshold = self.entry_threshold(session.keep_history_order);
        let qualified = session.history_entry
            || (session.page_change_count as i64) > threshold
            || session.is_page_terminated;
        if !qualified {
            return false;
        }
        (self.config.is_inner_archive_history_enabled || !session.is_inner_archive)
            && (self.config.is_unc_history_enabled || !session.is_unc)
    }
}
