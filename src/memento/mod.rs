//! Session mementos and the setting merger
//!
//! A [`SessionMemento`] is the persisted snapshot of a book's view settings.
//! When a book opens, [`SettingMerger::merge`] decides which memento applies:
//!
//! ```text
//! resume memento (same address) ──┐
//!                                 ├─► RESUME?  → full clone
//! persisted history record ───────┘   else     → template + whitelisted fields
//! (none)                              → template (DEFAULT_RECURSIVE forces recursion)
//! ```
//!
//! The caller's resume memento wins over the store because it reflects newer
//! in-memory state than the last flush.

use crate::address::QueryAddress;
use crate::load::LoadOptions;
use serde::{Deserialize, Serialize};

/// Page ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    #[default]
    FileName,
    FileNameDescending,
    /// Order stored in the archive or returned by the filesystem
    Entry,
}

/// Number of pages shown at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PageMode {
    #[default]
    SinglePage,
    WidePage,
}

/// Reading direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReadOrder {
    #[default]
    LeftToRight,
    RightToLeft,
}

/// Automatic page rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AutoRotate {
    #[default]
    None,
    Left,
    Right,
}

/// Persisted per-book view settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMemento {
    /// Book address this memento belongs to
    pub path: String,
    /// Entry name of the last displayed page
    pub page: String,
    pub sort_mode: SortMode,
    pub page_mode: PageMode,
    pub read_order: ReadOrder,
    pub is_recursive_folder: bool,
    pub is_supported_divide_page: bool,
    pub is_supported_wide_page: bool,
    pub is_supported_single_first_page: bool,
    pub is_supported_single_last_page: bool,
    pub auto_rotate: AutoRotate,
    pub base_scale: f64,
}

impl Default for SessionMemento {
    fn default() -> Self {
        Self {
            path: String::new(),
            page: String::new(),
            sort_mode: SortMode::default(),
            page_mode: PageMode::default(),
            read_order: ReadOrder::default(),
            is_recursive_folder: false,
            is_supported_divide_page: false,
            is_supported_wide_page: true,
            is_supported_single_first_page: false,
            is_supported_single_last_page: false,
            auto_rotate: AutoRotate::default(),
            base_scale: 1.0,
        }
    }
}

impl SessionMemento {
    /// Template copy bound to `address`
    #[must_use]
    pub fn for_address(template: &Self, address: &QueryAddress) -> Self {
        Self {
            path: address.to_string(),
            ..template.clone()
        }
    }

    #[must_use]
    pub fn is_for(&self, address: &QueryAddress) -> bool {
        self.path == address.to_string()
    }
}

/// Fields carried over from history when a book opens without `RESUME`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryMementoFilter {
    pub page: bool,
    pub sort_mode: bool,
    pub page_mode: bool,
    pub read_order: bool,
    pub is_recursive_folder: bool,
    pub is_supported_divide_page: bool,
    pub is_supported_wide_page: bool,
    pub is_supported_single_first_page: bool,
    pub is_supported_single_last_page: bool,
    pub auto_rotate: bool,
    pub base_scale: bool,
}

impl Default for HistoryMementoFilter {
    fn default() -> Self {
        Self {
            page: true,
            sort_mode: true,
            page_mode: true,
            read_order: true,
            is_recursive_folder: true,
            is_supported_divide_page: true,
            is_supported_wide_page: true,
            is_supported_single_first_page: true,
            is_supported_single_last_page: true,
            auto_rotate: false,
            base_scale: false,
        }
    }
}

impl HistoryMementoFilter {
    /// Copy the whitelisted fields of `source` into `target`
    pub fn overlay(&self, target: &mut SessionMemento, source: &SessionMemento) {
        if self.page {
            target.page.clone_from(&source.page);
        }
        if self.sort_mode {
            target.sort_mode = source.sort_mode;
        }
        if self.page_mode {
            target.page_mode = source.page_mode;
        }
        if self.read_order {
            target.read_order = source.read_order;
        }
        if self.is_recursive_folder {
            target.is_recursive_folder = source.is_recursive_folder;
        }
        if self.is_supported_divide_page {
            target.is_supported_divide_page = source.is_supported_divide_page;
        }
        if self.is_supported_wide_page {
            target.is_supported_wide_page = source.is_supported_wide_page;
        }
        if self.is_supported_single_first_page {
            target.is_supported_single_first_page = source.is_supported_single_first_page;
        }
        if self.is_supported_single_last_page {
            target.is_supported_single_last_page = source.is_supported_single_last_page;
        }
        if self.auto_rotate {
            target.auto_rotate = source.auto_rotate;
        }
        if self.base_scale {
            target.base_scale = source.base_scale;
        }
    }
}

/// Produces the memento applied to a newly opened book
#[derive(Debug, Clone, Default)]
pub struct SettingMerger {
    template: SessionMemento,
    filter: HistoryMementoFilter,
}

impl SettingMerger {
    #[must_use]
    pub const fn new(template: SessionMemento, filter: HistoryMementoFilter) -> Self {
        Self { template, filter }
    }

    /// Merge resume, persisted and default settings for `address`
    ///
    /// `resume` is ignored unless it belongs to `address`.
    #[must_use]
    pub fn merge(
        &self,
        address: &QueryAddress,
        resume: Option<&SessionMemento>,
        persisted: Option<&SessionMemento>,
        options: LoadOptions,
    ) -> SessionMemento {
        let restored = resume
            .filter(|memento| memento.is_for(address))
            .or(persisted);

        match restored {
            Some(memento) if options.contains(LoadOptions::RESUME) => {
                let mut merged = memento.clone();
                merged.path = address.to_string();
                merged
            }
            Some(memento) => {
                let mut merged = SessionMemento::for_address(&self.template, address);
                self.filter.overlay(&mut merged, memento);
                merged
            }
            None => {
                let mut merged = SessionMemento::for_address(&self.template, address);
                if options.contains(LoadOptions::DEFAULT_RECURSIVE) {
                    merged.is_recursive_folder = true;
                }
                merged
            }
        }
    }
}
