//! Load command error types
//!
//! - **`Address`**: the query could not be resolved
//! - **`Construction`**: the book could not be built or started
//! - **`Canceled`**: a newer request superseded the load

use crate::address::AddressError;
use crate::book::BookError;
use thiserror::Error;

/// Errors ending a load command
#[derive(Debug, Error)]
pub enum LoadError {
    /// Address resolution failed
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Book construction failed
    #[error("Failed to open {path}: {source}")]
    Construction { path: String, source: BookError },

    /// Load was superseded
    #[error("Load canceled")]
    Canceled,
}

impl LoadError {
    /// Whether the load stopped because it was superseded
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        match self {
            Self::Canceled | Self::Construction { source: BookError::Canceled, .. } => true,
            Self::Address(error) => error.is_canceled(),
            Self::Construction { .. } => false,
        }
    }

    /// Codec extension when the failure is a missing platform image codec
    #[must_use]
    pub fn missing_codec_extension(&self) -> Option<&str> {
        match self {
            Self::Construction { source, .. } => source.missing_codec_extension(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
