//! Key and value encoding for the sled trees
//!
//! - **`AddressKey`**: a `QueryAddress` as tree key bytes (its UTF-8 textual form,
//!   so prefix scans walk a bookmark subtree)
//! - **`encode_record`** / **`decode_record`**: bincode (serde mode) values
//!
//! # Examples
//!
//! ```no_run
//! use bookhub::address::QueryAddress;
//! use bookhub::db::types::AddressKey;
//!
//! let key = AddressKey::new(&QueryAddress::parse("bookmark:/Favorites"));
//! let bytes: Vec<u8> = key.into();
//! assert_eq!(AddressKey::from_bytes(&bytes).unwrap().as_address().path(), "/Favorites");
//! ```

use super::error::DbError;
use crate::address::QueryAddress;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Tree key wrapping a `QueryAddress`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressKey(QueryAddress);

impl AddressKey {
    #[must_use]
    pub fn new(address: &QueryAddress) -> Self {
        Self(address.clone())
    }

    /// # Errors
    ///
    /// Returns `DbError::SerializeError` if the bytes are not valid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DbError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DbError::SerializeError(format!("Invalid UTF-8 in key: {e}")))?;
        Ok(Self(QueryAddress::parse(text)))
    }

    #[must_use]
    pub const fn as_address(&self) -> &QueryAddress {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> QueryAddress {
        self.0
    }

    /// Key prefix matching every address below this one
    #[must_use]
    pub fn child_prefix(&self) -> Vec<u8> {
        let mut prefix = self.0.to_string().trim_end_matches('/').to_string();
        prefix.push('/');
        prefix.into_bytes()
    }
}

impl From<AddressKey> for Vec<u8> {
    fn from(key: AddressKey) -> Self {
        key.0.to_string().into_bytes()
    }
}

/// Encode a value with bincode's serde mode
///
/// # Errors
///
/// Returns `DbError::EncodeError` if serialization fails.
pub fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>, DbError> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

/// Decode a value written by [`encode_record`]
///
/// # Errors
///
/// Returns `DbError::DecodeError` if the bytes do not decode into `T`.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DbError> {
    let (value, _): (T, usize) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;
