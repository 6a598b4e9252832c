use serde::{de::DeserializeOwned, Serialize};

use crate::error::{StoreError, StoreResult};

/// Nested/list fields (allow-lists, blacklists, sources, frequencies,
/// patches) are stored as JSON text uniformly across dialects; only the SQL
/// column types differ, never this encoding.
pub fn encode<T: Serialize>(column: &'static str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|source| StoreError::MalformedJson { column, source })
}

pub fn decode<T: DeserializeOwned>(column: &'static str, text: &str) -> StoreResult<T> {
    serde_json::from_str(text).map_err(|source| StoreError::MalformedJson { column, source })
}
