//! Blob codec for persisted record lists.
//!
//! A collection is persisted as one compact JSON array under its key.
//! Array order is display order.

use crate::{error::Result, Error, Record};

/// Serialize a record sequence into a blob.
pub fn encode<R: Record>(records: &[R]) -> Result<String> {
    serde_json::to_string(records).map_err(|e| Error::CorruptBlob {
        key: R::COLLECTION.to_string(),
        reason: e.to_string(),
    })
}

/// Deserialize a blob into a record sequence.
pub fn decode<R: Record>(blob: &str) -> Result<Vec<R>> {
    serde_json::from_str(blob).map_err(|e| Error::CorruptBlob {
        key: R::COLLECTION.to_string(),
        reason: e.to_string(),
    })
}
