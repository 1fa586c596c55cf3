//! Durable record and table-entry conventions.
//!
//! The core treats values as opaque JSON with the exception of a handful of
//! fields the table-management layer agrees on. Those names live in [`fields`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StoreResult;

/// Suffix appended to a table name to form the key of its row collection.
pub const DATA_SUFFIX: &str = ":data";

/// Key under which the schema version is persisted by `onResolveSchema`.
pub const VERSION_KEY: &str = "version";

/// Field names shared with the table-management layer.
pub mod fields {
    /// Numeric row counter on a table definition.
    pub const LAST_INSERT_ID: &str = "lastInsertId";
    /// Table name on a table definition.
    pub const TABLE_NAME: &str = "TBL_NAME";
    /// Map of table name to table definition on a database record.
    pub const TABLES: &str = "tables";
    /// Owning database name on a table definition.
    pub const DATABASE_NAME: &str = "DB_NAME";
    /// Millisecond timestamp of the last structural change on a table.
    pub const LAST_MODIFIED: &str = "lastModified";
}

/// The durable unit: one value per key, last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: Value,
}

impl Record {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Encode the record as JSON bytes.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a record previously produced by [`Record::encode`].
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Key of the data record belonging to `table`.
pub fn data_key(table: &str) -> String {
    format!("{}{}", table, DATA_SUFFIX)
}

/// Byte length of the JSON serialization of `value`, or of `""` when absent.
pub fn serialized_len(value: Option<&Value>) -> usize {
    match value {
        Some(value) => serde_json::to_string(value).map(|s| s.len()).unwrap_or(0),
        // `""`
        None => 2,
    }
}
