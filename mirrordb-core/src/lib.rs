//! MirrorDB Core - Shared Types
//!
//! Errors, configuration, the durable record shape and the acknowledgement
//! future used by every crate in the workspace. No storage or event logic
//! lives here.

mod completion;
mod config;
mod error;
mod record;

pub use completion::{Ack, AckSender, Completion};
pub use config::{
    StoreConfig, CONTAINER_NAME, DATABASE_NAME, DEFAULT_RESOURCE_KEY, DEFAULT_VERSION,
};
pub use error::{ConfigError, OperationKind, StoreError, StoreResult};
pub use record::{data_key, fields, serialized_len, Record, DATA_SUFFIX, VERSION_KEY};

/// JSON value type used for every cached item.
pub use serde_json::Value;
