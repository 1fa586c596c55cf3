//! Lifecycle event types.
//!
//! The table-management layer reports structural and row-level changes as
//! [`LifecycleEvent`]s. Each event has a fixed [`EventKind`] whose wire name,
//! combined with a namespace, forms the [`EventKey`] a handler subscribes to.

use std::fmt;

use mirrordb_core::{Value, DATABASE_NAME};
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Discriminator for lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    CreateTable,
    AlterTable,
    DropTable,
    UpdateTable,
    TruncateTable,
    ResolveSchema,
    RenameTable,
    RenameDatabase,
}

impl EventKind {
    /// Every event kind, in registration order.
    pub const ALL: [EventKind; 11] = [
        EventKind::Insert,
        EventKind::Update,
        EventKind::Delete,
        EventKind::CreateTable,
        EventKind::AlterTable,
        EventKind::DropTable,
        EventKind::UpdateTable,
        EventKind::TruncateTable,
        EventKind::ResolveSchema,
        EventKind::RenameTable,
        EventKind::RenameDatabase,
    ];

    /// Wire name used when building subscription keys.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::CreateTable => "onCreateTable",
            EventKind::AlterTable => "onAlterTable",
            EventKind::DropTable => "onDropTable",
            EventKind::UpdateTable => "onUpdateTable",
            EventKind::TruncateTable => "onTruncateTable",
            EventKind::ResolveSchema => "onResolveSchema",
            EventKind::RenameTable => "onRenameTable",
            EventKind::RenameDatabase => "onRenameDataBase",
        }
    }

    /// Infrastructure events are produced at database level and are published
    /// under [`DATABASE_NAME`] rather than the store's own name.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, EventKind::AlterTable | EventKind::ResolveSchema)
    }

    /// Namespace this kind is published under for a store called `store_name`.
    pub fn namespace<'a>(&self, store_name: &'a str) -> &'a str {
        if self.is_infrastructure() {
            DATABASE_NAME
        } else {
            store_name
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Subscription key: a namespace joined with an event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey(String);

impl EventKey {
    pub fn new(namespace: &str, kind: EventKind) -> Self {
        Self(format!("{}:{}", namespace, kind.name()))
    }

    /// Key for `kind` as seen by the store named `store_name`.
    pub fn for_store(store_name: &str, kind: EventKind) -> Self {
        Self::new(kind.namespace(store_name), kind)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lifecycle event emitted by the table-management layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    /// Rows were inserted. With `append` set the rows are also appended to
    /// the table's data record; otherwise the caller already placed them.
    Insert {
        table: String,
        rows: Vec<Value>,
        append: bool,
    },

    /// Rows of the table's data record were updated in place.
    Update { table: String },

    /// Rows were removed from the table's data record.
    Delete { table: String },

    CreateTable { table: String, definition: Value },

    /// Database-level acknowledgement of an altered table.
    AlterTable { table: String },

    DropTable { table: String },

    /// Merge `patch` into the table definition.
    UpdateTable {
        table: String,
        patch: Map<String, Value>,
    },

    /// The caller emptied the table's data record.
    TruncateTable { table: String },

    /// Persist the schema version and create every listed table.
    ResolveSchema {
        version: Value,
        tables: Map<String, Value>,
    },

    RenameTable { old: String, new: String },

    RenameDatabase { old: String, new: String },
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Insert { .. } => EventKind::Insert,
            LifecycleEvent::Update { .. } => EventKind::Update,
            LifecycleEvent::Delete { .. } => EventKind::Delete,
            LifecycleEvent::CreateTable { .. } => EventKind::CreateTable,
            LifecycleEvent::AlterTable { .. } => EventKind::AlterTable,
            LifecycleEvent::DropTable { .. } => EventKind::DropTable,
            LifecycleEvent::UpdateTable { .. } => EventKind::UpdateTable,
            LifecycleEvent::TruncateTable { .. } => EventKind::TruncateTable,
            LifecycleEvent::ResolveSchema { .. } => EventKind::ResolveSchema,
            LifecycleEvent::RenameTable { .. } => EventKind::RenameTable,
            LifecycleEvent::RenameDatabase { .. } => EventKind::RenameDatabase,
        }
    }

    /// The table this event targets, if it targets exactly one.
    pub fn table(&self) -> Option<&str> {
        match self {
            LifecycleEvent::Insert { table, .. }
            | LifecycleEvent::Update { table }
            | LifecycleEvent::Delete { table }
            | LifecycleEvent::CreateTable { table, .. }
            | LifecycleEvent::AlterTable { table }
            | LifecycleEvent::DropTable { table }
            | LifecycleEvent::UpdateTable { table, .. }
            | LifecycleEvent::TruncateTable { table } => Some(table),
            LifecycleEvent::RenameTable { old, .. } => Some(old),
            LifecycleEvent::ResolveSchema { .. } | LifecycleEvent::RenameDatabase { .. } => None,
        }
    }
}
