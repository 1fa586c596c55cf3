//! MirrorDB Events - Lifecycle Events and Router
//!
//! The table-management layer drives the cache by publishing
//! [`LifecycleEvent`]s on an [`EventRouter`]. Stores subscribe one handler per
//! [`EventKey`], where the key joins a namespace with the event's wire name:
//!
//! ```text
//! library:insert            table-level events use the store name
//! _mirrordb_:onAlterTable   infrastructure events use the database name
//! ```

mod event;
mod router;

pub use event::{EventKey, EventKind, LifecycleEvent};
pub use router::{EventRouter, Handler};
