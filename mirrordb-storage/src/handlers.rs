//! Lifecycle event handlers.
//!
//! Every handler mutates the mirror synchronously and submits the matching
//! durable writes. The returned [`Completion`] tracks all of them.

use mirrordb_core::{data_key, fields, Completion, Value, VERSION_KEY};
use mirrordb_events::LifecycleEvent;
use serde_json::{json, Map};

use crate::store::StoreInner;

impl StoreInner {
    pub(crate) fn handle(&self, event: LifecycleEvent) -> Completion {
        match event {
            LifecycleEvent::Insert { table, rows, append } => self.on_insert(&table, rows, append),
            LifecycleEvent::Update { table }
            | LifecycleEvent::Delete { table }
            | LifecycleEvent::AlterTable { table }
            | LifecycleEvent::TruncateTable { table } => self.save_data(&table),
            LifecycleEvent::CreateTable { table, definition } => {
                self.create_table(&table, definition)
            }
            LifecycleEvent::DropTable { table } => self
                .remove_item(&table)
                .join(self.remove_item(&data_key(&table))),
            LifecycleEvent::UpdateTable { table, patch } => self.on_update_table(&table, patch),
            LifecycleEvent::ResolveSchema { version, tables } => {
                self.on_resolve_schema(version, tables)
            }
            LifecycleEvent::RenameTable { old, new } => self.on_rename_table(&old, &new),
            LifecycleEvent::RenameDatabase { old, new } => self.on_rename_database(&old, &new),
        }
    }

    /// Re-persist the mirror's current value for `key`.
    fn persist_cached(&self, key: &str) -> Completion {
        match self.persist(key) {
            Some(completion) => completion,
            None => {
                tracing::warn!(store = %self.config.name, key = %key, "nothing cached to persist");
                Completion::ready()
            }
        }
    }

    fn save_data(&self, table: &str) -> Completion {
        self.persist_cached(&data_key(table))
    }

    fn create_table(&self, table: &str, definition: Value) -> Completion {
        self.set_item(data_key(table), json!([]))
            .join(self.set_item(table, definition))
    }

    fn on_insert(&self, table: &str, rows: Vec<Value>, append: bool) -> Completion {
        let count = rows.len() as u64;
        let bumped = self.mirror.update(table, |definition| {
            let Some(definition) = definition.as_object_mut() else {
                return false;
            };
            let last = match definition.get(fields::LAST_INSERT_ID) {
                None => 0,
                Some(last) => last.as_u64().unwrap_or_else(|| {
                    tracing::warn!(
                        store = %self.config.name,
                        table = %table,
                        value = %last,
                        "lastInsertId is not an unsigned integer, restarting from 0"
                    );
                    0
                }),
            };
            definition.insert(
                fields::LAST_INSERT_ID.to_string(),
                json!(last.saturating_add(count)),
            );
            true
        });
        if bumped != Some(true) {
            tracing::warn!(store = %self.config.name, table = %table, "insert into unknown table");
        }

        if append {
            let appended = self.mirror.update(&data_key(table), |data| match data.as_array_mut() {
                Some(data) => {
                    data.extend(rows);
                    true
                }
                None => false,
            });
            if appended != Some(true) {
                tracing::warn!(store = %self.config.name, table = %table, "no data record to append to");
            }
        }

        self.save_data(table)
    }

    fn on_update_table(&self, table: &str, patch: Map<String, Value>) -> Completion {
        let merged = self.mirror.update(table, |definition| match definition.as_object_mut() {
            Some(definition) => {
                definition.extend(patch);
                true
            }
            None => false,
        });
        if merged != Some(true) {
            tracing::warn!(store = %self.config.name, table = %table, "update of unknown table");
            return Completion::ready();
        }
        self.persist_cached(table)
    }

    fn on_resolve_schema(&self, version: Value, tables: Map<String, Value>) -> Completion {
        let resolved = self.set_item(VERSION_KEY, version);
        tables
            .into_iter()
            .map(|(table, definition)| self.create_table(&table, definition))
            .fold(resolved, Completion::join)
    }

    fn on_rename_table(&self, old: &str, new: &str) -> Completion {
        if old == new {
            return Completion::ready();
        }
        let Some(mut definition) = self.mirror.get(old) else {
            tracing::warn!(store = %self.config.name, table = %old, "rename of unknown table");
            return Completion::ready();
        };
        if let Some(obj) = definition.as_object_mut() {
            obj.insert(fields::TABLE_NAME.to_string(), json!(new));
        }

        let mut done = self.set_item(new, definition);
        match self.mirror.get(&data_key(old)) {
            Some(data) => done = done.join(self.set_item(data_key(new), data)),
            None => tracing::warn!(store = %self.config.name, table = %old, "renamed table has no data record"),
        }
        done.join(self.remove_item(old))
            .join(self.remove_item(&data_key(old)))
    }

    fn on_rename_database(&self, old: &str, new: &str) -> Completion {
        if old == new {
            return Completion::ready();
        }
        let Some(mut database) = self.mirror.get(old) else {
            tracing::warn!(store = %self.config.name, database = %old, "rename of unknown database");
            return Completion::ready();
        };

        let now = chrono::Utc::now().timestamp_millis();
        if let Some(tables) = database
            .get_mut(fields::TABLES)
            .and_then(Value::as_object_mut)
        {
            for table in tables.values_mut().filter_map(Value::as_object_mut) {
                table.insert(fields::DATABASE_NAME.to_string(), json!(new));
                table.insert(fields::LAST_MODIFIED.to_string(), json!(now));
            }
        }

        let mut done = self.set_item(new, database);
        if self.mirror.has(&self.config.resource_key) {
            done = done.join(self.persist_cached(&self.config.resource_key));
        }
        self.notify_rename(old, new);
        done.join(self.remove_item(old))
    }

    fn notify_rename(&self, old: &str, new: &str) {
        match self.connection(old) {
            Some(connection) => {
                connection.rename(new);
                self.move_connection(old, new);
                tracing::debug!(store = %self.config.name, old = %old, new = %new, "connection renamed");
            }
            None => {
                tracing::trace!(store = %self.config.name, database = %old, "no connection to notify");
            }
        }
    }
}
