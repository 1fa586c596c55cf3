//! In-memory mirror of the backing store.
//!
//! The mirror is the source of truth for synchronous reads. Every entry
//! carries the generation of the write that produced it, so evictions gated
//! on a durable acknowledgement can skip entries re-written after the
//! eviction was requested.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mirrordb_core::Value;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    generation: u64,
}

#[derive(Debug, Default)]
struct MirrorState {
    entries: HashMap<String, Slot>,
    generation: u64,
}

impl MirrorState {
    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

/// Generation counter observed when an eviction is requested.
///
/// Entries written after the watermark was taken survive the eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(u64);

/// Thread-safe `key → value` mirror.
#[derive(Debug, Default)]
pub struct MirrorCache {
    state: RwLock<MirrorState>,
}

impl MirrorCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MirrorState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MirrorState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the value under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().entries.get(key).map(|slot| slot.value.clone())
    }

    /// Insert or replace the value under `key`.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut state = self.write();
        let generation = state.next_generation();
        state.entries.insert(key.into(), Slot { value, generation });
    }

    /// Insert or replace the value under `key`, running `then` before the
    /// write lock is released.
    ///
    /// No other mirror write can interleave with the pair, so a durable
    /// write enqueued by `then` keeps the mirror's order.
    pub fn set_with<R>(
        &self,
        key: impl Into<String>,
        value: Value,
        then: impl FnOnce(&str, &Value) -> R,
    ) -> R {
        let key = key.into();
        let mut state = self.write();
        let generation = state.next_generation();
        let result = then(&key, &value);
        state.entries.insert(key, Slot { value, generation });
        result
    }

    /// Read-modify-write the value under `key` while holding the write lock.
    ///
    /// Returns `None` without calling `f` when the key is absent.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let mut state = self.write();
        let generation = state.next_generation();
        let slot = state.entries.get_mut(key)?;
        slot.generation = generation;
        Some(f(&mut slot.value))
    }

    /// Run `f` against the value under `key` without cloning it.
    pub fn inspect<R>(&self, key: &str, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let state = self.read();
        f(state.entries.get(key).map(|slot| &slot.value))
    }

    /// Remove `key` unconditionally. Returns the previous value.
    pub fn delete(&self, key: &str) -> Option<Value> {
        self.write().entries.remove(key).map(|slot| slot.value)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.write().entries.clear();
    }

    pub fn has(&self, key: &str) -> bool {
        self.read().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Current generation, taken when an eviction is requested.
    pub fn watermark(&self) -> Watermark {
        Watermark(self.read().generation)
    }

    /// Run `f` with the current watermark while holding off every writer.
    pub fn with_watermark<R>(&self, f: impl FnOnce(Watermark) -> R) -> R {
        let state = self.read();
        f(Watermark(state.generation))
    }

    /// Remove `key` unless it was written after `watermark`.
    ///
    /// Returns whether an entry was removed.
    pub fn evict_if_unchanged(&self, key: &str, watermark: Watermark) -> bool {
        let mut state = self.write();
        match state.entries.get(key) {
            Some(slot) if slot.generation <= watermark.0 => {
                state.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Remove every entry not written after `watermark`.
    ///
    /// Returns the number of entries removed.
    pub fn evict_through(&self, watermark: Watermark) -> usize {
        let mut state = self.write();
        let before = state.entries.len();
        state.entries.retain(|_, slot| slot.generation > watermark.0);
        before - state.entries.len()
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.read();
        Snapshot(
            state
                .entries
                .iter()
                .map(|(key, slot)| (key.clone(), slot.value.clone()))
                .collect(),
        )
    }
}

/// Owned copy of the mirror, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot(BTreeMap<String, Value>);

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }

    /// The snapshot as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
