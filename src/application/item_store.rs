use crate::domain::completion::CompletionState;
use crate::domain::models::{ItemKind, ScheduledItem};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Store-local identity. Assigned on insert and never reused, so drafts
/// without a server id are still addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalKey(u64);

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub key: LocalKey,
    pub item: ScheduledItem,
    pub version: u64,
}

/// Canonical in-memory collection of scheduled items.
///
/// Pending and completed lists are views over one map, so an item can never
/// be in both. Every write bumps the entry version. An id is owned by at most
/// one entry.
#[derive(Debug, Default)]
pub struct ItemStore {
    entries: BTreeMap<LocalKey, StoredItem>,
    ids: HashMap<String, LocalKey>,
    in_flight: HashMap<LocalKey, u32>,
    deleting: HashSet<String>,
    next_key: u64,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, item: ScheduledItem) -> (LocalKey, u64) {
        self.next_key += 1;
        let key = LocalKey(self.next_key);
        if let Some(id) = item.persisted_id() {
            self.ids.insert(id.to_string(), key);
        }
        self.entries.insert(
            key,
            StoredItem {
                key,
                item,
                version: 1,
            },
        );
        (key, 1)
    }

    pub fn get(&self, key: LocalKey) -> Option<&StoredItem> {
        self.entries.get(&key)
    }

    pub fn key_for_id(&self, id: &str) -> Option<LocalKey> {
        self.ids.get(id.trim()).copied()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&ScheduledItem> {
        self.key_for_id(id)
            .and_then(|key| self.entries.get(&key))
            .map(|entry| &entry.item)
    }

    pub fn version(&self, key: LocalKey) -> Option<u64> {
        self.entries.get(&key).map(|entry| entry.version)
    }

    /// Overwrites the item at `key` and returns the new version. Refuses an
    /// item whose id already belongs to another entry.
    pub fn replace(&mut self, key: LocalKey, item: ScheduledItem) -> Option<u64> {
        if let Some(owner) = item.persisted_id().and_then(|id| self.ids.get(id)) {
            if *owner != key {
                return None;
            }
        }
        let entry = self.entries.get_mut(&key)?;
        if let Some(old_id) = entry.item.persisted_id() {
            if self.ids.get(old_id) == Some(&key) {
                self.ids.remove(old_id);
            }
        }
        if let Some(new_id) = item.persisted_id() {
            self.ids.insert(new_id.to_string(), key);
        }
        entry.item = item;
        entry.version += 1;
        Some(entry.version)
    }

    /// Overwrites the item only if no other write happened since `expected`.
    pub fn replace_if_version(
        &mut self,
        key: LocalKey,
        expected: u64,
        item: ScheduledItem,
    ) -> Option<u64> {
        if self.version(key)? != expected {
            return None;
        }
        self.replace(key, item)
    }

    pub fn remove(&mut self, key: LocalKey) -> Option<StoredItem> {
        let entry = self.entries.remove(&key)?;
        if let Some(id) = entry.item.persisted_id() {
            if self.ids.get(id) == Some(&key) {
                self.ids.remove(id);
            }
        }
        Some(entry)
    }

    pub fn remove_if_version(&mut self, key: LocalKey, expected: u64) -> Option<StoredItem> {
        if self.version(key)? != expected {
            return None;
        }
        self.remove(key)
    }

    /// Puts a removed entry back under its original key. Refuses when the key
    /// or the item id has been taken in the meantime.
    pub fn restore(&mut self, mut entry: StoredItem) -> bool {
        if self.entries.contains_key(&entry.key) {
            return false;
        }
        if let Some(id) = entry.item.persisted_id() {
            if self.ids.contains_key(id) {
                return false;
            }
            self.ids.insert(id.to_string(), entry.key);
        }
        entry.version += 1;
        self.entries.insert(entry.key, entry);
        true
    }

    /// Marks a remote write on `key` as pending. Hydration leaves the entry
    /// alone until every pending write has finished.
    pub fn begin_write(&mut self, key: LocalKey) {
        *self.in_flight.entry(key).or_insert(0) += 1;
    }

    pub fn finish_write(&mut self, key: LocalKey) {
        if let Some(count) = self.in_flight.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&key);
            }
        }
    }

    /// Marks `id` as being deleted remotely so hydration does not load it back.
    pub fn begin_delete(&mut self, id: &str) {
        self.deleting.insert(id.trim().to_string());
    }

    pub fn finish_delete(&mut self, id: &str) {
        self.deleting.remove(id.trim());
    }

    /// Replaces every persisted entry, e.g. after hydrating from the server.
    ///
    /// Drafts and entries with pending writes keep their keys and local
    /// content; server copies of those ids, and of ids being deleted, are
    /// skipped. Duplicate ids keep the last occurrence. Returns the number of
    /// server items skipped.
    pub fn replace_persisted(&mut self, items: Vec<ScheduledItem>) -> usize {
        let in_flight = &self.in_flight;
        self.entries
            .retain(|key, entry| entry.item.is_draft() || in_flight.contains_key(key));
        self.ids = self
            .entries
            .values()
            .filter_map(|entry| {
                entry
                    .item
                    .persisted_id()
                    .map(|id| (id.to_string(), entry.key))
            })
            .collect();

        let mut skipped = 0;
        for item in items {
            let Some(id) = item.persisted_id() else {
                skipped += 1;
                continue;
            };
            if self.deleting.contains(id) {
                skipped += 1;
                continue;
            }
            match self.ids.get(id).copied() {
                Some(key) if self.in_flight.contains_key(&key) => skipped += 1,
                Some(key) => {
                    self.replace(key, item);
                }
                None => {
                    self.insert(item);
                }
            }
        }
        skipped
    }

    pub fn items(&self) -> impl Iterator<Item = &ScheduledItem> {
        self.entries.values().map(|entry| &entry.item)
    }

    pub fn list(&self) -> Vec<ScheduledItem> {
        self.items().cloned().collect()
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<ScheduledItem>
    where
        P: Fn(&ScheduledItem) -> bool,
    {
        self.items().filter(|item| predicate(item)).cloned().collect()
    }

    pub fn pending(&self) -> Vec<ScheduledItem> {
        self.filter(|item| CompletionState::of(item) == CompletionState::Pending)
    }

    pub fn completed(&self) -> Vec<ScheduledItem> {
        self.filter(|item| CompletionState::of(item) == CompletionState::Completed)
    }

    pub fn drafts(&self) -> Vec<ScheduledItem> {
        self.filter(ScheduledItem::is_draft)
    }

    pub fn of_kind(&self, kind: ItemKind) -> Vec<ScheduledItem> {
        self.filter(|item| item.kind == kind)
    }
}
