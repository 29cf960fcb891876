use crate::core::Record;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory contents of one table.
///
/// Records are keyed by surrogate id. A secondary index maps each non-default
/// primary key to the id of the first record seen with that key. Records keep
/// their insertion order, so a table written by [`all`](Self::all) and read
/// back by [`load`](Self::load) indexes the same key owners as before.
#[derive(Debug)]
pub struct TableCache<T: Record> {
    by_id: HashMap<Uuid, T>,
    order: Vec<Uuid>,
    by_primary_key: HashMap<T::PrimaryKey, Uuid>,
    idle_counter: i64,
    idle_limit: i64,
}

impl<T: Record> TableCache<T> {
    pub fn new(idle_limit: i64) -> Self {
        Self {
            by_id: HashMap::new(),
            order: Vec::new(),
            by_primary_key: HashMap::new(),
            idle_counter: idle_limit,
            idle_limit,
        }
    }

    /// Populates the cache from a collection read off storage.
    pub fn load(&mut self, records: Vec<T>) {
        for record in records {
            self.insert(record);
        }
        self.touch();
    }

    /// Inserts a record by surrogate id and indexes its primary key when set and unclaimed.
    pub fn upsert(&mut self, record: T) {
        self.insert(record);
        self.touch();
    }

    /// Replaces the record stored under `id`, keeping the index consistent.
    pub fn replace(&mut self, id: Uuid, record: T) {
        self.unindex(id);
        if self.by_id.insert(id, record).is_none() {
            self.order.push(id);
        }
        self.index(id);
        self.touch();
    }

    pub fn get(&self, id: &Uuid) -> Option<&T> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.by_id.contains_key(id)
    }

    /// Surrogate id indexed for a primary key. Default keys never match.
    pub fn lookup_primary_key(&self, key: &T::PrimaryKey) -> Option<Uuid> {
        if Self::is_default_key(key) {
            return None;
        }
        self.by_primary_key.get(key).copied()
    }

    pub fn primary_key_of(record: &T) -> T::PrimaryKey {
        record.primary_key()
    }

    pub fn is_default_key(key: &T::PrimaryKey) -> bool {
        *key == T::PrimaryKey::default()
    }

    /// Sets the soft-delete flag. Returns `false` when the id is unknown.
    pub fn mark_for_delete(&mut self, id: &Uuid) -> bool {
        self.touch();
        match self.by_id.get_mut(id) {
            Some(record) => {
                record.set_marked_for_delete(true);
                true
            }
            None => false,
        }
    }

    /// Physically removes a record and its index entry.
    pub fn remove(&mut self, id: &Uuid) -> Option<T> {
        self.touch();
        self.unindex(*id);
        let removed = self.by_id.remove(id)?;
        self.order.retain(|known| known != id);
        Some(removed)
    }

    /// Every cached record, in insertion order.
    pub fn all(&mut self) -> Vec<T> {
        self.touch();
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn indexed_len(&self) -> usize {
        self.by_primary_key.len()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.order.clear();
        self.by_primary_key.clear();
    }

    /// Advances the idle countdown by one tick.
    ///
    /// Returns `true` when the table was evicted on this tick.
    pub fn tick(&mut self) -> bool {
        self.idle_counter -= 1;
        if self.idle_counter < 0 && !self.by_id.is_empty() {
            self.clear();
            return true;
        }
        false
    }

    /// Resets the idle countdown to the configured limit.
    pub fn touch(&mut self) {
        self.idle_counter = self.idle_limit;
    }

    fn insert(&mut self, record: T) {
        let id = record.id();
        if self.by_id.contains_key(&id) {
            self.unindex(id);
        } else {
            self.order.push(id);
        }
        self.by_id.insert(id, record);
        self.index(id);
    }

    fn index(&mut self, id: Uuid) {
        let Some(record) = self.by_id.get(&id) else {
            return;
        };
        let key = Self::primary_key_of(record);
        if !Self::is_default_key(&key) {
            self.by_primary_key.entry(key).or_insert(id);
        }
    }

    fn unindex(&mut self, id: Uuid) {
        let Some(record) = self.by_id.get(&id) else {
            return;
        };
        let key = Self::primary_key_of(record);
        if self.by_primary_key.get(&key) == Some(&id) {
            self.by_primary_key.remove(&key);
        }
    }
}
