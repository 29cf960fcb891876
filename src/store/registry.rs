use crate::core::{DbError, Record, Result};
use crate::storage::{IdleTimer, StorageFile, TableCache};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use tracing::{Level, event};

/// One open table: cached records, the locked backing file and the idle timer.
pub(crate) struct Table<T: Record> {
    pub(crate) cache: TableCache<T>,
    file: StorageFile,
    timer: IdleTimer,
}

impl<T: Record> Table<T> {
    pub(crate) fn new(idle_limit: i64, file: StorageFile, timer: IdleTimer) -> Self {
        Self {
            cache: TableCache::new(idle_limit),
            file,
            timer,
        }
    }

    /// Reads the table file when nothing is cached.
    ///
    /// Content that does not deserialize counts as an empty table; the next
    /// save overwrites it.
    pub(crate) async fn load_if_empty(&mut self) -> Result<()> {
        if !self.cache.is_empty() {
            return Ok(());
        }
        let records: Vec<T> = match self.file.read_json().await {
            Ok(records) => records.unwrap_or_default(),
            Err(DbError::Serialization(err)) => {
                event!(
                    Level::WARN,
                    table = T::table_name(),
                    path = %self.file.path().display(),
                    error = %err,
                    "table file is unreadable and will be rewritten"
                );
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        event!(Level::DEBUG, table = T::table_name(), records = records.len(), "table loaded");
        self.cache.load(records);
        Ok(())
    }

    /// Rewrites the table file with the whole cached collection.
    pub(crate) async fn save(&mut self) -> Result<()> {
        let records = self.cache.all();
        self.file.write_json(&records).await
    }
}

/// Type-erased view of a table, used by the registry, eviction ticks and shutdown.
pub(crate) trait TableSlot: Send {
    fn table_name(&self) -> &'static str;
    fn tick(&mut self) -> bool;
    fn clear(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_parts(self: Box<Self>) -> (StorageFile, IdleTimer);
}

impl<T: Record> TableSlot for Table<T> {
    fn table_name(&self) -> &'static str {
        T::table_name()
    }

    fn tick(&mut self) -> bool {
        self.cache.tick()
    }

    fn clear(&mut self) {
        self.cache.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_parts(self: Box<Self>) -> (StorageFile, IdleTimer) {
        let table = *self;
        (table.file, table.timer)
    }
}

/// Open tables keyed by record type.
#[derive(Default)]
pub(crate) struct Registry {
    tables: HashMap<TypeId, Box<dyn TableSlot>>,
}

impl Registry {
    pub(crate) fn contains<T: Record>(&self) -> bool {
        self.tables.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn insert<T: Record>(&mut self, table: Table<T>) {
        self.tables.insert(TypeId::of::<T>(), Box::new(table));
    }

    pub(crate) fn get<T: Record>(&self) -> Option<&Table<T>> {
        self.tables
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.as_any().downcast_ref::<Table<T>>())
    }

    pub(crate) fn get_mut<T: Record>(&mut self) -> Option<&mut Table<T>> {
        self.tables
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.as_any_mut().downcast_mut::<Table<T>>())
    }

    pub(crate) fn slot_mut(&mut self, type_id: TypeId) -> Option<&mut (dyn TableSlot + 'static)> {
        self.tables.get_mut(&type_id).map(|slot| slot.as_mut())
    }

    pub(crate) fn drain(&mut self) -> Vec<Box<dyn TableSlot>> {
        self.tables.drain().map(|(_, slot)| slot).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tables.len()
    }
}
