//! File-backed table store
//!
//! [`Store`] is the entry point: it owns one table per record type, the
//! shared archive and the single gate every operation goes through.

mod registry;

use crate::config::StoreConfig;
use crate::core::{DbError, Record, Result};
use crate::storage::{Archive, IdleTimer, StorageFile, TimerFlow};
use chrono::Utc;
use registry::{Registry, Table};
use std::any::TypeId;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

struct StoreState {
    tables: Registry,
    archive: Archive,
}

struct StoreShared {
    config: StoreConfig,
    data_dir: PathBuf,
    // the gate: one lock over every table and the archive
    state: Mutex<StoreState>,
}

/// Handle to an open store.
///
/// Cloning is cheap; clones share the same tables and gate, so a handle can be
/// moved into spawned tasks.
///
/// The plain operations never fail from the caller's point of view: errors are
/// logged and writes report nothing, reads return an empty collection. The
/// `try_*` variants return the error instead.
///
/// # Examples
///
/// ```no_run
/// use rustfiledb::{RecordMeta, Store, StoreConfig, impl_record};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Person {
///     #[serde(flatten)]
///     meta: RecordMeta,
///     id: i32,
///     name: String,
/// }
///
/// impl_record!(Person, meta, id: i32);
///
/// # async fn run() -> rustfiledb::Result<()> {
/// let config = StoreConfig::new("app", "/tmp/data").table("Person", "id");
/// let store = Store::open(config).await?;
///
/// let mut ada = Person { meta: RecordMeta::new(), id: 1, name: "Ada".into() };
/// store.upsert_one(&mut ada, false).await;
///
/// let people = store.get_all::<Person>(false).await;
/// assert_eq!(people.len(), 1);
///
/// store.release_all().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    shared: Arc<StoreShared>,
}

impl Store {
    /// Validates the configuration and creates the data directory.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = config.data_dir();
        tokio::fs::create_dir_all(&data_dir).await.map_err(|err| {
            DbError::Config(format!(
                "cannot create data directory '{}': {}",
                data_dir.display(),
                err
            ))
        })?;

        let archive = Archive::new(&data_dir);
        Ok(Self {
            shared: Arc::new(StoreShared {
                config,
                data_dir,
                state: Mutex::new(StoreState {
                    tables: Registry::default(),
                    archive,
                }),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.shared.data_dir
    }

    /// Path of the file backing a record type's table.
    pub fn table_path<T: Record>(&self) -> PathBuf {
        self.shared.data_dir.join(format!("{}.db", T::table_name()))
    }

    /// Opens the table for `T`, surfacing configuration and lock errors.
    pub async fn open_table<T: Record>(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        self.resolve_table::<T>(&mut state.tables).await?;
        Ok(())
    }

    /// Inserts or updates a batch, then rewrites the table and commits the archive.
    ///
    /// Records without a surrogate id get one. With `by_correlation` records are
    /// matched by surrogate id; otherwise by primary key, in which case a match
    /// takes over the existing record's surrogate id. Ids and timestamps are
    /// written back into `records`.
    pub async fn upsert_many<T: Record>(&self, records: &mut [T], by_correlation: bool) {
        if let Err(err) = self.try_upsert_many(records, by_correlation).await {
            log_failure::<T>("upsert", &err);
        }
    }

    pub async fn upsert_one<T: Record>(&self, record: &mut T, by_correlation: bool) {
        self.upsert_many(std::slice::from_mut(record), by_correlation)
            .await
    }

    pub async fn try_upsert_many<T: Record>(
        &self,
        records: &mut [T],
        by_correlation: bool,
    ) -> Result<()> {
        let span = info_span!("store.upsert", table = T::table_name(), count = records.len());
        self.upsert_batch(records, by_correlation)
            .instrument(span)
            .await
    }

    /// Soft-deletes (`mark_for_delete`) or removes a record, then rewrites the table.
    ///
    /// An unknown id leaves storage untouched.
    pub async fn delete<T: Record>(&self, id: Uuid, mark_for_delete: bool) {
        if let Err(err) = self.try_delete::<T>(id, mark_for_delete).await {
            log_failure::<T>("delete", &err);
        }
    }

    /// Soft-deletes the record with the same surrogate id.
    pub async fn delete_record<T: Record>(&self, record: &T) {
        self.delete::<T>(record.id(), true).await
    }

    /// Returns whether a record with `id` was found.
    pub async fn try_delete<T: Record>(&self, id: Uuid, mark_for_delete: bool) -> Result<bool> {
        let span = info_span!(
            "store.delete",
            table = T::table_name(),
            id = %id,
            soft = mark_for_delete
        );
        self.delete_by_id::<T>(id, mark_for_delete)
            .instrument(span)
            .await
    }

    /// All records of `T`, skipping soft-deleted ones unless `include_deleted`.
    pub async fn get_all<T: Record>(&self, include_deleted: bool) -> Vec<T> {
        self.try_get_all(include_deleted)
            .await
            .unwrap_or_else(|err| {
                log_failure::<T>("get_all", &err);
                Vec::new()
            })
    }

    pub async fn try_get_all<T: Record>(&self, include_deleted: bool) -> Result<Vec<T>> {
        let span = info_span!("store.get_all", table = T::table_name());
        self.load_all(include_deleted).instrument(span).await
    }

    /// Records of `T` matching `predicate`, by linear scan.
    pub async fn get_by_query<T, P>(&self, predicate: P, include_deleted: bool) -> Vec<T>
    where
        T: Record,
        P: Fn(&T) -> bool,
    {
        self.try_get_by_query(predicate, include_deleted)
            .await
            .unwrap_or_else(|err| {
                log_failure::<T>("get_by_query", &err);
                Vec::new()
            })
    }

    pub async fn try_get_by_query<T, P>(&self, predicate: P, include_deleted: bool) -> Result<Vec<T>>
    where
        T: Record,
        P: Fn(&T) -> bool,
    {
        let mut records = self.try_get_all::<T>(include_deleted).await?;
        records.retain(|record| predicate(record));
        Ok(records)
    }

    /// Last snapshot of a record written through the archive, in any table.
    pub async fn archived<T: Record>(&self, id: Uuid) -> Option<T> {
        self.try_archived(id).await.unwrap_or_else(|err| {
            log_failure::<T>("archived", &err);
            None
        })
    }

    pub async fn try_archived<T: Record>(&self, id: Uuid) -> Result<Option<T>> {
        let mut state = self.shared.state.lock().await;
        state.archive.ensure_open().await?;
        state.archive.get(&id)
    }

    /// Drops the cached records of `T`. Storage is not touched.
    pub async fn release_table_memory<T: Record>(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(table) = state.tables.get_mut::<T>() {
            table.cache.clear();
            event!(Level::DEBUG, table = T::table_name(), "table memory released");
        }
    }

    /// Stops every idle timer, closes every file handle and empties every table.
    ///
    /// Call before the process exits. The store stays usable; tables reopen on
    /// next access.
    pub async fn release_all(&self) {
        let mut state = self.shared.state.lock().await;
        let open_tables = state.tables.len();

        for mut slot in state.tables.drain() {
            let name = slot.table_name();
            slot.clear();
            let (file, timer) = slot.into_parts();
            timer.cancel();
            if let Err(err) = file.close().await {
                event!(Level::ERROR, table = name, error = %err, "closing table file failed");
            }
        }
        if let Err(err) = state.archive.close().await {
            event!(Level::ERROR, error = %err, "closing archive failed");
        }
        event!(Level::INFO, tables = open_tables, "store released");
    }

    /// Number of records currently cached for `T`; 0 when evicted or never opened.
    pub async fn cached_len<T: Record>(&self) -> usize {
        let state = self.shared.state.lock().await;
        state
            .tables
            .get::<T>()
            .map(|table| table.cache.len())
            .unwrap_or(0)
    }

    async fn upsert_batch<T: Record>(&self, records: &mut [T], by_correlation: bool) -> Result<()> {
        let mut guard = self.shared.state.lock().await;
        let state = &mut *guard;
        let table = self.resolve_table::<T>(&mut state.tables).await?;
        table.load_if_empty().await?;

        for record in records.iter_mut() {
            if !record.meta().has_id() {
                record.set_id(Uuid::new_v4());
            }
            if !by_correlation
                && let Some(existing) = table.cache.lookup_primary_key(&record.primary_key())
            {
                record.set_id(existing);
            }
            record.set_timestamp(Utc::now());
            state.archive.record(&*record)?;

            let id = record.id();
            if table.cache.contains(&id) {
                table.cache.replace(id, record.clone());
            } else {
                table.cache.upsert(record.clone());
            }
        }

        table.save().await?;
        state.archive.commit().await?;
        event!(Level::DEBUG, cached = table.cache.len(), "upsert committed");
        Ok(())
    }

    async fn delete_by_id<T: Record>(&self, id: Uuid, mark_for_delete: bool) -> Result<bool> {
        let mut state = self.shared.state.lock().await;
        let table = self.resolve_table::<T>(&mut state.tables).await?;
        table.load_if_empty().await?;

        let found = if mark_for_delete {
            table.cache.mark_for_delete(&id)
        } else {
            table.cache.remove(&id).is_some()
        };
        if found {
            table.save().await?;
        }
        Ok(found)
    }

    async fn load_all<T: Record>(&self, include_deleted: bool) -> Result<Vec<T>> {
        let mut state = self.shared.state.lock().await;
        let table = self.resolve_table::<T>(&mut state.tables).await?;
        table.load_if_empty().await?;

        let mut records = table.cache.all();
        if !include_deleted {
            records.retain(|record| !record.is_marked_for_delete());
        }
        Ok(records)
    }

    async fn resolve_table<'a, T: Record>(
        &self,
        tables: &'a mut Registry,
    ) -> Result<&'a mut Table<T>> {
        if !tables.contains::<T>() {
            let config = &self.shared.config;
            config.resolve::<T>()?;

            let file = StorageFile::open(self.table_path::<T>()).await?;
            let timer = spawn_eviction_timer(
                Arc::downgrade(&self.shared),
                TypeId::of::<T>(),
                config.tick_period,
            );
            tables.insert(Table::<T>::new(config.idle_time, file, timer));
            event!(Level::DEBUG, table = T::table_name(), "table opened");
        }

        tables
            .get_mut::<T>()
            .ok_or_else(|| DbError::Runtime(format!("table '{}' vanished", T::table_name())))
    }
}

/// Periodic idle check for one table. Each tick takes the gate, so eviction
/// never interleaves with a load or save.
fn spawn_eviction_timer(
    shared: Weak<StoreShared>,
    type_id: TypeId,
    period: std::time::Duration,
) -> IdleTimer {
    IdleTimer::schedule(period, move || {
        let shared = shared.clone();
        async move {
            let Some(shared) = shared.upgrade() else {
                return TimerFlow::Halt;
            };
            let mut state = shared.state.lock().await;
            match state.tables.slot_mut(type_id) {
                Some(slot) => {
                    if slot.tick() {
                        event!(Level::DEBUG, table = slot.table_name(), "idle table evicted");
                    }
                    TimerFlow::Proceed
                }
                None => TimerFlow::Halt,
            }
        }
    })
}

fn log_failure<T: Record>(operation: &str, err: &DbError) {
    event!(
        Level::ERROR,
        table = T::table_name(),
        operation,
        error = %err,
        "store operation failed"
    );
}
