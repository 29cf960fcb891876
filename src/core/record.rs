use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::hash::Hash;
use uuid::Uuid;

/// Bookkeeping fields every stored record carries.
///
/// Embed it in an entity with `#[serde(flatten)]` so the fields sit next to
/// the entity's own fields in the table file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Surrogate identifier; nil until the record is first persisted.
    #[serde(default, rename = "correlation_id")]
    pub id: Uuid,
    /// Time of the last write through the store.
    #[serde(default = "epoch")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub marked_for_delete: bool,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            timestamp: epoch(),
            marked_for_delete: false,
        }
    }
}

impl RecordMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once a surrogate id has been assigned.
    pub fn has_id(&self) -> bool {
        !self.id.is_nil()
    }
}

/// An entity type the store can keep in a table.
///
/// Implementors expose their embedded [`RecordMeta`] and a typed primary key.
/// A key equal to `PrimaryKey::default()` counts as unset and is never indexed.
pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type PrimaryKey: Clone + Debug + Default + Eq + Hash + Send + Sync;

    /// Name of the primary-key field, matched against the table configuration.
    const PRIMARY_KEY_FIELD: &'static str;

    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;
    fn primary_key(&self) -> Self::PrimaryKey;

    /// Table name used for configuration lookup and the `<name>.db` file.
    fn table_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    fn id(&self) -> Uuid {
        self.meta().id
    }

    fn set_id(&mut self, id: Uuid) {
        self.meta_mut().id = id;
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.meta().timestamp
    }

    fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.meta_mut().timestamp = timestamp;
    }

    fn is_marked_for_delete(&self) -> bool {
        self.meta().marked_for_delete
    }

    fn set_marked_for_delete(&mut self, marked: bool) {
        self.meta_mut().marked_for_delete = marked;
    }
}
