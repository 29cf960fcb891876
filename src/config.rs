use crate::core::{DbError, Record, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_IDLE_TIME: i64 = 5;
const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(60);

/// Per-table configuration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSetting {
    /// Entity type name, as returned by [`Record::table_name`]
    #[serde(alias = "Type", alias = "type")]
    pub entity_type: String,

    /// Name of the primary-key field of that entity
    #[serde(alias = "PK", alias = "pk")]
    pub primary_key: String,
}

impl TableSetting {
    pub fn new(entity_type: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            primary_key: primary_key.into(),
        }
    }
}

/// Store configuration
///
/// Names the database, where it lives on disk, how long an untouched table
/// stays cached, and which entity types the store manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database name; the data directory is `<base_dir>/<db_name>`
    #[serde(alias = "DbName")]
    pub db_name: String,

    /// Directory the database directory is created in
    #[serde(default, alias = "BaseDir")]
    pub base_dir: PathBuf,

    /// Number of idle ticks before a table's cache is cleared
    #[serde(default = "default_idle_time", alias = "IdleTime")]
    pub idle_time: i64,

    /// Period between two idle ticks
    #[serde(default = "default_tick_period", with = "duration_millis", alias = "TickPeriodMs")]
    pub tick_period: Duration,

    /// One entry per managed entity type
    #[serde(default, alias = "Settings")]
    pub tables: Vec<TableSetting>,
}

fn default_idle_time() -> i64 {
    DEFAULT_IDLE_TIME
}

fn default_tick_period() -> Duration {
    DEFAULT_TICK_PERIOD
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer, ser::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom(format!("tick period {:?} does not fit in u64 milliseconds", value)))?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

impl StoreConfig {
    /// Create a configuration with no tables and default timings
    pub fn new(db_name: &str, base_dir: impl AsRef<Path>) -> Self {
        Self {
            db_name: db_name.to_string(),
            base_dir: base_dir.as_ref().to_path_buf(),
            idle_time: DEFAULT_IDLE_TIME,
            tick_period: DEFAULT_TICK_PERIOD,
            tables: Vec::new(),
        }
    }

    /// Set the base directory
    pub fn base_dir(mut self, base_dir: impl AsRef<Path>) -> Self {
        self.base_dir = base_dir.as_ref().to_path_buf();
        self
    }

    /// Set the idle tick count
    pub fn idle_time(mut self, ticks: i64) -> Self {
        self.idle_time = ticks;
        self
    }

    /// Set the tick period
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Add a table entry
    pub fn table(mut self, entity_type: &str, primary_key: &str) -> Self {
        self.tables.push(TableSetting::new(entity_type, primary_key));
        self
    }

    /// Add a table entry for a record type, using its declared key field
    pub fn table_for<T: Record>(self) -> Self {
        self.table(T::table_name(), T::PRIMARY_KEY_FIELD)
    }

    /// Parse from a JSON document
    ///
    /// Accepts snake_case keys as well as the `DbName` / `IdleTime` /
    /// `Settings: [{ Type, PK }]` spelling.
    ///
    /// # Examples
    ///
    /// ```
    /// # use rustfiledb::StoreConfig;
    /// let config = StoreConfig::from_json_str(
    ///     r#"{"DbName": "app", "IdleTime": 5, "Settings": [{"Type": "Person", "PK": "ID"}]}"#,
    /// ).unwrap();
    /// assert_eq!(config.tables.len(), 1);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(json)
            .map_err(|err| DbError::Config(format!("invalid configuration document: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            DbError::Config(format!(
                "failed to read configuration '{}': {}",
                path.display(),
                err
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Check the configuration for errors that would surface at table-open time
    pub fn validate(&self) -> Result<()> {
        if self.db_name.trim().is_empty() {
            return Err(DbError::Config("database name must not be empty".to_string()));
        }
        if self.tick_period.is_zero() {
            return Err(DbError::Config("tick period must be greater than zero".to_string()));
        }

        let mut seen = HashSet::new();
        for setting in &self.tables {
            if setting.entity_type.is_empty() || setting.primary_key.is_empty() {
                return Err(DbError::Config(format!(
                    "table entry '{}' needs both a type and a primary key",
                    setting.entity_type
                )));
            }
            if !seen.insert(setting.entity_type.as_str()) {
                return Err(DbError::Config(format!(
                    "table '{}' is configured more than once",
                    setting.entity_type
                )));
            }
        }
        Ok(())
    }

    /// Directory holding every table file and the archive
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join(&self.db_name)
    }

    /// Configuration entry for a table, if any
    pub fn setting_for(&self, entity_type: &str) -> Option<&TableSetting> {
        self.tables.iter().find(|s| s.entity_type == entity_type)
    }

    /// Resolve and check the entry for a record type
    pub(crate) fn resolve<T: Record>(&self) -> Result<&TableSetting> {
        let name = T::table_name();
        let setting = self
            .setting_for(name)
            .ok_or_else(|| DbError::TableNotConfigured(name.to_string()))?;
        if setting.primary_key != T::PRIMARY_KEY_FIELD {
            return Err(DbError::PrimaryKeyMismatch {
                table: name.to_string(),
                configured: setting.primary_key.clone(),
                declared: T::PRIMARY_KEY_FIELD.to_string(),
            });
        }
        Ok(setting)
    }
}
