//! Key-value persistence for the task list, preferences, and notification
//! permission.
//!
//! Each document lives under a fixed key. Reads are forgiving: corrupt or
//! missing documents fall back to defaults and individual task records are
//! normalised. Writes report failures as [`GarageError::Storage`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::datetime;
use crate::error::{GarageError, Result};
use crate::notify::PermissionState;
use crate::prefs::Preferences;
use crate::task::{Priority, Task, TaskId};

pub const TASKS_KEY: &str = "taskgarage.tasks.v1";
pub const PREFS_KEY: &str = "taskgarage.prefs.v1";
pub const PERMISSION_KEY: &str = "taskgarage.notify.v1";

/// Get/set-by-key persistent store.
pub trait KeyValueStore: fmt::Debug + Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// One file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    #[tracing::instrument(skip(dir))]
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        info!(data_dir = %dir.display(), "opened key-value store");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(GarageError::storage(key, err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "writing key atomically");

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|err| GarageError::storage(key, err))?;
        temp.write_all(value.as_bytes())
            .and_then(|()| temp.flush())
            .map_err(|err| GarageError::storage(key, err))?;
        temp.persist(&path)
            .map_err(|err| GarageError::storage(key, format!("failed to persist {}: {}", path.display(), err)))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, String>,
    writes: usize,
    reject_writes: bool,
}

/// Shared in-memory map. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.inner
            .lock()
            .entries
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Simulates a full quota: every later `set` fails.
    pub fn reject_writes(&self, reject: bool) {
        self.inner.lock().reject_writes = reject;
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.reject_writes {
            return Err(GarageError::storage(key, "quota exceeded"));
        }
        inner.entries.insert(key.to_string(), value.to_string());
        inner.writes += 1;
        Ok(())
    }
}

/// Serialises the task list and preferences into a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct StorageAdapter {
    kv: Arc<dyn KeyValueStore>,
}

impl StorageAdapter {
    pub fn new(kv: impl KeyValueStore + 'static) -> Self {
        Self { kv: Arc::new(kv) }
    }

    pub fn load(&self) -> (Vec<Task>, Preferences) {
        self.load_at(Utc::now())
    }

    /// Never fails: unreadable documents are logged and replaced by
    /// defaults.
    #[tracing::instrument(skip(self, now))]
    pub fn load_at(&self, now: DateTime<Utc>) -> (Vec<Task>, Preferences) {
        let tasks = match self.kv.get(TASKS_KEY) {
            Ok(Some(raw)) => normalize_tasks(&raw, now),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "failed to read tasks; starting empty");
                Vec::new()
            }
        };

        let prefs = match self.kv.get(PREFS_KEY) {
            Ok(Some(raw)) => parse_prefs(&raw),
            Ok(None) => Preferences::default(),
            Err(err) => {
                warn!(error = %err, "failed to read preferences; using defaults");
                Preferences::default()
            }
        };

        info!(tasks = tasks.len(), theme = ?prefs.theme, compact = prefs.compact, "loaded state");
        (tasks, prefs)
    }

    /// Writes both documents. Stops at the first failure.
    pub fn save(&self, tasks: &[Task], prefs: &Preferences) -> Result<()> {
        self.save_tasks(tasks)?;
        self.save_prefs(prefs)
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        let json = serde_json::to_string(tasks).map_err(|err| GarageError::storage(TASKS_KEY, err))?;
        self.kv.set(TASKS_KEY, &json)
    }

    #[tracing::instrument(skip(self, prefs))]
    pub fn save_prefs(&self, prefs: &Preferences) -> Result<()> {
        let json = serde_json::to_string(prefs).map_err(|err| GarageError::storage(PREFS_KEY, err))?;
        self.kv.set(PREFS_KEY, &json)
    }

    pub fn load_permission(&self) -> PermissionState {
        match self.kv.get(PERMISSION_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(error = %err, "corrupt notification permission; treating as not requested");
                PermissionState::Default
            }),
            Ok(None) => PermissionState::Default,
            Err(err) => {
                warn!(error = %err, "failed to read notification permission");
                PermissionState::Default
            }
        }
    }

    pub fn save_permission(&self, state: PermissionState) -> Result<()> {
        let json = serde_json::to_string(&state).map_err(|err| GarageError::storage(PERMISSION_KEY, err))?;
        self.kv.set(PERMISSION_KEY, &json)
    }
}

fn parse_prefs(raw: &str) -> Preferences {
    match serde_json::from_str::<Option<Preferences>>(raw) {
        Ok(Some(prefs)) => prefs,
        Ok(None) => Preferences::default(),
        Err(err) => {
            warn!(error = %err, "failed to parse stored preferences; using defaults");
            Preferences::default()
        }
    }
}

/// Lenient mirror of [`Task`]: every field may be missing or mistyped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: Value,
    #[serde(default)]
    notes: Value,
    #[serde(default)]
    due: Value,
    #[serde(default)]
    priority: Value,
    #[serde(default)]
    progress: Value,
    #[serde(default)]
    completed: Value,
    #[serde(default)]
    created_at: Value,
    #[serde(default)]
    last_notified: Value,
}

#[tracing::instrument(skip(raw, now), fields(bytes = raw.len()))]
fn normalize_tasks(raw: &str, now: DateTime<Utc>) -> Vec<Task> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "failed to parse stored tasks; starting empty");
            return Vec::new();
        }
    };

    let Value::Array(items) = parsed else {
        warn!("stored tasks are not a list; starting empty");
        return Vec::new();
    };

    let total = items.len();
    let tasks: Vec<Task> = items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            if !item.is_object() {
                warn!(index = idx, "skipping stored task that is not an object");
                return None;
            }
            match serde_json::from_value::<RawTask>(item) {
                Ok(raw) => Some(normalize_task(raw, now)),
                Err(err) => {
                    warn!(index = idx, error = %err, "skipping unreadable stored task");
                    None
                }
            }
        })
        .collect();

    debug!(total, kept = tasks.len(), "normalised stored tasks");
    tasks
}

fn normalize_task(raw: RawTask, now: DateTime<Utc>) -> Task {
    let id = non_empty_text(&raw.id)
        .map(TaskId::from)
        .unwrap_or_else(TaskId::generate);

    let due = match non_empty_text(&raw.due) {
        Some(text) => {
            let parsed = datetime::parse_due_date(&text);
            if parsed.is_none() {
                warn!(id = %id, due = %text, "dropping unreadable due date");
            }
            parsed
        }
        None => None,
    };

    let priority = non_empty_text(&raw.priority)
        .map(Priority::from)
        .unwrap_or_default();

    let created_at = non_empty_text(&raw.created_at)
        .and_then(|text| datetime::parse_iso_timestamp(&text))
        .unwrap_or(now);

    let last_notified = non_empty_text(&raw.last_notified).and_then(|text| datetime::parse_iso_timestamp(&text));

    Task {
        id,
        title: text_or_empty(&raw.title),
        notes: text_or_empty(&raw.notes),
        due,
        priority,
        progress: coerce_progress(&raw.progress),
        completed: raw.completed.as_bool().unwrap_or(false),
        created_at,
        last_notified,
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn text_or_empty(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}

fn coerce_progress(value: &Value) -> u8 {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}
