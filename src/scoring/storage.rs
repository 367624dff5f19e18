use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::PersistenceError;
use super::learning::LearningState;
use super::types::{AdaptivePattern, FewShotEntry, PerformanceTracker, PoolCategory};

pub const CURRENT_VERSION: u32 = 1;

/// On-disk learning state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredState {
    /// Missing in files written before versioning
    #[serde(default)]
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub adaptive_patterns: BTreeMap<String, AdaptivePattern>,
    #[serde(default)]
    pub few_shot_pool: BTreeMap<String, Vec<FewShotEntry>>,
    #[serde(default)]
    pub performance_tracker: PerformanceTracker,
    #[serde(default)]
    pub learning_examples_count: usize,
    /// Commit generation this snapshot was taken at
    #[serde(skip)]
    pub generation: u64,
}

impl StoredState {
    pub fn snapshot(state: &LearningState) -> Self {
        Self {
            version: CURRENT_VERSION,
            timestamp: Utc::now(),
            adaptive_patterns: state.patterns.clone(),
            few_shot_pool: state.pool.to_map(),
            performance_tracker: state.tracker.clone(),
            learning_examples_count: state.examples.len(),
            generation: state.generation,
        }
    }
}

/// What `merge_into` changed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeSummary {
    pub patterns_added: usize,
    pub pool_entries_added: usize,
    pub skipped_categories: Vec<String>,
}

/// File-backed learning store
pub struct LearningStore {
    path: PathBuf,
    /// Generation of the newest snapshot on disk; also serialises writers
    written: Mutex<Option<u64>>,
}

impl LearningStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store. `Ok(None)` when no file exists yet.
    pub fn load(&self) -> Result<Option<StoredState>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| PersistenceError::io("read", &self.path, e))?;
        let stored: StoredState =
            serde_json::from_str(&content).map_err(|source| PersistenceError::Decode {
                path: self.path.clone(),
                source,
            })?;

        Ok(Some(migrate(stored)))
    }

    /// Write a snapshot atomically (temp file, then rename).
    ///
    /// Returns `Ok(false)` without writing if a newer generation is
    /// already on disk.
    pub fn save(&self, state: &StoredState) -> Result<bool, PersistenceError> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if written.is_some_and(|g| g > state.generation) {
            log::debug!(
                "Skipping stale learning snapshot (generation {})",
                state.generation
            );
            return Ok(false);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io("create", parent, e))?;
        }

        let content = serde_json::to_string_pretty(state).map_err(PersistenceError::Encode)?;
        let tmp = self.temp_path();

        let result = write_file(&tmp, content.as_bytes()).and_then(|_| {
            fs::rename(&tmp, &self.path)
                .map_err(|e| PersistenceError::io("replace", &self.path, e))
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        *written = Some(state.generation);
        log::info!("Learning state saved: {}", self.path.display());
        Ok(true)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), PersistenceError> {
    let mut file = fs::File::create(path).map_err(|e| PersistenceError::io("create", path, e))?;
    file.write_all(content)
        .and_then(|_| file.sync_all())
        .map_err(|e| PersistenceError::io("write", path, e))?;

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| PersistenceError::io("set permissions on", path, e))?;
    }

    Ok(())
}

/// Merge a loaded store into live state: patterns are added by id when
/// absent, pool entries appended (cap and duplicate text respected), and
/// performance counters replaced.
pub fn merge_into(state: &mut LearningState, stored: StoredState) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for (id, pattern) in stored.adaptive_patterns {
        if pattern.keywords.is_empty() {
            log::warn!("Ignoring stored pattern {} with no keywords", id);
            continue;
        }
        if !state.patterns.contains_key(&id) {
            state.patterns.insert(id, pattern);
            summary.patterns_added += 1;
        }
    }

    for (key, entries) in stored.few_shot_pool {
        let Some(category) = PoolCategory::from_key(&key) else {
            log::warn!("Ignoring unknown few-shot category in store: {}", key);
            summary.skipped_categories.push(key);
            continue;
        };
        for entry in entries {
            if state.pool.push(category, entry) {
                summary.pool_entries_added += 1;
            }
        }
    }

    state.tracker = stored.performance_tracker;
    state.generation += 1;
    summary
}

/// Bring older store formats up to `CURRENT_VERSION`
fn migrate(mut stored: StoredState) -> StoredState {
    if stored.version < CURRENT_VERSION {
        log::info!(
            "Migrating learning store from version {} to {}",
            stored.version,
            CURRENT_VERSION
        );
        stored.version = CURRENT_VERSION;
    }
    stored
}
