//! File-backed accessory registry.
//!
//! Mirrors registered accessories into a JSON cache so the next start can
//! restore them before the controller session is up.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use blockswitch_core::{
    Accessory, AccessoryRecord, EntityRegistry, PLATFORM_NAME, PLUGIN_NAME, RegistryError,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    plugin: String,
    platform: String,
    #[serde(default)]
    accessories: Vec<AccessoryRecord>,
}

pub struct FileRegistry {
    path: PathBuf,
    records: Mutex<BTreeMap<Uuid, AccessoryRecord>>,
}

impl FileRegistry {
    /// Open the cache at `path`. A missing file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let cache: CacheFile = serde_json::from_str(&contents).map_err(|e| {
                    RegistryError::Unavailable(format!("{}: {e}", path.display()))
                })?;
                cache
                    .accessories
                    .into_iter()
                    .map(|r| (r.uuid, r))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(RegistryError::Unavailable(format!(
                    "{}: {e}",
                    path.display()
                )));
            }
        };
        debug!(path = %path.display(), cached = records.len(), "opened accessory cache");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached accessories, for restoring into the engine.
    pub fn restored(&self) -> Vec<AccessoryRecord> {
        self.lock().values().cloned().collect()
    }

    /// Refresh the cached record of an accessory that is already registered.
    pub fn update(&self, accessory: &Accessory) -> Result<(), RegistryError> {
        let mut records = self.lock();
        if !records.contains_key(&accessory.uuid()) {
            return Ok(());
        }
        records.insert(accessory.uuid(), accessory.to_record());
        self.persist(&records)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Uuid, AccessoryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write through a temp file so a crash never leaves a torn cache.
    fn persist(&self, records: &BTreeMap<Uuid, AccessoryRecord>) -> Result<(), RegistryError> {
        let cache = CacheFile {
            plugin: PLUGIN_NAME.into(),
            platform: PLATFORM_NAME.into(),
            accessories: records.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&cache)
            .map_err(|e| RegistryError::Persist(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::Persist(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| RegistryError::Persist(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| RegistryError::Persist(e.to_string()))?;
        Ok(())
    }
}

impl EntityRegistry for FileRegistry {
    fn register(
        &self,
        _plugin: &str,
        _platform: &str,
        accessories: &[Arc<Accessory>],
    ) -> Result<(), RegistryError> {
        let mut records = self.lock();
        for acc in accessories {
            records.insert(acc.uuid(), acc.to_record());
        }
        self.persist(&records)
    }

    fn unregister(
        &self,
        _plugin: &str,
        _platform: &str,
        accessories: &[Arc<Accessory>],
    ) -> Result<(), RegistryError> {
        let mut records = self.lock();
        for acc in accessories {
            records.remove(&acc.uuid());
        }
        self.persist(&records)
    }
}
