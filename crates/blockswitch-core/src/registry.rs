// ── Host entity registry ──
//
// The host side of accessory lifecycle: the engine registers accessories
// it creates and unregisters the ones it drops. Calls are synchronous so
// stale-accessory removal can finish before the controller session is up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use crate::model::Accessory;

/// Plugin identifier passed with every registry call.
pub const PLUGIN_NAME: &str = "homebridge-unifi-block-clients";

/// Platform identifier passed with every registry call.
pub const PLATFORM_NAME: &str = "unifiBlockClients";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to persist accessories: {0}")]
    Persist(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Host-side store of exposed accessories.
pub trait EntityRegistry: Send + Sync {
    fn register(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[Arc<Accessory>],
    ) -> Result<(), RegistryError>;

    fn unregister(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[Arc<Accessory>],
    ) -> Result<(), RegistryError>;
}

/// In-process registry. Keeps whatever is currently registered, keyed by UUID.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<Uuid, Arc<Accessory>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently registered accessories, in no particular order.
    pub fn registered(&self) -> Vec<Arc<Accessory>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(uuid)
    }
}

impl EntityRegistry for MemoryRegistry {
    fn register(
        &self,
        _plugin: &str,
        _platform: &str,
        accessories: &[Arc<Accessory>],
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for acc in accessories {
            entries.insert(acc.uuid(), Arc::clone(acc));
        }
        Ok(())
    }

    fn unregister(
        &self,
        _plugin: &str,
        _platform: &str,
        accessories: &[Arc<Accessory>],
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for acc in accessories {
            entries.remove(&acc.uuid());
        }
        Ok(())
    }
}
