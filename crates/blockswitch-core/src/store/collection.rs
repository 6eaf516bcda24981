// ── Reactive accessory collection ──
//
// Concurrent storage keyed by client MAC with a UUID secondary index and
// push-based change notification via a `watch` snapshot.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

use crate::model::{Accessory, MacAddress};

/// The set of accessories the engine currently owns.
///
/// At most one accessory per MAC. Every mutation rebuilds the snapshot
/// that subscribers receive; readers iterate the snapshot rather than
/// the map, so a poll tick sees a consistent view.
pub(crate) struct AccessoryCollection {
    /// Primary storage: MAC -> accessory.
    by_mac: DashMap<MacAddress, Arc<Accessory>>,

    /// Secondary index: accessory UUID -> MAC.
    uuid_to_mac: DashMap<Uuid, MacAddress>,

    /// Full snapshot, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<Accessory>>>>,
}

impl AccessoryCollection {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_mac: DashMap::new(),
            uuid_to_mac: DashMap::new(),
            snapshot,
        }
    }

    /// Insert an accessory under its MAC.
    ///
    /// Returns the accessory it displaced, if any. The displaced entry's
    /// UUID mapping is dropped.
    pub(crate) fn insert(&self, accessory: Arc<Accessory>) -> Option<Arc<Accessory>> {
        let mac = accessory.mac().clone();
        let uuid = accessory.uuid();

        let displaced = self.by_mac.insert(mac.clone(), accessory);
        if let Some(old) = &displaced {
            if old.uuid() != uuid {
                self.uuid_to_mac.remove(&old.uuid());
            }
        }
        self.uuid_to_mac.insert(uuid, mac);

        self.rebuild_snapshot();
        displaced
    }

    /// Remove the accessory for a MAC. Returns it if it existed.
    pub(crate) fn remove(&self, mac: &MacAddress) -> Option<Arc<Accessory>> {
        let removed = self.by_mac.remove(mac).map(|(_, v)| v);
        if let Some(acc) = &removed {
            self.uuid_to_mac.remove(&acc.uuid());
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get_by_mac(&self, mac: &MacAddress) -> Option<Arc<Accessory>> {
        self.by_mac.get(mac).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn get_by_uuid(&self, uuid: &Uuid) -> Option<Arc<Accessory>> {
        let mac = self.uuid_to_mac.get(uuid)?;
        self.by_mac.get(mac.value()).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, mac: &MacAddress) -> bool {
        self.by_mac.contains_key(mac)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Accessory>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Accessory>>>> {
        self.snapshot.subscribe()
    }

    /// All MACs currently owned.
    pub(crate) fn macs(&self) -> Vec<MacAddress> {
        self.by_mac.iter().map(|r| r.key().clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_mac.len()
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Accessory>> =
            self.by_mac.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.mac().cmp(b.mac()));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
