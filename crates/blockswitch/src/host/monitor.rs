//! Follows accessory and switch state, logging block changes and keeping
//! the cache file current.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blockswitch_core::{Accessory, Platform};

use super::registry::FileRegistry;

/// Watch the platform's accessory set until the platform goes away.
///
/// One watcher task runs per accessory that has a switch; watchers for
/// accessories that leave the set are aborted.
pub async fn run(platform: Platform, registry: Arc<FileRegistry>) {
    let mut set_rx = platform.subscribe();
    let mut watchers: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    loop {
        let current = Arc::clone(&set_rx.borrow_and_update());

        watchers.retain(|uuid, handle| {
            let keep = current.iter().any(|acc| acc.uuid() == *uuid);
            if !keep {
                handle.abort();
            }
            keep
        });

        for acc in current.iter() {
            if acc.switch().is_some() && !watchers.contains_key(&acc.uuid()) {
                let handle = tokio::spawn(watch_switch(Arc::clone(acc), Arc::clone(&registry)));
                watchers.insert(acc.uuid(), handle);
            }
        }
        debug!(watched = watchers.len(), "accessory set changed");

        if set_rx.changed().await.is_err() {
            break;
        }
    }

    for handle in watchers.into_values() {
        handle.abort();
    }
}

async fn watch_switch(accessory: Arc<Accessory>, registry: Arc<FileRegistry>) {
    let Some(switch) = accessory.switch() else {
        return;
    };
    let mut rx = switch.subscribe();
    let mut last_on = rx.borrow_and_update().on;

    while rx.changed().await.is_ok() {
        let on = rx.borrow_and_update().on;
        if on == last_on {
            continue;
        }
        last_on = on;

        info!(
            mac = %accessory.mac(),
            name = accessory.display_name(),
            blocked = on,
            "switch state changed"
        );
        persist_state(&registry, &accessory).await;
    }
}

/// Write the accessory's current record to the cache off the runtime
/// workers.
async fn persist_state(registry: &Arc<FileRegistry>, accessory: &Arc<Accessory>) {
    let registry = Arc::clone(registry);
    let acc = Arc::clone(accessory);
    match tokio::task::spawn_blocking(move || registry.update(&acc)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(mac = %accessory.mac(), error = %e, "failed to update accessory cache");
        }
        Err(e) => warn!(mac = %accessory.mac(), error = %e, "accessory cache update task failed"),
    }
}
