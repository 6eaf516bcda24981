// ── Accessory domain types ──
//
// An accessory is the host-facing representation of one desired client:
// a switch whose "on" state means the client is blocked. The reported
// state lives in a `watch` channel so hosts can observe every change the
// engine writes.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use super::client::KnownClient;
use super::identity::{MacAddress, accessory_uuid};

/// Data persisted with the accessory so it can be matched after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryContext {
    /// Reconciliation key; compared against the desired clients.
    pub mac: MacAddress,
    /// Controller record id, used for block-status lookups.
    pub record_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

impl From<&KnownClient> for AccessoryContext {
    fn from(client: &KnownClient) -> Self {
        Self {
            mac: client.mac.clone(),
            record_id: client.record_id.clone(),
            name: client.name.clone(),
            hostname: client.hostname.clone(),
        }
    }
}

/// Last state written into a switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchState {
    /// `true` when the client is blocked.
    pub on: bool,
    /// When the controller last confirmed `on`. `None` until the first refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// The on/off capability of an accessory.
#[derive(Debug)]
pub struct SwitchService {
    name: String,
    state: watch::Sender<SwitchState>,
}

impl SwitchService {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_state(name, SwitchState::default())
    }

    fn with_state(name: impl Into<String>, state: SwitchState) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            name: name.into(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_on(&self) -> bool {
        self.state.borrow().on
    }

    pub fn state(&self) -> SwitchState {
        *self.state.borrow()
    }

    /// Observe every state the engine writes.
    pub fn subscribe(&self) -> watch::Receiver<SwitchState> {
        self.state.subscribe()
    }

    /// Record a controller-confirmed state.
    pub(crate) fn report(&self, on: bool) {
        self.state.send_replace(SwitchState {
            on,
            refreshed_at: Some(Utc::now()),
        });
    }
}

/// An exposed block switch for one client.
#[derive(Debug)]
pub struct Accessory {
    uuid: Uuid,
    display_name: String,
    context: AccessoryContext,
    switch: Option<SwitchService>,
    reachable: AtomicBool,
}

impl Accessory {
    /// Build a fresh accessory for a client the controller knows about.
    pub fn from_known_client(client: &KnownClient) -> Self {
        let display_name = client.display_name().to_owned();
        Self {
            uuid: accessory_uuid(&client.record_id),
            switch: Some(SwitchService::new(format!("Block {display_name}"))),
            display_name,
            context: AccessoryContext::from(client),
            reachable: AtomicBool::new(true),
        }
    }

    /// Rebuild an accessory from what a host persisted on a previous run.
    ///
    /// Restored accessories start unreachable; the engine marks them
    /// reachable once it takes ownership.
    pub fn from_record(record: AccessoryRecord) -> Self {
        let switch = record.switch_name.map(|name| {
            SwitchService::with_state(
                name,
                SwitchState {
                    on: record.on,
                    refreshed_at: None,
                },
            )
        });
        Self {
            uuid: record.uuid,
            display_name: record.display_name,
            context: record.context,
            switch,
            reachable: AtomicBool::new(false),
        }
    }

    /// Snapshot suitable for persisting.
    pub fn to_record(&self) -> AccessoryRecord {
        AccessoryRecord {
            uuid: self.uuid,
            display_name: self.display_name.clone(),
            context: self.context.clone(),
            switch_name: self.switch.as_ref().map(|s| s.name().to_owned()),
            on: self.switch.as_ref().is_some_and(SwitchService::is_on),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn context(&self) -> &AccessoryContext {
        &self.context
    }

    pub fn mac(&self) -> &MacAddress {
        &self.context.mac
    }

    pub fn switch(&self) -> Option<&SwitchService> {
        self.switch.as_ref()
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }
}

/// Serializable form of an [`Accessory`], as a host would cache it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryRecord {
    pub uuid: Uuid,
    pub display_name: String,
    pub context: AccessoryContext,
    #[serde(default)]
    pub switch_name: Option<String>,
    #[serde(default)]
    pub on: bool,
}
