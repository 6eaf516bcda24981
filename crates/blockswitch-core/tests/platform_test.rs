#![allow(clippy::unwrap_used)]

// Integration tests for the reconciliation and polling engine.
//
// The controller is an in-memory fake that counts every call; the host
// registry records what was registered and unregistered.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use blockswitch_core::model::accessory_uuid;
use blockswitch_core::{
    Accessory, AccessoryContext, AccessoryRecord, CharacteristicRequest, CharacteristicResponse,
    ClientService, CoreError, EntityRegistry, KnownClient, MacAddress, Platform, PlatformConfig,
    Readiness, RegistryError, RequestEnvelope,
};

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeService {
    fail_auth: AtomicBool,
    fail_known_clients: AtomicBool,
    known: Mutex<Vec<KnownClient>>,
    /// Block state by record id.
    blocked: Mutex<HashMap<String, bool>>,
    /// Record ids whose status lookups fail.
    failing: Mutex<BTreeSet<String>>,
    auth_calls: AtomicUsize,
    known_calls: AtomicUsize,
    status_calls: Mutex<Vec<String>>,
    block_calls: Mutex<Vec<MacAddress>>,
    unblock_calls: Mutex<Vec<MacAddress>>,
    logout_calls: AtomicUsize,
    /// When set, `authenticate` waits for a notification before answering.
    auth_gate: Mutex<Option<Arc<Notify>>>,
    auth_done: AtomicUsize,
    /// When set, `known_clients` waits for a notification before answering.
    known_gate: Mutex<Option<Arc<Notify>>>,
    /// Status lookups for these record ids take this long.
    status_delay: Mutex<HashMap<String, Duration>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
}

impl FakeService {
    fn with_clients(clients: &[(&str, &str, Option<&str>, bool)]) -> Arc<Self> {
        let svc = Self::default();
        {
            let mut known = svc.known.lock().unwrap();
            let mut blocked = svc.blocked.lock().unwrap();
            for (record_id, mac, name, is_blocked) in clients {
                known.push(KnownClient {
                    record_id: (*record_id).into(),
                    mac: MacAddress::new(mac),
                    name: name.map(String::from),
                    hostname: None,
                    blocked: *is_blocked,
                });
                blocked.insert((*record_id).into(), *is_blocked);
            }
        }
        Arc::new(svc)
    }

    fn service_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
            + self.known_calls.load(Ordering::SeqCst)
            + self.status_calls.lock().unwrap().len()
            + self.block_calls.lock().unwrap().len()
            + self.unblock_calls.lock().unwrap().len()
    }

    fn status_calls_for(&self, record_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == record_id)
            .count()
    }

    fn gate_auth(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.auth_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn gate_known_clients(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.known_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn max_in_flight_for(&self, record_id: &str) -> usize {
        self.max_in_flight
            .lock()
            .unwrap()
            .get(record_id)
            .copied()
            .unwrap_or(0)
    }

    fn set_blocked(&self, record_id: &str, blocked: bool) {
        self.blocked.lock().unwrap().insert(record_id.into(), blocked);
    }
}

#[async_trait]
impl ClientService for FakeService {
    async fn authenticate(&self) -> Result<(), CoreError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.auth_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.auth_done.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(CoreError::AuthenticationFailed {
                message: "bad credentials".into(),
            });
        }
        Ok(())
    }

    async fn known_clients(&self) -> Result<Vec<KnownClient>, CoreError> {
        self.known_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.known_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_known_clients.load(Ordering::SeqCst) {
            return Err(CoreError::Api {
                message: "boom".into(),
                status: Some(500),
            });
        }
        Ok(self.known.lock().unwrap().clone())
    }

    async fn client_block_status(&self, record_id: &str) -> Result<bool, CoreError> {
        self.status_calls.lock().unwrap().push(record_id.into());
        let delay = self.status_delay.lock().unwrap().get(record_id).copied();
        if let Some(delay) = delay {
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                let now = in_flight.entry(record_id.into()).or_default();
                *now += 1;
                let mut max = self.max_in_flight.lock().unwrap();
                let peak = max.entry(record_id.into()).or_default();
                *peak = (*peak).max(*now);
            }
            tokio::time::sleep(delay).await;
            *self.in_flight.lock().unwrap().entry(record_id.into()).or_default() -= 1;
        }
        if self.failing.lock().unwrap().contains(record_id) {
            return Err(CoreError::Timeout);
        }
        self.blocked
            .lock()
            .unwrap()
            .get(record_id)
            .copied()
            .ok_or_else(|| CoreError::ClientNotFound {
                identifier: record_id.into(),
            })
    }

    async fn block_client(&self, mac: &MacAddress) -> Result<(), CoreError> {
        self.block_calls.lock().unwrap().push(mac.clone());
        self.set_blocked_by_mac(mac, true);
        Ok(())
    }

    async fn unblock_client(&self, mac: &MacAddress) -> Result<(), CoreError> {
        self.unblock_calls.lock().unwrap().push(mac.clone());
        self.set_blocked_by_mac(mac, false);
        Ok(())
    }

    async fn logout(&self) -> Result<(), CoreError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl FakeService {
    fn set_blocked_by_mac(&self, mac: &MacAddress, blocked: bool) {
        let record = self
            .known
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.mac == mac)
            .map(|c| c.record_id.clone());
        if let Some(record_id) = record {
            self.set_blocked(&record_id, blocked);
        }
    }
}

#[derive(Default)]
struct RecordingRegistry {
    registered: Mutex<Vec<(String, String, MacAddress)>>,
    unregistered: Mutex<Vec<(String, String, MacAddress)>>,
}

impl RecordingRegistry {
    fn registered_macs(&self) -> Vec<String> {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, mac)| mac.to_string())
            .collect()
    }

    fn unregistered_macs(&self) -> Vec<String> {
        self.unregistered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, mac)| mac.to_string())
            .collect()
    }
}

impl EntityRegistry for RecordingRegistry {
    fn register(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[Arc<Accessory>],
    ) -> Result<(), RegistryError> {
        let mut registered = self.registered.lock().unwrap();
        for acc in accessories {
            registered.push((plugin.into(), platform.into(), acc.mac().clone()));
        }
        Ok(())
    }

    fn unregister(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[Arc<Accessory>],
    ) -> Result<(), RegistryError> {
        let mut unregistered = self.unregistered.lock().unwrap();
        for acc in accessories {
            unregistered.push((plugin.into(), platform.into(), acc.mac().clone()));
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn cached(record_id: &str, mac: &str, name: &str) -> Accessory {
    Accessory::from_record(AccessoryRecord {
        uuid: accessory_uuid(record_id),
        display_name: name.into(),
        context: AccessoryContext {
            mac: MacAddress::new(mac),
            record_id: record_id.into(),
            name: Some(name.into()),
            hostname: None,
        },
        switch_name: Some(format!("Block {name}")),
        on: false,
    })
}

fn platform(
    clients: &[&str],
    polling_ms: u64,
    service: &Arc<FakeService>,
    registry: &Arc<RecordingRegistry>,
) -> Platform {
    let mut config = PlatformConfig::with_clients(clients.iter().copied());
    config.polling_frequency = Duration::from_millis(polling_ms);
    Platform::new(
        config,
        Arc::clone(service) as Arc<dyn ClientService>,
        Arc::clone(registry) as Arc<dyn EntityRegistry>,
    )
}

fn exposed_macs(platform: &Platform) -> BTreeSet<String> {
    platform
        .accessories()
        .iter()
        .map(|a| a.mac().to_string())
        .collect()
}

fn uuid_for(platform: &Platform, mac: &str) -> Uuid {
    let mac = MacAddress::new(mac);
    platform
        .accessories()
        .iter()
        .find(|a| a.mac() == &mac)
        .map(|a| a.uuid())
        .unwrap()
}

// ── Reconciliation ──────────────────────────────────────────────────

#[tokio::test]
async fn reconciliation_adds_configured_client_with_display_name() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false)]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);

    let report = platform.on_ready().unwrap().wait().await.unwrap();

    assert_eq!(report.added, vec![MacAddress::new("aa:bb:cc:dd:ee:01")]);
    assert!(report.removed.is_empty());
    assert!(platform.is_ready());

    let accessories = platform.accessories();
    assert_eq!(accessories.len(), 1);
    let acc = &accessories[0];
    assert_eq!(acc.display_name(), "Laptop");
    assert_eq!(acc.uuid(), accessory_uuid("r1"));
    assert_eq!(acc.switch().unwrap().name(), "Block Laptop");

    let registered = registry.registered.lock().unwrap().clone();
    assert_eq!(
        registered,
        vec![(
            "homebridge-unifi-block-clients".to_owned(),
            "unifiBlockClients".to_owned(),
            MacAddress::new("aa:bb:cc:dd:ee:01"),
        )]
    );
}

#[tokio::test]
async fn stale_accessory_is_removed_and_no_client_is_fetched() {
    let service = FakeService::with_clients(&[]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&[], 60_000, &service, &registry);
    platform.on_entity_restored(cached("rz", "zz:zz:zz:zz:zz:zz", "Old"));

    let handle = platform.on_ready().unwrap();
    // Removal happens before authentication resolves, ahead of any remote call.
    assert_eq!(service.service_calls(), 0);
    assert!(platform.accessories().is_empty());
    assert_eq!(registry.unregistered_macs(), ["zz:zz:zz:zz:zz:zz"]);

    let report = handle.wait().await.unwrap();
    assert_eq!(report.removed, vec![MacAddress::new("zz:zz:zz:zz:zz:zz")]);
    assert_eq!(service.known_calls.load(Ordering::SeqCst), 0);
    assert!(registry.registered_macs().is_empty());
}

#[tokio::test]
async fn exposed_set_equals_desired_set_after_pass() {
    let service = FakeService::with_clients(&[
        ("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false),
        ("r2", "aa:bb:cc:dd:ee:02", Some("Phone"), true),
        ("r3", "aa:bb:cc:dd:ee:03", None, false),
    ]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(
        &["aa:bb:cc:dd:ee:01", "AA-BB-CC-DD-EE-03", "aa:bb:cc:dd:ee:01"],
        60_000,
        &service,
        &registry,
    );
    platform.on_entity_restored(cached("r1", "aa:bb:cc:dd:ee:01", "Laptop"));
    platform.on_entity_restored(cached("r2", "aa:bb:cc:dd:ee:02", "Phone"));

    let report = platform.on_ready().unwrap().wait().await.unwrap();

    let expected: BTreeSet<String> = ["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:03"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(exposed_macs(&platform), expected);
    assert_eq!(report.added, vec![MacAddress::new("aa:bb:cc:dd:ee:03")]);
    assert_eq!(report.removed, vec![MacAddress::new("aa:bb:cc:dd:ee:02")]);
    // The restored accessory was kept, not re-registered.
    assert_eq!(registry.registered_macs(), ["aa:bb:cc:dd:ee:03"]);
}

#[tokio::test]
async fn unknown_configured_client_is_reported_missing() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false)]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(
        &["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:99"],
        60_000,
        &service,
        &registry,
    );

    let report = platform.on_ready().unwrap().wait().await.unwrap();

    assert_eq!(report.added, vec![MacAddress::new("aa:bb:cc:dd:ee:01")]);
    assert_eq!(report.missing, vec![MacAddress::new("aa:bb:cc:dd:ee:99")]);
    assert_eq!(platform.accessory_count(), 1);
}

#[tokio::test]
async fn authentication_failure_blocks_adds_but_not_removal() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false)]);
    service.fail_auth.store(true, Ordering::SeqCst);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);
    platform.on_entity_restored(cached("rz", "zz:zz:zz:zz:zz:zz", "Old"));

    let result = platform.on_ready().unwrap().wait().await;

    assert!(matches!(result, Err(CoreError::AuthenticationFailed { .. })));
    assert_eq!(*platform.readiness().borrow(), Readiness::Failed);
    assert!(platform.accessories().is_empty());
    assert_eq!(registry.unregistered_macs(), ["zz:zz:zz:zz:zz:zz"]);
    assert!(registry.registered_macs().is_empty());
    assert_eq!(service.known_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.auth_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn known_client_fetch_failure_skips_adds_but_still_becomes_ready() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false)]);
    service.fail_known_clients.store(true, Ordering::SeqCst);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);

    let result = platform.on_ready().unwrap().wait().await;

    assert!(matches!(result, Err(CoreError::Api { .. })));
    assert!(platform.is_ready());
    assert!(platform.accessories().is_empty());
}

#[tokio::test]
async fn second_ready_signal_is_rejected() {
    let service = FakeService::with_clients(&[]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&[], 60_000, &service, &registry);

    let handle = platform.on_ready().unwrap();
    assert!(matches!(platform.on_ready(), Err(CoreError::AlreadyLaunched)));
    handle.wait().await.unwrap();
    assert_eq!(service.auth_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_restored_accessory_is_unregistered() {
    let service = FakeService::with_clients(&[]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);

    platform.on_entity_restored(cached("r1", "aa:bb:cc:dd:ee:01", "Laptop"));
    platform.on_entity_restored(cached("r1-old", "aa:bb:cc:dd:ee:01", "Laptop"));

    assert_eq!(platform.accessory_count(), 1);
    assert_eq!(
        platform.accessories()[0].uuid(),
        accessory_uuid("r1"),
        "first restored accessory wins"
    );
    assert_eq!(registry.unregistered_macs(), ["aa:bb:cc:dd:ee:01"]);
}

// ── Readiness gate ──────────────────────────────────────────────────

#[tokio::test]
async fn operations_before_readiness_never_reach_the_service() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false)]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);
    platform.on_entity_restored(cached("r1", "aa:bb:cc:dd:ee:01", "Laptop"));
    let uuid = accessory_uuid("r1");

    assert!(platform.refresh(uuid).await.unwrap_err().is_not_ready());
    assert!(platform.toggle(uuid, true).await.unwrap_err().is_not_ready());
    assert!(platform.mark_unreachable().unwrap_err().is_not_ready());
    assert!(platform.remove_accessory(uuid).unwrap_err().is_not_ready());
    let client = service.known.lock().unwrap()[0].clone();
    assert!(platform.add_accessory(&client).unwrap_err().is_not_ready());
    let get = platform.handle(CharacteristicRequest::Get { uuid }).await;
    assert!(get.unwrap_err().is_not_ready());

    assert_eq!(service.service_calls(), 0);
    assert_eq!(platform.accessory_count(), 1);
    assert!(platform.accessories()[0].is_reachable());
}

// ── State adapter ───────────────────────────────────────────────────

#[tokio::test]
async fn refresh_writes_controller_state_and_is_idempotent() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), true)]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);
    platform.on_ready().unwrap().wait().await.unwrap();
    let uuid = uuid_for(&platform, "aa:bb:cc:dd:ee:01");
    let acc = platform.accessory(&uuid).unwrap();
    let mut rx = acc.switch().unwrap().subscribe();

    assert!(platform.refresh(uuid).await.unwrap());
    assert!(platform.refresh(uuid).await.unwrap());

    assert!(acc.switch().unwrap().is_on());
    assert!(rx.borrow_and_update().refreshed_at.is_some());
    assert_eq!(service.status_calls_for("r1"), 2);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_state() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), true)]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);
    platform.on_ready().unwrap().wait().await.unwrap();
    let uuid = uuid_for(&platform, "aa:bb:cc:dd:ee:01");

    platform.refresh(uuid).await.unwrap();
    service.failing.lock().unwrap().insert("r1".into());

    assert!(matches!(platform.refresh(uuid).await, Err(CoreError::Timeout)));
    assert!(platform.accessory(&uuid).unwrap().switch().unwrap().is_on());
}

#[tokio::test]
async fn toggle_calls_block_then_refresh_observes_it() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false)]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);
    platform.on_ready().unwrap().wait().await.unwrap();
    let uuid = uuid_for(&platform, "aa:bb:cc:dd:ee:01");
    let switch_on = || platform.accessory(&uuid).unwrap().switch().unwrap().is_on();

    platform.toggle(uuid, true).await.unwrap();
    assert_eq!(
        *service.block_calls.lock().unwrap(),
        vec![MacAddress::new("aa:bb:cc:dd:ee:01")]
    );
    // No optimistic update.
    assert!(!switch_on());

    platform.refresh(uuid).await.unwrap();
    assert!(switch_on());

    platform.toggle(uuid, false).await.unwrap();
    platform.refresh(uuid).await.unwrap();
    assert!(!switch_on());
    assert_eq!(service.unblock_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_uuid_is_accessory_not_found() {
    let service = FakeService::with_clients(&[]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&[], 60_000, &service, &registry);
    platform.on_ready().unwrap().wait().await.unwrap();

    let err = platform.refresh(Uuid::nil()).await.unwrap_err();
    assert!(matches!(err, CoreError::AccessoryNotFound { .. }));
}

#[tokio::test]
async fn mark_unreachable_flags_every_accessory() {
    let service = FakeService::with_clients(&[
        ("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false),
        ("r2", "aa:bb:cc:dd:ee:02", Some("Phone"), false),
    ]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(
        &["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"],
        60_000,
        &service,
        &registry,
    );
    platform.on_ready().unwrap().wait().await.unwrap();

    platform.mark_unreachable().unwrap();
    assert!(platform.accessories().iter().all(|a| !a.is_reachable()));
}

#[tokio::test]
async fn remove_accessory_after_ready_unregisters_it() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false)]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);
    platform.on_ready().unwrap().wait().await.unwrap();
    let uuid = uuid_for(&platform, "aa:bb:cc:dd:ee:01");

    let removed = platform.remove_accessory(uuid).unwrap();
    assert_eq!(removed.uuid(), uuid);
    assert!(platform.accessory(&uuid).is_none());
    assert_eq!(registry.unregistered_macs(), ["aa:bb:cc:dd:ee:01"]);
}

// ── Request channel ─────────────────────────────────────────────────

#[tokio::test]
async fn request_processor_answers_every_request() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), true)]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 60_000, &service, &registry);
    platform.on_ready().unwrap().wait().await.unwrap();
    let uuid = uuid_for(&platform, "aa:bb:cc:dd:ee:01");
    let tx = platform.spawn_request_processor();

    let (get, get_rx) = RequestEnvelope::new(CharacteristicRequest::Get { uuid });
    tx.send(get).await.unwrap();
    assert_eq!(
        get_rx.await.unwrap().unwrap(),
        CharacteristicResponse::Value(true)
    );

    let (set, set_rx) = RequestEnvelope::new(CharacteristicRequest::Set { uuid, on: false });
    tx.send(set).await.unwrap();
    assert_eq!(set_rx.await.unwrap().unwrap(), CharacteristicResponse::Ack);

    let (missing, missing_rx) = RequestEnvelope::new(CharacteristicRequest::Get {
        uuid: Uuid::nil(),
    });
    tx.send(missing).await.unwrap();
    assert!(matches!(
        missing_rx.await.unwrap(),
        Err(CoreError::AccessoryNotFound { .. })
    ));

    platform.shutdown().await;
    assert_eq!(service.logout_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*platform.readiness().borrow(), Readiness::Unauthenticated);
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn poll_refreshes_each_accessory_once_per_period() {
    let service = FakeService::with_clients(&[
        ("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), true),
        ("r2", "aa:bb:cc:dd:ee:02", Some("Phone"), false),
    ]);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(
        &["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"],
        1000,
        &service,
        &registry,
    );
    platform.on_ready().unwrap().wait().await.unwrap();
    assert_eq!(service.status_calls.lock().unwrap().len(), 0);

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert_eq!(service.status_calls_for("r1"), 1);
    assert_eq!(service.status_calls_for("r2"), 1);
    let laptop = uuid_for(&platform, "aa:bb:cc:dd:ee:01");
    assert!(platform.accessory(&laptop).unwrap().switch().unwrap().is_on());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(service.status_calls_for("r1"), 2);
    assert_eq!(service.status_calls_for("r2"), 2);

    platform.shutdown().await;
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(service.status_calls_for("r1"), 2);
}

#[tokio::test(start_paused = true)]
async fn poll_does_not_start_before_authentication() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), true)]);
    service.fail_auth.store(true, Ordering::SeqCst);
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 1000, &service, &registry);
    platform.on_entity_restored(cached("r1", "aa:bb:cc:dd:ee:01", "Laptop"));

    let _ = platform.on_ready().unwrap().wait().await;
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(service.status_calls.lock().unwrap().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_refresh_does_not_hold_back_other_accessories_or_later_ticks() {
    let service = FakeService::with_clients(&[
        ("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), true),
        ("r2", "aa:bb:cc:dd:ee:02", Some("Phone"), false),
    ]);
    service
        .status_delay
        .lock()
        .unwrap()
        .insert("r1".into(), Duration::from_secs(10));
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(
        &["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"],
        1000,
        &service,
        &registry,
    );
    platform.on_ready().unwrap().wait().await.unwrap();

    tokio::time::sleep(Duration::from_millis(3001)).await;

    // One status call per accessory per tick, however long r1 takes.
    assert_eq!(service.status_calls_for("r1"), 3);
    assert_eq!(service.status_calls_for("r2"), 3);
    // Every tick's r1 lookup is still pending.
    assert_eq!(service.max_in_flight_for("r1"), 3);

    let laptop = uuid_for(&platform, "aa:bb:cc:dd:ee:01");
    let phone = uuid_for(&platform, "aa:bb:cc:dd:ee:02");
    let state = |uuid| platform.accessory(&uuid).unwrap().switch().unwrap().state();
    assert!(state(laptop).refreshed_at.is_none());
    assert!(state(phone).refreshed_at.is_some());

    platform.shutdown().await;
}

// ── Shutdown during reconciliation ──────────────────────────────────

async fn until(cond: impl Fn() -> bool) {
    while !cond() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn shutdown_during_authentication_abandons_the_login() {
    let service = FakeService::with_clients(&[("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false)]);
    let gate = service.gate_auth();
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(&["aa:bb:cc:dd:ee:01"], 1000, &service, &registry);

    let handle = platform.on_ready().unwrap();
    until(|| service.auth_calls.load(Ordering::SeqCst) == 1).await;

    platform.shutdown().await;
    assert!(matches!(handle.wait().await, Err(CoreError::ShuttingDown)));

    // Releasing the login afterwards reaches nothing: it was dropped
    // before it could store a session.
    gate.notify_one();
    tokio::task::yield_now().await;
    assert_eq!(service.auth_done.load(Ordering::SeqCst), 0);
    assert_eq!(service.known_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.logout_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*platform.readiness().borrow(), Readiness::Unauthenticated);
    assert!(registry.registered_macs().is_empty());
}

#[tokio::test]
async fn shutdown_during_client_fetch_adds_nothing() {
    let service = FakeService::with_clients(&[
        ("r1", "aa:bb:cc:dd:ee:01", Some("Laptop"), false),
        ("r2", "aa:bb:cc:dd:ee:02", Some("Phone"), false),
    ]);
    let gate = service.gate_known_clients();
    let registry = Arc::new(RecordingRegistry::default());
    let platform = platform(
        &["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"],
        60_000,
        &service,
        &registry,
    );

    let handle = platform.on_ready().unwrap();
    until(|| service.known_calls.load(Ordering::SeqCst) == 1).await;
    assert!(platform.is_ready());

    platform.shutdown().await;
    assert!(matches!(handle.wait().await, Err(CoreError::ShuttingDown)));

    gate.notify_one();
    tokio::task::yield_now().await;
    assert!(registry.registered_macs().is_empty());
    assert!(platform.accessories().is_empty());
    // The login that did complete is ended by shutdown.
    assert_eq!(service.logout_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*platform.readiness().borrow(), Readiness::Unauthenticated);
}
