// ── Block-switch platform ──
//
// Owns the exposed accessories and their lifecycle: restoration from the
// host, the one-time reconciliation pass against the configured clients,
// the periodic block-state refresh, and host get/set requests. Every
// operation that reaches the controller is gated on `Readiness::Ready`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PlatformConfig;
use crate::error::CoreError;
use crate::model::{Accessory, KnownClient, MacAddress};
use crate::registry::{EntityRegistry, PLATFORM_NAME, PLUGIN_NAME};
use crate::request::{CharacteristicRequest, CharacteristicResponse, RequestEnvelope};
use crate::service::ClientService;
use crate::store::AccessoryCollection;

const REQUEST_CHANNEL_SIZE: usize = 64;

// ── Readiness ────────────────────────────────────────────────────

/// Controller session state observable by hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Readiness {
    Unauthenticated,
    Authenticating,
    Ready,
    /// Authentication failed. Not retried.
    Failed,
}

// ── Reconciliation result ────────────────────────────────────────

/// Outcome of the reconciliation pass started by [`Platform::on_ready`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Accessories dropped because their client is no longer configured.
    pub removed: Vec<MacAddress>,
    /// Accessories created for configured clients.
    pub added: Vec<MacAddress>,
    /// Configured clients the controller has no record of.
    pub missing: Vec<MacAddress>,
}

/// Handle to the background half of the reconciliation pass.
///
/// Dropping it detaches the pass; it still runs until it completes or the
/// platform shuts down.
#[derive(Debug)]
pub struct ReconcileHandle {
    result: oneshot::Receiver<Result<ReconcileReport, CoreError>>,
}

impl ReconcileHandle {
    /// Wait for authentication and the add phase to finish.
    pub async fn wait(self) -> Result<ReconcileReport, CoreError> {
        self.result.await.map_err(|_| {
            CoreError::Internal("reconciliation task ended without a result".into())
        })?
    }
}

// ── Platform ─────────────────────────────────────────────────────

/// The reconciliation and polling engine.
///
/// Cheaply cloneable via `Arc<PlatformInner>`. Hosts hand it restored
/// accessories, call [`on_ready`](Self::on_ready) once, then route switch
/// reads and writes through [`handle`](Self::handle) or the channel from
/// [`spawn_request_processor`](Self::spawn_request_processor).
#[derive(Clone)]
pub struct Platform {
    inner: Arc<PlatformInner>,
}

struct PlatformInner {
    config: PlatformConfig,
    service: Arc<dyn ClientService>,
    registry: Arc<dyn EntityRegistry>,
    accessories: AccessoryCollection,
    readiness: watch::Sender<Readiness>,
    launched: AtomicBool,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Platform {
    /// Create a platform. Nothing talks to the controller until
    /// [`on_ready`](Self::on_ready).
    pub fn new(
        config: PlatformConfig,
        service: Arc<dyn ClientService>,
        registry: Arc<dyn EntityRegistry>,
    ) -> Self {
        let (readiness, _) = watch::channel(Readiness::Unauthenticated);
        Self {
            inner: Arc::new(PlatformInner {
                config,
                service,
                registry,
                accessories: AccessoryCollection::new(),
                readiness,
                launched: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.inner.config
    }

    // ── Host lifecycle ───────────────────────────────────────────

    /// Take ownership of an accessory the host restored from its cache.
    ///
    /// Accepted in any readiness state. A second accessory for a MAC that
    /// is already owned is unregistered instead of kept.
    pub fn on_entity_restored(&self, accessory: Accessory) {
        let accessory = Arc::new(accessory);
        info!(
            mac = %accessory.mac(),
            name = accessory.display_name(),
            "loaded client"
        );

        if self.inner.accessories.contains(accessory.mac()) {
            warn!(
                mac = %accessory.mac(),
                uuid = %accessory.uuid(),
                "duplicate cached accessory for client; unregistering it"
            );
            if let Err(e) = self.inner.registry.unregister(
                PLUGIN_NAME,
                PLATFORM_NAME,
                std::slice::from_ref(&accessory),
            ) {
                warn!(mac = %accessory.mac(), error = %e, "failed to unregister duplicate");
            }
            return;
        }

        if accessory.switch().is_none() {
            warn!(
                mac = %accessory.mac(),
                name = accessory.display_name(),
                "cached accessory has no switch service; requests for it will be rejected"
            );
        }

        accessory.set_reachable(true);
        self.inner.accessories.insert(accessory);
    }

    /// Start the reconciliation pass. Call once, after restoration.
    ///
    /// Stale accessories are removed before this returns. Authentication,
    /// the add phase, and the poll timer continue on a spawned task whose
    /// result the returned handle carries. Must be called from within a
    /// tokio runtime.
    pub fn on_ready(&self) -> Result<ReconcileHandle, CoreError> {
        if self.inner.launched.swap(true, Ordering::SeqCst) {
            warn!("platform already launched; ignoring repeated ready signal");
            return Err(CoreError::AlreadyLaunched);
        }
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ShuttingDown);
        }

        self.inner.readiness.send_replace(Readiness::Authenticating);

        let desired = self.inner.config.desired_clients();
        let desired_set: HashSet<&MacAddress> = desired.iter().collect();
        let exposed: HashSet<MacAddress> = self.inner.accessories.macs().into_iter().collect();

        let to_add: Vec<MacAddress> = desired
            .iter()
            .filter(|mac| !exposed.contains(*mac))
            .cloned()
            .collect();

        let snapshot = self.inner.accessories.snapshot();
        let to_remove = snapshot
            .iter()
            .filter(|acc| !desired_set.contains(acc.mac()));

        let mut removed = Vec::new();
        for accessory in to_remove {
            match self.detach(accessory) {
                Ok(()) => removed.push(accessory.mac().clone()),
                Err(e) => {
                    error!(mac = %accessory.mac(), error = %e, "failed to remove stale accessory");
                }
            }
        }

        debug!(
            desired = desired.len(),
            to_add = to_add.len(),
            removed = removed.len(),
            "reconciliation diff computed"
        );

        let (result_tx, result) = oneshot::channel();
        let platform = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = platform.complete_launch(to_add, removed).await;
            let _ = result_tx.send(outcome);
        });
        self.track(handle);
        Ok(ReconcileHandle { result })
    }

    /// Stop background work and end the controller session.
    ///
    /// Cancels the reconciliation pass, the poll timer, and the request
    /// processor, and waits for them before logging out. A login or client
    /// fetch still pending in the reconciliation pass is abandoned; refresh
    /// and toggle calls already in flight are not interrupted.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        // Tasks may still register handles while the first batch winds down.
        loop {
            let handles = std::mem::take(
                &mut *self
                    .inner
                    .task_handles
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }

        if let Err(e) = self.inner.service.logout().await {
            warn!(error = %e, "logout failed (non-fatal)");
        }

        self.inner
            .readiness
            .send_replace(Readiness::Unauthenticated);
        debug!("platform shut down");
    }

    // ── Accessory management ─────────────────────────────────────

    /// Expose a switch for a known client. Returns the existing
    /// accessory if the client is already exposed.
    pub fn add_accessory(&self, client: &KnownClient) -> Result<Arc<Accessory>, CoreError> {
        self.ensure_ready("add accessory")?;
        self.expose(client)
    }

    /// Unregister and drop an accessory.
    pub fn remove_accessory(&self, uuid: Uuid) -> Result<Arc<Accessory>, CoreError> {
        self.ensure_ready("remove accessory")?;
        let accessory = self.lookup(uuid)?;
        self.detach(&accessory)?;
        Ok(accessory)
    }

    /// Flag every accessory as unreachable.
    pub fn mark_unreachable(&self) -> Result<(), CoreError> {
        self.ensure_ready("update reachability")?;
        info!("update reachability");
        for accessory in self.accessories().iter() {
            accessory.set_reachable(false);
        }
        Ok(())
    }

    // ── State adapter ────────────────────────────────────────────

    /// Read the client's block state from the controller into its switch.
    ///
    /// On failure the switch keeps its previous state.
    pub async fn refresh(&self, uuid: Uuid) -> Result<bool, CoreError> {
        self.ensure_ready("refresh")?;
        let accessory = self.lookup(uuid)?;
        self.refresh_accessory(&accessory).await
    }

    /// Block (`on = true`) or unblock the client behind an accessory.
    ///
    /// The switch state is left alone; the next refresh observes the
    /// controller's answer.
    pub async fn toggle(&self, uuid: Uuid, on: bool) -> Result<(), CoreError> {
        self.ensure_ready("toggle")?;
        let accessory = self.lookup(uuid)?;
        if accessory.switch().is_none() {
            return Err(no_switch(&accessory));
        }

        let mac = accessory.mac();
        let result = if on {
            self.inner.service.block_client(mac).await
        } else {
            self.inner.service.unblock_client(mac).await
        };

        match &result {
            Ok(()) => info!(%mac, blocked = on, "client block state changed"),
            Err(e) => warn!(%mac, blocked = on, error = %e, "failed to change block state"),
        }
        result
    }

    /// Serve one host request.
    pub async fn handle(
        &self,
        request: CharacteristicRequest,
    ) -> Result<CharacteristicResponse, CoreError> {
        match request {
            CharacteristicRequest::Get { uuid } => {
                self.refresh(uuid).await.map(CharacteristicResponse::Value)
            }
            CharacteristicRequest::Set { uuid, on } => self
                .toggle(uuid, on)
                .await
                .map(|()| CharacteristicResponse::Ack),
        }
    }

    /// Spawn a task that serves requests from the returned channel.
    ///
    /// Each request runs on its own task and is answered exactly once.
    /// After [`shutdown`](Self::shutdown), queued requests are answered
    /// with [`CoreError::ShuttingDown`].
    pub fn spawn_request_processor(&self) -> mpsc::Sender<RequestEnvelope> {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let handle = tokio::spawn(request_processor_task(self.clone(), rx));
        self.track(handle);
        tx
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to readiness changes.
    pub fn readiness(&self) -> watch::Receiver<Readiness> {
        self.inner.readiness.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.readiness.borrow() == Readiness::Ready
    }

    pub fn accessories(&self) -> Arc<Vec<Arc<Accessory>>> {
        self.inner.accessories.snapshot()
    }

    pub fn accessory(&self, uuid: &Uuid) -> Option<Arc<Accessory>> {
        self.inner.accessories.get_by_uuid(uuid)
    }

    pub fn accessory_count(&self) -> usize {
        self.inner.accessories.len()
    }

    /// Subscribe to changes of the accessory set.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Accessory>>>> {
        self.inner.accessories.subscribe()
    }

    // ── Internals ────────────────────────────────────────────────

    async fn complete_launch(
        self,
        to_add: Vec<MacAddress>,
        removed: Vec<MacAddress>,
    ) -> Result<ReconcileReport, CoreError> {
        let cancel = self.inner.cancel.clone();
        let auth = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("shutdown during authentication; reconciliation abandoned");
                return Err(CoreError::ShuttingDown);
            }
            auth = self.inner.service.authenticate() => auth,
        };
        if let Err(e) = auth {
            self.inner.readiness.send_replace(Readiness::Failed);
            error!(error = %e, "controller authentication failed; switches stay unavailable");
            return Err(e);
        }
        // The session is logged out by `shutdown`, which waits for this task.
        if cancel.is_cancelled() {
            return Err(CoreError::ShuttingDown);
        }

        self.inner.readiness.send_replace(Readiness::Ready);
        info!("authenticated with controller");
        self.start_polling();

        let mut report = ReconcileReport {
            removed,
            ..ReconcileReport::default()
        };
        if !to_add.is_empty() {
            let (added, missing) = self.add_missing(&to_add).await?;
            report.added = added;
            report.missing = missing;
        }

        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            missing = report.missing.len(),
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Fetch known clients and expose the ones in `to_add`.
    async fn add_missing(
        &self,
        to_add: &[MacAddress],
    ) -> Result<(Vec<MacAddress>, Vec<MacAddress>), CoreError> {
        let cancel = &self.inner.cancel;
        let known = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            known = self.inner.service.known_clients() => Some(known),
        };
        let Some(known) = known.filter(|_| !cancel.is_cancelled()) else {
            debug!("shutdown during client fetch; no accessories added");
            return Err(CoreError::ShuttingDown);
        };
        let known = known.inspect_err(|e| {
            warn!(error = %e, "failed to fetch known clients; no accessories added");
        })?;

        let mut added = Vec::new();
        let mut missing = Vec::new();
        for mac in to_add {
            // First record wins if the controller reports a MAC twice.
            let Some(client) = known.iter().find(|c| &c.mac == mac) else {
                warn!(%mac, "configured client is unknown to the controller");
                missing.push(mac.clone());
                continue;
            };
            match self.expose(client) {
                Ok(_) => added.push(mac.clone()),
                Err(e) => error!(%mac, error = %e, "failed to add accessory"),
            }
        }
        Ok((added, missing))
    }

    fn expose(&self, client: &KnownClient) -> Result<Arc<Accessory>, CoreError> {
        if let Some(existing) = self.inner.accessories.get_by_mac(&client.mac) {
            return Ok(existing);
        }

        let accessory = Arc::new(Accessory::from_known_client(client));
        info!(
            mac = %accessory.mac(),
            name = accessory.display_name(),
            "added client from config"
        );
        self.inner.registry.register(
            PLUGIN_NAME,
            PLATFORM_NAME,
            std::slice::from_ref(&accessory),
        )?;
        self.inner.accessories.insert(Arc::clone(&accessory));
        Ok(accessory)
    }

    /// Ungated removal: unregister from the host, then drop locally.
    fn detach(&self, accessory: &Arc<Accessory>) -> Result<(), CoreError> {
        info!(
            mac = %accessory.mac(),
            name = accessory.display_name(),
            "removing accessory"
        );
        self.inner.registry.unregister(
            PLUGIN_NAME,
            PLATFORM_NAME,
            std::slice::from_ref(accessory),
        )?;
        self.inner.accessories.remove(accessory.mac());
        Ok(())
    }

    async fn refresh_accessory(&self, accessory: &Accessory) -> Result<bool, CoreError> {
        let switch = accessory.switch().ok_or_else(|| no_switch(accessory))?;
        match self
            .inner
            .service
            .client_block_status(&accessory.context().record_id)
            .await
        {
            Ok(blocked) => {
                switch.report(blocked);
                Ok(blocked)
            }
            Err(e) => {
                warn!(
                    mac = %accessory.mac(),
                    name = accessory.display_name(),
                    error = %e,
                    "failed to refresh block state"
                );
                Err(e)
            }
        }
    }

    /// Refresh every switch in a snapshot concurrently.
    async fn refresh_all(&self, snapshot: &[Arc<Accessory>]) {
        let refreshes = snapshot
            .iter()
            .filter(|acc| acc.switch().is_some())
            .map(|acc| self.refresh_accessory(acc));
        let results = join_all(refreshes).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(refreshed = results.len(), failed, "poll tick complete");
    }

    fn start_polling(&self) {
        let period = self.inner.config.polling_frequency;
        if period.is_zero() {
            warn!("polling frequency is zero; periodic refresh disabled");
            return;
        }
        let interval = tokio::time::interval(period);
        let handle = tokio::spawn(poll_task(
            self.clone(),
            interval,
            self.inner.cancel.clone(),
        ));
        self.track(handle);
    }

    fn ensure_ready(&self, action: &'static str) -> Result<(), CoreError> {
        let readiness = *self.inner.readiness.borrow();
        if readiness == Readiness::Ready {
            Ok(())
        } else {
            warn!(action, %readiness, "controller session not ready; request rejected");
            Err(CoreError::NotReady { action })
        }
    }

    fn lookup(&self, uuid: Uuid) -> Result<Arc<Accessory>, CoreError> {
        self.inner
            .accessories
            .get_by_uuid(&uuid)
            .ok_or_else(|| CoreError::AccessoryNotFound {
                identifier: uuid.to_string(),
            })
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.inner
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }
}

fn no_switch(accessory: &Accessory) -> CoreError {
    CoreError::NoSwitchService {
        identifier: accessory.mac().to_string(),
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Refresh every accessory once per period.
///
/// Ticks do not wait for each other: a tick whose refreshes are still
/// pending does not hold back the next one.
async fn poll_task(platform: Platform, mut interval: Interval, cancel: CancellationToken) {
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let snapshot = platform.accessories();
                let tick = platform.clone();
                tokio::spawn(async move { tick.refresh_all(&snapshot).await });
            }
        }
    }
}

/// Serve host requests from the channel, one task per request.
async fn request_processor_task(platform: Platform, mut rx: mpsc::Receiver<RequestEnvelope>) {
    let cancel = platform.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let platform = platform.clone();
                tokio::spawn(async move {
                    let result = platform.handle(envelope.request).await;
                    let _ = envelope.response_tx.send(result);
                });
            }
        }
    }

    rx.close();
    while let Ok(envelope) = rx.try_recv() {
        let _ = envelope.response_tx.send(Err(CoreError::ShuttingDown));
    }
}
