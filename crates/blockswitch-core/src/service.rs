// ── Controller client service ──
//
// The seam between the engine and the controller. The engine only ever
// talks to `dyn ClientService`; `LegacyClientService` is the production
// implementation over `blockswitch-api`.

use std::sync::Arc;

use async_trait::async_trait;
use blockswitch_api::transport::{TlsMode, TransportConfig};
use blockswitch_api::LegacyClient;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{ControllerConfig, TlsVerification};
use crate::error::CoreError;
use crate::model::{KnownClient, MacAddress};

/// Operations the engine needs from the controller.
#[async_trait]
pub trait ClientService: Send + Sync {
    /// Establish a session. Must succeed before any other call.
    async fn authenticate(&self) -> Result<(), CoreError>;

    /// Every client the controller has a record for.
    async fn known_clients(&self) -> Result<Vec<KnownClient>, CoreError>;

    /// Whether the client with this record id is blocked.
    async fn client_block_status(&self, record_id: &str) -> Result<bool, CoreError>;

    async fn block_client(&self, mac: &MacAddress) -> Result<(), CoreError>;

    async fn unblock_client(&self, mac: &MacAddress) -> Result<(), CoreError>;

    /// End the session. Best effort.
    async fn logout(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// [`ClientService`] backed by the controller's legacy session API.
pub struct LegacyClientService {
    config: ControllerConfig,
    client: Mutex<Option<Arc<LegacyClient>>>,
}

impl LegacyClientService {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// The logged-in client, or `NotReady` before `authenticate` succeeds.
    async fn session(&self, action: &'static str) -> Result<Arc<LegacyClient>, CoreError> {
        self.client
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(CoreError::NotReady { action })
    }
}

#[async_trait]
impl ClientService for LegacyClientService {
    async fn authenticate(&self) -> Result<(), CoreError> {
        let transport = build_transport(&self.config);
        let platform = LegacyClient::detect_platform(&self.config.url, &transport).await?;
        debug!(?platform, url = %self.config.url, "detected controller platform");

        let client = LegacyClient::new(
            self.config.url.clone(),
            self.config.site.clone(),
            platform,
            &transport,
        )?;
        client
            .login(&self.config.username, &self.config.password)
            .await?;

        *self.client.lock().await = Some(Arc::new(client));
        Ok(())
    }

    async fn known_clients(&self) -> Result<Vec<KnownClient>, CoreError> {
        let client = self.session("list known clients").await?;
        let entries = client.list_known_clients().await?;
        Ok(entries.into_iter().map(KnownClient::from).collect())
    }

    async fn client_block_status(&self, record_id: &str) -> Result<bool, CoreError> {
        let client = self.session("read block status").await?;
        Ok(client.client_block_status(record_id).await?)
    }

    async fn block_client(&self, mac: &MacAddress) -> Result<(), CoreError> {
        let client = self.session("block client").await?;
        Ok(client.block_client(mac.as_str()).await?)
    }

    async fn unblock_client(&self, mac: &MacAddress) -> Result<(), CoreError> {
        let client = self.session("unblock client").await?;
        Ok(client.unblock_client(mac.as_str()).await?)
    }

    async fn logout(&self) -> Result<(), CoreError> {
        let Some(client) = self.client.lock().await.take() else {
            return Ok(());
        };
        Ok(client.logout().await?)
    }
}

/// Build a [`TransportConfig`] from the controller configuration.
fn build_transport(config: &ControllerConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
        cookie_jar: None, // LegacyClient::new adds one automatically
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
