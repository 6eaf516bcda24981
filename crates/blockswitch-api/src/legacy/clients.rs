// Legacy API client (station) endpoints
//
// Known-client lookup via rest/user and block/unblock via cmd/stamgr.

use serde_json::json;
use tracing::debug;

use crate::error::Error;
use crate::legacy::client::LegacyClient;
use crate::legacy::models::KnownClientEntry;

impl LegacyClient {
    /// List every client the controller knows about, online or not.
    ///
    /// `GET /api/s/{site}/rest/user`
    pub async fn list_known_clients(&self) -> Result<Vec<KnownClientEntry>, Error> {
        let url = self.site_url("rest/user")?;
        debug!("listing known clients");
        self.get(url).await
    }

    /// Fetch a single known client by its controller record id.
    ///
    /// `GET /api/s/{site}/rest/user/{id}`
    pub async fn get_known_client(&self, id: &str) -> Result<KnownClientEntry, Error> {
        let url = self.site_url(&format!("rest/user/{id}"))?;
        debug!(id, "fetching known client");
        let mut data: Vec<KnownClientEntry> = self.get(url).await?;
        if data.is_empty() {
            return Err(Error::NotFound {
                resource: "client",
                id: id.to_owned(),
            });
        }
        Ok(data.swap_remove(0))
    }

    /// Whether the client with the given record id is currently blocked.
    ///
    /// A record without a `blocked` field has never been blocked.
    pub async fn client_block_status(&self, id: &str) -> Result<bool, Error> {
        let entry = self.get_known_client(id).await?;
        Ok(entry.blocked.unwrap_or(false))
    }

    /// Block a client by MAC address.
    ///
    /// `POST /api/s/{site}/cmd/stamgr` with `{"cmd": "block-sta", "mac": "..."}`
    pub async fn block_client(&self, mac: &str) -> Result<(), Error> {
        self.stamgr("block-sta", mac).await
    }

    /// Unblock a client by MAC address.
    ///
    /// `POST /api/s/{site}/cmd/stamgr` with `{"cmd": "unblock-sta", "mac": "..."}`
    pub async fn unblock_client(&self, mac: &str) -> Result<(), Error> {
        self.stamgr("unblock-sta", mac).await
    }

    async fn stamgr(&self, cmd: &str, mac: &str) -> Result<(), Error> {
        let url = self.site_url("cmd/stamgr")?;
        debug!(mac, cmd, "station manager command");
        let _: Vec<serde_json::Value> = self
            .post(
                url,
                &json!({
                    "cmd": cmd,
                    "mac": mac,
                }),
            )
            .await?;
        Ok(())
    }
}
