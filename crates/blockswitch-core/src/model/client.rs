// ── Known client ──

use serde::{Deserialize, Serialize};

use super::identity::MacAddress;

/// A client record as the controller reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownClient {
    /// Controller record id (`_id`). Used for status lookups.
    pub record_id: String,
    pub mac: MacAddress,
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub blocked: bool,
}

impl KnownClient {
    /// Preferred label: name, then hostname, then record id.
    /// Blank strings are skipped.
    pub fn display_name(&self) -> &str {
        [self.name.as_deref(), self.hostname.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(self.record_id.as_str())
    }
}

impl From<blockswitch_api::KnownClientEntry> for KnownClient {
    fn from(entry: blockswitch_api::KnownClientEntry) -> Self {
        Self {
            record_id: entry.id,
            mac: MacAddress::new(entry.mac),
            name: entry.name,
            hostname: entry.hostname,
            blocked: entry.blocked.unwrap_or(false),
        }
    }
}
