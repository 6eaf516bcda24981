// ── Runtime configuration ──
//
// These types describe how to reach the controller and which clients to
// expose. They carry credential data and tuning, but never touch disk.
// The binary builds them from `blockswitch-config` and hands them in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::model::MacAddress;

/// Poll cadence used when the configuration does not set one.
pub const DEFAULT_POLLING_FREQUENCY: Duration = Duration::from_millis(5000);

/// Site used when the configuration does not name one.
pub const DEFAULT_SITE: &str = "default";

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs). Default for local controllers.
    #[default]
    DangerAcceptInvalid,
}

/// How to reach and authenticate with the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller URL (e.g., `https://192.168.1.1`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    /// Site to operate on (defaults to "default").
    pub site: String,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ControllerConfig {
    pub fn new(url: Url, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            url,
            username: username.into(),
            password,
            site: DEFAULT_SITE.into(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Engine settings: which clients to expose and how often to refresh them.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Desired clients, in configuration order. May be empty.
    pub clients: Vec<MacAddress>,
    /// Period of the block-state refresh.
    pub polling_frequency: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            polling_frequency: DEFAULT_POLLING_FREQUENCY,
        }
    }
}

impl PlatformConfig {
    pub fn with_clients<I, S>(clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            clients: clients.into_iter().map(MacAddress::new).collect(),
            ..Self::default()
        }
    }

    /// The desired clients with duplicates removed, first occurrence wins.
    pub fn desired_clients(&self) -> Vec<MacAddress> {
        let mut seen = std::collections::HashSet::new();
        self.clients
            .iter()
            .filter(|mac| seen.insert((*mac).clone()))
            .cloned()
            .collect()
    }
}
