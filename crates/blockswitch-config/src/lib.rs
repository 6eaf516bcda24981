//! Configuration for the blockswitch daemon.
//!
//! Reads the bridge's platform block (TOML or JSON, camelCase keys) plus
//! `BLOCKSWITCH_*` environment overrides, resolves the controller password
//! (env, config, then system keyring), and translates the result into
//! `blockswitch_core` runtime configs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use blockswitch_core::config::{DEFAULT_POLLING_FREQUENCY, DEFAULT_SITE};
use blockswitch_core::{ControllerConfig, PlatformConfig, TlsVerification};

/// Prefix for environment overrides (`BLOCKSWITCH_SITE_NAME`, ...).
pub const ENV_PREFIX: &str = "BLOCKSWITCH_";

/// Keyring service name; the account is the controller username.
pub const KEYRING_SERVICE: &str = "blockswitch";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} is required. Check the configuration file.")]
    MissingField { field: &'static str },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// The platform configuration block.
///
/// Unknown keys (e.g. the bridge's `platform` and `name`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Plaintext password. Prefer `BLOCKSWITCH_PASSWORD` or the keyring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Controller base URL (e.g. "https://192.168.1.1:8443").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_url: Option<String>,

    /// Poll period in milliseconds.
    #[serde(default = "default_polling_frequency")]
    pub polling_frequency: u64,

    #[serde(default = "default_site")]
    pub site_name: String,

    /// MAC addresses to expose as block switches.
    #[serde(default)]
    pub clients: Vec<String>,

    /// Accept self-signed controller certificates.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// Custom CA certificate. Takes precedence over `insecure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Where the accessory cache lives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            controller_url: None,
            polling_frequency: default_polling_frequency(),
            site_name: default_site(),
            clients: Vec::new(),
            insecure: default_insecure(),
            ca_cert: None,
            timeout: default_timeout(),
            cache_path: None,
        }
    }
}

fn default_polling_frequency() -> u64 {
    u64::try_from(DEFAULT_POLLING_FREQUENCY.as_millis()).unwrap_or(5000)
}
fn default_site() -> String {
    DEFAULT_SITE.into()
}
fn default_insecure() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}

/// Environment overrides. Keys arrive lowercased, so they are snake_case
/// here and copied onto [`Settings`] field by field. Credentials are read
/// separately so numeric-looking passwords stay strings.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    controller_url: Option<String>,
    polling_frequency: Option<u64>,
    site_name: Option<String>,
    clients: Option<Vec<String>>,
    insecure: Option<bool>,
    ca_cert: Option<PathBuf>,
    timeout: Option<u64>,
    cache_path: Option<PathBuf>,
}

impl EnvOverrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.controller_url {
            settings.controller_url = Some(v);
        }
        if let Some(v) = self.polling_frequency {
            settings.polling_frequency = v;
        }
        if let Some(v) = self.site_name {
            settings.site_name = v;
        }
        if let Some(v) = self.clients {
            settings.clients = v;
        }
        if let Some(v) = self.insecure {
            settings.insecure = v;
        }
        if let Some(v) = self.ca_cert {
            settings.ca_cert = Some(v);
        }
        if let Some(v) = self.timeout {
            settings.timeout = v;
        }
        if let Some(v) = self.cache_path {
            settings.cache_path = Some(v);
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "blockswitch", "blockswitch")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("blockswitch");
    p
}

/// Default config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default accessory cache path.
pub fn default_cache_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("accessories.json"),
        |dirs| dirs.data_dir().join("accessories.json"),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load settings from a file plus environment overrides.
///
/// With `None`, the default path is used and may be absent. An explicit
/// path must exist. Files ending in `.json` are read as JSON, anything
/// else as TOML.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let base = Figment::new().merge(Serialized::defaults(Settings::default()));
    let figment = if path.extension().is_some_and(|ext| ext == "json") {
        base.merge(Json::file(&path))
    } else {
        base.merge(Toml::file(&path))
    };
    let mut settings: Settings = figment.extract()?;

    let overrides: EnvOverrides =
        Figment::from(Env::prefixed(ENV_PREFIX).ignore(&["username", "password"])).extract()?;
    overrides.apply(&mut settings);

    if let Ok(username) = std::env::var(format!("{ENV_PREFIX}USERNAME")) {
        settings.username = Some(username);
    }
    if let Ok(password) = std::env::var(format!("{ENV_PREFIX}PASSWORD")) {
        settings.password = Some(password);
    }

    Ok(settings)
}

// ── Translation ─────────────────────────────────────────────────────

impl Settings {
    /// Controller connection settings. Fails on the first missing or
    /// invalid required field.
    pub fn controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        let raw_url = required(self.controller_url.as_deref(), "controllerUrl")?;
        let url = Url::parse(raw_url).map_err(|e| ConfigError::Validation {
            field: "controllerUrl",
            reason: format!("invalid URL '{raw_url}': {e}"),
        })?;
        let username = required(self.username.as_deref(), "username")?;
        let password = self.resolve_password(username)?;

        let mut config = ControllerConfig::new(url, username, password);
        config.site.clone_from(&self.site_name);
        config.tls = self.tls();
        config.timeout = Duration::from_secs(self.timeout);
        Ok(config)
    }

    /// Engine settings: desired clients and poll period.
    pub fn platform_config(&self) -> Result<PlatformConfig, ConfigError> {
        if self.polling_frequency == 0 {
            return Err(ConfigError::Validation {
                field: "pollingFrequency",
                reason: "must be greater than zero".into(),
            });
        }
        let mut config = PlatformConfig::with_clients(&self.clients);
        config.polling_frequency = Duration::from_millis(self.polling_frequency);
        Ok(config)
    }

    pub fn tls(&self) -> TlsVerification {
        if let Some(ref ca) = self.ca_cert {
            TlsVerification::CustomCa(ca.clone())
        } else if self.insecure {
            TlsVerification::DangerAcceptInvalid
        } else {
            TlsVerification::SystemDefaults
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(default_cache_path)
    }

    /// Password chain: config or `BLOCKSWITCH_PASSWORD`, then the keyring.
    fn resolve_password(&self, username: &str) -> Result<SecretString, ConfigError> {
        if let Some(ref pw) = self.password {
            return Ok(SecretString::from(pw.clone()));
        }
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, username) {
            if let Ok(pw) = entry.get_password() {
                return Ok(SecretString::from(pw));
            }
        }
        Err(ConfigError::MissingField { field: "password" })
    }

    /// TOML rendering with the password masked.
    pub fn to_toml_redacted(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.password.is_some() {
            shown.password = Some("********".into());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

/// Store the controller password in the system keyring.
pub fn store_password(username: &str, password: &SecretString) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, username)?;
    entry.set_password(password.expose_secret())?;
    Ok(())
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingField { field })
}
