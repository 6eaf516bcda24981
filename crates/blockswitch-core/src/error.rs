// ── Core error types ──
//
// Errors surfaced by the engine. Hosts never see HTTP status codes or JSON
// parse failures directly; the `From<blockswitch_api::Error>` impl
// translates transport-layer errors into domain variants.

use thiserror::Error;

use crate::registry::RegistryError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Readiness ────────────────────────────────────────────────────
    /// The controller session is not authenticated yet (or never will be).
    /// This is the failure sentinel every gated operation returns.
    #[error("Controller session not ready: {action} rejected")]
    NotReady { action: &'static str },

    #[error("Platform already launched")]
    AlreadyLaunched,

    #[error("Platform is shutting down")]
    ShuttingDown,

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Controller request timed out")]
    Timeout,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Accessory not found: {identifier}")]
    AccessoryNotFound { identifier: String },

    #[error("Client not found: {identifier}")]
    ClientNotFound { identifier: String },

    #[error("Accessory {identifier} has no switch service")]
    NoSwitchService { identifier: String },

    // ── Collaborator errors ──────────────────────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Entity registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for the pre-readiness rejection sentinel.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<blockswitch_api::Error> for CoreError {
    fn from(err: blockswitch_api::Error) -> Self {
        match err {
            blockswitch_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            blockswitch_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            blockswitch_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            blockswitch_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            blockswitch_api::Error::LegacyApi { message } => CoreError::Api {
                message,
                status: None,
            },
            blockswitch_api::Error::NotFound { id, .. } => {
                CoreError::ClientNotFound { identifier: id }
            }
            blockswitch_api::Error::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("Deserialization error: {message}"),
                status: None,
            },
        }
    }
}
