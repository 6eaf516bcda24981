//! CLI error types with miette diagnostics.
//!
//! Maps core, config, and registry errors into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use blockswitch_config::ConfigError;
use blockswitch_core::{CoreError, RegistryError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller at {url}")]
    #[diagnostic(
        code(blockswitch::connection_failed),
        help(
            "Check that the controller is running and reachable.\n\
             Self-signed controllers need `insecure = true` or `caCert`."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Controller request timed out")]
    #[diagnostic(
        code(blockswitch::timeout),
        help("Increase `timeout` in the configuration or check controller responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(blockswitch::auth_failed),
        help(
            "Verify username and password.\n\
             Store the password with: blockswitch set-password"
        )
    )]
    AuthFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(blockswitch::not_found),
        help("Run: blockswitch clients --all to see known clients")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error: {message}")]
    #[diagnostic(code(blockswitch::api_error))]
    ApiError { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("{field} is required")]
    #[diagnostic(
        code(blockswitch::missing_field),
        help("Set `{field}` in {path} or through the BLOCKSWITCH_* environment.")
    )]
    MissingField { field: String, path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(blockswitch::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(blockswitch::config))]
    Config(ConfigError),

    #[error("Accessory cache error: {0}")]
    #[diagnostic(
        code(blockswitch::cache),
        help("Check permissions on the cache path, or remove a corrupt cache file.")
    )]
    Cache(#[from] RegistryError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(blockswitch::json))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(blockswitch::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout => exit_code::TIMEOUT,
            Self::MissingField { .. } | Self::Validation { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingField { field } => CliError::MissingField {
                field: field.into(),
                path: blockswitch_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation {
                field: field.into(),
                reason,
            },
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::NotReady { action } => CliError::AuthFailed {
                message: format!("session not established ({action})"),
            },

            CoreError::Timeout => CliError::Timeout,

            CoreError::AccessoryNotFound { identifier } => CliError::NotFound {
                resource_type: "accessory".into(),
                identifier,
            },

            CoreError::ClientNotFound { identifier } => CliError::NotFound {
                resource_type: "client".into(),
                identifier,
            },

            CoreError::NoSwitchService { identifier } => CliError::ApiError {
                message: format!("accessory {identifier} has no switch"),
            },

            CoreError::Api { message, status } => CliError::ApiError {
                message: status.map_or_else(|| message.clone(), |s| format!("HTTP {s}: {message}")),
            },

            CoreError::Registry(e) => CliError::Cache(e),

            CoreError::Config { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },

            CoreError::AlreadyLaunched | CoreError::ShuttingDown => {
                CliError::Internal(err.to_string())
            }

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
