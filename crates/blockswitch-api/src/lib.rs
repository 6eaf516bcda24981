// blockswitch-api: Async client for the UniFi controller's legacy client endpoints

pub mod auth;
pub mod error;
pub mod legacy;
pub mod transport;

pub use auth::ControllerPlatform;
pub use error::Error;
pub use legacy::LegacyClient;
pub use legacy::models::{KnownClientEntry, LegacyResponse, Meta};
pub use transport::{TlsMode, TransportConfig};
