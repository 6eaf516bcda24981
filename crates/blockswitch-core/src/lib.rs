//! Reconciliation and state-polling engine for UniFi block switches.
//!
//! Each configured client MAC is exposed to a bridge host as an on/off
//! accessory whose "on" state means "blocked on the controller". This crate
//! owns the logic between the host and the controller:
//!
//! - **[`Platform`]**: the engine. Hosts feed it restored accessories via
//!   [`on_entity_restored`](Platform::on_entity_restored), then call
//!   [`on_ready`](Platform::on_ready), which authenticates, removes stale
//!   accessories, adds missing ones, and starts the periodic refresh.
//!   [`refresh`](Platform::refresh) and [`toggle`](Platform::toggle) adapt
//!   a single accessory to controller calls; everything is gated on
//!   [`Readiness::Ready`].
//!
//! - **[`ClientService`]**: the controller seam. [`LegacyClientService`]
//!   implements it over `blockswitch-api`.
//!
//! - **[`EntityRegistry`]**: the host seam for registering and
//!   unregistering accessories. [`MemoryRegistry`] is an in-process
//!   implementation.
//!
//! - **Domain model** ([`model`]): [`Accessory`], [`KnownClient`], and
//!   [`MacAddress`].

pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod registry;
pub mod request;
pub mod service;
mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControllerConfig, PlatformConfig, TlsVerification};
pub use error::CoreError;
pub use model::{
    Accessory, AccessoryContext, AccessoryRecord, KnownClient, MacAddress, SwitchService,
    SwitchState,
};
pub use platform::{Platform, ReconcileHandle, ReconcileReport, Readiness};
pub use registry::{EntityRegistry, MemoryRegistry, PLATFORM_NAME, PLUGIN_NAME, RegistryError};
pub use request::{CharacteristicRequest, CharacteristicResponse, RequestEnvelope};
pub use service::{ClientService, LegacyClientService};
