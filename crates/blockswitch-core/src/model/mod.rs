// ── Domain model ──
//
// Canonical types shared by the engine, its collaborators, and hosts.

pub mod accessory;
pub mod client;
pub mod identity;

pub use accessory::{Accessory, AccessoryContext, AccessoryRecord, SwitchService, SwitchState};
pub use client::KnownClient;
pub use identity::{MacAddress, accessory_uuid};
