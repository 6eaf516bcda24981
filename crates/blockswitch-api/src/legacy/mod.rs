// Legacy API client modules
//
// Hand-written client for the UniFi controller's legacy (non-OpenAPI) endpoints.
// Only the pieces needed to manage per-client blocking are modeled: session
// login, the known-client (`rest/user`) resource, and `cmd/stamgr` commands.

pub mod auth;
pub mod client;
pub mod clients;
pub mod models;

pub use client::LegacyClient;
