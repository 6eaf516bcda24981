//! In-process host: stands in for the home-automation bridge.

pub mod console;
pub mod monitor;
pub mod registry;

pub use registry::FileRegistry;
