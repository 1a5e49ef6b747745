//! Result log for PortalWatch.
//!
//! Provides the probe record model and its append-only JSON Lines store.

mod models;
#[allow(clippy::module_inception)]
mod store;

pub use models::*;
pub use store::*;
