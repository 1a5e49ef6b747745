//! Probe module for portal monitoring.
//!
//! One check cycle runs an HTTP reachability probe against the site and a
//! browser interaction probe against the portal, under a retry policy.

mod browser;
mod http;
mod orchestrator;
mod retry;

pub use browser::*;
pub use http::*;
pub use orchestrator::*;
pub use retry::*;

use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// Execution errors that abort a probe attempt and are worth retrying.
///
/// Anything the probes can classify (bad status, missing UI element) is a
/// result value, not one of these.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("browser driver error: {0}")]
    Driver(String),
}

/// Render an error and its `source()` chain, one cause per line.
pub fn error_trace(err: &(dyn StdError + 'static)) -> String {
    let mut trace = format!("{:?}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        trace.push_str(&format!("\ncaused by: {}", cause));
        source = cause.source();
    }
    trace
}
