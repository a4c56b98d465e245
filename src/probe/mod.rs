//! Measurement collectors.
//!
//! Ping, DNS, and speed-test measurements plus the collector that fans them
//! out once per cycle.

mod collector;
mod dns;
mod ping;
mod speedtest;

pub use collector::*;
pub use dns::*;
pub use ping::*;
pub use speedtest::*;

use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("unparseable output: {0}")]
    Parse(String),
}
