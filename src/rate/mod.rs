//! Rate-limit-aware outbound scheduling.
//!
//! The server assigns each connection a set of rate classes, each governing a
//! list of command types with a smoothed minimum inter-send interval. The
//! [`RateManager`] classifies accepted requests into per-class FIFO queues
//! and a single background scheduler releases them when the class's
//! running-average model says a send will not trip the limit.

mod classes;
mod manager;
mod queue;
mod scheduler;

use std::time::Duration;

pub use manager::{RateConfigError, RateManager};

use crate::command::CommandType;

/// Margin added to a class's cautionary average before releasing a send.
///
/// Deliberately more conservative than the server's hard minimum so clock or
/// network jitter cannot trip the server's own enforcement.
pub(crate) const RATE_SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// Server-assigned limits for one rate class.
#[derive(Clone, Debug)]
pub struct RateClassInfo {
    /// Numeric class id assigned by the server.
    pub class_id: u16,
    /// Number of sends over which the average is smoothed. Must be at
    /// least 1.
    pub window_size: u32,
    /// Hard minimum average inter-send interval enforced by the server.
    pub min_interval: Duration,
    /// Ceiling for the running average; a freshly created queue starts here,
    /// fully rested.
    pub max_interval: Duration,
    /// Cautionary average below which the server warns before enforcing.
    pub limited_interval: Duration,
    /// Command types governed by this class. Empty means this class is the
    /// connection's default for anything not otherwise classified.
    pub command_types: Vec<CommandType>,
}

impl RateClassInfo {
    /// Whether this class is the connection's catch-all.
    #[must_use]
    pub fn is_default(&self) -> bool { self.command_types.is_empty() }
}
