//! Processor configuration types.

use std::time::Duration;

/// Time-to-live applied to pending requests unless overridden.
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(900);

/// Tunables for a [`crate::processor::SnacProcessor`].
#[derive(Clone, Copy, Debug)]
pub struct ProcessorConfig {
    /// Maximum age of a sent request before it is treated as abandoned.
    pub request_ttl: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            request_ttl: DEFAULT_REQUEST_TTL,
        }
    }
}
