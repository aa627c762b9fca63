//! Boundary contracts between the engine and the transport layer.
//!
//! The transport owns the connection below the processor. It hands decoded
//! frames up via [`crate::processor::SnacProcessor::dispatch_incoming`] and
//! receives cleared-for-send frames through [`SnacTransport::send_frame`].
//! Local dispatch failures are forwarded to [`SnacTransport::report_error`]
//! rather than escaping to the caller.

use std::io;

use crate::{command::SnacFrame, listener::ListenerError};

/// Opaque identity of one transport connection.
///
/// The transport allocates these; the engine only compares and logs them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a transport-assigned connection number.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// The raw connection number.
    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Dispatch stage in which a local failure was caught.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchStage {
    /// A frame preprocessor failed.
    Preprocess,
    /// A command factory failed while decoding a payload.
    Decode,
    /// A pending request's response listener failed.
    Response,
    /// A vetoable listener failed.
    Veto,
    /// A normal command listener failed.
    Deliver,
}

impl DispatchStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Preprocess => "preprocessor",
            Self::Decode => "decoder",
            Self::Response => "response listener",
            Self::Veto => "vetoable listener",
            Self::Deliver => "command listener",
        }
    }
}

impl std::fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caught local failure, tagged with the stage and offender that raised it.
#[derive(Debug)]
pub struct DispatchError {
    /// Stage that produced the failure.
    pub stage: DispatchStage,
    /// Identifies the offending preprocessor, listener, or request.
    pub context: String,
    /// The underlying failure.
    pub source: ListenerError,
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed ({}): {}", self.stage, self.context, self.source)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Interface the engine requires from its transport.
pub trait SnacTransport: Send + Sync {
    /// Write one frame to the wire.
    ///
    /// Assumed synchronous and order-preserving per caller; may block briefly.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the underlying connection rejects the
    /// write.
    fn send_frame(&self, frame: &SnacFrame) -> io::Result<()>;

    /// Receive a caught local failure from the dispatch pipeline.
    fn report_error(&self, error: &DispatchError);
}
