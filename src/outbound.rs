//! The flow-control seam between the processor and the transport.
//!
//! [`OutboundQueue`] is the pluggable contract deciding *when*, never
//! *whether*, an accepted request reaches the wire. The processor wraps each
//! cleared request in an [`OutboundItem`] and either hands it to the
//! installed queue manager or transmits it on the spot.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::warn;

use crate::{
    command::{CommandType, SnacFrame},
    pending::PendingStore,
    transport::{ConnectionId, SnacTransport},
};

/// A request cleared by the processor and awaiting transmission.
///
/// Transmitting stamps the pending entry's sent time, which is when the
/// request's TTL clock starts.
pub struct OutboundItem {
    frame: SnacFrame,
    transport: Arc<dyn SnacTransport>,
    pending: Arc<PendingStore>,
}

impl OutboundItem {
    pub(crate) fn new(
        frame: SnacFrame,
        transport: Arc<dyn SnacTransport>,
        pending: Arc<PendingStore>,
    ) -> Self {
        Self {
            frame,
            transport,
            pending,
        }
    }

    /// Wire category of the queued request, used for rate classification.
    #[must_use]
    pub fn command_type(&self) -> CommandType { self.frame.command_type }

    /// Correlation id assigned to the queued request.
    #[must_use]
    pub fn request_id(&self) -> u32 { self.frame.request_id }

    /// Write the frame to the transport, consuming the item.
    pub fn transmit(self) {
        self.pending.mark_sent(self.frame.request_id, Instant::now());
        if let Err(error) = self.transport.send_frame(&self.frame) {
            warn!(
                request_id = self.frame.request_id,
                command_type = %self.frame.command_type,
                %error,
                "transport write failed"
            );
        }
        crate::metrics::inc_commands_sent();
    }
}

impl std::fmt::Debug for OutboundItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundItem")
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

/// Contract between the processor and a flow-control implementation.
///
/// All four operations must be safe to call concurrently with each other and
/// with the implementation's own release machinery.
pub trait OutboundQueue: Send + Sync {
    /// Accept `item` for eventual transmission on `connection`.
    ///
    /// Implementations must accept items even while the connection is paused.
    fn enqueue(&self, connection: ConnectionId, item: OutboundItem);

    /// Suspend release for the connection's queues. Accepted items accumulate.
    fn pause(&self, connection: ConnectionId);

    /// Resume release for the connection's queues.
    fn unpause(&self, connection: ConnectionId);

    /// Discard every queued-but-unsent item for the connection without
    /// sending it. Implies an unpause.
    fn clear_queue(&self, connection: ConnectionId);
}

/// Trivial [`OutboundQueue`] that transmits on enqueue.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateOutbound;

impl OutboundQueue for ImmediateOutbound {
    fn enqueue(&self, _connection: ConnectionId, item: OutboundItem) { item.transmit(); }

    fn pause(&self, _connection: ConnectionId) {}

    fn unpause(&self, _connection: ConnectionId) {}

    fn clear_queue(&self, _connection: ConnectionId) {}
}
