//! Request/response processor bridging the transport to application logic.
//!
//! [`SnacProcessor`] accepts outgoing requests, assigns correlation ids, and
//! routes incoming frames either to the matching pending request or through
//! the preprocess → veto → deliver listener pipeline. No listener failure
//! ever escapes [`SnacProcessor::dispatch_incoming`]; each is tagged with its
//! stage and forwarded to the transport's error hook.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use bytes::BytesMut;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    command::{CommandKey, SnacCommand, SnacFrame},
    config::ProcessorConfig,
    factory::{CommandFactory, FactoryRegistry},
    listener::{
        CommandEvent,
        CommandListener,
        FramePreprocessor,
        ListenerError,
        ListenerSet,
        RequestListener,
        RequestResponseEvent,
        RequestTimeoutEvent,
        TimeoutReason,
        Veto,
        VetoableCommandListener,
    },
    metrics,
    outbound::{OutboundItem, OutboundQueue},
    pending::PendingStore,
    transport::{ConnectionId, DispatchError, DispatchStage, SnacTransport},
};

/// An outgoing command paired with an optional per-request listener.
///
/// Consumed by [`SnacProcessor::send_request`]; a request object cannot be
/// submitted twice.
pub struct SnacRequest {
    command: Arc<dyn SnacCommand>,
    listener: Option<Arc<dyn RequestListener>>,
}

impl SnacRequest {
    /// Build a request with no response listener.
    #[must_use]
    pub fn new(command: Arc<dyn SnacCommand>) -> Self {
        Self {
            command,
            listener: None,
        }
    }

    /// Build a request whose listener receives the response or a timeout.
    #[must_use]
    pub fn with_listener(
        command: Arc<dyn SnacCommand>,
        listener: Arc<dyn RequestListener>,
    ) -> Self {
        Self {
            command,
            listener: Some(listener),
        }
    }
}

impl std::fmt::Debug for SnacRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnacRequest")
            .field("command", &self.command)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

/// The engine's dispatch hub for one connection.
pub struct SnacProcessor {
    connection_id: ConnectionId,
    transport: Arc<dyn SnacTransport>,
    factories: FactoryRegistry,
    fallback: RwLock<Option<Arc<FactoryRegistry>>>,
    pending: Arc<PendingStore>,
    preprocessors: ListenerSet<dyn FramePreprocessor>,
    vetoables: ListenerSet<dyn VetoableCommandListener>,
    listeners: ListenerSet<dyn CommandListener>,
    outbound: RwLock<Option<Arc<dyn OutboundQueue>>>,
    request_ttl: RwLock<Duration>,
}

impl SnacProcessor {
    /// Create a processor with the default configuration.
    #[must_use]
    pub fn new(connection_id: ConnectionId, transport: Arc<dyn SnacTransport>) -> Self {
        Self::with_config(connection_id, transport, ProcessorConfig::default())
    }

    /// Create a processor with explicit tunables.
    #[must_use]
    pub fn with_config(
        connection_id: ConnectionId,
        transport: Arc<dyn SnacTransport>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            connection_id,
            transport,
            factories: FactoryRegistry::new(),
            fallback: RwLock::new(None),
            pending: Arc::new(PendingStore::new()),
            preprocessors: ListenerSet::new(),
            vetoables: ListenerSet::new(),
            listeners: ListenerSet::new(),
            outbound: RwLock::new(None),
            request_ttl: RwLock::new(config.request_ttl),
        }
    }

    /// The connection this processor serves.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.connection_id }

    /// Submit a request for sending, returning its correlation id.
    ///
    /// The id is assigned here; the sent timestamp is stamped at actual
    /// transmission, which the installed queue manager may delay. Exactly one
    /// pending entry exists for the returned id until it is matched, timed
    /// out, or cleared by [`detach`](Self::detach).
    pub fn send_request(&self, request: SnacRequest) -> u32 {
        let SnacRequest { command, listener } = request;
        let request_id = self.pending.insert(listener);
        self.expire_pending();

        let mut payload = BytesMut::new();
        command.encode_payload(&mut payload);
        let frame = SnacFrame::new(command.command_type(), request_id, payload.freeze());
        let item = OutboundItem::new(frame, Arc::clone(&self.transport), Arc::clone(&self.pending));

        let outbound = self
            .outbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match outbound {
            Some(queue) => queue.enqueue(self.connection_id, item),
            None => item.transmit(),
        }
        request_id
    }

    /// Process one incoming frame through the full dispatch pipeline.
    pub fn dispatch_incoming(&self, frame: SnacFrame) {
        metrics::inc_frames_dispatched();
        let mut frame = frame;
        for (index, preprocessor) in self.preprocessors.snapshot().iter().enumerate() {
            if let Err(source) = preprocessor.preprocess(&mut frame) {
                self.report(
                    DispatchStage::Preprocess,
                    format!("preprocessor #{index} on {}", frame.command_type),
                    source,
                );
            }
        }

        let command = self.decode(&frame);
        let request_id = frame.request_id;
        let event = CommandEvent { frame, command };

        if let Some(listener) = self.pending.complete(request_id) {
            metrics::inc_responses_matched();
            debug!(request_id, "response matched pending request");
            if let Some(listener) = listener {
                let response = RequestResponseEvent { request_id, event };
                if let Err(source) = listener.on_response(&response) {
                    self.report(
                        DispatchStage::Response,
                        format!("request {request_id}"),
                        source,
                    );
                }
            }
            return;
        }

        for (index, vetoable) in self.vetoables.snapshot().iter().enumerate() {
            match vetoable.handle_command(&event) {
                Ok(Veto::Continue) => {}
                Ok(Veto::Stop) => {
                    debug!(command_type = %event.frame.command_type, index, "delivery vetoed");
                    return;
                }
                Err(source) => self.report(
                    DispatchStage::Veto,
                    format!("vetoable listener #{index} on {}", event.frame.command_type),
                    source,
                ),
            }
        }

        for (index, listener) in self.listeners.snapshot().iter().enumerate() {
            if let Err(source) = listener.handle_command(&event) {
                self.report(
                    DispatchStage::Deliver,
                    format!("command listener #{index} on {}", event.frame.command_type),
                    source,
                );
            }
        }
    }

    /// Detach from the transport.
    ///
    /// Every pending request receives an immediate timeout notification so a
    /// later connection reusing the correlation-id space cannot misroute a
    /// stale response, and the installed queue manager is told to discard the
    /// connection's queued traffic.
    pub fn detach(&self) {
        let orphaned = self.pending.drain();
        if !orphaned.is_empty() {
            debug!(count = orphaned.len(), "detaching with pending requests");
        }
        for (request_id, listener) in orphaned {
            metrics::inc_requests_timed_out();
            if let Some(listener) = listener {
                listener.on_timeout(&RequestTimeoutEvent {
                    request_id,
                    reason: TimeoutReason::Detached,
                });
            }
        }
        let outbound = self
            .outbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(queue) = outbound {
            queue.clear_queue(self.connection_id);
        }
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.pending.len() }

    /// Register a command factory under `key`.
    pub fn register_factory(&self, key: CommandKey, factory: Arc<dyn CommandFactory>) {
        self.factories.register(key, factory);
    }

    /// Remove the command factory registered under `key`.
    pub fn unregister_factory(&self, key: CommandKey) { self.factories.unregister(key); }

    /// Install or clear the secondary registry consulted on a primary miss.
    pub fn set_fallback_factories(&self, fallback: Option<Arc<FactoryRegistry>>) {
        *self.fallback.write().unwrap_or_else(PoisonError::into_inner) = fallback;
    }

    /// Add a preprocessor to the head stage of the pipeline.
    pub fn add_preprocessor(&self, preprocessor: Arc<dyn FramePreprocessor>) {
        self.preprocessors.add(preprocessor);
    }

    /// Remove a previously added preprocessor (by pointer identity).
    pub fn remove_preprocessor(&self, preprocessor: &Arc<dyn FramePreprocessor>) {
        self.preprocessors.remove(preprocessor);
    }

    /// Add a vetoable listener.
    pub fn add_vetoable_listener(&self, listener: Arc<dyn VetoableCommandListener>) {
        self.vetoables.add(listener);
    }

    /// Remove a vetoable listener (by pointer identity).
    pub fn remove_vetoable_listener(&self, listener: &Arc<dyn VetoableCommandListener>) {
        self.vetoables.remove(listener);
    }

    /// Add a normal command listener.
    pub fn add_command_listener(&self, listener: Arc<dyn CommandListener>) {
        self.listeners.add(listener);
    }

    /// Remove a normal command listener (by pointer identity).
    pub fn remove_command_listener(&self, listener: &Arc<dyn CommandListener>) {
        self.listeners.remove(listener);
    }

    /// Install a flow-control implementation, or `None` to send immediately.
    pub fn set_outbound_queue(&self, queue: Option<Arc<dyn OutboundQueue>>) {
        *self.outbound.write().unwrap_or_else(PoisonError::into_inner) = queue;
    }

    /// Current pending-request time-to-live.
    #[must_use]
    pub fn request_ttl(&self) -> Duration {
        *self
            .request_ttl
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the pending-request time-to-live.
    pub fn set_request_ttl(&self, ttl: Duration) {
        *self
            .request_ttl
            .write()
            .unwrap_or_else(PoisonError::into_inner) = ttl;
    }

    /// Opportunistic sweep run on every submission, not on a timer.
    fn expire_pending(&self) {
        let ttl = self.request_ttl();
        for (request_id, listener) in self.pending.expire(ttl, Instant::now()) {
            metrics::inc_requests_timed_out();
            warn!(request_id, ?ttl, "pending request timed out");
            if let Some(listener) = listener {
                listener.on_timeout(&RequestTimeoutEvent {
                    request_id,
                    reason: TimeoutReason::Expired,
                });
            }
        }
    }

    fn decode(&self, frame: &SnacFrame) -> Option<Arc<dyn SnacCommand>> {
        let factory = self.factories.resolve(frame.command_type).or_else(|| {
            self.fallback
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .and_then(|registry| registry.resolve(frame.command_type))
        })?;
        match factory.decode(frame) {
            Ok(command) => Some(Arc::from(command)),
            Err(source) => {
                self.report(
                    DispatchStage::Decode,
                    format!("factory for {}", frame.command_type),
                    Box::new(source),
                );
                None
            }
        }
    }

    fn report(&self, stage: DispatchStage, context: String, source: ListenerError) {
        metrics::inc_dispatch_errors();
        let error = DispatchError {
            stage,
            context,
            source,
        };
        warn!(%error, "dispatch stage failed");
        self.transport.report_error(&error);
    }
}
