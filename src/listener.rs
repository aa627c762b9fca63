//! Listener traits for the inbound dispatch pipeline and the snapshot lists
//! that hold them.
//!
//! Dispatch runs three stages in order: preprocessors may mutate the working
//! copy of a frame, vetoable listeners may halt delivery, and normal
//! listeners receive whatever survives. Each request may also carry its own
//! [`RequestListener`] for responses and timeouts. Registration lists are
//! copy-on-write so adding or removing a listener never disturbs a dispatch
//! loop already iterating a snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use crate::command::{SnacCommand, SnacFrame};

/// Failure raised by any listener stage; reported, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A frame paired with its decoded command, if any factory matched.
#[derive(Clone, Debug)]
pub struct CommandEvent {
    /// The frame as it left the preprocessor stage.
    pub frame: SnacFrame,
    /// Decoded command, or `None` when no factory matched.
    pub command: Option<Arc<dyn SnacCommand>>,
}

/// Response event delivered to exactly one pending request's listener.
#[derive(Clone, Debug)]
pub struct RequestResponseEvent {
    /// Correlation id of the matched request.
    pub request_id: u32,
    /// The decoded response.
    pub event: CommandEvent,
}

/// Why a pending request was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutReason {
    /// The request aged past the configured time-to-live.
    Expired,
    /// The processor detached from its transport.
    Detached,
}

/// Notification that a pending request will never receive a response.
#[derive(Clone, Copy, Debug)]
pub struct RequestTimeoutEvent {
    /// Correlation id of the abandoned request.
    pub request_id: u32,
    /// Cause of the abandonment.
    pub reason: TimeoutReason,
}

/// Pipeline stage allowed to inspect and mutate an incoming frame before it
/// becomes a typed command.
pub trait FramePreprocessor: Send + Sync {
    /// Inspect or rewrite `frame` in place.
    ///
    /// # Errors
    ///
    /// A failure is reported through the transport's error hook and the
    /// preprocessor is skipped; later stages still run.
    fn preprocess(&self, frame: &mut SnacFrame) -> Result<(), ListenerError>;
}

/// Outcome of a vetoable listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Veto {
    /// Let the frame continue to later listeners.
    Continue,
    /// Halt delivery; no further vetoable or normal listener sees the frame.
    Stop,
}

/// Listener that can halt further delivery of a frame.
pub trait VetoableCommandListener: Send + Sync {
    /// Examine `event` and decide whether delivery continues.
    ///
    /// # Errors
    ///
    /// A failure is reported and treated as [`Veto::Continue`].
    fn handle_command(&self, event: &CommandEvent) -> Result<Veto, ListenerError>;
}

/// Listener receiving every frame not claimed by a pending request or vetoed.
pub trait CommandListener: Send + Sync {
    /// Handle `event`. Each listener is invoked independently of the others.
    ///
    /// # Errors
    ///
    /// A failure is reported; delivery to the remaining listeners continues.
    fn handle_command(&self, event: &CommandEvent) -> Result<(), ListenerError>;
}

/// Per-request listener receiving the response or a timeout, never both.
pub trait RequestListener: Send + Sync {
    /// Called with the response matching this request's correlation id.
    ///
    /// # Errors
    ///
    /// A failure is reported through the transport's error hook; the request
    /// is already removed from the pending table at that point.
    fn on_response(&self, event: &RequestResponseEvent) -> Result<(), ListenerError>;

    /// Called when the request expires or the processor detaches.
    fn on_timeout(&self, event: &RequestTimeoutEvent) { let _ = event; }
}

/// Copy-on-write listener list iterated by snapshot.
pub(crate) struct ListenerSet<T: ?Sized> {
    inner: RwLock<Arc<Vec<Arc<T>>>>,
}

impl<T: ?Sized> ListenerSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub(crate) fn add(&self, listener: Arc<T>) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&slot);
        next.push(listener);
        *slot = Arc::new(next);
    }

    /// Remove `listener` by pointer identity.
    pub(crate) fn remove(&self, listener: &Arc<T>) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&slot);
        next.retain(|existing| !Arc::ptr_eq(existing, listener));
        *slot = Arc::new(next);
    }

    /// Cheap snapshot safe to iterate while registrations change.
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }
}
