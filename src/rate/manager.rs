//! Rate-limited queue manager shared across connections.
//!
//! Owns one [`RateClassSet`](super::classes::RateClassSet) per connection,
//! created lazily on first use and removed on
//! [`detach`](RateManager::detach). A single background scheduler task,
//! started at construction and stopped when the manager drops, releases
//! queued requests as their classes become ready.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{RateClassInfo, classes::RateClassSet, scheduler::Scheduler};
use crate::{
    metrics,
    outbound::{OutboundItem, OutboundQueue},
    transport::ConnectionId,
};

/// Errors returned when installing a rate class.
#[derive(Debug)]
pub enum RateConfigError {
    /// The class's smoothing window was zero.
    InvalidWindow(u32),
}

impl std::fmt::Display for RateConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidWindow(window) => {
                write!(f, "invalid smoothing window {window}; must be at least 1")
            }
        }
    }
}

impl std::error::Error for RateConfigError {}

/// Per-connection state held by the manager.
pub(crate) struct ConnectionQueues {
    pub(crate) classes: Mutex<RateClassSet>,
    pub(crate) paused: AtomicBool,
}

impl ConnectionQueues {
    fn new() -> Self {
        Self {
            classes: Mutex::new(RateClassSet::new()),
            paused: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_paused(&self) -> bool { self.paused.load(Ordering::SeqCst) }
}

/// [`OutboundQueue`] implementation enforcing server-assigned rate classes.
pub struct RateManager {
    connections: Arc<DashMap<ConnectionId, Arc<ConnectionQueues>>>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
}

impl RateManager {
    /// Create a manager and spawn its scheduler task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let connections: Arc<DashMap<ConnectionId, Arc<ConnectionQueues>>> =
            Arc::new(DashMap::new());
        let wake = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        tokio::spawn(
            Scheduler::new(
                Arc::clone(&connections),
                Arc::clone(&wake),
                shutdown.clone(),
            )
            .run(),
        );
        Arc::new(Self {
            connections,
            wake,
            shutdown,
        })
    }

    /// Install or update a rate class for `connection`.
    ///
    /// An empty command-type list marks the class as the connection's
    /// default (catch-all) queue.
    ///
    /// # Errors
    ///
    /// Returns [`RateConfigError::InvalidWindow`] if the class's smoothing
    /// window is zero.
    pub fn set_rate_class(
        &self,
        connection: ConnectionId,
        class: RateClassInfo,
    ) -> Result<(), RateConfigError> {
        if class.window_size == 0 {
            return Err(RateConfigError::InvalidWindow(class.window_size));
        }
        debug!(%connection, class_id = class.class_id, "installing rate class");
        let queues = self.queues_for(connection);
        queues
            .classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .install(class);
        self.wake.notify_one();
        Ok(())
    }

    /// Drop all per-connection state. Queued items are discarded unsent.
    pub fn detach(&self, connection: ConnectionId) {
        if self.connections.remove(&connection).is_some() {
            debug!(%connection, "detached connection from rate manager");
        }
        self.wake.notify_one();
    }

    fn queues_for(&self, connection: ConnectionId) -> Arc<ConnectionQueues> {
        Arc::clone(
            &self
                .connections
                .entry(connection)
                .or_insert_with(|| Arc::new(ConnectionQueues::new())),
        )
    }
}

impl OutboundQueue for RateManager {
    fn enqueue(&self, connection: ConnectionId, item: OutboundItem) {
        let Some(queues) = self
            .connections
            .get(&connection)
            .map(|entry| Arc::clone(entry.value()))
        else {
            // No rate information for this connection yet; nothing to smooth.
            item.transmit();
            return;
        };
        let queue = queues
            .classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .route(item.command_type());
        match queue {
            Some(queue) => {
                debug!(
                    %connection,
                    command_type = %item.command_type(),
                    request_id = item.request_id(),
                    "queued for rate-limited send"
                );
                metrics::inc_commands_queued();
                queue.push(item);
                self.wake.notify_one();
            }
            // Unclassified commands bypass rate limiting entirely.
            None => item.transmit(),
        }
    }

    fn pause(&self, connection: ConnectionId) {
        let queues = self.queues_for(connection);
        if queues.paused.swap(true, Ordering::SeqCst) {
            warn!(%connection, "pause called while already paused");
        }
    }

    fn unpause(&self, connection: ConnectionId) {
        let queues = self.queues_for(connection);
        if !queues.paused.swap(false, Ordering::SeqCst) {
            warn!(%connection, "unpause called while not paused");
        }
        self.wake.notify_one();
    }

    fn clear_queue(&self, connection: ConnectionId) {
        if let Some(queues) = self
            .connections
            .get(&connection)
            .map(|entry| Arc::clone(entry.value()))
        {
            let discarded = queues
                .classes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear_all();
            queues.paused.store(false, Ordering::SeqCst);
            if discarded > 0 {
                debug!(%connection, discarded, "cleared rate queues");
            }
            self.wake.notify_one();
        }
    }
}

impl Drop for RateManager {
    fn drop(&mut self) { self.shutdown.cancel(); }
}
