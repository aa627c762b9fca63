//! The background loop releasing queued requests as classes become ready.
//!
//! One scheduler serves every connection and every rate queue of its owning
//! manager. It sleeps until an explicit wake signal or the minimum wait
//! across all queues elapses, drains whatever is ready, and recomputes the
//! next deadline. With no pending work it sleeps until signalled. The loop
//! has no terminal state short of manager shutdown.

use std::{
    sync::{Arc, PoisonError},
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    sync::Notify,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::manager::ConnectionQueues;
use crate::transport::ConnectionId;

/// Placeholder deadline used when no queue holds work; the corresponding
/// select branch is disabled so it is never actually polled.
const IDLE_DEADLINE: Duration = Duration::from_secs(3600);

pub(crate) struct Scheduler {
    connections: Arc<DashMap<ConnectionId, Arc<ConnectionQueues>>>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub(crate) fn new(
        connections: Arc<DashMap<ConnectionId, Arc<ConnectionQueues>>>,
        wake: Arc<Notify>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connections,
            wake,
            shutdown,
        }
    }

    pub(crate) async fn run(self) {
        let mut deadline: Option<Instant> = None;
        loop {
            let sleep_target = deadline.unwrap_or_else(|| Instant::now() + IDLE_DEADLINE);
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.wake.notified() => {}
                () = sleep_until(sleep_target), if deadline.is_some() => {}
            }
            deadline = self.flush();
        }
        debug!("rate scheduler stopped");
    }

    /// Drain every ready queue and compute the next wake-up.
    ///
    /// Each queue's readiness check and drain happen under that queue's own
    /// lock; transmission happens outside it so one slow write cannot stall
    /// enqueues, and FIFO order within the batch is preserved.
    fn flush(&self) -> Option<Instant> {
        let mut min_wait: Option<Duration> = None;
        let connections: Vec<Arc<ConnectionQueues>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for connection in connections {
            if connection.is_paused() {
                continue;
            }
            let queues = connection
                .classes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .queues();
            for queue in queues {
                if queue.is_empty() {
                    continue;
                }
                let outcome = queue.drain_ready(Instant::now());
                if !outcome.batch.is_empty() {
                    trace!(released = outcome.batch.len(), "rate queue drained");
                }
                for item in outcome.batch {
                    item.transmit();
                }
                if let Some(wait) = outcome.next_wait {
                    min_wait = Some(min_wait.map_or(wait, |current| current.min(wait)));
                }
            }
        }
        min_wait.map(|wait| Instant::now() + wait)
    }
}
