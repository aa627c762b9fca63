//! Per-class FIFO queue with the running-average smoothing model.
//!
//! The running average estimates the achieved inter-send interval over the
//! class's window. It is initialised to the class maximum ("fully rested"),
//! clamped there forever after, and only changes on dequeue — an enqueue has
//! no effect on timing. The wait computation inverts the smoothing step: it
//! asks how long to hold the next send so the average stays at or above the
//! threshold.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::time::Instant;

use super::{RATE_SAFETY_MARGIN, RateClassInfo};
use crate::outbound::OutboundItem;

/// Result of one check-drain-requeue step on a queue.
pub(crate) struct DrainOutcome {
    /// Items released for transmission, in FIFO order.
    pub(crate) batch: Vec<OutboundItem>,
    /// Wait until the queue is next ready, if items remain.
    pub(crate) next_wait: Option<Duration>,
}

struct QueueState {
    class: RateClassInfo,
    pending: VecDeque<OutboundItem>,
    last_send: Option<Instant>,
    running_avg: Duration,
}

/// One rate class's queue for one connection.
pub(crate) struct RateQueue {
    inner: Mutex<QueueState>,
}

impl RateQueue {
    pub(crate) fn new(class: RateClassInfo) -> Self {
        let running_avg = class.max_interval;
        Self {
            inner: Mutex::new(QueueState {
                class,
                pending: VecDeque::new(),
                last_send: None,
                running_avg,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the class currently governing this queue.
    pub(crate) fn class(&self) -> RateClassInfo { self.lock().class.clone() }

    pub(crate) fn push(&self, item: OutboundItem) { self.lock().pending.push_back(item); }

    /// Install updated limits, re-clamping the average to the new maximum.
    pub(crate) fn update_class(&self, class: RateClassInfo) {
        let mut state = self.lock();
        state.running_avg = state.running_avg.min(class.max_interval);
        state.class = class;
    }

    /// Discard queued items without sending, returning how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.pending.len();
        state.pending.clear();
        discarded
    }

    pub(crate) fn is_empty(&self) -> bool { self.lock().pending.is_empty() }

    /// Release every item the smoothing model allows at `now`.
    ///
    /// Readiness check, dequeue, and next-wait computation all happen under
    /// one lock so a concurrent enqueue or class update cannot interleave
    /// with the drain. Transmission happens at the caller, outside the lock.
    pub(crate) fn drain_ready(&self, now: Instant) -> DrainOutcome {
        let mut state = self.lock();
        let threshold = state.class.limited_interval + RATE_SAFETY_MARGIN;
        let mut batch = Vec::new();
        while !state.pending.is_empty() && wait_time(&state, threshold, now).is_zero() {
            let window = state.class.window_size.max(1);
            if let Some(last) = state.last_send {
                let diff = now.duration_since(last);
                let updated = (state.running_avg * (window - 1) + diff) / window;
                state.running_avg = updated.min(state.class.max_interval);
            }
            state.last_send = Some(now);
            if let Some(item) = state.pending.pop_front() {
                batch.push(item);
            }
        }
        let next_wait = if state.pending.is_empty() {
            None
        } else {
            Some(wait_time(&state, threshold, now))
        };
        DrainOutcome { batch, next_wait }
    }

    /// Wait before the next send may happen, given `threshold` as the target
    /// average. Exposed for unit tests; the scheduler goes through
    /// [`drain_ready`](Self::drain_ready).
    #[cfg(test)]
    pub(crate) fn wait_for_threshold(&self, threshold: Duration, now: Instant) -> Duration {
        wait_time(&self.lock(), threshold, now)
    }
}

/// `windowSize * threshold - runningAvg * (windowSize - 1) - elapsed`,
/// floored at zero. The first send never waits.
fn wait_time(state: &QueueState, threshold: Duration, now: Instant) -> Duration {
    let Some(last) = state.last_send else {
        return Duration::ZERO;
    };
    let window = i64::from(state.class.window_size.max(1));
    let wait = window * millis(threshold)
        - (window - 1) * millis(state.running_avg)
        - millis(now.duration_since(last));
    u64::try_from(wait).map_or(Duration::ZERO, Duration::from_millis)
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
