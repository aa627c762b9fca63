//! Table of in-flight requests keyed by correlation id.
//!
//! Ids are handed out sequentially, never zero, wrapping from `u32::MAX`
//! back to 1. Expiry order follows actual transmission time, not submission
//! time: a request delayed by rate limiting starts its TTL clock when it
//! reaches the wire, and an unsent request never expires. That keeps the
//! sweep's early stop sound even when the outbound scheduler reorders sends
//! relative to submission.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::time::Instant;

use crate::listener::RequestListener;

struct PendingEntry {
    listener: Option<Arc<dyn RequestListener>>,
    sent_at: Option<Instant>,
}

#[derive(Default)]
struct PendingInner {
    last_id: u32,
    entries: HashMap<u32, PendingEntry>,
    /// Ids in the order they were actually transmitted.
    sent_order: VecDeque<u32>,
}

/// Insertion point for every request the processor accepts.
#[derive(Default)]
pub(crate) struct PendingStore {
    inner: Mutex<PendingInner>,
}

impl PendingStore {
    pub(crate) fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, PendingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next correlation id and insert an entry for it.
    pub(crate) fn insert(&self, listener: Option<Arc<dyn RequestListener>>) -> u32 {
        let mut inner = self.lock();
        inner.last_id = match inner.last_id {
            u32::MAX => 1,
            last => last + 1,
        };
        let id = inner.last_id;
        inner.entries.insert(
            id,
            PendingEntry {
                listener,
                sent_at: None,
            },
        );
        id
    }

    /// Record that the request actually reached the wire at `when`.
    pub(crate) fn mark_sent(&self, request_id: u32, when: Instant) {
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.get_mut(&request_id) {
            entry.sent_at = Some(when);
            inner.sent_order.push_back(request_id);
        }
    }

    /// Remove the entry matched by an incoming response.
    ///
    /// Returns `None` when no request with that id is pending, making
    /// response delivery at-most-once per correlation id. The stale id left
    /// in the sent-order queue is skipped lazily by the next sweep.
    pub(crate) fn complete(&self, request_id: u32) -> Option<Option<Arc<dyn RequestListener>>> {
        let mut inner = self.lock();
        inner
            .entries
            .remove(&request_id)
            .map(|entry| entry.listener)
    }

    /// Sweep out entries whose send time is more than `ttl` ago.
    ///
    /// Stops at the first entry still within its TTL; the sent-order queue is
    /// non-decreasing in send time, so nothing younger can be expired.
    pub(crate) fn expire(
        &self,
        ttl: Duration,
        now: Instant,
    ) -> Vec<(u32, Option<Arc<dyn RequestListener>>)> {
        let mut expired = Vec::new();
        let mut inner = self.lock();
        while let Some(&id) = inner.sent_order.front() {
            let aged_out = match inner.entries.get(&id) {
                // Already completed; discard the stale order slot.
                None => {
                    inner.sent_order.pop_front();
                    continue;
                }
                Some(entry) => entry
                    .sent_at
                    .is_some_and(|sent| now.duration_since(sent) > ttl),
            };
            if !aged_out {
                break;
            }
            inner.sent_order.pop_front();
            if let Some(entry) = inner.entries.remove(&id) {
                expired.push((id, entry.listener));
            }
        }
        expired
    }

    /// Remove every entry, returning them for immediate timeout delivery.
    pub(crate) fn drain(&self) -> Vec<(u32, Option<Arc<dyn RequestListener>>)> {
        let mut inner = self.lock();
        inner.sent_order.clear();
        let mut drained: Vec<_> = inner
            .entries
            .drain()
            .map(|(id, entry)| (id, entry.listener))
            .collect();
        drained.sort_unstable_by_key(|(id, _)| *id);
        drained
    }

    pub(crate) fn len(&self) -> usize { self.lock().entries.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_skip_zero() {
        let store = PendingStore::new();
        assert_eq!(store.insert(None), 1);
        assert_eq!(store.insert(None), 2);
        assert_eq!(store.insert(None), 3);
    }

    #[test]
    fn ids_wrap_from_max_to_one() {
        let store = PendingStore::new();
        store.lock().last_id = u32::MAX - 1;
        assert_eq!(store.insert(None), u32::MAX);
        assert_eq!(store.insert(None), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unsent_entries_never_expire() {
        let store = PendingStore::new();
        let id = store.insert(None);
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(
            store
                .expire(Duration::from_secs(900), Instant::now())
                .is_empty()
        );
        assert!(store.complete(id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_stops_at_first_fresh_entry() {
        let store = PendingStore::new();
        let old = store.insert(None);
        store.mark_sent(old, Instant::now());
        tokio::time::advance(Duration::from_secs(10)).await;
        let fresh = store.insert(None);
        store.mark_sent(fresh, Instant::now());
        tokio::time::advance(Duration::from_secs(6)).await;

        let expired = store.expire(Duration::from_secs(15), Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, old);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_entries_are_skipped_by_the_sweep() {
        let store = PendingStore::new();
        let first = store.insert(None);
        let second = store.insert(None);
        store.mark_sent(first, Instant::now());
        store.mark_sent(second, Instant::now());
        assert!(store.complete(first).is_some());

        tokio::time::advance(Duration::from_secs(20)).await;
        let expired = store.expire(Duration::from_secs(10), Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, second);
    }
}
