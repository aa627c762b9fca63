//! Per-connection collection of rate queues and the type-to-queue index.

use std::{collections::HashMap, sync::Arc};

use super::{RateClassInfo, queue::RateQueue};
use crate::command::CommandType;

/// One connection's rate classes: queues keyed by class id, an exact-match
/// command-type index, and an optional catch-all queue.
#[derive(Default)]
pub(crate) struct RateClassSet {
    queues: HashMap<u16, Arc<RateQueue>>,
    by_type: HashMap<CommandType, Arc<RateQueue>>,
    default_queue: Option<Arc<RateQueue>>,
}

impl RateClassSet {
    pub(crate) fn new() -> Self { Self::default() }

    /// Install or update `class`, then rebuild the routing index so mappings
    /// from a previous version of the class do not linger.
    pub(crate) fn install(&mut self, class: RateClassInfo) {
        match self.queues.get(&class.class_id) {
            Some(queue) => queue.update_class(class),
            None => {
                self.queues
                    .insert(class.class_id, Arc::new(RateQueue::new(class)));
            }
        }
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.by_type.clear();
        self.default_queue = None;
        for queue in self.queues.values() {
            let class = queue.class();
            if class.is_default() {
                self.default_queue = Some(Arc::clone(queue));
            }
            for command_type in class.command_types {
                self.by_type.insert(command_type, Arc::clone(queue));
            }
        }
    }

    /// Exact-match classification; falls back to the default queue, never to
    /// family or global wildcards at this layer.
    pub(crate) fn route(&self, command_type: CommandType) -> Option<Arc<RateQueue>> {
        self.by_type
            .get(&command_type)
            .or(self.default_queue.as_ref())
            .map(Arc::clone)
    }

    /// Snapshot of every queue, for the scheduler's flush pass.
    pub(crate) fn queues(&self) -> Vec<Arc<RateQueue>> {
        self.queues.values().map(Arc::clone).collect()
    }

    /// Discard all queued items, returning how many were dropped.
    pub(crate) fn clear_all(&self) -> usize {
        self.queues.values().map(|queue| queue.clear()).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn class(class_id: u16, command_types: Vec<CommandType>) -> RateClassInfo {
        RateClassInfo {
            class_id,
            window_size: 10,
            min_interval: Duration::from_millis(500),
            max_interval: Duration::from_millis(5000),
            limited_interval: Duration::from_millis(1000),
            command_types,
        }
    }

    #[test]
    fn empty_command_list_installs_the_default_queue() {
        let mut set = RateClassSet::new();
        set.install(class(1, vec![CommandType::new(4, 6)]));
        set.install(class(2, vec![]));

        let explicit = set.route(CommandType::new(4, 6)).expect("explicit class");
        let fallback = set.route(CommandType::new(9, 9)).expect("default class");
        assert_eq!(explicit.class().class_id, 1);
        assert_eq!(fallback.class().class_id, 2);
    }

    #[test]
    fn unmatched_type_without_default_routes_nowhere() {
        let mut set = RateClassSet::new();
        set.install(class(1, vec![CommandType::new(4, 6)]));
        assert!(set.route(CommandType::new(9, 9)).is_none());
    }

    #[test]
    fn reinstalling_a_class_drops_stale_mappings() {
        let mut set = RateClassSet::new();
        set.install(class(1, vec![CommandType::new(4, 6), CommandType::new(4, 7)]));
        set.install(class(1, vec![CommandType::new(4, 6)]));

        assert!(set.route(CommandType::new(4, 6)).is_some());
        assert!(set.route(CommandType::new(4, 7)).is_none());
        assert_eq!(set.queues().len(), 1);
    }
}
