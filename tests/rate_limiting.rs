//! Tests for the rate manager and its background scheduler: classification,
//! default-class routing, pause/unpause, clearing, and smoothed release
//! timing under a paused clock.

mod common;

use std::{sync::Arc, time::Duration};

use common::{TestTransport, raw_request, settle};
use snacline::{
    CommandType,
    ConnectionId,
    OutboundQueue,
    RateClassInfo,
    RateConfigError,
    RateManager,
    SnacProcessor,
};

const CHAT: CommandType = CommandType::new(0x000e, 0x0005);
const LOOKUP: CommandType = CommandType::new(0x0002, 0x0015);
const CONN: ConnectionId = ConnectionId::new(7);

fn class(class_id: u16, command_types: Vec<CommandType>) -> RateClassInfo {
    RateClassInfo {
        class_id,
        window_size: 10,
        min_interval: Duration::from_millis(50),
        max_interval: Duration::from_millis(10_000),
        limited_interval: Duration::from_millis(100),
        command_types,
    }
}

fn rigged(transport: &Arc<TestTransport>, manager: &Arc<RateManager>) -> SnacProcessor {
    let proc = SnacProcessor::new(CONN, Arc::clone(transport) as Arc<_>);
    proc.set_outbound_queue(Some(Arc::clone(manager) as Arc<_>));
    proc
}

#[tokio::test(start_paused = true)]
async fn zero_window_class_is_rejected() {
    let manager = RateManager::new();
    let mut bad = class(1, vec![CHAT]);
    bad.window_size = 0;
    assert!(matches!(
        manager.set_rate_class(CONN, bad),
        Err(RateConfigError::InvalidWindow(0))
    ));
}

#[tokio::test(start_paused = true)]
async fn unclassified_commands_bypass_rate_limiting() {
    let transport = Arc::new(TestTransport::default());
    let manager = RateManager::new();
    manager.set_rate_class(CONN, class(1, vec![CHAT])).unwrap();
    manager.pause(CONN);
    let proc = rigged(&transport, &manager);

    // LOOKUP matches no class and there is no default queue, so the pause
    // does not hold it back.
    proc.send_request(raw_request(LOOKUP));
    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_command_list_becomes_the_default_queue() {
    let transport = Arc::new(TestTransport::default());
    let manager = RateManager::new();
    manager.set_rate_class(CONN, class(1, vec![CHAT])).unwrap();
    manager.set_rate_class(CONN, class(2, vec![])).unwrap();
    manager.pause(CONN);
    let proc = rigged(&transport, &manager);

    proc.send_request(raw_request(LOOKUP));
    settle().await;
    // Routed to the default queue, so the pause held it.
    assert_eq!(transport.sent_count(), 0);

    manager.unpause(CONN);
    settle().await;
    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn paused_queues_accumulate_and_drain_in_order_on_unpause() {
    let transport = Arc::new(TestTransport::default());
    let manager = RateManager::new();
    manager.set_rate_class(CONN, class(1, vec![CHAT])).unwrap();
    manager.pause(CONN);
    let proc = rigged(&transport, &manager);

    let ids: Vec<u32> = (0..3).map(|_| proc.send_request(raw_request(CHAT))).collect();
    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(transport.sent_count(), 0);

    manager.unpause(CONN);
    settle().await;
    assert_eq!(transport.sent_request_ids(), ids);
}

#[tokio::test(start_paused = true)]
async fn release_spacing_follows_the_smoothing_model() {
    let transport = Arc::new(TestTransport::default());
    let manager = RateManager::new();
    // Window of 2, rested average 1500ms, threshold 1100ms: the first item
    // releases immediately; the second must wait 2*1100 - 1*1500 = 700ms.
    let spacing_class = RateClassInfo {
        class_id: 1,
        window_size: 2,
        min_interval: Duration::from_millis(500),
        max_interval: Duration::from_millis(1500),
        limited_interval: Duration::from_millis(1000),
        command_types: vec![CHAT],
    };
    manager.set_rate_class(CONN, spacing_class).unwrap();
    let proc = rigged(&transport, &manager);

    proc.send_request(raw_request(CHAT));
    proc.send_request(raw_request(CHAT));
    settle().await;
    assert_eq!(transport.sent_count(), 1);

    tokio::time::advance(Duration::from_millis(600)).await;
    settle().await;
    assert_eq!(transport.sent_count(), 1, "released before its wait elapsed");

    tokio::time::advance(Duration::from_millis(150)).await;
    settle().await;
    assert_eq!(transport.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn clear_discards_without_sending_and_implies_unpause() {
    let transport = Arc::new(TestTransport::default());
    let manager = RateManager::new();
    manager.set_rate_class(CONN, class(1, vec![CHAT])).unwrap();
    manager.pause(CONN);
    let proc = rigged(&transport, &manager);

    for _ in 0..3 {
        proc.send_request(raw_request(CHAT));
    }
    manager.clear_queue(CONN);
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(transport.sent_count(), 0);

    // Clearing unpaused the connection: new traffic flows without an
    // explicit unpause.
    proc.send_request(raw_request(CHAT));
    settle().await;
    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn detach_drops_per_connection_state() {
    let transport = Arc::new(TestTransport::default());
    let manager = RateManager::new();
    manager.set_rate_class(CONN, class(1, vec![CHAT])).unwrap();
    let proc = rigged(&transport, &manager);

    manager.detach(CONN);
    // With no rate state the manager sends straight through.
    proc.send_request(raw_request(CHAT));
    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn queues_of_different_classes_schedule_independently() {
    let transport = Arc::new(TestTransport::default());
    let manager = RateManager::new();
    let slow = RateClassInfo {
        class_id: 1,
        window_size: 2,
        min_interval: Duration::from_millis(500),
        max_interval: Duration::from_millis(1500),
        limited_interval: Duration::from_millis(1000),
        command_types: vec![CHAT],
    };
    manager.set_rate_class(CONN, slow).unwrap();
    manager.set_rate_class(CONN, class(2, vec![LOOKUP])).unwrap();
    let proc = rigged(&transport, &manager);

    // Two slow-class items: the second is held. A fast-class item after them
    // must not be blocked behind the slow queue.
    proc.send_request(raw_request(CHAT));
    proc.send_request(raw_request(CHAT));
    proc.send_request(raw_request(LOOKUP));
    settle().await;
    assert_eq!(transport.sent_count(), 2);

    tokio::time::advance(Duration::from_millis(750)).await;
    settle().await;
    assert_eq!(transport.sent_count(), 3);
}
