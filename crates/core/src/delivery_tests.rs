// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::TickMetadata;

fn heartbeat(ts: i64) -> ServerMessage {
    ServerMessage::HeartbeatResponse { timestamp: ts }
}

fn tick_update(tick_number: i64) -> ServerMessage {
    ServerMessage::SyncGroupUpdatesResponse {
        tick_metadata: TickMetadata {
            sync_group: "g".into(),
            tick_id: uuid::Uuid::new_v4(),
            tick_number,
            is_delayed: false,
            capture_ms: None,
            diff_ms: None,
        },
        entities: vec![],
    }
}

#[tokio::test]
async fn dequeue_returns_messages_in_fifo_order() {
    let queue = OutboundQueue::new(4);
    queue.enqueue(tick_update(1)).unwrap();
    queue.enqueue(tick_update(2)).unwrap();

    assert_eq!(queue.dequeue().await.tick_number(), Some(1));
    assert_eq!(queue.dequeue().await.tick_number(), Some(2));
}

#[tokio::test]
async fn overflow_drops_oldest_non_critical_message() {
    let queue = OutboundQueue::new(2);
    queue.enqueue(tick_update(1)).unwrap();
    queue.enqueue(tick_update(2)).unwrap();
    queue.enqueue(tick_update(3)).unwrap();

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.dequeue().await.tick_number(), Some(2));
    assert_eq!(queue.dequeue().await.tick_number(), Some(3));
}

#[tokio::test]
async fn overflow_never_drops_critical_messages() {
    let queue = OutboundQueue::new(2);
    queue.enqueue(heartbeat(1)).unwrap();
    queue.enqueue(heartbeat(2)).unwrap();

    let err = queue.enqueue(heartbeat(3)).unwrap_err();
    assert!(matches!(err, CoreError::Backpressure));
    assert_eq!(queue.len(), 2);
}

#[tokio::test]
async fn critical_messages_survive_non_critical_eviction() {
    let queue = OutboundQueue::new(2);
    queue.enqueue(heartbeat(1)).unwrap();
    queue.enqueue(tick_update(1)).unwrap();
    queue.enqueue(tick_update(2)).unwrap();

    assert_eq!(queue.len(), 2);
    let first = queue.dequeue().await;
    assert!(first.is_critical());
    let second = queue.dequeue().await;
    assert_eq!(second.tick_number(), Some(2));
}

#[tokio::test]
async fn dequeue_waits_for_next_enqueue() {
    let queue = std::sync::Arc::new(OutboundQueue::new(4));
    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.dequeue().await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    queue.enqueue(heartbeat(1)).unwrap();

    let msg = waiter.await.unwrap();
    assert!(matches!(msg, ServerMessage::HeartbeatResponse { timestamp: 1 }));
}
