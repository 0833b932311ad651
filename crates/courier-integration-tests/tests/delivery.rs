//! Integration tests for produce-consume round trips
//!
//! These tests verify:
//! - Queue sends are consumed, handled, and acknowledged
//! - Topic publishes fan out to every bound queue
//! - Batch sends reach a batch handler intact
//! - Failed handlers leave messages for redelivery
//! - Delayed sends stay invisible until the delay lapses

mod common;

use common::{memory_messenger, memory_messenger_with_sink, wait_until, wait_until_drained};
use courier_core::{ConsumerOptions, CreateQueueOptions, QueueOptions, SendOptions};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Serialize)]
struct OrderPlaced {
    order_id: u64,
    amount: u32,
}

/// Verify the full path: send to a queue, consume, handle, acknowledge
#[tokio::test]
async fn test_queue_send_is_consumed_and_acknowledged() {
    let (backend, messenger) = memory_messenger();
    let queue = messenger
        .create_queue("orders", CreateQueueOptions::new())
        .await;
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let recording = Arc::clone(&received);
    messenger
        .on_message(
            "orders",
            move |payload: Value| {
                let recording = Arc::clone(&recording);
                async move {
                    recording.lock().unwrap().push(payload);
                    anyhow::Ok(())
                }
            },
            ConsumerOptions::new(),
        )
        .await
        .unwrap();
    messenger.ready().await.unwrap();

    messenger
        .send_to_queue(
            "orders",
            &OrderPlaced {
                order_id: 7,
                amount: 250,
            },
            SendOptions::new(),
        )
        .await
        .unwrap();

    wait_until(Duration::from_secs(5), || {
        !received.lock().unwrap().is_empty()
    })
    .await;

    let payloads = received.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["order_id"], 7);
    assert_eq!(payloads[0]["amount"], 250);
    assert_eq!(payloads[0]["_meta"], json!({}));

    // Acknowledgement removes the message from the backend.
    let locator = queue.wait_ready().await.unwrap();
    wait_until_drained(&backend, &locator).await;

    messenger.shutdown(Duration::from_secs(1)).await;
}

/// Verify that one publish reaches every queue bound to the topic
#[tokio::test]
async fn test_topic_publish_fans_out_to_every_bound_queue() {
    let (backend, messenger) = memory_messenger();
    let topic = messenger.create_topic("events").await;
    messenger
        .create_queue(
            "audit",
            CreateQueueOptions::new().bind_topic(Arc::clone(&topic)),
        )
        .await;
    messenger
        .create_queue(
            "billing",
            CreateQueueOptions::new().bind_topic(Arc::clone(&topic)),
        )
        .await;

    let audit_seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let billing_seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    for (name, seen) in [("audit", &audit_seen), ("billing", &billing_seen)] {
        let recording = Arc::clone(seen);
        messenger
            .on_message(
                name,
                move |payload: Value| {
                    let recording = Arc::clone(&recording);
                    async move {
                        recording.lock().unwrap().push(payload);
                        anyhow::Ok(())
                    }
                },
                ConsumerOptions::new(),
            )
            .await
            .unwrap();
    }
    messenger.ready().await.unwrap();

    // Both bindings must be in place before publishing.
    let topic_locator = topic.wait_ready().await.unwrap();
    let mut subscriptions = 0;
    for _ in 0..200 {
        subscriptions = backend.subscription_count(&topic_locator).await.unwrap();
        if subscriptions == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(subscriptions, 2, "bindings did not materialize");

    messenger
        .send_to_topic("events", &json!({"kind": "created"}))
        .await
        .unwrap();

    wait_until(Duration::from_secs(5), || {
        !audit_seen.lock().unwrap().is_empty() && !billing_seen.lock().unwrap().is_empty()
    })
    .await;

    for seen in [&audit_seen, &billing_seen] {
        let payloads = seen.lock().unwrap().clone();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["kind"], "created");
        assert_eq!(payloads[0]["_meta"]["topicName"], "events");
    }

    messenger.shutdown(Duration::from_secs(1)).await;
}

/// Verify that a batch send reaches a batch handler and is acknowledged whole
#[tokio::test]
async fn test_batch_send_is_consumed_by_batch_handler() {
    let (backend, messenger) = memory_messenger();
    let queue = messenger
        .create_queue("orders", CreateQueueOptions::new())
        .await;
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let recording = Arc::clone(&received);
    messenger
        .on_batch(
            "orders",
            move |payloads: Vec<Value>| {
                let recording = Arc::clone(&recording);
                async move {
                    recording.lock().unwrap().extend(payloads);
                    anyhow::Ok(())
                }
            },
            ConsumerOptions::new(),
        )
        .await
        .unwrap();
    messenger.ready().await.unwrap();

    messenger
        .send_to_queue_batch("orders", &[json!({"n": 1}), json!({"n": 2}), json!({"n": 3})])
        .await
        .unwrap();

    wait_until(Duration::from_secs(5), || received.lock().unwrap().len() == 3).await;

    // Delivery preserves enqueue order.
    let payloads = received.lock().unwrap().clone();
    let values: Vec<i64> = payloads
        .iter()
        .map(|p| p["n"].as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![1, 2, 3]);

    let locator = queue.wait_ready().await.unwrap();
    wait_until_drained(&backend, &locator).await;

    messenger.shutdown(Duration::from_secs(1)).await;
}

/// Verify that a failed handler leaves the message to be redelivered
#[tokio::test]
async fn test_failed_handler_leaves_message_for_redelivery() {
    let (backend, sink, messenger) = memory_messenger_with_sink();
    let queue = messenger
        .create_queue(
            "orders",
            CreateQueueOptions::new()
                .with_queue_options(QueueOptions::new().with_visibility_timeout(1)),
        )
        .await;
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&attempts);
    messenger
        .on_message(
            "orders",
            move |_payload: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("transient failure");
                    }
                    anyhow::Ok(())
                }
            },
            ConsumerOptions::new(),
        )
        .await
        .unwrap();
    messenger.ready().await.unwrap();

    messenger
        .send_to_queue("orders", &json!({"n": 1}), SendOptions::new())
        .await
        .unwrap();

    // The first attempt fails; the retry lands after the visibility timeout.
    wait_until(Duration::from_secs(10), || {
        attempts.load(Ordering::SeqCst) >= 2
    })
    .await;

    let locator = queue.wait_ready().await.unwrap();
    wait_until_drained(&backend, &locator).await;
    assert!(sink.contains("Consumer[orders] handler error: transient failure"));

    messenger.shutdown(Duration::from_secs(1)).await;
}

/// Verify that a delayed send stays invisible until the delay lapses
#[tokio::test]
async fn test_delayed_send_defers_delivery() {
    let (_backend, messenger) = memory_messenger();
    messenger
        .create_queue("orders", CreateQueueOptions::new())
        .await;
    let received = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&received);
    messenger
        .on_message(
            "orders",
            move |_payload: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            },
            ConsumerOptions::new(),
        )
        .await
        .unwrap();
    messenger.ready().await.unwrap();

    let sent_at = std::time::Instant::now();
    messenger
        .send_to_queue(
            "orders",
            &json!({"n": 1}),
            SendOptions::new().with_delay_seconds(1),
        )
        .await
        .unwrap();

    wait_until(Duration::from_secs(10), || {
        received.load(Ordering::SeqCst) == 1
    })
    .await;

    assert!(
        sent_at.elapsed() >= Duration::from_millis(900),
        "delivery arrived {}ms after send, expected the 1s delay to hold",
        sent_at.elapsed().as_millis()
    );

    messenger.shutdown(Duration::from_secs(1)).await;
}
