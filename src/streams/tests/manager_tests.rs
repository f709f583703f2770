use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use serial_test::serial;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::errors::BybitStreamsError;
use crate::streams::manager::BybitWebSocketManager;
use crate::streams::signals::SignalType;
use crate::streams::types::{AsyncCallback, OutputMode, PopMode, StreamData, SyncCallback};
use crate::streams::unix_second;
use crate::config::{ManagerConfig, StreamOptions};

const TEST_LICENSE: &str = "unit-test-license-token";

/**
 * Wraps async assertions with a timeout to prevent hanging tests.
 */
async fn with_timeout<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(30), future)
        .await
        .expect("test timed out")
}

/**
 * Polls a condition until it holds or the timeout elapses.
 */
async fn poll_until(condition: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return condition();
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn test_config(port: u16) -> ManagerConfig {
    ManagerConfig::builder()
        .with_license_token(TEST_LICENSE)
        .with_websocket_base_uri(format!("ws://127.0.0.1:{port}"))
        .with_stream_signal_buffer(true)
        .with_restart_timeout(Duration::from_secs(3))
        .build()
}

fn drain_signal_types(manager: &BybitWebSocketManager) -> Vec<SignalType> {
    let mut signals = Vec::new();
    while let Some(signal) = manager.pop_stream_signal_from_stream_signal_buffer() {
        signals.push(signal.signal_type);
    }
    signals
}

/**
 * Binds and immediately drops a listener, yielding a port that refuses
 * connections.
 */
async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr").port()
}

/**
 * In-process websocket endpoint.
 *
 * Per connection: reads the subscribe frame, sends `frames_per_connection`
 * data records, then either closes (first connection, when
 * `drop_after_send` is set) or stays open echoing received text frames into
 * the inspection channel.
 */
async fn spawn_mock_server(
    frames_per_connection: usize,
    drop_after_send: bool,
) -> (u16, mpsc::UnboundedReceiver<String>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let mut connection_index = 0usize;
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let Ok(mut websocket) = tokio_tungstenite::accept_async(socket).await else {
                continue;
            };

            if let Some(Ok(Message::Text(text))) = websocket.next().await {
                let _ = frames_tx.send(text);
            }

            for sequence in 0..frames_per_connection {
                let record = json!({
                    "topic": "kline.1.BTCUSDT",
                    "data": {"sequence": sequence, "connection": connection_index},
                });
                if websocket.send(Message::Text(record.to_string())).await.is_err() {
                    break;
                }
            }

            if drop_after_send && connection_index == 0 {
                let _ = websocket.close(None).await;
            } else {
                while let Some(Ok(message)) = websocket.next().await {
                    match message {
                        Message::Text(text) => {
                            let _ = frames_tx.send(text);
                        }
                        Message::Ping(payload) => {
                            let _ = websocket.send(Message::Pong(payload)).await;
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            }
            connection_index += 1;
        }
    });

    (port, frames_rx, handle)
}

/**
 * Raw TCP endpoint answering every websocket upgrade with HTTP 429.
 */
async fn spawn_429_server() -> (u16, tokio::task::JoinHandle<()>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buffer = [0u8; 2048];
            let _ = socket.read(&mut buffer).await;
            let _ = socket
                .write_all(b"HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\n\r\n")
                .await;
            let _ = socket.shutdown().await;
        }
    });
    (port, handle)
}

/**
 * Tests that an unknown exchange is fatal at construction.
 */
#[tokio::test]
async fn test_unknown_exchange_is_fatal() {
    let config = ManagerConfig::builder()
        .with_exchange("unknown.exchange")
        .with_license_token(TEST_LICENSE)
        .build();

    let error = BybitWebSocketManager::new(config).expect_err("construction must fail");
    assert!(matches!(
        error.downcast_ref::<BybitStreamsError>(),
        Some(BybitStreamsError::UnknownExchange(_))
    ));
}

/**
 * Tests that a missing license is fatal at construction.
 */
#[tokio::test]
async fn test_missing_license_is_fatal() {
    let config = ManagerConfig::builder().build();

    let error = BybitWebSocketManager::new(config).expect_err("construction must fail");
    assert!(matches!(
        error.downcast_ref::<BybitStreamsError>(),
        Some(BybitStreamsError::MissingLicense(_))
    ));
}

/**
 * Tests that a missing endpoint is a caller error on create_stream.
 */
#[tokio::test]
async fn test_missing_endpoint_is_caller_error() {
    let manager = BybitWebSocketManager::new(test_config(9)).expect("manager");

    let error = manager
        .create_stream("", ["trade"], ["btcusdt"], StreamOptions::default())
        .await
        .expect_err("create must fail");
    assert!(matches!(
        error.downcast_ref::<BybitStreamsError>(),
        Some(BybitStreamsError::MissingEndpoint)
    ));
    manager.stop_manager().await;
}

/**
 * Tests that unsubscribe is rejected at the API boundary without a
 * transmit.
 */
#[tokio::test]
async fn test_unsubscribe_is_rejected() {
    let manager = BybitWebSocketManager::new(test_config(9)).expect("manager");

    let error = manager
        .unsubscribe_from_stream("some-id", ["trade"], ["btcusdt"])
        .expect_err("unsubscribe must be rejected");
    assert!(matches!(
        error.downcast_ref::<BybitStreamsError>(),
        Some(BybitStreamsError::UnsubscribeNotSupported)
    ));
    manager.stop_manager().await;
}

/**
 * Tests that the per-family subscription cap is enforced on create and on
 * later subscribe merges.
 */
#[tokio::test]
async fn test_subscription_limit_enforced() {
    let port = refused_port().await;
    let config = ManagerConfig::builder()
        .with_license_token(TEST_LICENSE)
        .with_websocket_base_uri(format!("ws://127.0.0.1:{port}"))
        .with_max_subscriptions_per_stream_linear(4)
        .with_high_performance(true)
        .build();
    let manager = BybitWebSocketManager::new(config).expect("manager");

    // Five subscriptions against a cap of four.
    let error = manager
        .create_stream(
            "public/linear",
            ["trade"],
            ["m1", "m2", "m3", "m4", "m5"],
            StreamOptions::default(),
        )
        .await
        .expect_err("create must exceed the cap");
    assert!(matches!(
        error.downcast_ref::<BybitStreamsError>(),
        Some(BybitStreamsError::SubscriptionLimitExceeded { requested: 5, limit: 4, .. })
    ));

    // Two subscriptions fit; merging three more markets does not.
    let stream_id = manager
        .create_stream("public/linear", ["trade"], ["m1", "m2"], StreamOptions::default())
        .await
        .expect("create within cap");
    assert_eq!(manager.get_number_of_subscriptions(&stream_id), Some(2));

    let error = manager
        .subscribe_to_stream(&stream_id, ["trade"], ["m3", "m4", "m5"])
        .expect_err("merge must exceed the cap");
    assert!(matches!(
        error.downcast_ref::<BybitStreamsError>(),
        Some(BybitStreamsError::SubscriptionLimitExceeded { requested: 5, limit: 4, .. })
    ));

    // The failed merge must not have grown the sets.
    assert_eq!(manager.get_number_of_subscriptions(&stream_id), Some(2));
    manager.stop_manager().await;
}

/**
 * Tests request-id lookup in the result ring: matching result within the
 * timeout, None on expiry, never a non-matching result.
 */
#[tokio::test]
async fn test_result_ring_lookup() {
    let manager = BybitWebSocketManager::new(test_config(9)).expect("manager");
    manager.add_to_ringbuffer_result(json!({"req_id": "req-1", "success": true}));
    manager.add_to_ringbuffer_error(json!({"req_id": "req-2", "success": false}));

    let result = manager
        .get_result_by_request_id("req-1", Duration::from_secs(1))
        .await
        .expect("result present");
    assert_eq!(result["req_id"], "req-1");

    // Errors are not results.
    assert!(
        manager
            .get_result_by_request_id("req-2", Duration::from_millis(200))
            .await
            .is_none()
    );
    assert_eq!(manager.get_errors_from_endpoints().len(), 1);
    manager.stop_manager().await;
}

/**
 * Tests that the maintenance sweep updates peak rates, bounds the
 * per-second histograms, and feeds the receiving-speed queries.
 */
#[tokio::test]
async fn test_maintenance_pass_trims_and_updates() {
    let port = refused_port().await;
    let config = ManagerConfig::builder()
        .with_license_token(TEST_LICENSE)
        .with_websocket_base_uri(format!("ws://127.0.0.1:{port}"))
        .with_high_performance(true)
        .build();
    let manager = BybitWebSocketManager::new(config).expect("manager");
    let stream_id = manager
        .create_stream("public/linear", ["trade"], ["btcusdt"], StreamOptions::default())
        .await
        .expect("create");

    let now = unix_second();
    for age in 2..20u64 {
        manager.seed_histogram(&stream_id, now.saturating_sub(age), 1, 64);
    }
    // Both the current and the previous second carry the peak values, so
    // the assertions hold on either side of a second boundary.
    manager.seed_histogram(&stream_id, now - 1, 7, 2_048);
    manager.seed_histogram(&stream_id, now, 7, 2_048);

    manager.run_maintenance_pass();

    assert!(manager.get_most_receives_per_second() >= 7);
    assert_eq!(manager.get_current_receiving_speed(&stream_id), Some(2_048));
    assert_eq!(manager.get_current_receiving_speed_global(), 2_048);
    assert!(manager.get_receiving_speed_peak() >= 2_048);

    let (receives_len, bytes_len) = manager.histogram_lens(&stream_id).expect("stream exists");
    let keep_max = manager.get_keep_max_received_last_second_entries();
    assert!(receives_len <= keep_max);
    assert!(bytes_len <= keep_max);

    manager.stop_manager().await;
}

/**
 * Tests stopped-stream garbage collection: a stream terminated for longer
 * than the age bound disappears from the stream list.
 */
#[tokio::test]
async fn test_cleanup_of_stopped_streams() {
    let port = refused_port().await;
    let config = ManagerConfig::builder()
        .with_license_token(TEST_LICENSE)
        .with_websocket_base_uri(format!("ws://127.0.0.1:{port}"))
        .with_high_performance(true)
        .build();
    let manager = BybitWebSocketManager::new(config).expect("manager");
    let stream_id = manager
        .create_stream("public/linear", ["trade"], ["btcusdt"], StreamOptions::default())
        .await
        .expect("create");

    assert!(manager.stop_stream(&stream_id, false));
    assert!(
        with_timeout(manager.wait_till_stream_has_stopped(&stream_id, Duration::from_secs(10)))
            .await
    );

    // Younger than the age bound: kept.
    assert_eq!(manager.cleanup_stopped_streams(Duration::from_secs(900)), 0);
    assert!(manager.get_stream_list().contains_key(&stream_id));

    // Aged past the bound: collected.
    manager.backdate_stopped_stream(&stream_id, 901.0);
    assert_eq!(manager.cleanup_stopped_streams(Duration::from_secs(900)), 1);
    assert!(!manager.get_stream_list().contains_key(&stream_id));

    manager.stop_manager().await;
}

/**
 * Tests wait semantics: unknown ids report false, and a bounded wait on a
 * stream that cannot start expires with false.
 */
#[tokio::test]
async fn test_wait_till_semantics() {
    let port = refused_port().await;
    let config = ManagerConfig::builder()
        .with_license_token(TEST_LICENSE)
        .with_websocket_base_uri(format!("ws://127.0.0.1:{port}"))
        .with_high_performance(true)
        .build();
    let manager = BybitWebSocketManager::new(config).expect("manager");

    assert!(
        !manager
            .wait_till_stream_has_started("unknown", Duration::from_millis(100))
            .await
    );

    let stream_id = manager
        .create_stream("public/linear", ["trade"], ["btcusdt"], StreamOptions::default())
        .await
        .expect("create");
    assert!(
        !manager
            .wait_till_stream_has_started(&stream_id, Duration::from_millis(300))
            .await
    );

    manager.stop_manager().await;
}

/**
 * Tests the full happy path against an in-process endpoint: subscribe frame
 * contents, buffered delivery, lifecycle signals, statistics, and stop.
 */
#[tokio::test]
#[serial]
async fn test_create_stream_subscribes_and_buffers() {
    let (port, mut frames_rx, server) = spawn_mock_server(1, false).await;
    let manager = BybitWebSocketManager::new(test_config(port)).expect("manager");

    let stream_id = with_timeout(manager.create_stream(
        "public/linear",
        ["kline.1"],
        ["btcusdt", "ethusdt"],
        StreamOptions::default(),
    ))
    .await
    .expect("create");

    assert_eq!(stream_id.len(), 36);
    assert_eq!(manager.get_number_of_subscriptions(&stream_id), Some(2));
    assert!(manager.is_socket_ready(&stream_id));

    // The wire carries exactly one subscribe frame with the upper-cased
    // cross product.
    let subscribe = with_timeout(frames_rx.recv()).await.expect("subscribe frame");
    let subscribe: serde_json::Value = serde_json::from_str(&subscribe).expect("valid json");
    assert_eq!(subscribe["op"], "subscribe");
    assert_eq!(
        subscribe["args"],
        json!(["kline.1.BTCUSDT", "kline.1.ETHUSDT"])
    );

    // The data record lands in the global stream buffer.
    let popped = with_timeout(async {
        loop {
            if let Some(data) = manager.pop_stream_data_from_stream_buffer(None, PopMode::Fifo) {
                return data;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    match popped {
        StreamData::Raw(text) => assert!(text.contains("kline.1.BTCUSDT")),
        StreamData::Decoded(_) => panic!("default output is raw"),
    }

    assert!(manager.get_total_receives() >= 1);
    assert!(manager.get_total_received_bytes() > 0);
    let info = manager.get_stream_info(&stream_id).expect("info");
    assert_eq!(info.status, "running");
    assert_eq!(info.reconnects, 0);
    assert!(info.last_received_data_record.is_some());

    let signals = drain_signal_types(&manager);
    assert_eq!(
        signals,
        vec![SignalType::Connect, SignalType::FirstReceivedData]
    );

    assert!(manager.stop_stream(&stream_id, false));
    assert!(
        with_timeout(manager.wait_till_stream_has_stopped(&stream_id, Duration::from_secs(10)))
            .await
    );
    let info = manager.get_stream_info(&stream_id).expect("info");
    assert_eq!(info.status, "stopped");

    // The STOP signal lands right after the terminal transition.
    let stop_signal = with_timeout(async {
        loop {
            if let Some(signal) = manager.pop_stream_signal_from_stream_signal_buffer() {
                return signal;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert_eq!(stop_signal.signal_type, SignalType::Stop);

    // Stopping twice stays true and does not revive the stream.
    assert!(manager.stop_stream(&stream_id, false));
    assert_eq!(
        manager.get_stream_info(&stream_id).expect("info").status,
        "stopped"
    );

    manager.stop_manager().await;
    server.abort();
}

/**
 * Tests the reconnection path: a peer close surfaces as DISCONNECT with the
 * last received record, the stream reconnects within the restart timeout,
 * and the reconnect counters agree.
 */
#[tokio::test]
#[serial]
async fn test_reconnect_after_peer_close() {
    let (port, mut frames_rx, server) = spawn_mock_server(1, true).await;
    let manager = BybitWebSocketManager::new(test_config(port)).expect("manager");

    let stream_id = with_timeout(manager.create_stream(
        "public/linear",
        ["kline.1"],
        ["btcusdt"],
        StreamOptions::default(),
    ))
    .await
    .expect("create");

    // Two connection epochs deliver two data records.
    let mut records = Vec::new();
    with_timeout(async {
        while records.len() < 2 {
            if let Some(data) = manager.pop_stream_data_from_stream_buffer(None, PopMode::Fifo) {
                records.push(data);
            } else {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }
    })
    .await;

    assert!(
        poll_until(|| manager.get_reconnects() == 1, Duration::from_secs(10)).await,
        "exactly one reconnect expected"
    );
    let info = manager.get_stream_info(&stream_id).expect("info");
    assert_eq!(info.reconnects, 1);
    assert_eq!(info.logged_reconnects.len(), 1);
    assert_eq!(info.status, "running");

    // Both epochs sent their subscribe frame.
    let first = with_timeout(frames_rx.recv()).await.expect("first subscribe");
    let second = with_timeout(frames_rx.recv()).await.expect("second subscribe");
    assert_eq!(first, second);

    // Signal lifecycle: CONNECT, FIRST_RECEIVED_DATA, DISCONNECT (with the
    // last record), then the next epoch's CONNECT and FIRST_RECEIVED_DATA.
    let mut disconnect_seen = false;
    let mut ordered = Vec::new();
    while let Some(signal) = manager.pop_stream_signal_from_stream_signal_buffer() {
        if signal.signal_type == SignalType::Disconnect {
            disconnect_seen = true;
            assert!(signal.data_record.is_some());
        }
        ordered.push(signal.signal_type);
    }
    assert!(disconnect_seen);
    assert_eq!(
        ordered[..3],
        [
            SignalType::Connect,
            SignalType::FirstReceivedData,
            SignalType::Disconnect
        ]
    );

    manager.stop_manager().await;
    server.abort();
}

/**
 * Tests that an HTTP 429 on upgrade is unrepairable: the stream crashes,
 * emits STREAM_UNREPAIRABLE, and never reconnects.
 */
#[tokio::test]
#[serial]
async fn test_http_429_crashes_stream() {
    let (port, server) = spawn_429_server().await;
    let manager = BybitWebSocketManager::new(test_config(port)).expect("manager");

    let stream_id = with_timeout(manager.create_stream(
        "public/linear",
        ["trade"],
        ["btcusdt"],
        StreamOptions::default(),
    ))
    .await
    .expect("create returns the id even on failure");

    assert!(
        with_timeout(manager.wait_till_stream_has_stopped(&stream_id, Duration::from_secs(10)))
            .await
    );
    let info = manager.get_stream_info(&stream_id).expect("info");
    assert!(info.status.starts_with("crashed - "), "status: {}", info.status);
    assert!(info.status.contains("429"));
    assert_eq!(info.reconnects, 0);

    let unrepairable = with_timeout(async {
        loop {
            if let Some(signal) = manager.pop_stream_signal_from_stream_signal_buffer() {
                if signal.signal_type == SignalType::StreamUnrepairable {
                    return signal;
                }
            } else {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }
    })
    .await;
    assert!(unrepairable.error.expect("carries the error").contains("429"));

    manager.stop_manager().await;
    server.abort();
}

/**
 * Tests that a configured synchronous callback is the one sink observing
 * the frames, with the stream buffer name argument and no buffered copy.
 */
#[tokio::test]
#[serial]
async fn test_sync_callback_gets_frames() {
    let (port, _frames_rx, server) = spawn_mock_server(1, false).await;
    let manager = BybitWebSocketManager::new(test_config(port)).expect("manager");

    let received: Arc<Mutex<Vec<(StreamData, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let callback: SyncCallback = Arc::new(move |data, buffer_name| {
        sink.lock().unwrap().push((data, buffer_name));
        Ok(())
    });

    let stream_id = with_timeout(manager.create_stream(
        "public/linear",
        ["kline.1"],
        ["btcusdt"],
        StreamOptions::builder().with_stream_data_callback(callback).build(),
    ))
    .await
    .expect("create");

    assert!(
        poll_until(
            || !received.lock().unwrap().is_empty(),
            Duration::from_secs(10)
        )
        .await
    );
    let (data, buffer_name) = received.lock().unwrap().remove(0);
    assert!(matches!(data, StreamData::Raw(_)));
    assert_eq!(buffer_name, None);

    // Exactly one sink: nothing lands in the stream buffer.
    assert!(manager.pop_stream_data_from_stream_buffer(None, PopMode::Fifo).is_none());

    manager.stop_stream(&stream_id, false);
    manager.stop_manager().await;
    server.abort();
}

/**
 * Tests that a stream consumer drains its queue in arrival order with
 * decoded output.
 */
#[tokio::test]
#[serial]
async fn test_consumer_receives_in_order() {
    let (port, _frames_rx, server) = spawn_mock_server(5, false).await;
    let manager = BybitWebSocketManager::new(test_config(port)).expect("manager");

    let received: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let consumer: AsyncCallback = Arc::new(move |data| -> BoxFuture<'static, crate::Result<()>> {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            if let StreamData::Decoded(value) = data {
                if let Some(sequence) = value["data"]["sequence"].as_i64() {
                    sink.lock().unwrap().push(sequence);
                }
            }
            Ok(())
        })
    });

    let stream_id = with_timeout(manager.create_stream(
        "public/linear",
        ["kline.1"],
        ["btcusdt"],
        StreamOptions::builder()
            .with_output(OutputMode::Decoded)
            .with_stream_consumer(consumer)
            .build(),
    ))
    .await
    .expect("create");

    assert!(
        poll_until(
            || received.lock().unwrap().len() >= 5,
            Duration::from_secs(10)
        )
        .await
    );
    assert_eq!(received.lock().unwrap()[..5], [0, 1, 2, 3, 4]);

    manager.stop_stream(&stream_id, false);
    manager.stop_manager().await;
    server.abort();
}

/**
 * Tests that a failing consumer crashes only its own stream.
 */
#[tokio::test]
#[serial]
async fn test_failing_consumer_crashes_stream() {
    let (port, _frames_rx, server) = spawn_mock_server(1, false).await;
    let manager = BybitWebSocketManager::new(test_config(port)).expect("manager");

    let consumer: AsyncCallback = Arc::new(|_data| -> BoxFuture<'static, crate::Result<()>> {
        Box::pin(async { Err(anyhow::anyhow!("downstream store unavailable")) })
    });

    let stream_id = with_timeout(manager.create_stream(
        "public/linear",
        ["kline.1"],
        ["btcusdt"],
        StreamOptions::builder().with_stream_consumer(consumer).build(),
    ))
    .await
    .expect("create");

    assert!(
        with_timeout(manager.wait_till_stream_has_stopped(&stream_id, Duration::from_secs(10)))
            .await
    );
    let info = manager.get_stream_info(&stream_id).expect("info");
    assert!(info.status.starts_with("crashed - "), "status: {}", info.status);
    assert!(info.status.contains("downstream store unavailable"));

    manager.stop_manager().await;
    server.abort();
}

/**
 * Tests that send_with_stream serializes the payload onto the live socket
 * and fails fast for unknown streams.
 */
#[tokio::test]
#[serial]
async fn test_send_with_stream_roundtrip() {
    let (port, mut frames_rx, server) = spawn_mock_server(1, false).await;
    let manager = BybitWebSocketManager::new(test_config(port)).expect("manager");

    let stream_id = with_timeout(manager.create_stream(
        "public/linear",
        ["kline.1"],
        ["btcusdt"],
        StreamOptions::default(),
    ))
    .await
    .expect("create");

    assert!(
        !manager
            .send_with_stream("unknown", json!({"op": "ping"}), Duration::from_millis(100))
            .await
    );
    assert!(
        manager
            .send_with_stream(&stream_id, json!({"op": "ping"}), Duration::from_secs(5))
            .await
    );

    // First wire frame is the subscribe, the second is our payload.
    let _subscribe = with_timeout(frames_rx.recv()).await.expect("subscribe");
    let sent = with_timeout(frames_rx.recv()).await.expect("payload");
    let sent: serde_json::Value = serde_json::from_str(&sent).expect("valid json");
    assert_eq!(sent, json!({"op": "ping"}));
    assert!(manager.get_total_transmitted() >= 2);

    manager.stop_stream(&stream_id, false);
    manager.stop_manager().await;
    server.abort();
}

/**
 * Tests labels and per-stream buffers: stream-id routing keeps records
 * out of the global buffer and reachable by id.
 */
#[tokio::test]
#[serial]
async fn test_stream_id_buffer_and_labels() {
    use crate::streams::types::BufferTarget;

    let (port, _frames_rx, server) = spawn_mock_server(1, false).await;
    let manager = BybitWebSocketManager::new(test_config(port)).expect("manager");

    let stream_id = with_timeout(manager.create_stream(
        "public/linear",
        ["kline.1"],
        ["btcusdt"],
        StreamOptions::builder()
            .with_stream_label("ohlcv")
            .with_buffer_target(BufferTarget::StreamId)
            .build(),
    ))
    .await
    .expect("create");

    assert_eq!(manager.get_stream_id_by_label("ohlcv"), Some(stream_id.clone()));
    assert_eq!(manager.get_stream_label(&stream_id), Some("ohlcv".to_string()));

    let popped = with_timeout(async {
        loop {
            if let Some(data) =
                manager.pop_stream_data_from_stream_buffer(Some(&stream_id), PopMode::Fifo)
            {
                return data;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(matches!(popped, StreamData::Raw(_)));
    assert!(manager.pop_stream_data_from_stream_buffer(None, PopMode::Fifo).is_none());

    // Removing all data of the stream drops the record and its buffer.
    assert!(
        with_timeout(manager.remove_all_data_of_stream_id(&stream_id, Duration::from_secs(10)))
            .await
    );
    assert!(manager.get_stream_info(&stream_id).is_none());
    assert_eq!(manager.get_stream_buffer_length(Some(&stream_id)), 0);

    manager.stop_manager().await;
    server.abort();
}
