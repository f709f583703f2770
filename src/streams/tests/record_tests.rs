use std::collections::BTreeSet;
use std::time::Duration;

use crate::streams::record::{StreamRecord, StreamSpecs, StreamStatus};
use crate::streams::types::{BufferTarget, OutputMode, StreamData, StreamRoute};

fn test_specs(stream_id: &str) -> StreamSpecs {
    let channels: BTreeSet<String> = ["kline.1", "trade"].iter().map(|s| s.to_string()).collect();
    let markets: BTreeSet<String> = ["BTCUSDT", "ETHUSDT", "XRPUSDT"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    StreamSpecs {
        stream_id: stream_id.to_string(),
        endpoint: "public/linear".to_string(),
        channels,
        markets,
        stream_label: Some("unit".to_string()),
        credentials: None,
        output: OutputMode::Raw,
        ping_interval: Duration::from_secs(5),
        ping_timeout: Duration::from_secs(10),
        close_timeout: Duration::from_secs(1),
        buffer_target: BufferTarget::StreamId,
        stream_buffer_maxlen: None,
        route: StreamRoute::Buffered(BufferTarget::StreamId),
    }
}

/**
 * Tests the status rendering used across the query surface, including the
 * crashed reason suffix.
 */
#[test]
fn test_status_display() {
    assert_eq!(StreamStatus::Starting.to_string(), "starting");
    assert_eq!(StreamStatus::Running.to_string(), "running");
    assert_eq!(StreamStatus::Restarting.to_string(), "restarting");
    assert_eq!(StreamStatus::Stopped.to_string(), "stopped");
    assert_eq!(
        StreamStatus::Crashed("HTTP 429".to_string()).to_string(),
        "crashed - HTTP 429"
    );
}

/**
 * Tests that only stopped and crashed statuses are terminal.
 */
#[test]
fn test_status_terminality() {
    assert!(!StreamStatus::Starting.is_terminal());
    assert!(!StreamStatus::Running.is_terminal());
    assert!(!StreamStatus::Restarting.is_terminal());
    assert!(StreamStatus::Stopped.is_terminal());
    assert!(StreamStatus::Crashed("x".to_string()).is_terminal());
}

/**
 * Tests that the subscription count is the channels x markets cross
 * product and the buffer name resolves per routing target.
 */
#[test]
fn test_specs_subscriptions_and_buffer_name() {
    let specs = test_specs("stream-1");

    assert_eq!(specs.subscriptions(), 6);
    assert_eq!(specs.buffer_name(), Some("stream-1".to_string()));

    let mut global = test_specs("stream-2");
    global.buffer_target = BufferTarget::Global;
    assert_eq!(global.buffer_name(), None);

    let mut named = test_specs("stream-3");
    named.buffer_target = BufferTarget::Named("shared".to_string());
    assert_eq!(named.buffer_name(), Some("shared".to_string()));
}

/**
 * Tests the info snapshot contents straight after creation.
 */
#[test]
fn test_record_info_snapshot() {
    // Arrange
    let record = StreamRecord::new(test_specs("stream-a"), 1_000.0);

    // Act
    let info = record.info_snapshot(1_010.0);

    // Assert
    assert_eq!(info.stream_id, "stream-a");
    assert_eq!(info.status, "starting");
    assert_eq!(info.subscriptions, 6);
    assert_eq!(info.start_time, 1_000.0);
    assert_eq!(info.has_stopped, None);
    assert_eq!(info.seconds_since_has_stopped, None);
    assert_eq!(info.reconnects, 0);
    assert_eq!(info.processed_receives_total, 0);
    assert_eq!(info.stream_buffer_name, Some("stream-a".to_string()));
}

/**
 * Tests that the statistics snapshot derives uptime from the stop time for
 * terminated streams and averages receives over the uptime.
 */
#[test]
fn test_record_statistic_snapshot() {
    // Arrange
    let mut record = StreamRecord::new(test_specs("stream-b"), 1_000.0);
    record.processed_receives_total = 500;
    record.most_receives_per_second = 42;
    record.status = StreamStatus::Stopped;
    record.has_stopped = Some(1_100.0);

    // Act
    let statistic = record.statistic_snapshot(2_000.0);

    // Assert
    assert_eq!(statistic.uptime_seconds, 100.0);
    assert_eq!(statistic.receives_per_second, 5.0);
    assert_eq!(statistic.most_receives_per_second, 42);
    assert_eq!(statistic.status, "stopped");
}

/**
 * Tests that the current receiving speed reads the previous full second of
 * the byte histogram.
 */
#[test]
fn test_current_receiving_speed() {
    let mut record = StreamRecord::new(test_specs("stream-c"), 0.0);
    record.bytes_last_second.insert(99, 1_024);
    record.bytes_last_second.insert(100, 2_048);

    assert_eq!(record.current_receiving_speed(100), 1_024);
    assert_eq!(record.current_receiving_speed(101), 2_048);
    assert_eq!(record.current_receiving_speed(50), 0);
}

/**
 * Tests that the last received record keeps the sink-facing representation.
 */
#[test]
fn test_last_received_record_roundtrip() {
    let mut record = StreamRecord::new(test_specs("stream-d"), 0.0);
    record.last_received_data_record = Some(StreamData::Raw("{\"topic\":\"t\"}".to_string()));

    let info = record.info_snapshot(1.0);
    assert_eq!(
        info.last_received_data_record,
        Some(StreamData::Raw("{\"topic\":\"t\"}".to_string()))
    );
}
