use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::errors::SocketFailure;
use super::manager::BybitWebSocketManager;
use super::signals::SignalType;
use super::types::{AsyncCallback, OutputMode, StreamData, StreamRoute};

/**
 * Routes one received text frame to exactly one sink.
 *
 * Bookkeeping (counters, histograms, heartbeat, first-data flag) happens
 * under the stream-table lock; the sink itself is invoked strictly outside
 * it. Endpoint responses (subscribe acks, auth results) are captured into
 * the result/error ring buffers instead of the data sinks.
 *
 * # Returns
 * - `SocketFailure::Crash` when a synchronous user callback failed; the
 *   worker exits and the supervisor marks the stream unrepairable.
 */
pub(crate) async fn process_stream_data(
    manager: &Arc<BybitWebSocketManager>,
    stream_id: &str,
    raw: String,
    output: OutputMode,
) -> Result<(), SocketFailure> {
    let byte_size = raw.len();
    let parsed: Option<Value> = serde_json::from_str(&raw).ok();

    let data = match output {
        OutputMode::Decoded => match parsed.clone() {
            Some(value) => StreamData::Decoded(value),
            None => StreamData::Raw(raw),
        },
        OutputMode::Raw => StreamData::Raw(raw),
    };

    let Some(routing) = manager.record_received_frame(stream_id, byte_size, &data) else {
        return Ok(());
    };

    if routing.first_data {
        manager.send_stream_signal(
            SignalType::FirstReceivedData,
            stream_id,
            Some(data.clone()),
            None,
        );
    }

    if let Some(value) = parsed {
        if is_endpoint_response(&value) {
            if value.get("success").and_then(Value::as_bool) == Some(false) {
                manager.add_to_ringbuffer_error(value);
            } else {
                manager.add_to_ringbuffer_result(value);
            }
            return Ok(());
        }
    }

    match routing.route {
        StreamRoute::AsyncQueue(sender) | StreamRoute::AsyncCb(sender) => {
            if sender.send(data).is_err() {
                debug!(stream_id, "Consumer queue closed, dropping record");
            }
        }
        StreamRoute::SyncCb(callback) => {
            if let Err(e) = callback(data, routing.buffer_name.clone()) {
                let reason = format!("stream data callback failed: {e:#}");
                error!(stream_id, error = %reason, "User callback raised");
                manager.crash_stream(stream_id, reason.clone());
                return Err(SocketFailure::Crash(reason));
            }
        }
        StreamRoute::Buffered(_) => {
            manager.buffers.push(routing.buffer_name.as_deref(), data);
        }
    }
    Ok(())
}

/**
 * Endpoint responses carry `op`/`success`/`req_id` envelopes and no topic.
 */
fn is_endpoint_response(value: &Value) -> bool {
    value.get("topic").is_none()
        && (value.get("success").is_some()
            || value.get("req_id").is_some()
            || value.get("ret_msg").is_some()
            || value.get("op").is_some())
}

/**
 * Drains a stream's ordered queue, awaiting the consumer callback once per
 * record.
 *
 * The queue is drained by exactly one task, so records reach the consumer
 * in arrival order. A failing callback is converted into a crash request
 * for this stream only; other streams are unaffected.
 */
pub(crate) async fn run_consumer(
    manager: Arc<BybitWebSocketManager>,
    stream_id: String,
    mut receiver: mpsc::UnboundedReceiver<StreamData>,
    callback: AsyncCallback,
) {
    debug!(stream_id = %stream_id, "Stream consumer started");
    let Some(mut stop_rx) = manager.stop_watch(&stream_id) else {
        return;
    };
    loop {
        tokio::select! {
            data = receiver.recv() => {
                match data {
                    Some(data) => {
                        if let Err(e) = callback(data).await {
                            let reason = format!("stream consumer failed: {e:#}");
                            error!(stream_id = %stream_id, error = %reason, "Stream consumer raised");
                            manager.crash_stream(&stream_id, reason);
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = stop_rx.changed() => {
                if manager.is_stop_request(&stream_id) || manager.is_crash_request(&stream_id) {
                    break;
                }
            }
        }
    }
    debug!(stream_id = %stream_id, "Stream consumer finished");
}
