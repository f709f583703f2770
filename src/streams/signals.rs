use std::sync::Arc;

use serde::Serialize;

use super::types::StreamData;

/**
 * Lifecycle signal types emitted per connection epoch.
 *
 * # Variants
 * - `Connect`: Socket opened and subscriptions sent.
 * - `FirstReceivedData`: First frame of this connection epoch.
 * - `Disconnect`: Worker exited with a restartable error.
 * - `Stop`: Worker exited by request.
 * - `StreamUnrepairable`: Worker exited with a fatal error.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Connect,
    FirstReceivedData,
    Disconnect,
    Stop,
    StreamUnrepairable,
}

/**
 * One lifecycle notification, distinct from market data.
 *
 * # Fields
 * - `signal_type`: The lifecycle event.
 * - `stream_id`: Stream this signal belongs to.
 * - `timestamp`: Unix timestamp of emission.
 * - `data_record`: Last/first received record, for `Disconnect` and
 *   `FirstReceivedData`.
 * - `error`: Failure reason, for `StreamUnrepairable`.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSignal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub stream_id: String,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_record: Option<StreamData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/**
 * User-supplied signal handler.
 */
pub type SignalCallback = Arc<dyn Fn(StreamSignal) + Send + Sync>;

/**
 * Destination for emitted signals.
 *
 * The default appends to the manager's signal buffer (when enabled); a
 * user-provided callback replaces the buffer entirely.
 */
#[derive(Clone)]
pub(crate) enum SignalSink {
    Buffer,
    Callback(SignalCallback),
}

impl std::fmt::Debug for SignalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSink::Buffer => write!(f, "Buffer"),
            SignalSink::Callback(_) => write!(f, "Callback"),
        }
    }
}
