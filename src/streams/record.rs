use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::auth::ApiCredentials;
use super::signals::SignalType;
use super::types::{BufferTarget, OutputMode, StreamData, StreamRoute};

/**
 * Lifecycle status of one stream.
 *
 * `Stopped` and `Crashed` are terminal; a stream never re-enters `Running`
 * once it reached either.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Starting,
    Running,
    Restarting,
    Stopped,
    Crashed(String),
}

impl StreamStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamStatus::Stopped | StreamStatus::Crashed(_))
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::Starting => write!(f, "starting"),
            StreamStatus::Running => write!(f, "running"),
            StreamStatus::Restarting => write!(f, "restarting"),
            StreamStatus::Stopped => write!(f, "stopped"),
            StreamStatus::Crashed(reason) => write!(f, "crashed - {reason}"),
        }
    }
}

/**
 * Immutable-after-create configuration of one stream.
 *
 * `channels` and `markets` are the only fields `subscribe_to_stream` may
 * grow; everything else is fixed at create time.
 */
#[derive(Clone)]
pub(crate) struct StreamSpecs {
    pub stream_id: String,
    pub endpoint: String,
    pub channels: BTreeSet<String>,
    pub markets: BTreeSet<String>,
    pub stream_label: Option<String>,
    pub credentials: Option<ApiCredentials>,
    pub output: OutputMode,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub close_timeout: Duration,
    pub buffer_target: BufferTarget,
    pub stream_buffer_maxlen: Option<usize>,
    pub route: StreamRoute,
}

impl StreamSpecs {
    /**
     * Resolves the stream buffer name the way callbacks see it.
     */
    pub fn buffer_name(&self) -> Option<String> {
        match &self.buffer_target {
            BufferTarget::Global => None,
            BufferTarget::StreamId => Some(self.stream_id.clone()),
            BufferTarget::Named(name) => Some(name.clone()),
        }
    }

    pub fn subscriptions(&self) -> usize {
        self.channels.len() * self.markets.len()
    }
}

/**
 * Per-stream mutable state.
 *
 * All fields are guarded by the manager's stream-table lock; the socket
 * worker, supervisor, maintenance worker and manager mutate them only while
 * holding it, and readers copy snapshots out before releasing it.
 *
 * # Fields
 * - `specs`: Stream configuration.
 * - `status`: Lifecycle status, terminal once stopped/crashed.
 * - `socket_is_ready`: Whether the live socket accepts writes.
 * - `has_received_first_data`: First-frame flag of the current epoch.
 * - `last_heartbeat`: Unix timestamp of the last received frame/pong.
 * - `start_time`: Unix timestamp of stream creation.
 * - `has_stopped`: Unix timestamp of the terminal transition, if any.
 * - `reconnects` / `logged_reconnects`: Reconnect counter and timestamps.
 * - `pending_payloads`: Payloads awaiting a ready socket.
 * - `processed_receives_total` / `processed_transmitted_total`: Counters.
 * - `receives_last_second` / `bytes_last_second`: Per-second histograms.
 * - `most_receives_per_second`: Peak of the receive histogram.
 * - `last_received_data_record`: Most recent record, for DISCONNECT signals.
 * - `websocket_uri`: URI of the current connection attempt.
 * - `stop_request` / `crash_request` / `crash_reason`: Termination requests.
 * - `last_stream_signal`: Most recent signal type emitted.
 * - `listen_key`: Listen key held by private streams, if any.
 * - `stop_tx`: Watch channel waking the worker on stop/crash requests.
 */
pub(crate) struct StreamRecord {
    pub specs: StreamSpecs,
    pub status: StreamStatus,
    pub socket_is_ready: bool,
    pub has_received_first_data: bool,
    pub last_heartbeat: Option<f64>,
    pub start_time: f64,
    pub has_stopped: Option<f64>,
    pub reconnects: u64,
    pub logged_reconnects: Vec<f64>,
    pub pending_payloads: VecDeque<Value>,
    pub processed_receives_total: u64,
    pub processed_transmitted_total: u64,
    pub receives_last_second: BTreeMap<u64, u64>,
    pub bytes_last_second: BTreeMap<u64, u64>,
    pub most_receives_per_second: u64,
    pub last_received_data_record: Option<StreamData>,
    pub websocket_uri: String,
    pub stop_request: bool,
    pub crash_request: bool,
    pub crash_reason: Option<String>,
    pub last_stream_signal: Option<SignalType>,
    pub listen_key: Option<String>,
    pub stop_tx: watch::Sender<bool>,
}

impl StreamRecord {
    pub fn new(specs: StreamSpecs, start_time: f64) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            specs,
            status: StreamStatus::Starting,
            socket_is_ready: false,
            has_received_first_data: false,
            last_heartbeat: None,
            start_time,
            has_stopped: None,
            reconnects: 0,
            logged_reconnects: Vec::new(),
            pending_payloads: VecDeque::new(),
            processed_receives_total: 0,
            processed_transmitted_total: 0,
            receives_last_second: BTreeMap::new(),
            bytes_last_second: BTreeMap::new(),
            most_receives_per_second: 0,
            last_received_data_record: None,
            websocket_uri: String::new(),
            stop_request: false,
            crash_request: false,
            crash_reason: None,
            last_stream_signal: None,
            listen_key: None,
            stop_tx,
        }
    }

    /**
     * Bytes received in the previous full second.
     */
    pub fn current_receiving_speed(&self, now_second: u64) -> u64 {
        self.bytes_last_second
            .get(&now_second.saturating_sub(1))
            .copied()
            .unwrap_or(0)
    }

    /**
     * Builds the public info snapshot; call under the stream-table lock.
     */
    pub fn info_snapshot(&self, now: f64) -> StreamInfo {
        StreamInfo {
            stream_id: self.specs.stream_id.clone(),
            stream_label: self.specs.stream_label.clone(),
            endpoint: self.specs.endpoint.clone(),
            channels: self.specs.channels.iter().cloned().collect(),
            markets: self.specs.markets.iter().cloned().collect(),
            status: self.status.to_string(),
            subscriptions: self.specs.subscriptions(),
            output: self.specs.output,
            stream_buffer_name: self.specs.buffer_name(),
            websocket_uri: self.websocket_uri.clone(),
            start_time: self.start_time,
            has_stopped: self.has_stopped,
            seconds_since_has_stopped: self.has_stopped.map(|stopped| now - stopped),
            reconnects: self.reconnects,
            logged_reconnects: self.logged_reconnects.clone(),
            last_heartbeat: self.last_heartbeat,
            processed_receives_total: self.processed_receives_total,
            processed_transmitted_total: self.processed_transmitted_total,
            last_received_data_record: self.last_received_data_record.clone(),
            last_stream_signal: self.last_stream_signal,
            current_receiving_speed: self.current_receiving_speed(now as u64),
        }
    }

    /**
     * Builds the statistics snapshot; call under the stream-table lock.
     */
    pub fn statistic_snapshot(&self, now: f64) -> StreamStatistic {
        let uptime = match self.has_stopped {
            Some(stopped) => (stopped - self.start_time).max(0.0),
            None => (now - self.start_time).max(0.0),
        };
        let receives_per_second = if uptime > 0.0 {
            self.processed_receives_total as f64 / uptime
        } else {
            0.0
        };
        StreamStatistic {
            stream_id: self.specs.stream_id.clone(),
            status: self.status.to_string(),
            uptime_seconds: uptime,
            processed_receives_total: self.processed_receives_total,
            processed_transmitted_total: self.processed_transmitted_total,
            receives_per_second,
            most_receives_per_second: self.most_receives_per_second,
            current_receiving_speed: self.current_receiving_speed(now as u64),
            reconnects: self.reconnects,
            subscriptions: self.specs.subscriptions(),
        }
    }
}

/**
 * Copy-out snapshot of one stream's state.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub stream_id: String,
    pub stream_label: Option<String>,
    pub endpoint: String,
    pub channels: Vec<String>,
    pub markets: Vec<String>,
    pub status: String,
    pub subscriptions: usize,
    pub output: OutputMode,
    pub stream_buffer_name: Option<String>,
    pub websocket_uri: String,
    pub start_time: f64,
    pub has_stopped: Option<f64>,
    pub seconds_since_has_stopped: Option<f64>,
    pub reconnects: u64,
    pub logged_reconnects: Vec<f64>,
    pub last_heartbeat: Option<f64>,
    pub processed_receives_total: u64,
    pub processed_transmitted_total: u64,
    pub last_received_data_record: Option<StreamData>,
    pub last_stream_signal: Option<SignalType>,
    pub current_receiving_speed: u64,
}

/**
 * Copy-out statistics of one stream.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatistic {
    pub stream_id: String,
    pub status: String,
    pub uptime_seconds: f64,
    pub processed_receives_total: u64,
    pub processed_transmitted_total: u64,
    pub receives_per_second: f64,
    pub most_receives_per_second: u64,
    pub current_receiving_speed: u64,
    pub reconnects: u64,
    pub subscriptions: usize,
}
