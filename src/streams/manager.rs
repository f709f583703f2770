use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::Result;
use crate::config::{EndpointFamily, ManagerConfig, StreamOptions, resolve_connection_settings};
use crate::errors::BybitStreamsError;
use crate::rest::{BybitRestApi, BybitRestClient};
use super::buffers::{BufferSet, RingBuffer};
use super::dispatcher;
use super::payload::{SubscriptionMethod, create_payload};
use super::record::{StreamInfo, StreamRecord, StreamSpecs, StreamStatistic, StreamStatus};
use super::signals::{SignalSink, SignalType, StreamSignal};
use super::supervisor;
use super::types::{AsyncCallback, PopMode, StreamData, StreamRoute};
use super::{unix_second, unix_timestamp};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/**
 * Connection settings after applying construction-time overrides.
 */
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSettings {
    pub websocket_base_uri: String,
    pub restful_base_uri: String,
    pub api_version: String,
    pub args_limit: usize,
    pub max_subscriptions_spot: usize,
    pub max_subscriptions_linear: usize,
    pub max_subscriptions_inverse: usize,
    pub max_subscriptions_option: usize,
}

impl ResolvedSettings {
    fn resolve(config: &ManagerConfig) -> std::result::Result<Self, BybitStreamsError> {
        let settings = resolve_connection_settings(&config.exchange)?;
        Ok(Self {
            websocket_base_uri: config
                .websocket_base_uri
                .clone()
                .unwrap_or_else(|| settings.websocket_base_uri.to_string()),
            restful_base_uri: config
                .restful_base_uri
                .clone()
                .unwrap_or_else(|| settings.restful_base_uri.to_string()),
            api_version: settings.api_version.to_string(),
            args_limit: settings.args_limit,
            max_subscriptions_spot: config
                .max_subscriptions_per_stream_spot
                .unwrap_or(settings.max_subscriptions_spot),
            max_subscriptions_linear: config
                .max_subscriptions_per_stream_linear
                .unwrap_or(settings.max_subscriptions_linear),
            max_subscriptions_inverse: config
                .max_subscriptions_per_stream_inverse
                .unwrap_or(settings.max_subscriptions_inverse),
            max_subscriptions_option: config
                .max_subscriptions_per_stream_option
                .unwrap_or(settings.max_subscriptions_option),
        })
    }

    pub fn max_subscriptions(&self, family: EndpointFamily) -> usize {
        match family {
            EndpointFamily::Spot => self.max_subscriptions_spot,
            EndpointFamily::Linear => self.max_subscriptions_linear,
            EndpointFamily::Inverse => self.max_subscriptions_inverse,
            EndpointFamily::Option => self.max_subscriptions_option,
        }
    }
}

/**
 * Bookkeeping handed to the dispatcher for one received frame.
 */
pub(crate) struct FrameRouting {
    pub first_data: bool,
    pub route: StreamRoute,
    pub buffer_name: Option<String>,
}

/**
 * Manager for a fleet of concurrent, long-lived websocket subscriptions.
 *
 * Owns the stream table, the shared buffers, the global counters and the
 * maintenance worker. One socket worker task exists per stream; its
 * supervisor classifies failures and keeps the stream alive across
 * transient network errors.
 *
 * Structural mutation of the stream table and of per-stream mutable fields
 * happens under a single lock; queries copy snapshots out before releasing
 * it, and no lock is ever held across user-callback invocations.
 */
pub struct BybitWebSocketManager {
    pub(crate) config: ManagerConfig,
    settings: ResolvedSettings,
    start_time: f64,
    stream_list: Mutex<HashMap<String, StreamRecord>>,
    pub(crate) buffers: BufferSet,
    signal_buffer: Mutex<VecDeque<StreamSignal>>,
    signal_sink: SignalSink,
    ringbuffer_results: Mutex<RingBuffer>,
    ringbuffer_errors: Mutex<RingBuffer>,
    total_received_bytes: AtomicU64,
    total_receives: AtomicU64,
    total_transmitted: AtomicU64,
    reconnects_total: AtomicU64,
    most_receives_per_second: AtomicU64,
    receiving_speed_peak: AtomicU64,
    keep_max_received_last_second_entries: AtomicUsize,
    stop_manager_request: AtomicBool,
    rest_client: Arc<BybitRestClient>,
    maintenance_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BybitWebSocketManager {
    /**
     * Creates a new manager and starts its maintenance worker.
     *
     * Validates the exchange against the connection settings table and the
     * configured license; both failures are fatal.
     *
     * # Arguments
     * - `config`: Manager configuration built via `ManagerConfig::builder()`.
     *
     * # Returns
     * - The manager wrapped in an `Arc` for sharing with worker tasks.
     */
    #[instrument(skip(config))]
    pub fn new(config: ManagerConfig) -> Result<Arc<Self>> {
        let start = std::time::Instant::now();
        let settings = ResolvedSettings::resolve(&config)?;
        config
            .license_verifier
            .verify(config.license_token.as_deref())?;

        let rest_client = Arc::new(BybitRestClient::new(settings.restful_base_uri.clone())?);
        let signal_sink = match config.stream_signal_callback.clone() {
            Some(callback) => SignalSink::Callback(callback),
            None => SignalSink::Buffer,
        };

        let manager = Arc::new(Self {
            buffers: BufferSet::new(config.stream_buffer_maxlen),
            signal_buffer: Mutex::new(VecDeque::new()),
            signal_sink,
            ringbuffer_results: Mutex::new(RingBuffer::new(config.ringbuffer_result_max_size)),
            ringbuffer_errors: Mutex::new(RingBuffer::new(config.ringbuffer_error_max_size)),
            total_received_bytes: AtomicU64::new(0),
            total_receives: AtomicU64::new(0),
            total_transmitted: AtomicU64::new(0),
            reconnects_total: AtomicU64::new(0),
            most_receives_per_second: AtomicU64::new(0),
            receiving_speed_peak: AtomicU64::new(0),
            keep_max_received_last_second_entries: AtomicUsize::new(
                config.keep_max_received_last_second_entries,
            ),
            stop_manager_request: AtomicBool::new(false),
            start_time: unix_timestamp(),
            stream_list: Mutex::new(HashMap::new()),
            rest_client,
            maintenance_handle: Mutex::new(None),
            settings,
            config,
        });

        let maintenance = tokio::spawn(super::maintenance::run_maintenance(Arc::clone(&manager)));
        *manager.maintenance_handle.lock().unwrap() = Some(maintenance);

        info!(
            duration_us = start.elapsed().as_micros(),
            exchange = %manager.config.exchange,
            websocket_base_uri = %manager.settings.websocket_base_uri,
            "Bybit websocket manager created"
        );
        Ok(manager)
    }

    /**
     * Creates a websocket stream for the (channels x markets) cross product.
     *
     * Markets are upper-cased on subscription. The call blocks until the
     * socket signals ready, the stream requests stop/crash, or immediately
     * when `high_performance` is configured; in every case the stream id is
     * returned and callers inspect the stream status for the outcome.
     *
     * # Arguments
     * - `endpoint`: URL path selecting the market category, e.g.
     *   `public/linear`.
     * - `channels` / `markets`: Subscription cross product input.
     * - `options`: Per-stream options; unset fields use manager defaults.
     *
     * # Returns
     * - The new stream id, unique for the lifetime of the manager.
     */
    #[instrument(skip(self, channels, markets, options))]
    pub async fn create_stream<C, CI, M, MI>(
        self: &Arc<Self>,
        endpoint: &str,
        channels: C,
        markets: M,
        options: StreamOptions,
    ) -> Result<String>
    where
        C: IntoIterator<Item = CI>,
        CI: Into<String>,
        M: IntoIterator<Item = MI>,
        MI: Into<String>,
    {
        let start = std::time::Instant::now();
        if endpoint.trim().is_empty() {
            return Err(BybitStreamsError::MissingEndpoint.into());
        }

        let channels: BTreeSet<String> = channels.into_iter().map(Into::into).collect();
        let markets: BTreeSet<String> = markets
            .into_iter()
            .map(|market| market.into().to_uppercase())
            .collect();
        self.check_subscription_limit(endpoint, channels.len() * markets.len())?;

        let stream_id = Uuid::new_v4().to_string();
        let (route, consumer) = self.resolve_route(&options);
        let stream_buffer_maxlen = options
            .stream_buffer_maxlen
            .or(self.config.stream_buffer_maxlen);

        let specs = StreamSpecs {
            stream_id: stream_id.clone(),
            endpoint: endpoint.to_string(),
            channels,
            markets,
            stream_label: options.stream_label.clone(),
            credentials: options.credentials.clone(),
            output: options.output.unwrap_or(self.config.output_default),
            ping_interval: options
                .ping_interval
                .unwrap_or(self.config.ping_interval_default),
            ping_timeout: options
                .ping_timeout
                .unwrap_or(self.config.ping_timeout_default),
            close_timeout: options
                .close_timeout
                .unwrap_or(self.config.close_timeout_default),
            buffer_target: options.buffer_target.clone(),
            stream_buffer_maxlen,
            route,
        };

        if let Some(name) = specs.buffer_name() {
            self.buffers.create_named(&name, stream_buffer_maxlen);
        }

        {
            let mut streams = self.stream_list.lock().unwrap();
            streams.insert(
                stream_id.clone(),
                StreamRecord::new(specs, unix_timestamp()),
            );
        }

        if let Some((receiver, callback)) = consumer {
            tokio::spawn(dispatcher::run_consumer(
                Arc::clone(self),
                stream_id.clone(),
                receiver,
                callback,
            ));
        }
        tokio::spawn(supervisor::run_stream(Arc::clone(self), stream_id.clone()));

        if !self.config.high_performance {
            loop {
                {
                    let streams = self.stream_list.lock().unwrap();
                    match streams.get(&stream_id) {
                        None => break,
                        Some(record) => {
                            if record.socket_is_ready
                                || record.stop_request
                                || record.crash_request
                                || record.status.is_terminal()
                            {
                                break;
                            }
                        }
                    }
                }
                if self.is_manager_stopping() {
                    break;
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        }

        info!(
            stream_id = %stream_id,
            endpoint,
            duration_us = start.elapsed().as_micros(),
            high_performance = self.config.high_performance,
            "Stream created"
        );
        Ok(stream_id)
    }

    /**
     * Requests a stream to stop; idempotent.
     *
     * When the stream holds a listen key and deletion is requested, the REST
     * collaborator is invoked best-effort; failures are logged, not raised.
     *
     * # Returns
     * - `false` for an unknown stream id.
     */
    pub fn stop_stream(&self, stream_id: &str, delete_listen_key: bool) -> bool {
        let listen_key = {
            let mut streams = self.stream_list.lock().unwrap();
            let Some(record) = streams.get_mut(stream_id) else {
                return false;
            };
            record.stop_request = true;
            let _ = record.stop_tx.send(true);
            record.listen_key.clone()
        };

        info!(stream_id, "Stop requested for stream");
        if delete_listen_key && listen_key.is_some() {
            let rest_client = Arc::clone(&self.rest_client);
            let stream_id = stream_id.to_string();
            tokio::spawn(async move {
                match rest_client.delete_listen_key(&stream_id).await {
                    Ok((_, status)) if status.is_ok() => {
                        debug!(stream_id = %stream_id, "Listen key deleted");
                    }
                    Ok((_, status)) => {
                        warn!(
                            stream_id = %stream_id,
                            code = status.code,
                            message = %status.message,
                            "Listen key deletion rejected"
                        );
                    }
                    Err(e) => {
                        warn!(stream_id = %stream_id, error = %e, "Listen key deletion failed");
                    }
                }
            });
        }
        true
    }

    /**
     * Stops the manager: every stream, the maintenance worker, and the
     * license handle.
     */
    #[instrument(skip(self))]
    pub async fn stop_manager(&self) {
        if self.stop_manager_request.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping Bybit websocket manager");

        let stream_ids: Vec<String> = {
            let streams = self.stream_list.lock().unwrap();
            streams.keys().cloned().collect()
        };
        for stream_id in &stream_ids {
            self.stop_stream(stream_id, true);
        }

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        loop {
            let all_terminal = {
                let streams = self.stream_list.lock().unwrap();
                streams.values().all(|record| record.status.is_terminal())
            };
            if all_terminal || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        if let Some(handle) = self.maintenance_handle.lock().unwrap().take() {
            handle.abort();
        }
        self.config.license_verifier.release();
        info!(streams = stream_ids.len(), "Bybit websocket manager stopped");
    }

    /**
     * Union-merges channels/markets into a stream's subscription sets and
     * queues the rebuilt subscribe payload for transmission.
     *
     * # Returns
     * - `Ok(false)` for an unknown stream id,
     *   `BybitStreamsError::SubscriptionLimitExceeded` when the merged cross
     *   product exceeds the endpoint family's cap.
     */
    pub fn subscribe_to_stream<C, CI, M, MI>(
        &self,
        stream_id: &str,
        channels: C,
        markets: M,
    ) -> Result<bool>
    where
        C: IntoIterator<Item = CI>,
        CI: Into<String>,
        M: IntoIterator<Item = MI>,
        MI: Into<String>,
    {
        let mut streams = self.stream_list.lock().unwrap();
        let Some(record) = streams.get_mut(stream_id) else {
            return Ok(false);
        };

        let mut merged_channels = record.specs.channels.clone();
        merged_channels.extend(channels.into_iter().map(Into::into));
        let mut merged_markets = record.specs.markets.clone();
        merged_markets.extend(
            markets
                .into_iter()
                .map(|market| market.into().to_uppercase()),
        );

        self.check_subscription_limit(
            &record.specs.endpoint,
            merged_channels.len() * merged_markets.len(),
        )?;

        record.specs.channels = merged_channels;
        record.specs.markets = merged_markets;
        let payloads = create_payload(
            SubscriptionMethod::Subscribe,
            &record.specs.channels,
            &record.specs.markets,
            self.settings.args_limit,
        );
        debug!(
            stream_id,
            subscriptions = record.specs.subscriptions(),
            chunks = payloads.len(),
            "Subscription payload queued"
        );
        record.pending_payloads.extend(payloads);
        Ok(true)
    }

    /**
     * Unsubscribing is accepted syntactically but not implemented at the
     * wire level in this revision; the call is rejected without a transmit.
     */
    pub fn unsubscribe_from_stream<C, CI, M, MI>(
        &self,
        _stream_id: &str,
        _channels: C,
        _markets: M,
    ) -> Result<bool>
    where
        C: IntoIterator<Item = CI>,
        CI: Into<String>,
        M: IntoIterator<Item = MI>,
        MI: Into<String>,
    {
        Err(BybitStreamsError::UnsubscribeNotSupported.into())
    }

    /**
     * Serializes a payload and queues it on a live socket.
     *
     * Waits up to `timeout` for the socket to become ready, which also
     * covers callers racing a `high_performance` `create_stream`. Fails
     * fast when the stream is stopping or crashing.
     *
     * # Returns
     * - `true` once the payload is queued for the worker's write cycle.
     */
    pub async fn send_with_stream(&self, stream_id: &str, payload: Value, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut payload = Some(payload);
        loop {
            {
                let mut streams = self.stream_list.lock().unwrap();
                let Some(record) = streams.get_mut(stream_id) else {
                    return false;
                };
                if record.stop_request || record.crash_request || record.status.is_terminal() {
                    return false;
                }
                if record.socket_is_ready {
                    if let Some(payload) = payload.take() {
                        record.pending_payloads.push_back(payload);
                    }
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(stream_id, "send_with_stream timed out waiting for a ready socket");
                return false;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /**
     * Appends a raw payload to a stream's pending list without waiting.
     */
    pub fn add_payload_to_stream(&self, stream_id: &str, payload: Value) -> bool {
        let mut streams = self.stream_list.lock().unwrap();
        match streams.get_mut(stream_id) {
            Some(record) => {
                record.pending_payloads.push_back(payload);
                true
            }
            None => false,
        }
    }

    // ---- query surface -------------------------------------------------

    pub fn get_stream_info(&self, stream_id: &str) -> Option<StreamInfo> {
        let now = unix_timestamp();
        let streams = self.stream_list.lock().unwrap();
        streams.get(stream_id).map(|record| record.info_snapshot(now))
    }

    pub fn get_stream_statistic(&self, stream_id: &str) -> Option<StreamStatistic> {
        let now = unix_timestamp();
        let streams = self.stream_list.lock().unwrap();
        streams
            .get(stream_id)
            .map(|record| record.statistic_snapshot(now))
    }

    pub fn get_stream_list(&self) -> HashMap<String, StreamInfo> {
        let now = unix_timestamp();
        let streams = self.stream_list.lock().unwrap();
        streams
            .iter()
            .map(|(id, record)| (id.clone(), record.info_snapshot(now)))
            .collect()
    }

    /**
     * Snapshots of all streams that have not reached a terminal status.
     */
    pub fn get_active_stream_list(&self) -> HashMap<String, StreamInfo> {
        let now = unix_timestamp();
        let streams = self.stream_list.lock().unwrap();
        streams
            .iter()
            .filter(|(_, record)| !record.status.is_terminal())
            .map(|(id, record)| (id.clone(), record.info_snapshot(now)))
            .collect()
    }

    pub fn get_number_of_streams_in_stream_list(&self) -> usize {
        self.stream_list.lock().unwrap().len()
    }

    pub fn get_number_of_subscriptions(&self, stream_id: &str) -> Option<usize> {
        let streams = self.stream_list.lock().unwrap();
        streams.get(stream_id).map(|record| record.specs.subscriptions())
    }

    pub fn get_number_of_all_subscriptions(&self) -> usize {
        let streams = self.stream_list.lock().unwrap();
        streams
            .values()
            .map(|record| record.specs.subscriptions())
            .sum()
    }

    /**
     * Subscription cap of the endpoint's market family, after overrides.
     */
    pub fn get_limit_of_subscriptions_per_stream(&self, endpoint: &str) -> Option<usize> {
        EndpointFamily::from_endpoint(endpoint)
            .map(|family| self.settings.max_subscriptions(family))
    }

    /**
     * Bytes received by one stream in the previous full second.
     */
    pub fn get_current_receiving_speed(&self, stream_id: &str) -> Option<u64> {
        let now_second = unix_second();
        let streams = self.stream_list.lock().unwrap();
        streams
            .get(stream_id)
            .map(|record| record.current_receiving_speed(now_second))
    }

    pub fn get_current_receiving_speed_global(&self) -> u64 {
        let now_second = unix_second();
        let streams = self.stream_list.lock().unwrap();
        streams
            .values()
            .map(|record| record.current_receiving_speed(now_second))
            .sum()
    }

    pub fn get_receiving_speed_peak(&self) -> u64 {
        self.receiving_speed_peak.load(Ordering::Relaxed)
    }

    pub fn get_stream_receives_last_second(&self, stream_id: &str) -> Option<u64> {
        let last_second = unix_second().saturating_sub(1);
        let streams = self.stream_list.lock().unwrap();
        streams.get(stream_id).map(|record| {
            record
                .receives_last_second
                .get(&last_second)
                .copied()
                .unwrap_or(0)
        })
    }

    pub fn get_all_receives_last_second(&self) -> u64 {
        let last_second = unix_second().saturating_sub(1);
        let streams = self.stream_list.lock().unwrap();
        streams
            .values()
            .map(|record| {
                record
                    .receives_last_second
                    .get(&last_second)
                    .copied()
                    .unwrap_or(0)
            })
            .sum()
    }

    pub fn get_total_received_bytes(&self) -> u64 {
        self.total_received_bytes.load(Ordering::Relaxed)
    }

    pub fn get_total_receives(&self) -> u64 {
        self.total_receives.load(Ordering::Relaxed)
    }

    pub fn get_total_transmitted(&self) -> u64 {
        self.total_transmitted.load(Ordering::Relaxed)
    }

    pub fn get_reconnects(&self) -> u64 {
        self.reconnects_total.load(Ordering::Relaxed)
    }

    pub fn get_most_receives_per_second(&self) -> u64 {
        self.most_receives_per_second.load(Ordering::Relaxed)
    }

    pub fn get_exchange(&self) -> &str {
        &self.config.exchange
    }

    pub fn get_start_time(&self) -> f64 {
        self.start_time
    }

    /**
     * A fresh UUID, as used for stream and request ids.
     */
    pub fn get_new_uuid() -> String {
        Uuid::new_v4().to_string()
    }

    /**
     * A fresh request id for `req_id`-tagged endpoint requests.
     */
    pub fn get_request_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub fn get_keep_max_received_last_second_entries(&self) -> usize {
        self.keep_max_received_last_second_entries
            .load(Ordering::Relaxed)
    }

    pub fn set_keep_max_received_last_second_entries(&self, entries: usize) {
        self.keep_max_received_last_second_entries
            .store(entries, Ordering::Relaxed);
    }

    // ---- stream buffers ------------------------------------------------

    /**
     * Pops one record from the global (`None`) or a named stream buffer.
     *
     * # Returns
     * - `None` when the buffer is empty or unknown.
     */
    pub fn pop_stream_data_from_stream_buffer(
        &self,
        stream_buffer_name: Option<&str>,
        mode: PopMode,
    ) -> Option<StreamData> {
        self.buffers.pop(stream_buffer_name, mode)
    }

    /**
     * Writes a record back into a stream buffer, e.g. after a failed
     * downstream store.
     */
    pub fn add_to_stream_buffer(&self, data: StreamData, stream_buffer_name: Option<&str>) {
        self.buffers.push(stream_buffer_name, data);
    }

    pub fn get_stream_buffer_length(&self, stream_buffer_name: Option<&str>) -> usize {
        self.buffers.len(stream_buffer_name)
    }

    pub fn get_stream_buffer_maxlen(&self, stream_buffer_name: Option<&str>) -> Option<usize> {
        self.buffers.maxlen(stream_buffer_name)
    }

    pub fn get_stream_buffer_byte_size(&self) -> usize {
        self.buffers.global_byte_size()
    }

    pub fn clear_stream_buffer(&self, stream_buffer_name: Option<&str>) {
        self.buffers.clear(stream_buffer_name);
    }

    // ---- signals -------------------------------------------------------

    pub fn pop_stream_signal_from_stream_signal_buffer(&self) -> Option<StreamSignal> {
        self.signal_buffer.lock().unwrap().pop_front()
    }

    pub fn is_stream_signal_buffer_enabled(&self) -> bool {
        self.config.enable_stream_signal_buffer
    }

    /**
     * Emits a lifecycle signal for a stream and records it on the stream.
     *
     * The signal goes to the user-supplied sink when configured, otherwise
     * to the signal buffer (when enabled). User code runs outside the
     * stream-table lock.
     */
    pub(crate) fn send_stream_signal(
        &self,
        signal_type: SignalType,
        stream_id: &str,
        data_record: Option<StreamData>,
        error: Option<String>,
    ) -> bool {
        {
            let mut streams = self.stream_list.lock().unwrap();
            match streams.get_mut(stream_id) {
                Some(record) => record.last_stream_signal = Some(signal_type),
                None => return false,
            }
        }
        let signal = StreamSignal {
            signal_type,
            stream_id: stream_id.to_string(),
            timestamp: unix_timestamp(),
            data_record,
            error,
        };
        debug!(stream_id, signal_type = ?signal.signal_type, "Stream signal emitted");
        match &self.signal_sink {
            SignalSink::Callback(callback) => callback(signal),
            SignalSink::Buffer => {
                if self.config.enable_stream_signal_buffer {
                    self.signal_buffer.lock().unwrap().push_back(signal);
                }
            }
        }
        true
    }

    // ---- ring buffers --------------------------------------------------

    pub fn add_to_ringbuffer_result(&self, result: Value) {
        self.ringbuffer_results.lock().unwrap().push(result);
    }

    pub fn add_to_ringbuffer_error(&self, error: Value) {
        self.ringbuffer_errors.lock().unwrap().push(error);
    }

    pub fn get_results_from_endpoints(&self) -> Vec<Value> {
        self.ringbuffer_results.lock().unwrap().to_vec()
    }

    pub fn get_errors_from_endpoints(&self) -> Vec<Value> {
        self.ringbuffer_errors.lock().unwrap().to_vec()
    }

    pub fn get_ringbuffer_result_max_size(&self) -> usize {
        self.ringbuffer_results.lock().unwrap().max_size()
    }

    pub fn get_ringbuffer_error_max_size(&self) -> usize {
        self.ringbuffer_errors.lock().unwrap().max_size()
    }

    pub fn set_ringbuffer_result_max_size(&self, max_size: usize) {
        self.ringbuffer_results.lock().unwrap().set_max_size(max_size);
    }

    pub fn set_ringbuffer_error_max_size(&self, max_size: usize) {
        self.ringbuffer_errors.lock().unwrap().set_max_size(max_size);
    }

    /**
     * Waits up to `timeout` for an endpoint response matching `request_id`.
     *
     * # Returns
     * - The matching response, or `None` on expiry; never a non-matching
     *   result.
     */
    pub async fn get_result_by_request_id(
        &self,
        request_id: &str,
        timeout: Duration,
    ) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(result) = self
                .ringbuffer_results
                .lock()
                .unwrap()
                .find_request_id(request_id)
            {
                return Some(result);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
        }
    }

    // ---- labels --------------------------------------------------------

    pub fn get_stream_label(&self, stream_id: &str) -> Option<String> {
        let streams = self.stream_list.lock().unwrap();
        streams
            .get(stream_id)
            .and_then(|record| record.specs.stream_label.clone())
    }

    pub fn set_stream_label(&self, stream_id: &str, stream_label: Option<String>) -> bool {
        let mut streams = self.stream_list.lock().unwrap();
        match streams.get_mut(stream_id) {
            Some(record) => {
                record.specs.stream_label = stream_label;
                true
            }
            None => false,
        }
    }

    pub fn get_stream_id_by_label(&self, stream_label: &str) -> Option<String> {
        let streams = self.stream_list.lock().unwrap();
        streams
            .iter()
            .find(|(_, record)| {
                record
                    .specs
                    .stream_label
                    .as_deref()
                    .is_some_and(|label| label == stream_label)
            })
            .map(|(id, _)| id.clone())
    }

    // ---- waiting and flags ---------------------------------------------

    /**
     * Waits until the stream reports `running`.
     *
     * # Arguments
     * - `timeout`: Bound; `Duration::ZERO` waits indefinitely.
     *
     * # Returns
     * - `false` on expiry, unknown stream id, or a terminal status.
     */
    pub async fn wait_till_stream_has_started(&self, stream_id: &str, timeout: Duration) -> bool {
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);
        loop {
            {
                let streams = self.stream_list.lock().unwrap();
                match streams.get(stream_id) {
                    None => return false,
                    Some(record) => {
                        if record.status == StreamStatus::Running {
                            return true;
                        }
                        if record.status.is_terminal() {
                            return false;
                        }
                    }
                }
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return false;
                }
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /**
     * Waits until the stream reaches a terminal status.
     *
     * # Arguments
     * - `timeout`: Bound; `Duration::ZERO` waits indefinitely.
     */
    pub async fn wait_till_stream_has_stopped(&self, stream_id: &str, timeout: Duration) -> bool {
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);
        loop {
            {
                let streams = self.stream_list.lock().unwrap();
                match streams.get(stream_id) {
                    None => return false,
                    Some(record) => {
                        if record.status.is_terminal() {
                            return true;
                        }
                    }
                }
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return false;
                }
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    pub fn is_manager_stopping(&self) -> bool {
        self.stop_manager_request.load(Ordering::SeqCst)
    }

    pub fn is_stop_request(&self, stream_id: &str) -> bool {
        let streams = self.stream_list.lock().unwrap();
        streams
            .get(stream_id)
            .map(|record| record.stop_request)
            .unwrap_or(false)
    }

    pub fn is_crash_request(&self, stream_id: &str) -> bool {
        let streams = self.stream_list.lock().unwrap();
        streams
            .get(stream_id)
            .map(|record| record.crash_request)
            .unwrap_or(false)
    }

    pub fn is_socket_ready(&self, stream_id: &str) -> bool {
        let streams = self.stream_list.lock().unwrap();
        streams
            .get(stream_id)
            .map(|record| record.socket_is_ready)
            .unwrap_or(false)
    }

    // ---- stream removal ------------------------------------------------

    /**
     * Stops a stream and removes its record from the stream list.
     *
     * # Returns
     * - `false` when the stream did not stop within `timeout`.
     */
    pub async fn delete_stream_from_stream_list(&self, stream_id: &str, timeout: Duration) -> bool {
        if !self.stop_stream(stream_id, true) {
            return false;
        }
        if !self.wait_till_stream_has_stopped(stream_id, timeout).await {
            return false;
        }
        self.stream_list.lock().unwrap().remove(stream_id).is_some()
    }

    /**
     * Stops a stream and removes its record plus its dedicated buffer.
     */
    pub async fn remove_all_data_of_stream_id(&self, stream_id: &str, timeout: Duration) -> bool {
        if !self.delete_stream_from_stream_list(stream_id, timeout).await {
            return false;
        }
        self.buffers.remove_named(stream_id);
        true
    }

    /**
     * Deletes the listen key attached to a stream via the REST collaborator.
     */
    pub async fn delete_listen_key_by_stream_id(&self, stream_id: &str) -> bool {
        match self.rest_client.delete_listen_key(stream_id).await {
            Ok((_, status)) => status.is_ok(),
            Err(e) => {
                warn!(stream_id, error = %e, "Listen key deletion failed");
                false
            }
        }
    }

    /**
     * The REST collaborator, for market enumeration.
     */
    pub fn rest_client(&self) -> Arc<BybitRestClient> {
        Arc::clone(&self.rest_client)
    }

    // ---- worker-facing internals ---------------------------------------

    pub(crate) fn resolved_settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    /**
     * Resolves the full websocket URI for an endpoint path.
     */
    pub(crate) fn create_websocket_uri(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.websocket_base_uri, self.settings.api_version, endpoint
        )
    }

    pub(crate) fn specs_snapshot(&self, stream_id: &str) -> Option<StreamSpecs> {
        let streams = self.stream_list.lock().unwrap();
        streams.get(stream_id).map(|record| record.specs.clone())
    }

    pub(crate) fn stop_watch(&self, stream_id: &str) -> Option<watch::Receiver<bool>> {
        let streams = self.stream_list.lock().unwrap();
        streams.get(stream_id).map(|record| record.stop_tx.subscribe())
    }

    /**
     * Marks a new connection attempt: status `starting`, socket not ready.
     */
    pub(crate) fn mark_connecting(&self, stream_id: &str, websocket_uri: &str) {
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            if !record.status.is_terminal() {
                record.status = StreamStatus::Starting;
            }
            record.socket_is_ready = false;
            record.websocket_uri = websocket_uri.to_string();
        }
    }

    /**
     * Marks the socket ready after subscriptions were sent. Resets the
     * first-data flag for the new connection epoch.
     */
    pub(crate) fn mark_connected(&self, stream_id: &str) {
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            if !record.status.is_terminal() {
                record.status = StreamStatus::Running;
            }
            record.socket_is_ready = true;
            record.has_received_first_data = false;
            record.last_heartbeat = Some(unix_timestamp());
        }
    }

    pub(crate) fn set_socket_is_not_ready(&self, stream_id: &str) {
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            record.socket_is_ready = false;
        }
    }

    pub(crate) fn last_heartbeat(&self, stream_id: &str) -> Option<f64> {
        let streams = self.stream_list.lock().unwrap();
        streams.get(stream_id).and_then(|record| record.last_heartbeat)
    }

    pub(crate) fn set_heartbeat(&self, stream_id: &str) {
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            record.last_heartbeat = Some(unix_timestamp());
        }
    }

    pub(crate) fn take_pending_payloads(&self, stream_id: &str) -> Vec<Value> {
        let mut streams = self.stream_list.lock().unwrap();
        match streams.get_mut(stream_id) {
            Some(record) => record.pending_payloads.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /**
     * Returns unsent payloads to the front of the pending list, preserving
     * their order for the next ready socket.
     */
    pub(crate) fn requeue_pending_payloads(&self, stream_id: &str, payloads: Vec<Value>) {
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            for payload in payloads.into_iter().rev() {
                record.pending_payloads.push_front(payload);
            }
        }
    }

    pub(crate) fn increase_transmitted_counter(&self, stream_id: &str) {
        self.total_transmitted.fetch_add(1, Ordering::Relaxed);
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            record.processed_transmitted_total += 1;
        }
    }

    /**
     * Updates the per-frame bookkeeping under the stream-table lock and
     * returns what the dispatcher needs to select the sink.
     */
    pub(crate) fn record_received_frame(
        &self,
        stream_id: &str,
        byte_size: usize,
        data: &StreamData,
    ) -> Option<FrameRouting> {
        let now = unix_timestamp();
        let now_second = now as u64;
        let routing = {
            let mut streams = self.stream_list.lock().unwrap();
            let record = streams.get_mut(stream_id)?;
            record.processed_receives_total += 1;
            *record.receives_last_second.entry(now_second).or_insert(0) += 1;
            *record.bytes_last_second.entry(now_second).or_insert(0) += byte_size as u64;
            record.last_heartbeat = Some(now);
            record.last_received_data_record = Some(data.clone());
            let first_data = !record.has_received_first_data;
            record.has_received_first_data = true;
            FrameRouting {
                first_data,
                route: record.specs.route.clone(),
                buffer_name: record.specs.buffer_name(),
            }
        };
        self.total_receives.fetch_add(1, Ordering::Relaxed);
        self.total_received_bytes
            .fetch_add(byte_size as u64, Ordering::Relaxed);
        Some(routing)
    }

    /**
     * Requests an unrepairable termination for a stream.
     */
    pub(crate) fn crash_stream(&self, stream_id: &str, reason: String) {
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            record.crash_request = true;
            record.crash_reason = Some(reason);
            let _ = record.stop_tx.send(true);
        }
    }

    pub(crate) fn crash_reason(&self, stream_id: &str) -> Option<String> {
        let streams = self.stream_list.lock().unwrap();
        streams
            .get(stream_id)
            .and_then(|record| record.crash_reason.clone())
    }

    // ---- supervisor transitions ----------------------------------------

    /**
     * Transitions a stream into `restarting` after a transient failure and
     * emits the `DISCONNECT` signal with the last received record.
     */
    pub(crate) fn stream_is_restarting(&self, stream_id: &str, error: Option<String>) {
        let data_record = {
            let mut streams = self.stream_list.lock().unwrap();
            let Some(record) = streams.get_mut(stream_id) else {
                return;
            };
            if record.status.is_terminal() {
                return;
            }
            record.status = StreamStatus::Restarting;
            record.socket_is_ready = false;
            record.reconnects += 1;
            record.logged_reconnects.push(unix_timestamp());
            record.last_received_data_record.clone()
        };
        self.reconnects_total.fetch_add(1, Ordering::Relaxed);
        warn!(stream_id, error = ?error, "Stream is restarting");
        self.send_stream_signal(SignalType::Disconnect, stream_id, data_record, error);
    }

    /**
     * Transitions a stream into the terminal `stopped` status and emits the
     * `STOP` signal. Idempotent.
     */
    pub(crate) fn stream_is_stopping(&self, stream_id: &str) {
        {
            let mut streams = self.stream_list.lock().unwrap();
            let Some(record) = streams.get_mut(stream_id) else {
                return;
            };
            if record.status.is_terminal() {
                return;
            }
            record.status = StreamStatus::Stopped;
            record.socket_is_ready = false;
            record.has_stopped = Some(unix_timestamp());
        }
        info!(stream_id, "Stream stopped");
        self.send_stream_signal(SignalType::Stop, stream_id, None, None);
    }

    /**
     * Transitions a stream into the terminal `crashed` status and emits the
     * `STREAM_UNREPAIRABLE` signal with the failure reason.
     */
    pub(crate) fn stream_is_crashing(&self, stream_id: &str, error: Option<String>) {
        let reason = {
            let mut streams = self.stream_list.lock().unwrap();
            let Some(record) = streams.get_mut(stream_id) else {
                return;
            };
            if record.status.is_terminal() {
                return;
            }
            let reason = error
                .or_else(|| record.crash_reason.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            record.status = StreamStatus::Crashed(reason.clone());
            record.socket_is_ready = false;
            record.has_stopped = Some(unix_timestamp());
            reason
        };
        error!(stream_id, reason = %reason, "Stream is unrepairable");
        self.send_stream_signal(
            SignalType::StreamUnrepairable,
            stream_id,
            None,
            Some(reason),
        );
    }

    // ---- maintenance ---------------------------------------------------

    /**
     * One maintenance sweep: refreshes per-stream and global peak receive
     * rates, trims the per-second histograms, and updates the global
     * receiving-speed peak.
     */
    pub(crate) fn run_maintenance_pass(&self) {
        let now_second = unix_second();
        let last_second = now_second.saturating_sub(1);
        let keep_max = self
            .keep_max_received_last_second_entries
            .load(Ordering::Relaxed)
            .max(1);
        let mut receives_last_second_total: u64 = 0;
        let mut bytes_last_second_total: u64 = 0;
        {
            let mut streams = self.stream_list.lock().unwrap();
            for record in streams.values_mut() {
                let receives = record
                    .receives_last_second
                    .get(&last_second)
                    .copied()
                    .unwrap_or(0);
                if receives > record.most_receives_per_second {
                    record.most_receives_per_second = receives;
                }
                receives_last_second_total += receives;
                bytes_last_second_total += record
                    .bytes_last_second
                    .get(&last_second)
                    .copied()
                    .unwrap_or(0);
                while record.receives_last_second.len() > keep_max {
                    record.receives_last_second.pop_first();
                }
                while record.bytes_last_second.len() > keep_max {
                    record.bytes_last_second.pop_first();
                }
            }
        }
        if receives_last_second_total > self.most_receives_per_second.load(Ordering::Relaxed) {
            self.most_receives_per_second
                .store(receives_last_second_total, Ordering::Relaxed);
        }
        if bytes_last_second_total > self.receiving_speed_peak.load(Ordering::Relaxed) {
            self.receiving_speed_peak
                .store(bytes_last_second_total, Ordering::Relaxed);
        }
    }

    /**
     * Removes every terminal stream older than `max_age` together with its
     * dedicated buffer.
     *
     * # Returns
     * - The number of removed streams.
     */
    pub(crate) fn cleanup_stopped_streams(&self, max_age: Duration) -> usize {
        let now = unix_timestamp();
        let removed: Vec<String> = {
            let mut streams = self.stream_list.lock().unwrap();
            let expired: Vec<String> = streams
                .iter()
                .filter(|(_, record)| {
                    record.status.is_terminal()
                        && record
                            .has_stopped
                            .is_some_and(|stopped| now - stopped > max_age.as_secs_f64())
                })
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                streams.remove(id);
            }
            expired
        };
        for stream_id in &removed {
            self.buffers.remove_named(stream_id);
            info!(stream_id = %stream_id, "Stopped stream garbage-collected");
        }
        removed.len()
    }

    // ---- helpers -------------------------------------------------------

    fn check_subscription_limit(
        &self,
        endpoint: &str,
        requested: usize,
    ) -> std::result::Result<(), BybitStreamsError> {
        if let Some(family) = EndpointFamily::from_endpoint(endpoint) {
            let limit = self.settings.max_subscriptions(family);
            if requested > limit {
                return Err(BybitStreamsError::SubscriptionLimitExceeded {
                    endpoint: endpoint.to_string(),
                    requested,
                    limit,
                });
            }
        }
        Ok(())
    }

    /**
     * Resolves the sink for a new stream by priority: stream consumer,
     * manager consumer (unless a specific callback exists), sync callback,
     * async callback, buffer target.
     */
    fn resolve_route(
        &self,
        options: &StreamOptions,
    ) -> (
        StreamRoute,
        Option<(mpsc::UnboundedReceiver<StreamData>, AsyncCallback)>,
    ) {
        if let Some(consumer) = options.stream_consumer.clone() {
            let (tx, rx) = mpsc::unbounded_channel();
            return (StreamRoute::AsyncQueue(tx), Some((rx, consumer)));
        }
        if let Some(consumer) = self.config.stream_consumer.clone() {
            if options.stream_data_callback.is_none()
                && options.stream_data_callback_async.is_none()
            {
                let (tx, rx) = mpsc::unbounded_channel();
                return (StreamRoute::AsyncQueue(tx), Some((rx, consumer)));
            }
        }
        if let Some(callback) = options
            .stream_data_callback
            .clone()
            .or_else(|| self.config.stream_data_callback.clone())
        {
            return (StreamRoute::SyncCb(callback), None);
        }
        if let Some(callback) = options
            .stream_data_callback_async
            .clone()
            .or_else(|| self.config.stream_data_callback_async.clone())
        {
            let (tx, rx) = mpsc::unbounded_channel();
            return (StreamRoute::AsyncCb(tx), Some((rx, callback)));
        }
        (StreamRoute::Buffered(options.buffer_target.clone()), None)
    }
}

#[cfg(test)]
impl BybitWebSocketManager {
    /**
     * Moves a terminated stream's stop timestamp into the past.
     */
    pub(crate) fn backdate_stopped_stream(&self, stream_id: &str, seconds: f64) {
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            record.has_stopped = record.has_stopped.map(|stopped| stopped - seconds);
        }
    }

    /**
     * Seeds the per-second histograms of a stream.
     */
    pub(crate) fn seed_histogram(&self, stream_id: &str, second: u64, receives: u64, bytes: u64) {
        let mut streams = self.stream_list.lock().unwrap();
        if let Some(record) = streams.get_mut(stream_id) {
            record.receives_last_second.insert(second, receives);
            record.bytes_last_second.insert(second, bytes);
        }
    }

    /**
     * Histogram sizes of a stream, for trim assertions.
     */
    pub(crate) fn histogram_lens(&self, stream_id: &str) -> Option<(usize, usize)> {
        let streams = self.stream_list.lock().unwrap();
        streams.get(stream_id).map(|record| {
            (
                record.receives_last_second.len(),
                record.bytes_last_second.len(),
            )
        })
    }
}

impl std::fmt::Debug for BybitWebSocketManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitWebSocketManager")
            .field("exchange", &self.config.exchange)
            .field("streams", &self.get_number_of_streams_in_stream_list())
            .finish_non_exhaustive()
    }
}
