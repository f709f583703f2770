use std::sync::Arc;
use std::time::Duration;

use crate::auth::{LicenseVerifier, TokenLicenseVerifier};
use crate::streams::{AsyncCallback, OutputMode, SignalCallback, SyncCallback};

const DEFAULT_EXCHANGE: &str = "bybit.com";
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_RESTART_TIMEOUT: Duration = Duration::from_secs(6);
const DEFAULT_KEEP_MAX_RECEIVED_LAST_SECOND_ENTRIES: usize = 5;
const DEFAULT_RINGBUFFER_MAX_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct Socks5Config {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_verification: bool,
}

#[derive(Clone)]
pub struct ManagerConfig {
    pub exchange: String,
    pub output_default: OutputMode,
    pub enable_stream_signal_buffer: bool,
    pub auto_data_cleanup_stopped_streams: bool,
    pub stream_buffer_maxlen: Option<usize>,
    pub ping_interval_default: Duration,
    pub ping_timeout_default: Duration,
    pub close_timeout_default: Duration,
    pub restart_timeout: Duration,
    pub high_performance: bool,
    pub websocket_base_uri: Option<String>,
    pub restful_base_uri: Option<String>,
    pub max_subscriptions_per_stream_spot: Option<usize>,
    pub max_subscriptions_per_stream_linear: Option<usize>,
    pub max_subscriptions_per_stream_inverse: Option<usize>,
    pub max_subscriptions_per_stream_option: Option<usize>,
    pub socks5_proxy: Option<Socks5Config>,
    pub license_token: Option<String>,
    pub keep_max_received_last_second_entries: usize,
    pub ringbuffer_result_max_size: usize,
    pub ringbuffer_error_max_size: usize,
    pub(crate) license_verifier: Arc<dyn LicenseVerifier>,
    pub(crate) stream_data_callback: Option<SyncCallback>,
    pub(crate) stream_data_callback_async: Option<AsyncCallback>,
    pub(crate) stream_consumer: Option<AsyncCallback>,
    pub(crate) stream_signal_callback: Option<SignalCallback>,
}

pub struct ManagerConfigBuilder {
    exchange: String,
    output_default: OutputMode,
    enable_stream_signal_buffer: bool,
    auto_data_cleanup_stopped_streams: bool,
    stream_buffer_maxlen: Option<usize>,
    ping_interval_default: Duration,
    ping_timeout_default: Duration,
    close_timeout_default: Duration,
    restart_timeout: Duration,
    high_performance: bool,
    websocket_base_uri: Option<String>,
    restful_base_uri: Option<String>,
    max_subscriptions_per_stream_spot: Option<usize>,
    max_subscriptions_per_stream_linear: Option<usize>,
    max_subscriptions_per_stream_inverse: Option<usize>,
    max_subscriptions_per_stream_option: Option<usize>,
    socks5_proxy: Option<Socks5Config>,
    license_token: Option<String>,
    keep_max_received_last_second_entries: usize,
    ringbuffer_result_max_size: usize,
    ringbuffer_error_max_size: usize,
    license_verifier: Arc<dyn LicenseVerifier>,
    stream_data_callback: Option<SyncCallback>,
    stream_data_callback_async: Option<AsyncCallback>,
    stream_consumer: Option<AsyncCallback>,
    stream_signal_callback: Option<SignalCallback>,
}

impl ManagerConfig {
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::new()
    }
}

impl std::fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("exchange", &self.exchange)
            .field("output_default", &self.output_default)
            .field("enable_stream_signal_buffer", &self.enable_stream_signal_buffer)
            .field("auto_data_cleanup_stopped_streams", &self.auto_data_cleanup_stopped_streams)
            .field("stream_buffer_maxlen", &self.stream_buffer_maxlen)
            .field("restart_timeout", &self.restart_timeout)
            .field("high_performance", &self.high_performance)
            .field("websocket_base_uri", &self.websocket_base_uri)
            .field("socks5_proxy", &self.socks5_proxy.is_some())
            .finish_non_exhaustive()
    }
}

impl ManagerConfigBuilder {
    fn new() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            output_default: OutputMode::Raw,
            enable_stream_signal_buffer: false,
            auto_data_cleanup_stopped_streams: false,
            stream_buffer_maxlen: None,
            ping_interval_default: DEFAULT_PING_INTERVAL,
            ping_timeout_default: DEFAULT_PING_TIMEOUT,
            close_timeout_default: DEFAULT_CLOSE_TIMEOUT,
            restart_timeout: DEFAULT_RESTART_TIMEOUT,
            high_performance: false,
            websocket_base_uri: None,
            restful_base_uri: None,
            max_subscriptions_per_stream_spot: None,
            max_subscriptions_per_stream_linear: None,
            max_subscriptions_per_stream_inverse: None,
            max_subscriptions_per_stream_option: None,
            socks5_proxy: None,
            license_token: None,
            keep_max_received_last_second_entries: DEFAULT_KEEP_MAX_RECEIVED_LAST_SECOND_ENTRIES,
            ringbuffer_result_max_size: DEFAULT_RINGBUFFER_MAX_SIZE,
            ringbuffer_error_max_size: DEFAULT_RINGBUFFER_MAX_SIZE,
            license_verifier: Arc::new(TokenLicenseVerifier),
            stream_data_callback: None,
            stream_data_callback_async: None,
            stream_consumer: None,
            stream_signal_callback: None,
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_output_default(mut self, output: OutputMode) -> Self {
        self.output_default = output;
        self
    }

    pub fn with_stream_signal_buffer(mut self, enabled: bool) -> Self {
        self.enable_stream_signal_buffer = enabled;
        self
    }

    pub fn with_auto_data_cleanup_stopped_streams(mut self, enabled: bool) -> Self {
        self.auto_data_cleanup_stopped_streams = enabled;
        self
    }

    pub fn with_stream_buffer_maxlen(mut self, maxlen: usize) -> Self {
        self.stream_buffer_maxlen = Some(maxlen);
        self
    }

    pub fn with_ping_interval_default(mut self, interval: Duration) -> Self {
        self.ping_interval_default = interval;
        self
    }

    pub fn with_ping_timeout_default(mut self, timeout: Duration) -> Self {
        self.ping_timeout_default = timeout;
        self
    }

    pub fn with_close_timeout_default(mut self, timeout: Duration) -> Self {
        self.close_timeout_default = timeout;
        self
    }

    pub fn with_restart_timeout(mut self, timeout: Duration) -> Self {
        self.restart_timeout = timeout;
        self
    }

    pub fn with_high_performance(mut self, enabled: bool) -> Self {
        self.high_performance = enabled;
        self
    }

    pub fn with_websocket_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.websocket_base_uri = Some(uri.into());
        self
    }

    pub fn with_restful_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.restful_base_uri = Some(uri.into());
        self
    }

    pub fn with_max_subscriptions_per_stream_spot(mut self, max: usize) -> Self {
        self.max_subscriptions_per_stream_spot = Some(max);
        self
    }

    pub fn with_max_subscriptions_per_stream_linear(mut self, max: usize) -> Self {
        self.max_subscriptions_per_stream_linear = Some(max);
        self
    }

    pub fn with_max_subscriptions_per_stream_inverse(mut self, max: usize) -> Self {
        self.max_subscriptions_per_stream_inverse = Some(max);
        self
    }

    pub fn with_max_subscriptions_per_stream_option(mut self, max: usize) -> Self {
        self.max_subscriptions_per_stream_option = Some(max);
        self
    }

    pub fn with_socks5_proxy(mut self, proxy: Socks5Config) -> Self {
        self.socks5_proxy = Some(proxy);
        self
    }

    pub fn with_license_token(mut self, token: impl Into<String>) -> Self {
        self.license_token = Some(token.into());
        self
    }

    pub fn with_license_verifier(mut self, verifier: Arc<dyn LicenseVerifier>) -> Self {
        self.license_verifier = verifier;
        self
    }

    pub fn with_keep_max_received_last_second_entries(mut self, entries: usize) -> Self {
        self.keep_max_received_last_second_entries = entries;
        self
    }

    pub fn with_ringbuffer_result_max_size(mut self, max_size: usize) -> Self {
        self.ringbuffer_result_max_size = max_size;
        self
    }

    pub fn with_ringbuffer_error_max_size(mut self, max_size: usize) -> Self {
        self.ringbuffer_error_max_size = max_size;
        self
    }

    pub fn with_stream_data_callback(mut self, callback: SyncCallback) -> Self {
        self.stream_data_callback = Some(callback);
        self
    }

    pub fn with_stream_data_callback_async(mut self, callback: AsyncCallback) -> Self {
        self.stream_data_callback_async = Some(callback);
        self
    }

    pub fn with_stream_consumer(mut self, consumer: AsyncCallback) -> Self {
        self.stream_consumer = Some(consumer);
        self
    }

    pub fn with_stream_signal_callback(mut self, callback: SignalCallback) -> Self {
        self.stream_signal_callback = Some(callback);
        self
    }

    pub fn build(self) -> ManagerConfig {
        ManagerConfig {
            exchange: self.exchange,
            output_default: self.output_default,
            enable_stream_signal_buffer: self.enable_stream_signal_buffer,
            auto_data_cleanup_stopped_streams: self.auto_data_cleanup_stopped_streams,
            stream_buffer_maxlen: self.stream_buffer_maxlen,
            ping_interval_default: self.ping_interval_default,
            ping_timeout_default: self.ping_timeout_default,
            close_timeout_default: self.close_timeout_default,
            restart_timeout: self.restart_timeout,
            high_performance: self.high_performance,
            websocket_base_uri: self.websocket_base_uri,
            restful_base_uri: self.restful_base_uri,
            max_subscriptions_per_stream_spot: self.max_subscriptions_per_stream_spot,
            max_subscriptions_per_stream_linear: self.max_subscriptions_per_stream_linear,
            max_subscriptions_per_stream_inverse: self.max_subscriptions_per_stream_inverse,
            max_subscriptions_per_stream_option: self.max_subscriptions_per_stream_option,
            socks5_proxy: self.socks5_proxy,
            license_token: self.license_token,
            keep_max_received_last_second_entries: self.keep_max_received_last_second_entries,
            ringbuffer_result_max_size: self.ringbuffer_result_max_size,
            ringbuffer_error_max_size: self.ringbuffer_error_max_size,
            license_verifier: self.license_verifier,
            stream_data_callback: self.stream_data_callback,
            stream_data_callback_async: self.stream_data_callback_async,
            stream_consumer: self.stream_consumer,
            stream_signal_callback: self.stream_signal_callback,
        }
    }
}

impl Default for ManagerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
