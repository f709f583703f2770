use std::time::Duration;

use crate::auth::ApiCredentials;
use crate::streams::{AsyncCallback, BufferTarget, OutputMode, SyncCallback};

/**
 * Per-stream options for `create_stream`.
 *
 * Unset fields fall back to the manager-wide defaults. The configured
 * callbacks take precedence over the manager-level ones according to the
 * dispatcher's sink priority.
 */
#[derive(Clone, Default)]
pub struct StreamOptions {
    pub stream_label: Option<String>,
    pub buffer_target: BufferTarget,
    pub stream_buffer_maxlen: Option<usize>,
    pub output: Option<OutputMode>,
    pub ping_interval: Option<Duration>,
    pub ping_timeout: Option<Duration>,
    pub close_timeout: Option<Duration>,
    pub credentials: Option<ApiCredentials>,
    pub(crate) stream_data_callback: Option<SyncCallback>,
    pub(crate) stream_data_callback_async: Option<AsyncCallback>,
    pub(crate) stream_consumer: Option<AsyncCallback>,
}

pub struct StreamOptionsBuilder {
    options: StreamOptions,
}

impl StreamOptions {
    pub fn builder() -> StreamOptionsBuilder {
        StreamOptionsBuilder {
            options: StreamOptions::default(),
        }
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("stream_label", &self.stream_label)
            .field("buffer_target", &self.buffer_target)
            .field("stream_buffer_maxlen", &self.stream_buffer_maxlen)
            .field("output", &self.output)
            .field("has_credentials", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl StreamOptionsBuilder {
    pub fn with_stream_label(mut self, label: impl Into<String>) -> Self {
        self.options.stream_label = Some(label.into());
        self
    }

    pub fn with_buffer_target(mut self, target: BufferTarget) -> Self {
        self.options.buffer_target = target;
        self
    }

    pub fn with_stream_buffer_maxlen(mut self, maxlen: usize) -> Self {
        self.options.stream_buffer_maxlen = Some(maxlen);
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.options.output = Some(output);
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.options.ping_interval = Some(interval);
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.options.ping_timeout = Some(timeout);
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.options.close_timeout = Some(timeout);
        self
    }

    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.options.credentials = Some(credentials);
        self
    }

    pub fn with_stream_data_callback(mut self, callback: SyncCallback) -> Self {
        self.options.stream_data_callback = Some(callback);
        self
    }

    pub fn with_stream_data_callback_async(mut self, callback: AsyncCallback) -> Self {
        self.options.stream_data_callback_async = Some(callback);
        self
    }

    pub fn with_stream_consumer(mut self, consumer: AsyncCallback) -> Self {
        self.options.stream_consumer = Some(consumer);
        self
    }

    pub fn build(self) -> StreamOptions {
        self.options
    }
}
