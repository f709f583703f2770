use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/**
 * Synchronous per-frame callback.
 *
 * Invoked with the received record and the stream buffer name the record
 * would otherwise have been routed to. Runs on the socket worker's task;
 * back-pressure is explicit. Returning an error crashes the stream.
 */
pub type SyncCallback = Arc<dyn Fn(StreamData, Option<String>) -> crate::Result<()> + Send + Sync>;

/**
 * Asynchronous per-frame callback.
 *
 * Awaited sequentially on the stream's consumer task, so delivery stays in
 * arrival order. Returning an error crashes the stream.
 */
pub type AsyncCallback = Arc<dyn Fn(StreamData) -> BoxFuture<'static, crate::Result<()>> + Send + Sync>;

/**
 * Output format delivered to sinks.
 *
 * # Variants
 * - `Raw`: The text frame is forwarded unchanged.
 * - `Decoded`: The frame is JSON-decoded before delivery.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Raw,
    Decoded,
}

/**
 * One received record as seen by a sink.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamData {
    Raw(String),
    Decoded(Value),
}

impl StreamData {
    /**
     * Approximate in-memory payload size in bytes.
     */
    pub fn byte_size(&self) -> usize {
        match self {
            StreamData::Raw(text) => text.len(),
            StreamData::Decoded(value) => value.to_string().len(),
        }
    }
}

/**
 * Routing target for buffered delivery.
 *
 * # Variants
 * - `Global`: The manager-wide shared stream buffer.
 * - `StreamId`: A dedicated buffer keyed by this stream's id.
 * - `Named`: A shared buffer keyed by a caller-supplied name; survives
 *   stream restarts.
 */
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BufferTarget {
    #[default]
    Global,
    StreamId,
    Named(String),
}

/**
 * Pop order for stream buffers.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopMode {
    #[default]
    Fifo,
    Lifo,
}

/**
 * The sink selected for a stream at create time.
 *
 * The ingress dispatcher is a single match on this value; exactly one sink
 * observes every received record.
 *
 * # Variants
 * - `AsyncQueue`: In-order queue drained by the stream's consumer task.
 * - `SyncCb`: Synchronous callback invoked on the worker task.
 * - `AsyncCb`: In-order queue drained by a callback task.
 * - `Buffered`: Appended to the configured buffer target.
 */
#[derive(Clone)]
pub(crate) enum StreamRoute {
    AsyncQueue(mpsc::UnboundedSender<StreamData>),
    SyncCb(SyncCallback),
    AsyncCb(mpsc::UnboundedSender<StreamData>),
    Buffered(BufferTarget),
}

impl std::fmt::Debug for StreamRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamRoute::AsyncQueue(_) => write!(f, "AsyncQueue"),
            StreamRoute::SyncCb(_) => write!(f, "SyncCb"),
            StreamRoute::AsyncCb(_) => write!(f, "AsyncCb"),
            StreamRoute::Buffered(target) => write!(f, "Buffered({target:?})"),
        }
    }
}
