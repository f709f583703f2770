mod buffers;
mod dispatcher;
mod maintenance;
mod manager;
mod payload;
mod record;
mod signals;
mod socket;
mod supervisor;
mod types;

#[cfg(test)]
mod tests;

pub use manager::BybitWebSocketManager;
pub use payload::SubscriptionMethod;
pub use record::{StreamInfo, StreamStatistic, StreamStatus};
pub use signals::{SignalCallback, SignalType, StreamSignal};
pub use types::{AsyncCallback, BufferTarget, OutputMode, PopMode, StreamData, SyncCallback};

/**
 * Wall-clock unix timestamp with sub-second precision.
 */
pub(crate) fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/**
 * Wall-clock unix timestamp truncated to full seconds.
 */
pub(crate) fn unix_second() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
