mod auth;
mod config;
mod errors;
pub mod rest;
pub mod streams;

pub use auth::{ApiCredentials, LicenseVerifier, TokenLicenseVerifier};
pub use config::{
    ConnectionSettings, EndpointFamily, ManagerConfig, ManagerConfigBuilder, Socks5Config,
    StreamOptions, StreamOptionsBuilder, resolve_connection_settings,
};
pub use errors::{BybitStreamsError, RestartDecision, SocketFailure};
pub use streams::{
    AsyncCallback, BufferTarget, BybitWebSocketManager, OutputMode, PopMode, SignalCallback,
    SignalType, StreamData, StreamInfo, StreamSignal, StreamStatistic, StreamStatus,
    SubscriptionMethod, SyncCallback,
};

pub type Result<T> = anyhow::Result<T>;
