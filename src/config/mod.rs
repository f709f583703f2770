mod connection_settings;
mod manager_config;
mod stream_options;

pub use connection_settings::{ConnectionSettings, EndpointFamily, resolve_connection_settings};
pub use manager_config::{ManagerConfig, ManagerConfigBuilder, Socks5Config};
pub use stream_options::{StreamOptions, StreamOptionsBuilder};
