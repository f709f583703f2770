mod client;
mod types;

pub use client::{BybitRestApi, BybitRestClient};
pub use types::{ApiStatus, SymbolInfo, SymbolsResponse, SymbolsResult};
