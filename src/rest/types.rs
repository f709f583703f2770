use serde::{Deserialize, Serialize};

/**
 * One tradable market as reported by the instruments endpoint.
 *
 * # Fields
 * - `name`: Market symbol, e.g. `BTCUSDT`.
 * - `quote_currency`: Quote coin of the market.
 * - `status`: Trading status reported by the endpoint.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    #[serde(rename = "symbol")]
    pub name: String,
    #[serde(rename = "quoteCoin")]
    pub quote_currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsResult {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub list: Vec<SymbolInfo>,
}

/**
 * Envelope of the instruments-info endpoint.
 */
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsResponse {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg")]
    pub ret_msg: String,
    pub result: SymbolsResult,
}

impl SymbolsResponse {
    pub fn symbols(&self) -> &[SymbolInfo] {
        &self.result.list
    }
}

/**
 * API-level status extracted from an endpoint response envelope.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiStatus {
    pub code: i64,
    pub message: String,
}

impl ApiStatus {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}
