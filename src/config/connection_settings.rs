use crate::errors::BybitStreamsError;

/**
 * Static connection settings for one exchange.
 *
 * # Fields
 * - `websocket_base_uri`: Base URI all stream endpoints are resolved against.
 * - `restful_base_uri`: Base URI of the REST collaborator.
 * - `api_version`: Path segment between base URI and endpoint.
 * - `args_limit`: Maximum number of args per subscribe request.
 * - `max_subscriptions_spot`/`linear`/`inverse`/`option`: Per-stream
 *   subscription caps by endpoint family.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub websocket_base_uri: &'static str,
    pub restful_base_uri: &'static str,
    pub api_version: &'static str,
    pub args_limit: usize,
    pub max_subscriptions_spot: usize,
    pub max_subscriptions_linear: usize,
    pub max_subscriptions_inverse: usize,
    pub max_subscriptions_option: usize,
}

static CONNECTION_SETTINGS: phf::Map<&'static str, ConnectionSettings> = phf::phf_map! {
    "bybit.com" => ConnectionSettings {
        websocket_base_uri: "wss://stream.bybit.com",
        restful_base_uri: "https://api.bybit.com",
        api_version: "v5",
        args_limit: 350,
        max_subscriptions_spot: 10,
        max_subscriptions_linear: 2000,
        max_subscriptions_inverse: 2000,
        max_subscriptions_option: 2000,
    },
    "bybit.com-testnet" => ConnectionSettings {
        websocket_base_uri: "wss://stream-testnet.bybit.com",
        restful_base_uri: "https://api-testnet.bybit.com",
        api_version: "v5",
        args_limit: 350,
        max_subscriptions_spot: 10,
        max_subscriptions_linear: 2000,
        max_subscriptions_inverse: 2000,
        max_subscriptions_option: 2000,
    },
};

/**
 * Endpoint families carrying distinct subscription caps.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointFamily {
    Spot,
    Linear,
    Inverse,
    Option,
}

impl EndpointFamily {
    /**
     * Derives the family from an endpoint path like `public/linear`.
     *
     * # Returns
     * - `Some(family)` when the path names a known market category,
     *   `None` otherwise (private endpoints carry no cap).
     */
    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        if endpoint.contains("spot") {
            Some(EndpointFamily::Spot)
        } else if endpoint.contains("linear") {
            Some(EndpointFamily::Linear)
        } else if endpoint.contains("inverse") {
            Some(EndpointFamily::Inverse)
        } else if endpoint.contains("option") {
            Some(EndpointFamily::Option)
        } else {
            None
        }
    }
}

impl ConnectionSettings {
    /**
     * Returns the subscription cap for one endpoint family.
     */
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
 * Looks up the connection settings for an exchange name.
 *
 * # Arguments
 * - `exchange`: Exchange name, e.g. `bybit.com` or `bybit.com-testnet`.
 *
 * # Returns
 * - The static settings, or `BybitStreamsError::UnknownExchange`.
 */
pub fn resolve_connection_settings(exchange: &str) -> Result<&'static ConnectionSettings, BybitStreamsError> {
    CONNECTION_SETTINGS
        .get(exchange)
        .ok_or_else(|| BybitStreamsError::UnknownExchange(exchange.to_string()))
}
