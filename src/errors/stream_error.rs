use thiserror::Error;

/**
 * Main error type for the Bybit stream manager.
 *
 * This enum covers the construction and caller errors the manager raises
 * directly. Transient network conditions never surface here; they are
 * classified by the supervisor and reported through stream status and
 * signals instead.
 *
 * # Design Principles
 * - Construction errors: unknown exchange, missing/invalid license
 * - Caller errors: invalid `create_stream` / `subscribe_to_stream` input
 * - No wrapping: network, parsing, etc. bubble up via anyhow
 */
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BybitStreamsError {
    /**
     * The exchange name is not present in the connection settings table.
     */
    #[error("Unknown exchange '{0}': no connection settings available")]
    UnknownExchange(String),

    /**
     * Construction was attempted without a validated license.
     */
    #[error("No validated license: {0}")]
    MissingLicense(String),

    /**
     * `create_stream` was called without an endpoint.
     */
    #[error("Parameter `endpoint` is missing: a stream needs an endpoint like 'public/linear'")]
    MissingEndpoint,

    /**
     * The subscription cross-product would exceed the endpoint family's cap.
     */
    #[error(
        "Subscription limit exceeded on '{endpoint}': {requested} subscriptions requested, \
         limit is {limit}"
    )]
    SubscriptionLimitExceeded {
        endpoint: String,
        requested: usize,
        limit: usize,
    },

    /**
     * Unsubscribing at the wire level is not supported in this revision.
     */
    #[error("Unsubscribe is currently not available on Bybit websockets")]
    UnsubscribeNotSupported,
}
