use std::collections::BTreeSet;

use serde_json::{Value, json};
use tracing::debug;

/**
 * Subscription request method.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMethod {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionMethod {
    fn op(&self) -> &'static str {
        match self {
            SubscriptionMethod::Subscribe => "subscribe",
            SubscriptionMethod::Unsubscribe => "unsubscribe",
        }
    }
}

/**
 * Builds the subscription payloads for a (channels x markets) cross product.
 *
 * Args take the form `<channel>.<MARKET>` with the market upper-cased.
 * Sending more than ~8000 chars in one `websocket.send()` risks a connection
 * loss, so the args are chunked at `max_items_per_request` per payload.
 *
 * # Arguments
 * - `method`: `Subscribe` or `Unsubscribe`.
 * - `channels`: Channels to combine, e.g. `kline.1`.
 * - `markets`: Markets to combine, e.g. `BTCUSDT`.
 * - `max_items_per_request`: Maximum args per payload (350 keeps the
 *   serialized form under the frame budget).
 *
 * # Returns
 * - One `{"op": ..., "args": [...]}` record per chunk; empty input produces
 *   an empty list.
 */
pub fn create_payload(
    method: SubscriptionMethod,
    channels: &BTreeSet<String>,
    markets: &BTreeSet<String>,
    max_items_per_request: usize,
) -> Vec<Value> {
    let args: Vec<String> = channels
        .iter()
        .flat_map(|channel| {
            markets
                .iter()
                .map(move |market| format!("{}.{}", channel, market.to_uppercase()))
        })
        .collect();

    let payload = split_payload(method, &args, max_items_per_request);
    debug!(
        channels = channels.len(),
        markets = markets.len(),
        chunks = payload.len(),
        "Subscription payload created"
    );
    payload
}

/**
 * Chunks a flat arg list into payload records of bounded size.
 */
pub fn split_payload(method: SubscriptionMethod, args: &[String], max_items_per_request: usize) -> Vec<Value> {
    let limit = max_items_per_request.max(1);
    args.chunks(limit)
        .map(|chunk| {
            json!({
                "op": method.op(),
                "args": chunk,
            })
        })
        .collect()
}
