use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Result;

type HmacSha256 = Hmac<Sha256>;

/**
 * API credentials for authenticated (private) streams.
 *
 * The secret is wiped from memory when the credentials are dropped.
 *
 * # Fields
 * - `api_key`: The Bybit API key sent in the auth request.
 * - `api_secret`: The HMAC signing secret; zeroized on drop.
 */
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiCredentials {
    #[zeroize(skip)]
    api_key: String,
    api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /**
     * Builds the websocket authentication payload.
     *
     * The signature is `hex(hmac_sha256(secret, "GET/realtime<expires>"))`
     * with `expires` a millisecond deadline in the near future.
     *
     * # Arguments
     * - `expires_ms`: Unix millisecond timestamp after which the auth
     *   request is rejected by the endpoint.
     *
     * # Returns
     * - The `{"op":"auth","args":[key, expires, signature]}` record.
     */
    pub fn websocket_auth_payload(&self, expires_ms: i64) -> Result<serde_json::Value> {
        let signature = self.sign(&format!("GET/realtime{expires_ms}"))?;
        Ok(serde_json::json!({
            "op": "auth",
            "args": [self.api_key, expires_ms, signature],
        }))
    }

    /**
     * Signs a payload with HMAC-SHA256, returning the hex digest.
     */
    pub fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid HMAC key length: {e}"))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}
