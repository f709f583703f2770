use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/**
 * Failure taxonomy for one socket worker run.
 *
 * Every way a worker can exit its connection attempt or read/write loop maps
 * to exactly one variant; the supervisor matches on `decision()` to pick the
 * restart policy. User-visible reasons come from the `Display` impl.
 *
 * # Variants
 * - `Reset`: connection reset or heartbeat silence past the ping timeout.
 * - `Tls`: TLS layer failure.
 * - `Os`: OS-level network error (includes connect timeouts).
 * - `PeerClosed`: the remote endpoint closed the connection.
 * - `BadStatus`: non-101 HTTP status on the websocket upgrade.
 * - `BadMessage`: protocol-level invalid frame or capacity violation.
 * - `Negotiation`: malformed upgrade request/response.
 * - `ProxyHandshake`: SOCKS5 tunnel could not be established.
 * - `Cancelled`: stop requested while the worker was running.
 * - `Crash`: unrepairable condition reported by the dispatcher or a consumer.
 */
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SocketFailure {
    #[error("connection reset")]
    Reset,

    #[error("TLS error")]
    Tls,

    #[error("OS network error: {0}")]
    Os(String),

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("websocket upgrade rejected with HTTP status {0}")]
    BadStatus(u16),

    #[error("invalid websocket message: {0}")]
    BadMessage(String),

    #[error("websocket negotiation failed: {0}")]
    Negotiation(String),

    #[error("SOCKS5 proxy handshake failed: {0}")]
    ProxyHandshake(String),

    #[error("cancelled by stop request")]
    Cancelled,

    #[error("stream is crashing: {0}")]
    Crash(String),
}

/**
 * Restart policy derived from a socket failure.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart,
    Stop,
    Crash,
}

impl SocketFailure {
    /**
     * Classifies this failure into the supervisor's restart policy.
     *
     * HTTP 429 on upgrade, negotiation failures and explicit crash requests
     * are unrepairable; a stop request terminates cleanly; everything else
     * is transient and restarts the stream.
     *
     * # Returns
     * - The `RestartDecision` the supervisor acts on.
     */
    pub fn decision(&self) -> RestartDecision {
        match self {
            SocketFailure::BadStatus(429) => RestartDecision::Crash,
            SocketFailure::Negotiation(_) => RestartDecision::Crash,
            SocketFailure::Crash(_) => RestartDecision::Crash,
            SocketFailure::Cancelled => RestartDecision::Stop,
            SocketFailure::Reset
            | SocketFailure::Tls
            | SocketFailure::Os(_)
            | SocketFailure::PeerClosed
            | SocketFailure::BadStatus(_)
            | SocketFailure::BadMessage(_)
            | SocketFailure::ProxyHandshake(_) => RestartDecision::Restart,
        }
    }

    /**
     * Maps a tungstenite error into the failure taxonomy.
     */
    pub fn from_tungstenite(error: &WsError) -> Self {
        match error {
            WsError::ConnectionClosed | WsError::AlreadyClosed => SocketFailure::PeerClosed,
            WsError::Io(io) => {
                if io.kind() == std::io::ErrorKind::ConnectionReset {
                    SocketFailure::Reset
                } else {
                    SocketFailure::Os(io.to_string())
                }
            }
            WsError::Tls(_) => SocketFailure::Tls,
            WsError::Capacity(e) => SocketFailure::BadMessage(e.to_string()),
            WsError::Protocol(e) => SocketFailure::BadMessage(e.to_string()),
            WsError::Http(response) => SocketFailure::BadStatus(response.status().as_u16()),
            WsError::HttpFormat(e) => SocketFailure::Negotiation(e.to_string()),
            WsError::Url(e) => SocketFailure::Negotiation(e.to_string()),
            other => SocketFailure::Os(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * Tests that every transient failure restarts and every terminal one
     * maps to its terminal decision.
     */
    #[test]
    fn test_restart_classification() {
        // Transient conditions restart the stream.
        for failure in [
            SocketFailure::Reset,
            SocketFailure::Tls,
            SocketFailure::Os("broken pipe".to_string()),
            SocketFailure::PeerClosed,
            SocketFailure::BadStatus(400),
            SocketFailure::BadStatus(500),
            SocketFailure::BadMessage("bad frame".to_string()),
            SocketFailure::ProxyHandshake("refused".to_string()),
        ] {
            assert_eq!(failure.decision(), RestartDecision::Restart, "{failure}");
        }

        // HTTP 429, negotiation failures and crash requests are fatal.
        assert_eq!(SocketFailure::BadStatus(429).decision(), RestartDecision::Crash);
        assert_eq!(
            SocketFailure::Negotiation("bad upgrade".to_string()).decision(),
            RestartDecision::Crash
        );
        assert_eq!(
            SocketFailure::Crash("consumer failed".to_string()).decision(),
            RestartDecision::Crash
        );

        // A stop request terminates cleanly.
        assert_eq!(SocketFailure::Cancelled.decision(), RestartDecision::Stop);
    }
}
