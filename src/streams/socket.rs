use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, client_async_tls_with_config};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Socks5Config;
use crate::errors::SocketFailure;
use super::dispatcher;
use super::manager::BybitWebSocketManager;
use super::payload::{SubscriptionMethod, create_payload};
use super::record::StreamSpecs;
use super::signals::SignalType;
use super::unix_timestamp;

const PAYLOAD_DRAIN_INTERVAL: Duration = Duration::from_millis(100);
const MIN_PING_INTERVAL: Duration = Duration::from_millis(100);

/**
 * One complete socket run for a stream: connect, authenticate, subscribe,
 * then the read/write cycle until a termination condition.
 *
 * # Returns
 * - The `SocketFailure` describing why the run ended; the supervisor
 *   classifies it into a restart decision.
 */
#[instrument(skip(manager))]
pub(super) async fn run_socket(manager: &Arc<BybitWebSocketManager>, stream_id: &str) -> SocketFailure {
    let Some(specs) = manager.specs_snapshot(stream_id) else {
        return SocketFailure::Cancelled;
    };
    let Some(mut stop_rx) = manager.stop_watch(stream_id) else {
        return SocketFailure::Cancelled;
    };

    let uri = manager.create_websocket_uri(&specs.endpoint);
    manager.mark_connecting(stream_id, &uri);
    debug!(stream_id, uri = %uri, "Connecting stream socket");

    let restart_timeout = manager.config.restart_timeout;
    match manager.config.socks5_proxy.clone() {
        Some(proxy) => {
            let connected = await_connect(
                connect_via_socks5(&uri, &proxy),
                restart_timeout,
                &mut stop_rx,
            )
            .await;
            match connected {
                Ok(stream) => drive_socket(manager, stream_id, specs, stream, stop_rx).await,
                Err(failure) => failure,
            }
        }
        None => {
            let connected =
                await_connect(connect_direct(&uri), restart_timeout, &mut stop_rx).await;
            match connected {
                Ok(stream) => drive_socket(manager, stream_id, specs, stream, stop_rx).await,
                Err(failure) => failure,
            }
        }
    }
}

/**
 * Bounds a connection attempt by the restart timeout and the stop channel.
 */
async fn await_connect<F, S>(
    connect: F,
    restart_timeout: Duration,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<WebSocketStream<S>, SocketFailure>
where
    F: std::future::Future<Output = Result<WebSocketStream<S>, SocketFailure>>,
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        result = tokio::time::timeout(restart_timeout, connect) => match result {
            Ok(result) => result,
            Err(_) => Err(SocketFailure::Os("connection attempt timed out".to_string())),
        },
        _ = stop_rx.changed() => Err(SocketFailure::Cancelled),
    }
}

async fn connect_direct(
    uri: &str,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, SocketFailure> {
    let request = build_websocket_request(uri)?;
    match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _)) => Ok(stream),
        Err(e) => Err(SocketFailure::from_tungstenite(&e)),
    }
}

/**
 * Tunnels the TCP connection through a SOCKS5 proxy, then runs the TLS and
 * websocket handshakes on top of the tunneled stream.
 */
async fn connect_via_socks5(
    uri: &str,
    proxy: &Socks5Config,
) -> Result<WebSocketStream<MaybeTlsStream<Socks5Stream<TcpStream>>>, SocketFailure> {
    let url = Url::parse(uri).map_err(|e| SocketFailure::Negotiation(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| SocketFailure::Negotiation("websocket URI is missing a host".to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| SocketFailure::Negotiation("websocket URI is missing a port".to_string()))?;

    let stream = match (&proxy.username, &proxy.password) {
        (Some(username), Some(password)) => {
            Socks5Stream::connect_with_password(proxy.server.as_str(), (host, port), username, password)
                .await
        }
        _ => Socks5Stream::connect(proxy.server.as_str(), (host, port)).await,
    }
    .map_err(|e| SocketFailure::ProxyHandshake(e.to_string()))?;

    let connector = if proxy.ssl_verification {
        None
    } else {
        Some(Connector::Rustls(Arc::new(insecure_tls_config())))
    };
    let request = build_websocket_request(uri)?;
    match client_async_tls_with_config(request, stream, None, connector).await {
        Ok((stream, _)) => Ok(stream),
        Err(e) => Err(SocketFailure::from_tungstenite(&e)),
    }
}

/**
 * Builds a standard websocket upgrade request for the URI.
 */
fn build_websocket_request(uri: &str) -> Result<Request<()>, SocketFailure> {
    use tokio_tungstenite::tungstenite::http::Uri;

    let parsed: Uri = uri
        .parse()
        .map_err(|e: tokio_tungstenite::tungstenite::http::uri::InvalidUri| {
            SocketFailure::Negotiation(e.to_string())
        })?;
    let host = parsed
        .host()
        .ok_or_else(|| SocketFailure::Negotiation("websocket URI is missing a host".to_string()))?;
    let host_header = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Request::builder()
        .uri(uri)
        .header("Host", host_header)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .body(())
        .map_err(|e| SocketFailure::Negotiation(e.to_string()))
}

/**
 * Certificate verifier that accepts any chain; used when the caller
 * explicitly disabled TLS verification for a proxied connection.
 */
struct NoCertificateVerification;

impl rustls::client::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

fn insecure_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
        .with_no_client_auth()
}

/**
 * Websocket connection wrapper over split read and write halves.
 */
struct SocketConnection<S> {
    write: SplitSink<WebSocketStream<S>, Message>,
    read: SplitStream<WebSocketStream<S>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SocketConnection<S> {
    fn new(stream: WebSocketStream<S>) -> Self {
        let (write, read) = stream.split();
        Self { write, read }
    }

    async fn send_message(&mut self, message: Message) -> Result<(), SocketFailure> {
        self.write
            .send(message)
            .await
            .map_err(|e| SocketFailure::from_tungstenite(&e))
    }

    async fn next_message(&mut self) -> Option<Result<Message, WsError>> {
        self.read.next().await
    }

    async fn close(&mut self) -> Result<(), SocketFailure> {
        self.write
            .send(Message::Close(None))
            .await
            .map_err(|e| SocketFailure::from_tungstenite(&e))
    }
}

/**
 * Runs the read/write cycle on an established connection.
 *
 * On entry: authenticates private endpoints, sends the chunked subscribe
 * payloads, marks the socket ready and emits `CONNECT`. The loop then
 * receives frames, answers pings, watches the heartbeat, and drains
 * payloads queued by the manager while the socket was not ready.
 */
async fn drive_socket<S>(
    manager: &Arc<BybitWebSocketManager>,
    stream_id: &str,
    specs: StreamSpecs,
    stream: WebSocketStream<S>,
    mut stop_rx: watch::Receiver<bool>,
) -> SocketFailure
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut connection = SocketConnection::new(stream);

    if let Some(credentials) = &specs.credentials {
        let expires_ms = chrono::Utc::now().timestamp_millis() + 10_000;
        match credentials.websocket_auth_payload(expires_ms) {
            Ok(payload) => {
                if let Err(failure) = connection.send_message(Message::Text(payload.to_string())).await {
                    return failure;
                }
                manager.increase_transmitted_counter(stream_id);
            }
            Err(e) => return SocketFailure::Crash(format!("authentication failed: {e:#}")),
        }
    }

    let args_limit = manager.resolved_settings().args_limit;
    let payloads = create_payload(
        SubscriptionMethod::Subscribe,
        &specs.channels,
        &specs.markets,
        args_limit,
    );
    for payload in &payloads {
        if let Err(failure) = connection.send_message(Message::Text(payload.to_string())).await {
            return failure;
        }
        manager.increase_transmitted_counter(stream_id);
    }

    manager.mark_connected(stream_id);
    manager.send_stream_signal(SignalType::Connect, stream_id, None, None);
    info!(
        stream_id,
        subscriptions = specs.subscriptions(),
        chunks = payloads.len(),
        "Stream socket connected and subscribed"
    );

    let epoch_start = unix_timestamp();
    let mut ping_timer = tokio::time::interval(specs.ping_interval.max(MIN_PING_INTERVAL));
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut drain_timer = tokio::time::interval(PAYLOAD_DRAIN_INTERVAL);
    drain_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut message_count: u64 = 0;

    let failure = loop {
        tokio::select! {
            message = connection.next_message() => {
                match message {
                    None => break SocketFailure::PeerClosed,
                    Some(Err(e)) => break SocketFailure::from_tungstenite(&e),
                    Some(Ok(message)) => {
                        message_count += 1;
                        match message {
                            Message::Text(text) => {
                                if let Err(failure) =
                                    dispatcher::process_stream_data(manager, stream_id, text, specs.output).await
                                {
                                    break failure;
                                }
                            }
                            Message::Binary(bytes) => {
                                let text = String::from_utf8_lossy(&bytes).into_owned();
                                if let Err(failure) =
                                    dispatcher::process_stream_data(manager, stream_id, text, specs.output).await
                                {
                                    break failure;
                                }
                            }
                            Message::Ping(data) => {
                                if let Err(failure) = connection.send_message(Message::Pong(data)).await {
                                    break failure;
                                }
                                manager.set_heartbeat(stream_id);
                            }
                            Message::Pong(_) => manager.set_heartbeat(stream_id),
                            Message::Close(frame) => {
                                debug!(stream_id, frame = ?frame, "Close frame received");
                                break SocketFailure::PeerClosed;
                            }
                            _ => {}
                        }
                        if message_count % 1000 == 0 {
                            debug!(
                                stream_id,
                                messages_processed = message_count,
                                "Stream socket health check"
                            );
                        }
                    }
                }
            }
            _ = ping_timer.tick() => {
                if let Some(failure) = check_heartbeat(manager, stream_id, epoch_start, specs.ping_timeout) {
                    break failure;
                }
                if let Err(failure) = connection.send_message(Message::Ping(Vec::new())).await {
                    break failure;
                }
            }
            _ = drain_timer.tick() => {
                if manager.is_crash_request(stream_id) {
                    break SocketFailure::Crash(
                        manager
                            .crash_reason(stream_id)
                            .unwrap_or_else(|| "crash requested".to_string()),
                    );
                }
                let pending = manager.take_pending_payloads(stream_id);
                if let Some(failure) = send_pending(manager, stream_id, &mut connection, pending).await {
                    break failure;
                }
            }
            _ = stop_rx.changed() => {
                if manager.is_crash_request(stream_id) {
                    break SocketFailure::Crash(
                        manager
                            .crash_reason(stream_id)
                            .unwrap_or_else(|| "crash requested".to_string()),
                    );
                }
                break SocketFailure::Cancelled;
            }
        }
    };

    manager.set_socket_is_not_ready(stream_id);
    if failure == SocketFailure::Cancelled {
        let _ = tokio::time::timeout(specs.close_timeout, connection.close()).await;
    }
    info!(
        stream_id,
        uptime_s = (unix_timestamp() - epoch_start) as u64,
        messages_processed = message_count,
        failure = %failure,
        "Stream socket loop exited"
    );
    failure
}

/**
 * Treats heartbeat silence past the ping timeout as a dead link.
 */
fn check_heartbeat(
    manager: &Arc<BybitWebSocketManager>,
    stream_id: &str,
    epoch_start: f64,
    ping_timeout: Duration,
) -> Option<SocketFailure> {
    let last_heartbeat = manager.last_heartbeat(stream_id).unwrap_or(epoch_start);
    let silence = unix_timestamp() - last_heartbeat;
    if silence > ping_timeout.as_secs_f64() {
        warn!(
            stream_id,
            silence_s = silence as u64,
            "Heartbeat silence exceeded the ping timeout"
        );
        return Some(SocketFailure::Reset);
    }
    None
}

/**
 * Sends pending payloads; unsent ones return to the pending list in order.
 */
async fn send_pending<S>(
    manager: &Arc<BybitWebSocketManager>,
    stream_id: &str,
    connection: &mut SocketConnection<S>,
    pending: Vec<Value>,
) -> Option<SocketFailure>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if pending.is_empty() {
        return None;
    }
    let mut queued = pending.into_iter();
    while let Some(payload) = queued.next() {
        if let Err(failure) = connection.send_message(Message::Text(payload.to_string())).await {
            let mut unsent = vec![payload];
            unsent.extend(queued);
            manager.requeue_pending_payloads(stream_id, unsent);
            return Some(failure);
        }
        manager.increase_transmitted_counter(stream_id);
    }
    None
}
