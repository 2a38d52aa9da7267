//! WebSocket transport for the hub protocol.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use caselink_core::config::RealtimeConfig;
use caselink_core::error::{AppError, ErrorKind};
use caselink_core::result::AppResult;

use super::connector::{HubConnector, HubLink};
use super::protocol::{self, HubFrame, HubMessage, RECORD_SEPARATOR};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the hub over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    config: RealtimeConfig,
}

impl WebSocketConnector {
    /// Creates a connector for `config.hub_url`.
    pub fn new(config: RealtimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl HubConnector for WebSocketConnector {
    async fn connect(&self, access_token: Option<String>) -> AppResult<HubLink> {
        let url = socket_url(&self.config.hub_url, access_token.as_deref())?;
        let handshake_timeout = self.config.handshake_timeout();

        debug!(hub = %self.config.hub_url, "Opening hub socket");
        let (mut socket, _) = timeout(handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| AppError::connection("Timed out opening hub socket"))?
            .map_err(|e| ws_error("Failed to open hub socket", e))?;

        socket
            .send(Message::Text(protocol::handshake_request()?.into()))
            .await
            .map_err(|e| ws_error("Failed to send handshake", e))?;

        let leftover = timeout(handshake_timeout, read_handshake(&mut socket))
            .await
            .map_err(|_| AppError::connection("Timed out waiting for hub handshake"))??;

        let buffer = self.config.channel_buffer_size;
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer);

        tokio::spawn(pump(
            socket,
            outbound_rx,
            inbound_tx,
            self.config.keepalive_interval(),
            leftover,
        ));

        info!(hub = %self.config.hub_url, "Hub connected");
        Ok(HubLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Maps an `http(s)` hub URL to `ws(s)` and appends the access token.
pub fn socket_url(hub_url: &str, access_token: Option<&str>) -> AppResult<String> {
    let mut url = reqwest::Url::parse(hub_url)
        .map_err(|e| AppError::configuration(format!("Invalid hub URL '{hub_url}': {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(AppError::configuration(format!(
                "Unsupported hub URL scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::configuration(format!("Cannot use scheme '{scheme}' for {hub_url}")))?;

    if let Some(token) = access_token {
        url.query_pairs_mut().append_pair("access_token", token);
    }
    Ok(url.to_string())
}

fn ws_error(context: &str, err: tokio_tungstenite::tungstenite::Error) -> AppError {
    AppError::with_source(ErrorKind::Connection, format!("{context}: {err}"), err)
}

/// Waits for the handshake response. Returns any records that arrived in
/// the same message after it.
async fn read_handshake(socket: &mut Socket) -> AppResult<String> {
    while let Some(msg) = socket.next().await {
        match msg.map_err(|e| ws_error("Hub socket failed during handshake", e))? {
            Message::Text(text) => {
                let text = text.as_str();
                let (response, rest) = text
                    .split_once(RECORD_SEPARATOR)
                    .ok_or_else(|| AppError::protocol("Handshake response is not terminated"))?;
                protocol::parse_handshake_response(response)?;
                return Ok(rest.to_string());
            }
            Message::Close(frame) => {
                return Err(AppError::connection(format!(
                    "Hub closed the socket during handshake: {frame:?}"
                )));
            }
            _ => {}
        }
    }
    Err(AppError::connection("Hub socket ended during handshake"))
}

/// Outcome of handling one inbound record.
enum Flow {
    Continue,
    Stop,
}

async fn deliver(record: &str, inbound: &mpsc::Sender<HubMessage>) -> Flow {
    match HubFrame::decode(record) {
        Ok(HubFrame::Invocation(msg)) => {
            if inbound.send(msg).await.is_err() {
                debug!("Hub link receiver dropped");
                return Flow::Stop;
            }
        }
        Ok(HubFrame::Ping) => {}
        Ok(HubFrame::Close {
            error,
            allow_reconnect,
        }) => {
            match error {
                Some(error) => {
                    warn!(error = %error, allow_reconnect, "Hub closed the connection")
                }
                None => info!("Hub closed the connection"),
            }
            return Flow::Stop;
        }
        Ok(HubFrame::Other(kind)) => debug!(kind, "Ignoring hub frame"),
        Err(e) => warn!(error = %e, "Dropping malformed hub frame"),
    }
    Flow::Continue
}

/// Shuttles frames between the socket and the link channels until either
/// side goes away. Returning drops `inbound`, which the manager observes as
/// a transport drop.
async fn pump(
    socket: Socket,
    mut outbound: mpsc::Receiver<HubMessage>,
    inbound: mpsc::Sender<HubMessage>,
    keepalive: Duration,
    leftover: String,
) {
    let (mut sink, mut stream) = socket.split();

    for record in protocol::records(&leftover) {
        if let Flow::Stop = deliver(record, &inbound).await {
            return;
        }
    }

    let mut ticker = time::interval(keepalive);
    ticker.tick().await;

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    for record in protocol::records(text.as_str()) {
                        if let Flow::Stop = deliver(record, &inbound).await {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Hub socket closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Hub socket failed");
                    break;
                }
                None => break,
            },
            out = outbound.recv() => match out {
                Some(msg) => {
                    let target = msg.target.clone();
                    let record = match HubFrame::Invocation(msg).encode() {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(method = %target, error = %e, "Failed to encode invocation");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(record.into())).await {
                        warn!(method = %target, error = %e, "Failed to send invocation");
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    debug!("Hub link closed by client");
                    break;
                }
            },
            _ = ticker.tick() => {
                let ping = match HubFrame::Ping.encode() {
                    Ok(ping) => ping,
                    Err(_) => continue,
                };
                if let Err(e) = sink.send(Message::Text(ping.into())).await {
                    warn!(error = %e, "Keepalive failed");
                    break;
                }
            }
        }
    }
}
