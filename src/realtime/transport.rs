//! Realtime transport over WebSocket.
//!
//! One task owns the socket: it writes queued client events, answers and
//! sends heartbeats, and feeds parsed server events into the
//! [`ResponseAssembler`]. Sending never waits on inbound processing.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};

use super::assembler::{ResponseAssembler, SessionSignal};
use super::events::{ClientEvent, ConversationItem, ResponseOptions, ServerEvent};
use super::items::InboundEvent;
use crate::config::{ConnectTarget, Credential};
use crate::error::ParleyError;

type RealtimeWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound turn injection, the seam the response processor talks to.
#[async_trait]
pub trait TurnSender: Send + Sync {
    async fn send_event(&self, event: ClientEvent) -> Result<(), ParleyError>;

    /// True once the connection behind this sender is gone.
    fn is_closed(&self) -> bool {
        false
    }

    /// Inject a conversation item (`conversation.item.create`).
    async fn send_item(&self, item: ConversationItem) -> Result<(), ParleyError> {
        self.send_event(ClientEvent::ItemCreate { item }).await
    }

    /// Request the next assistant turn (`response.create`).
    async fn generate_response(&self, options: Option<ResponseOptions>) -> Result<(), ParleyError> {
        self.send_event(ClientEvent::ResponseCreate { response: options })
            .await
    }
}

/// Cloneable handle onto the transport's outbound queue.
#[derive(Debug, Clone)]
pub struct TransportSender {
    outbound_tx: mpsc::UnboundedSender<ClientEvent>,
}

impl TransportSender {
    /// Enqueue without suspending; used from audio callbacks.
    pub fn send_now(&self, event: ClientEvent) -> Result<(), ParleyError> {
        self.outbound_tx
            .send(event)
            .map_err(|_| ParleyError::Transport("Realtime transport is closed".into()))
    }
}

#[async_trait]
impl TurnSender for TransportSender {
    async fn send_event(&self, event: ClientEvent) -> Result<(), ParleyError> {
        self.send_now(event)
    }

    fn is_closed(&self) -> bool {
        self.outbound_tx.is_closed()
    }
}

/// Parameters for opening a transport.
#[derive(Debug, Clone)]
pub struct TransportParams {
    pub url: String,
    pub credential: Credential,
    pub heartbeat_interval: Duration,
    pub transcription_enabled: bool,
}

/// Receiving ends created by [`RealtimeTransport::open`].
#[derive(Debug)]
pub struct InboundChannels {
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
    pub signals: mpsc::UnboundedReceiver<SessionSignal>,
}

/// An open realtime connection.
pub struct RealtimeTransport {
    outbound_tx: mpsc::UnboundedSender<ClientEvent>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeTransport {
    /// Open the socket and send `bootstrap` as the first frame.
    pub async fn open(
        params: TransportParams,
        bootstrap: ClientEvent,
    ) -> Result<(Self, InboundChannels), ParleyError> {
        let mut socket = connect_realtime_socket(&params.url, &params.credential).await?;
        send_client_event(&mut socket, &bootstrap)
            .await
            .map_err(|error| {
                ParleyError::Transport(format!("Realtime handshake send failed: {error}"))
            })?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let assembler = ResponseAssembler::new(
            events_tx,
            signals_tx.clone(),
            params.transcription_enabled,
        );
        let task = tokio::spawn(run_connection(
            socket,
            assembler,
            signals_tx,
            outbound_rx,
            shutdown_rx,
            params.heartbeat_interval,
        ));

        Ok((
            Self {
                outbound_tx,
                shutdown_tx,
                task: Some(task),
            },
            InboundChannels {
                events: events_rx,
                signals: signals_rx,
            },
        ))
    }

    pub fn sender(&self) -> TransportSender {
        TransportSender {
            outbound_tx: self.outbound_tx.clone(),
        }
    }

    /// Close the socket and wait for the connection task to finish.
    ///
    /// Every inbound sequence ends once this returns.
    pub async fn close(&mut self) -> Result<(), ParleyError> {
        if let Some(task) = self.task.take() {
            let _ = self.shutdown_tx.send(true);
            task.await.map_err(|error| {
                ParleyError::Transport(format!("Realtime connection task failed: {error}"))
            })?;
        }
        Ok(())
    }
}

impl Drop for RealtimeTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = self.shutdown_tx.send(true);
            task.abort();
        }
    }
}

async fn run_connection(
    mut socket: RealtimeWebSocket,
    mut assembler: ResponseAssembler,
    signals_tx: mpsc::UnboundedSender<SessionSignal>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    let lost = |reason: String| {
        let _ = signals_tx.send(SessionSignal::ConnectionLost { reason });
    };

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(error) = socket.send(Message::Ping(Default::default())).await {
                    lost(format!("Realtime heartbeat failed: {error}"));
                    break;
                }
            }
            outbound = outbound_rx.recv() => {
                let Some(event) = outbound else {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                tracing::trace!(event_type = event.event_type(), "sending realtime event");
                if let Err(error) = send_client_event(&mut socket, &event).await {
                    lost(format!("Realtime send failed: {error}"));
                    break;
                }
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(message)) => {
                        if let Err(error) = handle_server_message(&mut socket, &mut assembler, message).await {
                            match error {
                                WsError::ConnectionClosed => {
                                    lost("Realtime service closed the connection".into());
                                }
                                other => lost(format!("Realtime frame handling failed: {other}")),
                            }
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        lost(format!("Realtime receive failed: {error}"));
                        break;
                    }
                    None => {
                        lost("Realtime service closed the connection".into());
                        break;
                    }
                }
            }
        }
    }
    tracing::debug!("realtime connection task finished");
}

async fn handle_server_message(
    socket: &mut RealtimeWebSocket,
    assembler: &mut ResponseAssembler,
    message: Message,
) -> Result<(), WsError> {
    match message {
        Message::Text(text) => parse_and_route(text.as_ref(), assembler),
        Message::Binary(bytes) => {
            if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                parse_and_route(&text, assembler);
            }
        }
        Message::Ping(payload) => socket.send(Message::Pong(payload)).await?,
        Message::Pong(_) => {}
        Message::Close(_) => return Err(WsError::ConnectionClosed),
        Message::Frame(_) => {}
    }
    Ok(())
}

fn parse_and_route(payload: &str, assembler: &mut ResponseAssembler) {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            if let Some(event) = ServerEvent::from_server_payload(&value) {
                assembler.handle(event);
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, "failed to parse realtime event payload");
        }
    }
}

async fn send_client_event(
    socket: &mut RealtimeWebSocket,
    event: &ClientEvent,
) -> Result<(), WsError> {
    let payload = serde_json::to_string(event).map_err(|error| {
        WsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, error))
    })?;
    socket.send(Message::Text(payload.into())).await
}

/// Build the realtime WebSocket URL for an endpoint and connect target.
pub fn build_realtime_url(
    endpoint: &str,
    api_version: &str,
    target: &ConnectTarget,
    credential: &Credential,
) -> Result<String, ParleyError> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ParleyError::Configuration(
            "Realtime endpoint cannot be empty".into(),
        ));
    }
    let base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    };

    let mut url = Url::parse(&format!("{base}/voice-live/realtime")).map_err(|error| {
        ParleyError::Configuration(format!("Invalid realtime endpoint '{trimmed}': {error}"))
    })?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("api-version", api_version);
        match target {
            ConnectTarget::Model { model } => {
                query.append_pair("model", model);
            }
            ConnectTarget::Agent {
                agent_id,
                project_name,
            } => {
                query
                    .append_pair("agent-id", agent_id)
                    .append_pair("agent-project-name", project_name);
                if let Credential::BearerToken(token) = credential {
                    query.append_pair("agent-access-token", token);
                }
            }
        }
    }
    Ok(url.into())
}

async fn connect_realtime_socket(
    url: &str,
    credential: &Credential,
) -> Result<RealtimeWebSocket, ParleyError> {
    let mut request = url.into_client_request().map_err(|error| {
        ParleyError::Configuration(format!("Invalid realtime websocket URL: {error}"))
    })?;

    let (header, value) = match credential {
        Credential::BearerToken(token) => ("Authorization", format!("Bearer {token}")),
        other => ("api-key", other.secret().to_string()),
    };
    let header_value = HeaderValue::from_str(&value).map_err(|error| {
        ParleyError::Authentication(format!("Invalid realtime auth header: {error}"))
    })?;
    request.headers_mut().insert(header, header_value);
    if let Ok(request_id) = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
        request
            .headers_mut()
            .insert("x-ms-client-request-id", request_id);
    }

    connect_async(request)
        .await
        .map(|(socket, _)| socket)
        .map_err(map_connect_error)
}

fn map_connect_error(error: WsError) -> ParleyError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if matches!(status, 401 | 403) {
                ParleyError::Authentication(format!(
                    "Realtime websocket authentication failed with status {status}"
                ))
            } else {
                ParleyError::api(
                    status,
                    format!("Realtime websocket handshake failed with status {status}"),
                )
            }
        }
        WsError::Io(error) => ParleyError::Io(error),
        WsError::Url(error) => {
            ParleyError::Configuration(format!("Invalid realtime websocket URL: {error}"))
        }
        other => ParleyError::Transport(format!("Realtime websocket connect failed: {other}")),
    }
}
