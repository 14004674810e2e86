//! Shared test helpers: a scripted realtime WebSocket server and log waiters.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use parley::conversation::{Message as LogMessage, MessageLog};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{Request, Response},
        Message,
    },
    WebSocketStream,
};

pub const WAIT: Duration = Duration::from_secs(3);

/// Headers and query seen during the upgrade.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub headers: HashMap<String, String>,
    pub query: String,
}

impl Handshake {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Server side of one accepted realtime connection.
pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
    pub handshake: Handshake,
}

impl ServerConn {
    /// Next client JSON event, skipping control frames.
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let frame = timeout(WAIT, self.ws.next())
                .await
                .expect("client frame should arrive in time")
                .expect("client should keep the socket open")
                .expect("client frame should be valid");
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("client frame should be JSON")
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                other => panic!("unexpected client frame: {other:?}"),
            }
        }
    }

    /// Next client event type, skipping control frames.
    pub async fn recv_type(&mut self) -> String {
        self.recv_json()
            .await
            .get("type")
            .and_then(Value::as_str)
            .expect("client event should carry a type")
            .to_string()
    }

    pub async fn send_json(&mut self, event: Value) {
        self.ws
            .send(Message::Text(event.to_string().into()))
            .await
            .expect("server frame should send");
    }

    /// Wait until the client closes the socket.
    pub async fn wait_closed(mut self) {
        let _ = timeout(WAIT, async {
            while let Some(Ok(frame)) = self.ws.next().await {
                if matches!(frame, Message::Close(_)) {
                    break;
                }
            }
        })
        .await;
    }
}

/// Spawn a one-connection realtime server; returns its `http://` endpoint.
pub async fn spawn_server<F, Fut>(handler: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(ServerConn) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener
        .local_addr()
        .expect("local addr should be available");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("server should accept");
        let capture = Arc::new(Mutex::new(Handshake::default()));
        let capture_inner = Arc::clone(&capture);
        let ws = accept_hdr_async(stream, move |req: &Request, response: Response| {
            let mut handshake = capture_inner.lock().expect("handshake lock should not poison");
            handshake.query = req.uri().query().unwrap_or_default().to_string();
            for (name, value) in req.headers() {
                if let Ok(value) = value.to_str() {
                    handshake
                        .headers
                        .insert(name.as_str().to_string(), value.to_string());
                }
            }
            Ok(response)
        })
        .await
        .expect("handshake should succeed");

        let handshake = capture
            .lock()
            .expect("handshake lock should not poison")
            .clone();
        handler(ServerConn { ws, handshake }).await;
    });

    (format!("http://{address}"), server)
}

/// Wait until the log satisfies `condition`, returning that snapshot.
pub async fn wait_for_log<F>(log: &MessageLog, condition: F) -> Vec<LogMessage>
where
    F: Fn(&[LogMessage]) -> bool,
{
    let mut revisions = log.subscribe();
    timeout(WAIT, async {
        loop {
            let snapshot = log.snapshot();
            if condition(&snapshot) {
                return snapshot;
            }
            revisions
                .changed()
                .await
                .expect("log should stay alive while waiting");
        }
    })
    .await
    .expect("log condition should be met in time")
}
