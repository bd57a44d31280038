//! WebSocket client for the live streaming endpoint
//!
//! One socket carries both directions. The write half is shared by the
//! sender task and `close`; the read half belongs to the receiver task and
//! buffers items decoded from multi-part messages.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::network::protocol::{RealtimeInputMessage, ServerMessage, SetupMessage};
use crate::network::{AudioBlob, InboundItem, LiveConnector, LiveSession, LiveSetup};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens [`GeminiLiveSession`]s
pub struct GeminiLiveConnector {
    endpoint: String,
    api_key: String,
    connect_timeout: Duration,
}

impl GeminiLiveConnector {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            connect_timeout,
        }
    }

    /// Build a connector from configuration, reading the API key from the
    /// environment
    pub fn from_config(remote: &RemoteConfig) -> Result<Self, RemoteError> {
        Ok(Self::new(
            remote.endpoint.clone(),
            remote.api_key()?,
            Duration::from_millis(remote.connect_timeout_ms),
        ))
    }

    fn url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.api_key)
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<Arc<dyn LiveSession>, RemoteError> {
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(self.url()))
            .await
            .map_err(|_| RemoteError::Timeout("connection"))??;
        let (mut sink, mut stream) = ws.split();

        let setup_json = serde_json::to_string(&SetupMessage::from_setup(setup))?;
        sink.send(Message::Text(setup_json)).await?;

        let early = tokio::time::timeout(self.connect_timeout, wait_for_setup(&mut stream))
            .await
            .map_err(|_| RemoteError::Timeout("setup"))??;

        tracing::info!(model = %setup.model, voice = %setup.voice_name, "Live session established");
        Ok(Arc::new(GeminiLiveSession::new(sink, stream, early)))
    }
}

/// Read until the server acknowledges the setup message
///
/// Anything that arrives first is kept and replayed by the session.
async fn wait_for_setup(
    stream: &mut SplitStream<WsStream>,
) -> Result<VecDeque<InboundItem>, RemoteError> {
    let mut early = VecDeque::new();
    while let Some(message) = stream.next().await {
        let raw = match message? {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| f.reason.into_owned())
                    .unwrap_or_else(|| "closed without reason".to_string());
                return Err(RemoteError::SetupFailed(reason));
            }
            _ => continue,
        };

        let message = ServerMessage::parse(&raw)?;
        if message.is_setup_complete() {
            return Ok(early);
        }
        early.extend(message.into_items()?);
    }
    Err(RemoteError::SetupFailed(
        "connection closed before setup completed".to_string(),
    ))
}

struct Inbound {
    stream: SplitStream<WsStream>,
    pending: VecDeque<InboundItem>,
    ended: bool,
}

/// Live session over an established WebSocket
pub struct GeminiLiveSession {
    outbound: Mutex<SplitSink<WsStream, Message>>,
    inbound: Mutex<Inbound>,
    closed: AtomicBool,
}

impl GeminiLiveSession {
    fn new(
        sink: SplitSink<WsStream, Message>,
        stream: SplitStream<WsStream>,
        early: VecDeque<InboundItem>,
    ) -> Self {
        Self {
            outbound: Mutex::new(sink),
            inbound: Mutex::new(Inbound {
                stream,
                pending: early,
                ended: false,
            }),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LiveSession for GeminiLiveSession {
    async fn send_audio(&self, blob: AudioBlob) -> Result<(), RemoteError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RemoteError::Closed);
        }
        let text = serde_json::to_string(&RealtimeInputMessage::from_blob(&blob))?;
        self.outbound
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| RemoteError::SendFailed(e.to_string()))
    }

    async fn receive(&self) -> Result<Option<InboundItem>, RemoteError> {
        let mut inbound = self.inbound.lock().await;
        loop {
            if let Some(item) = inbound.pending.pop_front() {
                return Ok(Some(item));
            }
            if inbound.ended {
                return Ok(None);
            }

            let raw = match inbound.stream.next().await {
                None => {
                    inbound.ended = true;
                    return Ok(None);
                }
                Some(Err(e)) => return Err(RemoteError::ReceiveFailed(e.to_string())),
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        tracing::info!(
                            code = %frame.code,
                            reason = %frame.reason,
                            "Live session closed by server"
                        );
                    }
                    inbound.ended = true;
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
            };

            let message = ServerMessage::parse(&raw)?;
            if let Some(go_away) = &message.go_away {
                tracing::warn!(time_left = ?go_away.time_left, "Server is going away");
            }
            let items = message.into_items()?;
            inbound.pending.extend(items);
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut outbound = self.outbound.lock().await;
        if let Err(e) = outbound.send(Message::Close(None)).await {
            tracing::debug!("Close frame not sent: {}", e);
        }
        let _ = outbound.close().await;
    }
}
