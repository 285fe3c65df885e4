use std::fmt;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use hostwatch_types::BroadcastPayload;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Subscriber connection closed")]
    Closed,

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to send payload: {0}")]
    Send(String),
}

/// Outbound side of one subscriber connection.
#[async_trait]
pub trait SubscriberTransport: Send {
    /// Deliver one payload.
    async fn push(&mut self, payload: &BroadcastPayload) -> Result<(), TransportError>;

    /// Resolve once the peer has gone away. Must be cancel-safe.
    async fn closed(&mut self);
}

/// Push subscriber over an axum WebSocket, one text frame per payload.
pub struct WebSocketTransport {
    socket: WebSocket,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("protocol", &self.socket.protocol())
            .finish()
    }
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl SubscriberTransport for WebSocketTransport {
    async fn push(&mut self, payload: &BroadcastPayload) -> Result<(), TransportError> {
        let json = serde_json::to_string(payload)?;
        self.socket
            .send(Message::Text(json))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn closed(&mut self) {
        // Inbound frames carry nothing; drain them until the peer closes.
        loop {
            match self.socket.recv().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Push subscriber backed by an in-process channel of JSON strings.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// A transport and the receiver observing it.
    pub fn pair(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl SubscriberTransport for ChannelTransport {
    async fn push(&mut self, payload: &BroadcastPayload) -> Result<(), TransportError> {
        let json = serde_json::to_string(payload)?;
        self.tx.send(json).await.map_err(|_| TransportError::Closed)
    }

    async fn closed(&mut self) {
        self.tx.closed().await
    }
}
