//! Message channel between the session and the browser.
//!
//! The session only ever sees [`Channel`]: read one text message, write one
//! text message, close. [`WsChannel`] adapts an upgraded WebSocket;
//! [`MemoryChannel`] connects two in-process endpoints and is what the tests
//! and benchmarks drive sessions through.

use crate::error::ChannelError;
use axum::extract::ws::{Message, WebSocket};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tokio::sync::mpsc;

/// Message-oriented duplex connection carrying JSON text frames.
pub trait Channel: Send {
    /// Waits for the next text message.
    fn recv(&mut self) -> impl Future<Output = Result<String, ChannelError>> + Send;

    fn send(&mut self, text: String) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Closes the connection. Errors while closing are ignored.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Reads the next message and decodes it as `T`.
pub async fn recv_json<C, T>(channel: &mut C) -> Result<T, ChannelError>
where
    C: Channel,
    T: DeserializeOwned,
{
    let text = channel.recv().await?;
    serde_json::from_str(&text).map_err(ChannelError::Decode)
}

/// Encodes `message` as JSON and writes it.
pub async fn send_json<C, T>(channel: &mut C, message: &T) -> Result<(), ChannelError>
where
    C: Channel,
    T: Serialize,
{
    let text = serde_json::to_string(message).map_err(ChannelError::Encode)?;
    channel.send(text).await
}

/// Channel over an upgraded axum WebSocket.
pub struct WsChannel {
    socket: WebSocket,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Channel for WsChannel {
    async fn recv(&mut self) -> Result<String, ChannelError> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec())
                        .map_err(|_| ChannelError::UnsupportedFrame)
                }
                // axum answers pings itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Closed),
                Some(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

/// One end of an in-process channel pair.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Creates two connected endpoints; what one sends the other receives.
pub fn memory_pair() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel {
            tx: Some(a_tx),
            rx: a_rx,
        },
        MemoryChannel {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

impl MemoryChannel {
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl Channel for MemoryChannel {
    async fn recv(&mut self) -> Result<String, ChannelError> {
        self.rx.recv().await.ok_or(ChannelError::Closed)
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        match &self.tx {
            Some(tx) => tx.send(text).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    async fn close(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}
