//! Transport abstraction for session streams.
//!
//! The manager only needs a sink of outgoing text frames and a stream of
//! incoming ones. `WsConnector` provides them over a real WebSocket; tests
//! plug in in-memory channels.

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, Message};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),
    #[error("Failed to send frame: {0}")]
    Send(String),
    #[error("Failed to read frame: {0}")]
    Receive(String),
    #[error("Connection closed")]
    Closed,
}

/// Outgoing text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Incoming text frames, ending when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open, full-duplex session stream.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens session streams.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (ws_write, ws_read) = ws_stream.split();

        let sink = ws_write
            .with(|text: String| futures::future::ready(Ok::<_, tungstenite::Error>(Message::text(text))))
            .sink_map_err(|e| TransportError::Send(e.to_string()));

        let stream = ws_read.filter_map(|message| {
            futures::future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec()).ok().map(Ok),
                // Ping/pong are answered by tungstenite; close ends the stream
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            })
        });

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
