//! Transport capability - WebSocket connection behind trait seams
//!
//! The session state machine only sees `Transport` / `WriteHalf` / `ReadHalf`,
//! so tests can substitute a scripted transport. The production implementation
//! wraps tokio-tungstenite.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::LinkError;

/// Opens one live connection to the endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(
        &self,
        uri: &str,
    ) -> Result<(Box<dyn WriteHalf>, Box<dyn ReadHalf>), LinkError>;
}

/// Outbound half of one connection. Invalid once the session tears it down.
#[async_trait]
pub trait WriteHalf: Send {
    async fn send(&mut self, text: String) -> Result<(), LinkError>;
    /// Liveness probe frame.
    async fn ping(&mut self) -> Result<(), LinkError>;
    /// Close the connection. Errors during close are not interesting.
    async fn close(&mut self);
}

/// Inbound half of one connection.
#[async_trait]
pub trait ReadHalf: Send {
    /// Next inbound message: `Ok(Some(text))` on receipt, `Ok(None)` when the
    /// remote closed cleanly, `Err` on a transport fault.
    async fn recv(&mut self) -> Result<Option<String>, LinkError>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Production transport over tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        uri: &str,
    ) -> Result<(Box<dyn WriteHalf>, Box<dyn ReadHalf>), LinkError> {
        let (ws_stream, _) = connect_async(uri)
            .await
            .map_err(|e| LinkError::Connect(e.to_string()))?;
        let (sink, stream) = ws_stream.split();
        Ok((Box::new(WsWriter { sink }), Box::new(WsReader { stream })))
    }
}

struct WsWriter {
    sink: WsSink,
}

#[async_trait]
impl WriteHalf for WsWriter {
    async fn send(&mut self, text: String) -> Result<(), LinkError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| LinkError::Send(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), LinkError> {
        self.sink
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| LinkError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

struct WsReader {
    stream: WsStream,
}

#[async_trait]
impl ReadHalf for WsReader {
    async fn recv(&mut self) -> Result<Option<String>, LinkError> {
        // Control frames are absorbed here; callers only see payload messages.
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()))
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    debug!("received control frame");
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(LinkError::Recv(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}
