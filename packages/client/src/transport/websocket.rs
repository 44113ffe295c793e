//! WebSocket transport backed by tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tayori_shared::protocol::{ClientFrame, ServerFrame};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

use crate::error::ClientError;

use super::{Connector, FrameSink, FrameStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), ClientError> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
        tracing::debug!("WebSocket connected to {}", self.url);

        let (write, read) = ws_stream.split();
        Ok((
            Box::new(WebSocketSink { write }),
            Box::new(WebSocketStreamHalf { read }),
        ))
    }
}

struct WebSocketSink {
    write: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: &ClientFrame) -> Result<(), ClientError> {
        let json = frame
            .to_json()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        self.write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ClientError::ConnectionLost(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.write.send(Message::Close(None)).await;
        let _ = self.write.close().await;
    }
}

struct WebSocketStreamHalf {
    read: SplitStream<Socket>,
}

#[async_trait]
impl FrameStream for WebSocketStreamHalf {
    async fn next_frame(&mut self) -> Option<Result<ServerFrame, ClientError>> {
        while let Some(message) = self.read.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                    Ok(frame) => return Some(Ok(frame)),
                    Err(e) => {
                        tracing::warn!("Ignoring unparseable frame: {}", e);
                    }
                },
                Ok(Message::Close(close)) => {
                    tracing::info!("Server closed the connection: {:?}", close);
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    tracing::debug!("Ignoring {} bytes of binary data", data.len());
                }
                Ok(_) => {}
                Err(e) => return Some(Err(ClientError::ConnectionLost(e.to_string()))),
            }
        }
        None
    }
}
