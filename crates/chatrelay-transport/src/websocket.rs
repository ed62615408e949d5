//! WebSocket transport implementation
//!
//! Server side: [`split_socket`] takes a socket already upgraded by axum and
//! returns a [`WebSocketSender`] for the outbound writer plus a
//! [`WebSocketByteStream`] that concatenates inbound message payloads into
//! one byte stream. The frame reader never sees WebSocket message
//! boundaries, so a frame may span several messages and one message may
//! carry several frames.
//!
//! Client side: [`WebSocketClient::connect`] dials a relay with
//! tokio-tungstenite and hands back a sender/receiver pair.

use async_trait::async_trait;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use bytes::Bytes;
use futures::future;
use futures::stream::{BoxStream, SplitSink};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tokio_util::io::StreamReader;
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Inbound side of a server connection as a plain byte stream
pub type WebSocketByteStream = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// Split an upgraded server socket into its outbound sender and inbound
/// byte stream.
///
/// Text and binary messages both contribute their payload bytes. A close
/// message ends the stream; a protocol error surfaces as an I/O error on the
/// next read.
pub fn split_socket(socket: WebSocket) -> (WebSocketSender, WebSocketByteStream) {
    let (sink, stream) = socket.split();

    let payloads = stream
        .take_while(|msg| future::ready(!matches!(msg, Ok(AxumMessage::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(AxumMessage::Text(text)) => Some(Ok(Bytes::from(text))),
                Ok(AxumMessage::Binary(data)) => Some(Ok(Bytes::from(data))),
                // Pings are answered by axum itself
                Ok(_) => None,
                Err(e) => Some(Err(io::Error::new(io::ErrorKind::ConnectionReset, e))),
            })
        })
        .boxed();

    let sender = WebSocketSender {
        sink,
        connected: true,
    };

    (sender, StreamReader::new(payloads))
}

/// Wrap a payload in a WebSocket message: text when it is valid UTF-8 so
/// browsers hand it to `onmessage` as a string, binary otherwise.
fn payload_message(data: Bytes) -> AxumMessage {
    match String::from_utf8(data.to_vec()) {
        Ok(text) => AxumMessage::Text(text),
        Err(e) => AxumMessage::Binary(e.into_bytes()),
    }
}

/// Outbound half of a server-side WebSocket connection
pub struct WebSocketSender {
    sink: SplitSink<WebSocket, AxumMessage>,
    connected: bool,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&mut self, data: Bytes) -> Result<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        if let Err(e) = self.sink.send(payload_message(data)).await {
            self.connected = false;
            return Err(TransportError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.sink.close().await?;
        Ok(())
    }
}

/// WebSocket client for talking to a relay
pub struct WebSocketClient;

impl WebSocketClient {
    /// Connect to a relay endpoint such as `ws://127.0.0.1:8080/ws`
    pub async fn connect(url: &str) -> Result<(WebSocketClientSender, WebSocketReceiver)> {
        info!("Connecting to WebSocket: {}", url);

        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }

        let (ws_stream, response) = connect_async(url).await?;

        debug!("WebSocket connected, response: {:?}", response.status());

        let (write, read) = ws_stream.split();

        let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(100);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(100);

        let connected = Arc::new(Mutex::new(true));
        let connected_write = connected.clone();
        let connected_read = connected.clone();

        // Writer task
        tokio::spawn(async move {
            let mut write = write;
            while let Some(msg) = send_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    error!("WebSocket write error: {}", e);
                    break;
                }
            }
            *connected_write.lock() = false;
        });

        // Reader task
        tokio::spawn(async move {
            let mut read = read;

            let _ = event_tx.send(TransportEvent::Connected).await;

            while let Some(result) = read.next().await {
                match result {
                    Ok(WsMessage::Text(text)) => {
                        let _ = event_tx.send(TransportEvent::Data(Bytes::from(text))).await;
                    }
                    Ok(WsMessage::Binary(data)) => {
                        let _ = event_tx.send(TransportEvent::Data(Bytes::from(data))).await;
                    }
                    Ok(WsMessage::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        info!("WebSocket closed: {:?}", reason);
                        let _ = event_tx
                            .send(TransportEvent::Disconnected { reason })
                            .await;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("WebSocket read error: {}", e);
                        let _ = event_tx
                            .send(TransportEvent::Disconnected {
                                reason: Some(e.to_string()),
                            })
                            .await;
                        break;
                    }
                }
            }

            *connected_read.lock() = false;
        });

        let sender = WebSocketClientSender {
            tx: send_tx,
            connected,
        };

        Ok((sender, WebSocketReceiver { rx: event_rx }))
    }
}

/// Client-side WebSocket sender
pub struct WebSocketClientSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketClientSender {
    async fn send(&mut self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let msg = match String::from_utf8(data.to_vec()) {
            Ok(text) => WsMessage::Text(text),
            Err(e) => WsMessage::Binary(e.into_bytes()),
        };

        self.tx
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// Client-side WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_payload_goes_out_as_text() {
        assert!(matches!(
            payload_message(Bytes::from_static(b"hello")),
            AxumMessage::Text(ref t) if t == "hello"
        ));
    }

    #[test]
    fn test_binary_payload_goes_out_as_binary() {
        assert!(matches!(
            payload_message(Bytes::from_static(&[0xff, 0x00])),
            AxumMessage::Binary(ref b) if b == &[0xff, 0x00]
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_non_ws_url() {
        let result = WebSocketClient::connect("http://127.0.0.1:1/ws").await;
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }
}
