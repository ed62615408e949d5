//! chatrelay Transport Layer
//!
//! This crate provides the transport seams for chatrelay:
//! - Traits every transport implements ([`TransportSender`], [`TransportReceiver`])
//! - A server-side adapter that turns an upgraded WebSocket into a byte
//!   stream for the frame reader and a sender for the outbound writer
//! - A WebSocket client used by the CLI and integration tests

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{TransportEvent, TransportReceiver, TransportSender};

#[cfg(feature = "websocket")]
pub use websocket::{
    split_socket, WebSocketByteStream, WebSocketClient, WebSocketClientSender, WebSocketReceiver,
    WebSocketSender,
};
