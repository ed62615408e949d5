//! chatrelay core
//!
//! Core types and wire framing for the chatrelay protocol.
//!
//! This crate provides:
//! - Client identity and message types ([`ClientKey`], [`ChatMessage`])
//! - Length-prefixed frame decoding and encoding ([`frame`])
//! - Error types shared by the transport and router crates

pub mod error;
pub mod frame;
pub mod types;

pub use error::{Error, FrameError, Result};
pub use frame::{decode, encode_frame, read_frame};
pub use types::*;

/// Width of the ASCII decimal length prefix on inbound frames
pub const LENGTH_PREFIX_SIZE: usize = 5;

/// Largest payload an inbound frame may declare
pub const MAX_PAYLOAD_SIZE: usize = 65536;

/// Default capacity of each client's outbound queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default capacity of each router event stream
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Default HTTP/WebSocket listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Path the WebSocket endpoint is mounted on
pub const WS_PATH: &str = "/ws";
