//! chatrelay Router
//!
//! The router is the single coordination point of the relay:
//! - Tracks which clients are connected ([`ClientRegistry`])
//! - Appends every accepted message to the message log ([`LogSink`])
//! - Fans each message out to every connected client's bounded queue
//!
//! All registry access happens on one task, reached only through the
//! event channels behind [`RouterHandle`]. Per-connection reading and
//! writing live in [`session`]; the HTTP/WebSocket front lives in
//! [`server`].
//!
//! # Example
//!
//! ```no_run
//! use chatrelay_router::{FileLogSink, RelayServer, Router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = FileLogSink::open("chat.log").await?;
//!     let (handle, _task) = Router::new(sink).spawn(&RouterConfig::default());
//!
//!     let server = RelayServer::bind("0.0.0.0:8080", handle, "./static").await?;
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod log_sink;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use error::{Result, RouterError};
pub use log_sink::{FileLogSink, LogSink, MemoryLogSink};
pub use registry::{ClientRegistry, ConnectionId, FanOut, OutboundQueue};
pub use router::{Registration, Router, RouterConfig, RouterHandle, RouterStats};
pub use server::{build_app, RelayServer};
pub use session::{supervise, Disconnect};
