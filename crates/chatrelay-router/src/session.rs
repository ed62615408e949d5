//! Per-connection supervision
//!
//! Each connection gets a reader (the supervising task itself) and a writer
//! (a spawned task draining the client's outbound queue). Whichever side
//! ends first ends the session; the client is deregistered on every exit
//! path.

use bytes::Bytes;
use chatrelay_core::{read_frame, ChatMessage, ClientKey, FrameError};
use chatrelay_transport::{TransportError, TransportSender};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::router::RouterHandle;

/// Why a session ended
#[derive(Error, Debug)]
pub enum Disconnect {
    /// The reader stopped: peer hung up or sent a malformed frame
    #[error("read side ended: {0}")]
    Reader(#[from] FrameError),

    /// Writing to the peer failed
    #[error("write side failed: {0}")]
    Writer(#[from] TransportError),

    /// The writer task panicked or was cancelled
    #[error("writer task aborted: {0}")]
    WriterAborted(String),

    /// The router closed this client's queue (another connection took over
    /// its key, or the router shut down)
    #[error("outbound queue closed by router")]
    QueueClosed,

    /// The router is not running
    #[error("router closed")]
    RouterClosed,
}

impl Disconnect {
    /// True for an ordinary hang-up as opposed to a protocol or I/O fault
    pub fn is_clean(&self) -> bool {
        match self {
            Disconnect::Reader(e) => e.is_disconnect(),
            Disconnect::QueueClosed => true,
            _ => false,
        }
    }
}

/// Decode frames from `reader` and submit each one to the router.
///
/// Returns when a frame fails to decode or the router stops taking
/// messages. Messages from one connection reach the router in the order
/// they were read.
pub async fn read_loop<R>(key: &ClientKey, reader: &mut R, router: &RouterHandle) -> Disconnect
where
    R: AsyncRead + Unpin + ?Sized,
{
    let max_payload = router.config().max_payload_size;

    loop {
        let payload = match read_frame(&mut *reader, max_payload).await {
            Ok(payload) => payload,
            Err(e) => return Disconnect::Reader(e),
        };

        debug!(client = %key, len = payload.len(), "Frame received");

        if router
            .submit(ChatMessage::new(key.clone(), payload))
            .await
            .is_err()
        {
            return Disconnect::RouterClosed;
        }
    }
}

/// Drain `queue` into `sender`, one transport message per payload.
///
/// Returns `Ok` once the queue is closed, or the first send error.
pub async fn write_loop<S>(
    mut queue: mpsc::Receiver<Bytes>,
    mut sender: S,
) -> Result<(), TransportError>
where
    S: TransportSender,
{
    while let Some(payload) = queue.recv().await {
        sender.send(payload).await?;
    }

    let _ = sender.close().await;
    Ok(())
}

/// Run one client connection to completion.
///
/// Registers `key` with the router, spawns the writer, and reads frames
/// until either side ends. The client is always deregistered before this
/// returns.
pub async fn supervise<R, S>(
    key: ClientKey,
    mut reader: R,
    sender: S,
    router: RouterHandle,
) -> Disconnect
where
    R: AsyncRead + Unpin + Send,
    S: TransportSender + 'static,
{
    let (queue_tx, queue_rx) = mpsc::channel(router.config().queue_capacity);

    let registration = match router.register(key.clone(), queue_tx).await {
        Ok(registration) => registration,
        Err(_) => return Disconnect::RouterClosed,
    };

    let mut writer = tokio::spawn(write_loop(queue_rx, sender));

    let reason = tokio::select! {
        reason = read_loop(&key, &mut reader, &router) => reason,
        result = &mut writer => match result {
            Ok(Ok(())) => Disconnect::QueueClosed,
            Ok(Err(e)) => Disconnect::Writer(e),
            Err(e) => Disconnect::WriterAborted(e.to_string()),
        },
    };

    registration.release().await;

    // Connection is finished either way; anything still queued has nowhere to go
    if !writer.is_finished() {
        writer.abort();
        let _ = writer.await;
    }

    if reason.is_clean() {
        info!(client = %key, reason = %reason, "Session ended");
    } else {
        warn!(client = %key, reason = %reason, "Session ended abnormally");
    }

    reason
}
