//! Client identity and message types

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Identifies a connected client for the lifetime of its connection.
///
/// Derived from the remote socket address, so two live connections only
/// share a key if the transport reports the same peer address for both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(Arc<str>);

impl ClientKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SocketAddr> for ClientKey {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.to_string())
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ClientKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

/// A chat message in transit from one client's reader to the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Key of the client that sent the message
    pub sender: ClientKey,
    /// Raw payload bytes, exactly as framed by the sender
    pub text: Bytes,
}

impl ChatMessage {
    pub fn new(sender: ClientKey, text: impl Into<Bytes>) -> Self {
        Self {
            sender,
            text: text.into(),
        }
    }

    /// Render the line appended to the message log: `<sender>: <text>\n`
    pub fn log_line(&self) -> Bytes {
        let key = self.sender.as_str().as_bytes();
        let mut line = BytesMut::with_capacity(key.len() + 2 + self.text.len() + 1);
        line.put_slice(key);
        line.put_slice(b": ");
        line.put_slice(&self.text);
        line.put_u8(b'\n');
        line.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_socket_addr() {
        let addr: SocketAddr = "127.0.0.1:52000".parse().unwrap();
        assert_eq!(ClientKey::from(addr).as_str(), "127.0.0.1:52000");
    }

    #[test]
    fn test_log_line() {
        let msg = ChatMessage::new(ClientKey::from("c1"), "hi");
        assert_eq!(&msg.log_line()[..], b"c1: hi\n");
    }

    #[test]
    fn test_log_line_keeps_raw_bytes() {
        let msg = ChatMessage::new(ClientKey::from("c1"), vec![0xff, b'\n']);
        assert_eq!(&msg.log_line()[..], b"c1: \xff\n\n");
    }
}
