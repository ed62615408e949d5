//! Append-only message log
//!
//! The router writes one line per accepted message. A failed append is the
//! router's problem to report; it never stops fan-out.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::Result;

/// Destination for the message log
#[async_trait]
pub trait LogSink: Send {
    /// Append one complete log line
    async fn append(&mut self, line: &[u8]) -> io::Result<()>;
}

/// Message log backed by a file opened in append mode
pub struct FileLogSink {
    path: PathBuf,
    file: File,
}

impl FileLogSink {
    /// Open (or create) the log file for appending
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), "Message log opened");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn append(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await
    }
}

/// In-memory message log.
///
/// Clones share one buffer, so a test can keep a clone and inspect what the
/// router wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything appended so far
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }

    /// Appended lines, lossily decoded, without their trailing newline
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buf.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn append(&mut self, line: &[u8]) -> io::Result<()> {
        self.buf.lock().extend_from_slice(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_shares_buffer() {
        let sink = MemoryLogSink::new();
        let mut writer = sink.clone();
        writer.append(b"c1: hi\n").await.unwrap();
        writer.append(b"c2: yo\n").await.unwrap();
        assert_eq!(sink.lines(), vec!["c1: hi", "c2: yo"]);
    }

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.log");
        std::fs::write(&path, b"earlier: line\n").unwrap();

        let mut sink = FileLogSink::open(&path).await.unwrap();
        sink.append(b"c1: hi\n").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "earlier: line\nc1: hi\n");
    }

    #[tokio::test]
    async fn test_file_sink_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.log");

        let mut sink = FileLogSink::open(&path).await.unwrap();
        sink.append(b"c1: first\n").await.unwrap();

        assert_eq!(sink.path(), path.as_path());
        assert_eq!(std::fs::read(&path).unwrap(), b"c1: first\n");
    }

    #[tokio::test]
    async fn test_file_sink_open_fails_for_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/chat.log");
        assert!(FileLogSink::open(&path).await.is_err());
    }
}
