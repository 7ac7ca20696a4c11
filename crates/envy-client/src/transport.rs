// ── Line-oriented transport ──
//
// The socket is abstracted behind a small capability contract so the client
// can be driven by a scripted fake in tests. The real implementation frames
// lines with CRLF and strips terminators on read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::error::EnvyError;

/// Capability contract for line-oriented I/O against the device.
///
/// All methods take `&self`; implementations are internally synchronized so
/// the listen loop can read while another task sends.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the transport currently holds a live connection.
    fn connected(&self) -> bool;

    /// Establish the connection within `timeout`.
    ///
    /// Fails with [`EnvyError::ConnectionFailed`] or
    /// [`EnvyError::ConnectionTimeout`].
    async fn connect(&self, timeout: Duration) -> Result<(), EnvyError>;

    /// Tear down the connection. Idempotent.
    async fn close(&self) -> Result<(), EnvyError>;

    /// Read one line without its terminator.
    ///
    /// An elapsed `timeout` fails with [`EnvyError::read_timeout`], which the
    /// supervisor treats as "keep waiting"; a dead peer fails with
    /// [`EnvyError::NotConnected`] or [`EnvyError::Io`], which triggers
    /// reconnect.
    async fn read_line(&self, timeout: Duration) -> Result<String, EnvyError>;

    /// Send one line; the implementation appends CRLF framing.
    async fn send_line(&self, line: &str, timeout: Duration) -> Result<(), EnvyError>;
}

/// TCP transport speaking the device's CRLF-framed line protocol.
pub struct TcpTransport {
    host: String,
    port: u16,
    connected: AtomicBool,
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connected: AtomicBool::new(false),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self, timeout: Duration) -> Result<(), EnvyError> {
        let address = (self.host.clone(), self.port);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Err(_) => return Err(EnvyError::ConnectionTimeout { timeout }),
            Ok(Err(error)) => {
                return Err(EnvyError::ConnectionFailed { reason: error.to_string() });
            }
            Ok(Ok(stream)) => stream,
        };

        // Commands are short and latency-sensitive; never batch them.
        if let Err(error) = stream.set_nodelay(true) {
            tracing::debug!(error = %error, "set_nodelay failed");
        }

        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(BufReader::new(read_half));
        *self.writer.lock().await = Some(write_half);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(host = %self.host, port = self.port, "connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), EnvyError> {
        self.mark_disconnected();
        self.reader.lock().await.take();
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    async fn read_line(&self, timeout: Duration) -> Result<String, EnvyError> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Err(EnvyError::NotConnected);
        };

        let mut line = String::new();
        let read = match tokio::time::timeout(timeout, reader.read_line(&mut line)).await {
            Err(_) => return Err(EnvyError::read_timeout(timeout)),
            Ok(result) => result,
        };

        match read {
            Ok(0) => {
                self.mark_disconnected();
                Err(EnvyError::NotConnected)
            }
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(line)
            }
            Err(error) => {
                self.mark_disconnected();
                Err(EnvyError::Io(error))
            }
        }
    }

    async fn send_line(&self, line: &str, timeout: Duration) -> Result<(), EnvyError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(EnvyError::NotConnected);
        };

        let mut framed = Vec::with_capacity(line.len() + 2);
        framed.extend_from_slice(line.as_bytes());
        framed.extend_from_slice(b"\r\n");

        let written = async {
            writer.write_all(&framed).await?;
            writer.flush().await
        };
        match tokio::time::timeout(timeout, written).await {
            Err(_) => Err(EnvyError::Timeout { operation: "send", timeout }),
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                self.mark_disconnected();
                Err(EnvyError::Io(error))
            }
        }
    }
}
