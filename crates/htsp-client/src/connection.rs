//! Framed TCP transport
//!
//! One message on the wire is a 4-byte big-endian length followed by that
//! many body bytes. There is no other framing, compression, or encryption.
//! The connection is one-shot: a failed write, a read timeout, or EOF
//! invalidates it permanently and every later call fails with
//! [`ClientError::Disconnected`].

use crate::error::{ClientError, Result};
use htsp_core::{Message, READ_TIMEOUT_SECS};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Upper bound on an incoming message body; anything larger is treated as a
/// corrupt length prefix
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// TCP keepalive probe interval
const KEEPALIVE_SECS: u64 = 30;

/// A connected HTSP transport
pub struct Connection {
    stream: TcpStream,
    open: bool,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Self> {
        info!("connecting to {addr}");

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::Connection(format!("{addr}: {e}")))?;

        let socket = socket2::SockRef::from(&stream);
        let keepalive =
            socket2::TcpKeepalive::new().with_time(Duration::from_secs(KEEPALIVE_SECS));
        let _ = socket.set_tcp_keepalive(&keepalive);

        Ok(Self { stream, open: true })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Serialize and write one message. Write failures, short writes
    /// included, are fatal to the connection.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        if !self.open {
            return Err(ClientError::Disconnected);
        }

        let frame = msg.encode()?;
        if let Err(e) = self.stream.write_all(&frame).await {
            self.open = false;
            error!("write failed: {e}");
            return Err(ClientError::Disconnected);
        }
        Ok(())
    }

    /// Read one message. A zero-length body is a valid, empty message.
    pub async fn recv(&mut self) -> Result<Message> {
        if !self.open {
            return Err(ClientError::Disconnected);
        }

        let mut prefix = [0u8; 4];
        self.read_exact_timed(&mut prefix).await?;
        let len = u32::from_be_bytes(prefix) as usize;

        if len == 0 {
            return Ok(Message::default());
        }
        if len > MAX_MESSAGE_SIZE {
            self.open = false;
            return Err(ClientError::FrameTooLarge(len));
        }

        let mut body = vec![0u8; len];
        self.read_exact_timed(&mut body).await?;

        Message::decode(&body).map_err(|e| {
            self.open = false;
            error!("malformed message: {e}");
            ClientError::Protocol(e)
        })
    }

    async fn read_exact_timed(&mut self, buf: &mut [u8]) -> Result<()> {
        match timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            self.stream.read_exact(buf),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                self.open = false;
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    debug!("connection closed by server");
                } else {
                    error!("read failed: {e}");
                }
                Err(ClientError::Disconnected)
            }
            Err(_) => {
                self.open = false;
                error!("read timeout");
                Err(ClientError::Disconnected)
            }
        }
    }
}
