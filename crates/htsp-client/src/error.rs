//! Client error types
//!
//! The recovery class of each variant follows the session design: connect,
//! handshake, and authentication failures are fatal and surfaced to the
//! caller; a pending-queue overflow fails only the in-flight request; stream
//! table and packet errors fail one event and are otherwise recovered
//! locally; a read error or EOF terminates the session as end-of-stream. No
//! error triggers an automatic reconnect.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] htsp_core::Error),

    #[error("incoming message too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("access denied")]
    Auth,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("pending queue overflow while waiting for reply")]
    QueueOverflow,

    #[error("malformed subscription start: {0}")]
    StreamTable(String),

    #[error("bad media packet: {0}")]
    Packet(String),

    #[error("connection closed")]
    Disconnected,

    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    #[error("timeshift not available on this subscription")]
    TimeshiftUnavailable,

    #[error("a control request of this kind is already pending")]
    ControlBusy,
}
