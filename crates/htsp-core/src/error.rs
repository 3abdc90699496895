//! Codec error types

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while encoding or decoding wire data.
///
/// Every variant here is a `ProtocolError` in the session taxonomy: a
/// malformed frame is fatal to the connection that produced it.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown field type tag
    #[error("unknown field type tag: 0x{0:02x}")]
    UnknownTag(u8),

    /// Field header or payload runs past the end of the enclosing buffer
    #[error("truncated field: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    /// Declared payload length overruns the declared parent length
    #[error("field overruns parent: declared {declared} bytes, {remaining} remaining")]
    Overrun { declared: usize, remaining: usize },

    /// Field names are limited to 255 bytes by the one-byte name length
    #[error("field name too long: {0} bytes")]
    NameTooLong(usize),

    /// String payload is not valid UTF-8
    #[error("invalid string payload: {0}")]
    InvalidString(#[from] std::str::Utf8Error),
}
