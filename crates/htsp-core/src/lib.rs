//! HTSP Core
//!
//! Value model, binary codec, and protocol primitives for HTSP, the
//! Tvheadend streaming-control protocol.
//!
//! This crate provides:
//! - The self-describing tagged value tree ([`Value`], [`Map`], [`List`])
//! - Wire serialization/deserialization ([`Message`], [`codec`])
//! - The closed set of known protocol methods ([`Method`])
//!
//! No I/O lives here; the transport and session layers are in `htsp-client`.

pub mod codec;
pub mod error;
pub mod message;
pub mod method;
pub mod value;

pub use error::{Error, Result};
pub use message::Message;
pub use method::Method;
pub use value::{List, Map, Value};

/// HTSP protocol version advertised in the `hello` request
pub const PROTOCOL_VERSION: u32 = 12;

/// Default HTSP TCP port
pub const DEFAULT_PORT: u16 = 9982;

/// Bound on messages buffered while waiting for a correlated reply
pub const MAX_QUEUE_SIZE: usize = 1000;

/// Socket read timeout in seconds
pub const READ_TIMEOUT_SECS: u64 = 10;

/// Clock emission threshold in HTSP time units (microseconds)
pub const DEFAULT_PTS_DELAY: i64 = 300_000;

/// The single subscription id this client uses
pub const SUBSCRIPTION_ID: u32 = 1;

/// Server-side queue depth requested on subscribe (bytes)
pub const DEFAULT_QUEUE_DEPTH: u32 = 5 * 1024 * 1024;
