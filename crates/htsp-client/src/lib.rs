//! HTSP subscription client
//!
//! Async client for HTSP, the Tvheadend streaming-control protocol:
//! connect, authenticate, subscribe to a channel, and demultiplex the
//! elementary streams it carries, with timeshift seek/speed control and
//! per-stream filtering.
//!
//! The transport is owned by a background worker task; the consumer pulls
//! demuxed data through [`HtspClient::demux_step`] and delivers it to an
//! [`OutputSink`] implementation.
//!
//! ## Layout
//! - [`connection`] / [`session`]: framed transport and request/response
//!   correlation
//! - [`streams`]: stream table, I-frame gating, clock (PCR) recovery
//! - `worker`: socket-owning dispatch loop and control round-trips
//! - [`client`] / [`builder`]: consumer-facing surface
//! - [`discovery`]: channel catalogue browsing

pub mod builder;
pub mod client;
pub mod config;
pub mod connection;
pub mod control;
pub mod discovery;
pub mod epg;
pub mod error;
pub mod locator;
pub mod media;
pub mod session;
pub mod sink;
pub mod streams;
mod worker;

pub use builder::HtspClientBuilder;
pub use client::{DemuxStatus, HtspClient, State};
pub use config::{SubscribeConfig, Transcode};
pub use discovery::browse_channels;
pub use epg::{ChannelEntry, Epg, EpgEvent};
pub use error::{ClientError, Result};
pub use locator::Locator;
pub use media::{Block, Codec, FrameKind, MediaClass, MediaDetail, StreamDescriptor};
pub use session::ServerInfo;
pub use sink::{EpgSink, OutputSink, StreamHandle};

pub use htsp_core::{List, Map, Message, Method, Value};
