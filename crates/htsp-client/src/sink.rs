//! Collaborator interfaces
//!
//! The client does not render or decode anything itself: demultiplexed
//! blocks, clock updates, and group metadata go to an [`OutputSink`], and
//! program guide entries go to an [`EpgSink`]. Both are supplied by the
//! embedding application.

use crate::epg::{Epg, EpgEvent};
use crate::media::{Block, StreamDescriptor};

/// Opaque reference to a registered output stream, owned by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

/// Receives the demultiplexed output of the active subscription.
///
/// Calls arrive from the consumer context only, never concurrently.
pub trait OutputSink: Send {
    /// Register an elementary stream; the handle identifies it in later calls
    fn add_stream(&mut self, descriptor: &StreamDescriptor) -> StreamHandle;

    /// Release a stream registered earlier
    fn remove_stream(&mut self, handle: StreamHandle);

    /// Deliver one media unit
    fn send_block(&mut self, handle: StreamHandle, block: Block);

    /// Advance the recovered program clock
    fn set_clock(&mut self, time: i64);

    /// Drop the clock baseline; timestamps are discontinuous after a seek
    fn reset_clock(&mut self);

    /// Title metadata for the program group
    fn set_group_meta(&mut self, group: u32, title: &str);

    /// Program guide for the program group
    fn set_group_epg(&mut self, group: u32, epg: &Epg);
}

/// Receives program guide entries fetched at connect time
pub trait EpgSink: Send {
    fn add_event(&mut self, event: &EpgEvent);

    /// Marks the event starting at `start` as the one airing now
    fn set_current(&mut self, start: i64);
}
