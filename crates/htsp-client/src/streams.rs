//! Per-subscription stream table and clock recovery
//!
//! `subscriptionStart` describes the elementary streams of the service;
//! every `muxpkt` afterwards carries a stream index, a payload, and
//! timestamps. The table resolves indices to output handles, gates video
//! on the first I-frame, and recovers a playback clock (PCR) as the
//! minimum DTS across the timed streams, throttled so the sink sees at
//! most one clock update per `pts_delay` interval.

use crate::control::{ControlSlots, TimeshiftWindow};
use crate::epg::Epg;
use crate::error::{ClientError, Result};
use crate::media::{Block, Codec, FrameKind, MediaClass, MediaDetail, StreamDescriptor};
use crate::sink::{OutputSink, StreamHandle};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One elementary stream. Placeholder entries (unrecognized codec or
/// audio-only policy) keep their slot so the index lookup stays stable,
/// but have no output handle and their packets are discarded.
struct EsStream {
    index: u32,
    is_video: bool,
    ignore_timing: bool,
    last_dts: i64,
    last_pts: i64,
    handle: Option<StreamHandle>,
}

pub struct StreamTable {
    streams: Vec<EsStream>,
    /// Video is held back until the first intra frame after each
    /// subscription start
    had_iframe: bool,
    /// Clock value last emitted to the sink
    last_pcr: i64,
    pts_delay: i64,
    /// Running maximum of the clock candidate, shared with the consumer
    current_pcr: Arc<AtomicI64>,
    /// Cumulative server-side drop counter, for delta logging
    drops: u32,
    channel_id: u32,
    audio_only: bool,
    /// EPG collected before the subscription started, flushed to the sink
    /// with the first `sourceinfo`
    pending_epg: Option<Epg>,
    slots: Arc<ControlSlots>,
    window: Arc<TimeshiftWindow>,
}

impl StreamTable {
    pub fn new(
        channel_id: u32,
        audio_only: bool,
        pts_delay: i64,
        slots: Arc<ControlSlots>,
        window: Arc<TimeshiftWindow>,
    ) -> Self {
        Self {
            streams: Vec::new(),
            had_iframe: false,
            last_pcr: 0,
            pts_delay,
            current_pcr: Arc::new(AtomicI64::new(0)),
            drops: 0,
            channel_id,
            audio_only,
            pending_epg: None,
            slots,
            window,
        }
    }

    /// Shared handle to the recovered clock.
    pub fn clock(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.current_pcr)
    }

    pub fn set_pending_epg(&mut self, epg: Epg) {
        self.pending_epg = Some(epg);
    }

    pub fn on_subscription_start(
        &mut self,
        msg: &htsp_core::Message,
        sink: &mut dyn OutputSink,
    ) -> Result<()> {
        self.teardown(sink);

        if let Some(source) = msg.get_map("sourceinfo") {
            let service = source.get_str("service");
            if !service.is_empty() {
                sink.set_group_meta(self.channel_id, service);
            }
            if let Some(epg) = self.pending_epg.take() {
                sink.set_group_epg(self.channel_id, &epg);
            }
        }

        let streams = msg
            .get_list("streams")
            .filter(|l| !l.is_empty())
            .ok_or_else(|| {
                ClientError::StreamTable("subscription started with no streams".into())
            })?;

        let mut disables = HashSet::new();
        for entry in streams.maps() {
            let index = entry.get_u32("index");
            let type_name = entry.get_str("type");

            let Some(codec) = Codec::from_type(type_name) else {
                warn!("stream {index}: unsupported type {type_name:?}");
                self.streams.push(EsStream {
                    index,
                    is_video: false,
                    ignore_timing: false,
                    last_dts: 0,
                    last_pts: 0,
                    handle: None,
                });
                continue;
            };

            let class = codec.class();
            if self.audio_only && class == MediaClass::Video {
                debug!("stream {index}: video disabled by audio-only policy");
                disables.insert(index);
                self.streams.push(EsStream {
                    index,
                    is_video: true,
                    ignore_timing: false,
                    last_dts: 0,
                    last_pts: 0,
                    handle: None,
                });
                continue;
            }

            let detail = match class {
                MediaClass::Video => MediaDetail::Video {
                    width: entry.get_u32("width"),
                    height: entry.get_u32("height"),
                },
                MediaClass::Audio => MediaDetail::Audio {
                    channels: entry.get_u32("channels"),
                    rate: entry.get_u32("rate"),
                },
                MediaClass::Subtitle => MediaDetail::Subtitle,
            };
            let language = match entry.get_str("language") {
                "" => None,
                lang => Some(lang.to_owned()),
            };
            let descriptor = StreamDescriptor {
                index,
                codec,
                detail,
                language,
                extra: entry.get_bin("meta").cloned(),
                group: self.channel_id,
            };

            info!("stream {index}: {type_name}");
            let handle = sink.add_stream(&descriptor);
            self.streams.push(EsStream {
                index,
                is_video: class == MediaClass::Video,
                ignore_timing: class == MediaClass::Subtitle,
                last_dts: 0,
                last_pts: 0,
                handle: Some(handle),
            });
        }

        // Rearm the filter so the new disable set reaches the server
        self.slots.set_disables(disables);

        self.had_iframe = false;
        self.last_pcr = 0;
        self.current_pcr.store(0, Ordering::Release);
        self.window.reset_shift();
        Ok(())
    }

    pub fn on_mux_packet(
        &mut self,
        msg: &htsp_core::Message,
        sink: &mut dyn OutputSink,
    ) -> Result<()> {
        if !msg.contains("stream") {
            return Err(ClientError::Packet("packet without stream index".into()));
        }
        let index = msg.get_u32("stream");
        let payload = msg
            .get_bin("payload")
            .ok_or_else(|| ClientError::Packet(format!("stream {index}: packet without payload")))?
            .clone();

        let pos = self
            .streams
            .iter()
            .position(|s| s.index == index)
            .ok_or_else(|| ClientError::Packet(format!("packet for unknown stream {index}")))?;

        if self.slots.is_disabled(index) || self.streams[pos].handle.is_none() {
            return Ok(());
        }

        let pts = msg.contains("pts").then(|| msg.get_s64("pts"));
        let dts = msg.contains("dts").then(|| msg.get_s64("dts"));
        let duration = msg.contains("duration").then(|| msg.get_s64("duration"));
        let frame = FrameKind::from_wire(msg.get_u32("frametype"));

        if !self.streams[pos].ignore_timing {
            if let Some(dts) = dts {
                self.streams[pos].last_dts = dts;
            }
            if let Some(pts) = pts {
                self.streams[pos].last_pts = pts;
            }
        }

        // the gate only judges packets that carry a frame classification;
        // untagged video flows through
        if self.streams[pos].is_video && !self.had_iframe {
            match frame {
                Some(FrameKind::Intra) => self.had_iframe = true,
                Some(_) => return Ok(()),
                None => {}
            }
        }

        self.advance_clock(sink);

        // handle checked above
        if let Some(handle) = self.streams[pos].handle {
            sink.send_block(
                handle,
                Block {
                    payload,
                    pts,
                    dts,
                    duration,
                    frame,
                },
            );
        }
        Ok(())
    }

    /// Clock candidate is the minimum positive DTS across the timed
    /// streams: the slowest stream gates the clock. The first nonzero
    /// candidate only arms the baseline; emission starts once a later
    /// candidate exceeds it by `pts_delay`.
    fn advance_clock(&mut self, sink: &mut dyn OutputSink) {
        let candidate = self
            .streams
            .iter()
            .filter(|s| !s.ignore_timing && s.last_dts > 0)
            .map(|s| s.last_dts)
            .min()
            .unwrap_or(0);
        if candidate == 0 {
            return;
        }

        self.current_pcr.fetch_max(candidate, Ordering::AcqRel);

        if self.last_pcr == 0 {
            self.last_pcr = candidate;
        } else if candidate > self.last_pcr + self.pts_delay {
            sink.set_clock(candidate);
            self.last_pcr = candidate;
        }
    }

    /// A skip acknowledgment breaks timestamp continuity. Malformed acks
    /// (error/size present, time absent) are ignored.
    pub fn on_subscription_skip(&mut self, msg: &htsp_core::Message, sink: &mut dyn OutputSink) {
        if msg.contains("error") || msg.contains("size") || !msg.contains("time") {
            debug!("ignoring malformed skip acknowledgment");
            return;
        }
        debug!("seek landed at {}", msg.get_s64("time"));
        self.last_pcr = 0;
        self.current_pcr.store(0, Ordering::Release);
        for s in &mut self.streams {
            s.last_dts = 0;
            s.last_pts = 0;
        }
        self.window.reset_shift();
        sink.reset_clock();
    }

    /// Drop counters are cumulative; only the delta is worth reporting.
    pub fn on_queue_status(&mut self, msg: &htsp_core::Message) {
        let total = msg.get_u32("Bdrops") + msg.get_u32("Pdrops") + msg.get_u32("Idrops");
        let delta = total.saturating_sub(self.drops);
        if delta > 0 {
            warn!("server dropped {delta} frames (queue congestion)");
        }
        self.drops = total;
    }

    pub fn teardown(&mut self, sink: &mut dyn OutputSink) {
        for stream in self.streams.drain(..) {
            if let Some(handle) = stream.handle {
                sink.remove_stream(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epg::EpgEvent;
    use bytes::Bytes;
    use htsp_core::{List, Map, Message};

    #[derive(Debug, PartialEq)]
    enum SinkEvent {
        Add(u32),
        Remove(u64),
        Block(u64, usize),
        Clock(i64),
        ResetClock,
        Meta(u32, String),
        EpgFlush(u32, usize),
    }

    #[derive(Default)]
    struct MockSink {
        next_handle: u64,
        events: Vec<SinkEvent>,
    }

    impl OutputSink for MockSink {
        fn add_stream(&mut self, descriptor: &StreamDescriptor) -> StreamHandle {
            self.next_handle += 1;
            self.events.push(SinkEvent::Add(descriptor.index));
            StreamHandle(self.next_handle)
        }
        fn remove_stream(&mut self, handle: StreamHandle) {
            self.events.push(SinkEvent::Remove(handle.0));
        }
        fn send_block(&mut self, handle: StreamHandle, block: Block) {
            self.events.push(SinkEvent::Block(handle.0, block.payload.len()));
        }
        fn set_clock(&mut self, time: i64) {
            self.events.push(SinkEvent::Clock(time));
        }
        fn reset_clock(&mut self) {
            self.events.push(SinkEvent::ResetClock);
        }
        fn set_group_meta(&mut self, group: u32, title: &str) {
            self.events.push(SinkEvent::Meta(group, title.to_owned()));
        }
        fn set_group_epg(&mut self, group: u32, epg: &Epg) {
            self.events.push(SinkEvent::EpgFlush(group, epg.events.len()));
        }
    }

    fn table() -> StreamTable {
        StreamTable::new(
            7,
            false,
            300_000,
            Arc::new(ControlSlots::new()),
            Arc::new(TimeshiftWindow::new()),
        )
    }

    fn start_message(types: &[(u32, &str)]) -> Message {
        let mut list = List::new();
        for (index, name) in types {
            let mut entry = Map::new();
            entry.set("index", *index as i64);
            entry.set("type", *name);
            list.push(entry);
        }
        let mut root = Map::new();
        root.set("method", "subscriptionStart");
        root.set("streams", list);
        Message::new(root)
    }

    fn packet(index: u32, dts: i64, frametype: Option<char>) -> Message {
        let mut root = Map::new();
        root.set("method", "muxpkt");
        root.set("stream", index as i64);
        root.set("payload", Bytes::from_static(&[0u8; 16]));
        root.set("dts", dts);
        root.set("pts", dts);
        if let Some(f) = frametype {
            root.set("frametype", f as i64);
        }
        Message::new(root)
    }

    #[test]
    fn empty_start_fails_and_discards_previous_table() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "AC3")]), &mut sink)
            .unwrap();

        let empty = Message::new({
            let mut root = Map::new();
            root.set("method", "subscriptionStart");
            root
        });
        assert!(matches!(
            t.on_subscription_start(&empty, &mut sink),
            Err(ClientError::StreamTable(_))
        ));
        // previous stream was released even though the start failed
        assert!(sink.events.contains(&SinkEvent::Remove(1)));
    }

    #[test]
    fn unrecognized_type_becomes_placeholder() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "AC3"), (2, "WEIRDCODEC")]), &mut sink)
            .unwrap();
        assert_eq!(sink.events, vec![SinkEvent::Add(1)]);

        // packets for the placeholder are silently discarded
        t.on_mux_packet(&packet(2, 1_000_000, None), &mut sink).unwrap();
        assert_eq!(sink.events.len(), 1);
    }

    #[test]
    fn unknown_index_is_packet_error() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "AC3")]), &mut sink)
            .unwrap();
        assert!(matches!(
            t.on_mux_packet(&packet(9, 1_000_000, None), &mut sink),
            Err(ClientError::Packet(_))
        ));
    }

    #[test]
    fn index_lookup_is_not_positional() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(4, "AC3"), (11, "AAC")]), &mut sink)
            .unwrap();
        t.on_mux_packet(&packet(11, 1_000_000, None), &mut sink).unwrap();
        assert_eq!(sink.events.last(), Some(&SinkEvent::Block(2, 16)));
    }

    #[test]
    fn video_held_until_first_iframe() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "H264")]), &mut sink)
            .unwrap();

        t.on_mux_packet(&packet(1, 1_000_000, Some('P')), &mut sink).unwrap();
        t.on_mux_packet(&packet(1, 1_040_000, Some('B')), &mut sink).unwrap();
        assert!(!sink.events.iter().any(|e| matches!(e, SinkEvent::Block(..))));

        t.on_mux_packet(&packet(1, 1_080_000, Some('I')), &mut sink).unwrap();
        t.on_mux_packet(&packet(1, 1_120_000, Some('P')), &mut sink).unwrap();
        let blocks: Vec<_> = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Block(..)))
            .collect();
        assert_eq!(blocks.len(), 2);
    }

    // A server that never classifies frames must not have its video held
    // back: the gate only applies to tagged packets.
    #[test]
    fn untagged_video_passes_without_iframe() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "H264")]), &mut sink)
            .unwrap();

        t.on_mux_packet(&packet(1, 1_000_000, None), &mut sink).unwrap();
        t.on_mux_packet(&packet(1, 1_040_000, None), &mut sink).unwrap();
        let blocks = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Block(..)))
            .count();
        assert_eq!(blocks, 2);

        // tagged predicted frames are still held until the first intra
        t.on_mux_packet(&packet(1, 1_080_000, Some('P')), &mut sink).unwrap();
        let blocks = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Block(..)))
            .count();
        assert_eq!(blocks, 2);
    }

    #[test]
    fn clock_throttled_by_pts_delay_with_arming_grace() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "AC3")]), &mut sink)
            .unwrap();

        // first candidate arms the baseline without emission
        t.on_mux_packet(&packet(1, 1_000_000, None), &mut sink).unwrap();
        // within the delay window: still no emission
        t.on_mux_packet(&packet(1, 1_200_000, None), &mut sink).unwrap();
        assert!(!sink.events.iter().any(|e| matches!(e, SinkEvent::Clock(_))));

        // past the window: exactly one update
        t.on_mux_packet(&packet(1, 1_400_000, None), &mut sink).unwrap();
        let clocks: Vec<_> = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Clock(_)))
            .collect();
        assert_eq!(clocks, vec![&SinkEvent::Clock(1_400_000)]);
    }

    #[test]
    fn slowest_stream_gates_the_clock() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "AC3"), (2, "AAC")]), &mut sink)
            .unwrap();

        t.on_mux_packet(&packet(1, 1_000_000, None), &mut sink).unwrap();
        // stream 2 is far ahead, but stream 1 holds the candidate back
        t.on_mux_packet(&packet(2, 9_000_000, None), &mut sink).unwrap();
        assert!(!sink.events.iter().any(|e| matches!(e, SinkEvent::Clock(_))));

        t.on_mux_packet(&packet(1, 2_000_000, None), &mut sink).unwrap();
        assert!(sink.events.contains(&SinkEvent::Clock(2_000_000)));
    }

    #[test]
    fn skip_zeroes_clocks_and_resets_sink_once() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "AC3")]), &mut sink)
            .unwrap();
        t.on_mux_packet(&packet(1, 1_000_000, None), &mut sink).unwrap();
        t.on_mux_packet(&packet(1, 2_000_000, None), &mut sink).unwrap();
        assert!(t.clock().load(Ordering::Acquire) > 0);

        let mut root = Map::new();
        root.set("method", "subscriptionSkip");
        root.set("time", 42_000_000i64);
        t.on_subscription_skip(&Message::new(root), &mut sink);

        assert_eq!(t.clock().load(Ordering::Acquire), 0);
        let resets = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::ResetClock))
            .count();
        assert_eq!(resets, 1);
    }

    #[test]
    fn malformed_skip_is_ignored() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "AC3")]), &mut sink)
            .unwrap();
        t.on_mux_packet(&packet(1, 1_000_000, None), &mut sink).unwrap();

        let mut root = Map::new();
        root.set("method", "subscriptionSkip");
        root.set("time", 42_000_000i64);
        root.set("error", 1i64);
        t.on_subscription_skip(&Message::new(root), &mut sink);
        assert!(!sink.events.iter().any(|e| matches!(e, SinkEvent::ResetClock)));

        // time field absent
        let mut root = Map::new();
        root.set("method", "subscriptionSkip");
        t.on_subscription_skip(&Message::new(root), &mut sink);
        assert!(!sink.events.iter().any(|e| matches!(e, SinkEvent::ResetClock)));
    }

    #[test]
    fn audio_only_disables_video_streams() {
        let slots = Arc::new(ControlSlots::new());
        let mut t = StreamTable::new(
            7,
            true,
            300_000,
            Arc::clone(&slots),
            Arc::new(TimeshiftWindow::new()),
        );
        let mut sink = MockSink::default();
        t.on_subscription_start(&start_message(&[(1, "H264"), (2, "AC3")]), &mut sink)
            .unwrap();

        // only the audio stream got an output handle
        assert_eq!(sink.events, vec![SinkEvent::Add(2)]);
        // the video index is queued for the server-side filter
        let disables = slots.take_disables_if_dirty().unwrap();
        assert!(disables.contains(&1));

        // video packets are discarded without error
        t.on_mux_packet(&packet(1, 1_000_000, Some('I')), &mut sink).unwrap();
        assert_eq!(sink.events.len(), 1);
    }

    #[test]
    fn sourceinfo_flushes_meta_and_pending_epg() {
        let mut t = table();
        let mut sink = MockSink::default();
        t.set_pending_epg(Epg {
            events: vec![EpgEvent {
                start: 100,
                duration: 1800,
                title: "News".into(),
                summary: String::new(),
                description: String::new(),
            }],
            current_start: Some(100),
        });

        let mut msg = start_message(&[(1, "AC3")]);
        let mut source = Map::new();
        source.set("service", "Channel One HD");
        msg.root_mut().set("sourceinfo", source);
        t.on_subscription_start(&msg, &mut sink).unwrap();

        assert!(sink
            .events
            .contains(&SinkEvent::Meta(7, "Channel One HD".into())));
        assert!(sink.events.contains(&SinkEvent::EpgFlush(7, 1)));
    }

    #[test]
    fn queue_status_reports_drop_deltas() {
        let mut t = table();
        let mut msg = Map::new();
        msg.set("Bdrops", 3i64);
        msg.set("Pdrops", 2i64);
        msg.set("Idrops", 1i64);
        t.on_queue_status(&Message::new(msg.clone()));
        assert_eq!(t.drops, 6);

        // same cumulative value again: delta is zero
        t.on_queue_status(&Message::new(msg));
        assert_eq!(t.drops, 6);
    }
}
