//! Elementary-stream media types

use bytes::Bytes;

/// Codecs announced by the server in `subscriptionStart` stream entries.
/// The protocol identifies them by type string; anything else becomes a
/// placeholder stream whose packets are silently discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Ac3,
    Eac3,
    Mpeg2Audio,
    Aac,
    Vorbis,
    Mpeg2Video,
    H264,
    DvbSubtitle,
    TextSubtitle,
    Teletext,
}

/// Broad media class of a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Video,
    Audio,
    Subtitle,
}

impl Codec {
    pub fn from_type(name: &str) -> Option<Self> {
        match name {
            "AC3" => Some(Codec::Ac3),
            "EAC3" => Some(Codec::Eac3),
            "MPEG2AUDIO" => Some(Codec::Mpeg2Audio),
            "AAC" => Some(Codec::Aac),
            "VORBIS" => Some(Codec::Vorbis),
            "MPEG2VIDEO" => Some(Codec::Mpeg2Video),
            "H264" => Some(Codec::H264),
            "DVBSUB" => Some(Codec::DvbSubtitle),
            "TEXTSUB" => Some(Codec::TextSubtitle),
            "TELETEXT" => Some(Codec::Teletext),
            _ => None,
        }
    }

    pub fn class(&self) -> MediaClass {
        match self {
            Codec::Mpeg2Video | Codec::H264 => MediaClass::Video,
            Codec::Ac3 | Codec::Eac3 | Codec::Mpeg2Audio | Codec::Aac | Codec::Vorbis => {
                MediaClass::Audio
            }
            Codec::DvbSubtitle | Codec::TextSubtitle | Codec::Teletext => MediaClass::Subtitle,
        }
    }
}

/// Class-specific stream properties copied from the subscription start entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaDetail {
    Video { width: u32, height: u32 },
    Audio { channels: u32, rate: u32 },
    Subtitle,
}

/// Everything the output sink needs to register one elementary stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Server-assigned stream index, not necessarily contiguous or 1-based
    pub index: u32,
    pub codec: Codec,
    pub detail: MediaDetail,
    pub language: Option<String>,
    /// Codec extradata from the entry's `meta` field
    pub extra: Option<Bytes>,
    /// Program group, the subscribed channel id
    pub group: u32,
}

/// Video frame classification carried by `muxpkt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Intra,
    Predicted,
    Bidirectional,
}

impl FrameKind {
    /// The wire carries the ASCII code of 'I', 'P', or 'B'; zero or anything
    /// else means unclassified
    pub fn from_wire(frametype: u32) -> Option<Self> {
        match frametype as u8 {
            b'I' => Some(FrameKind::Intra),
            b'P' => Some(FrameKind::Predicted),
            b'B' => Some(FrameKind::Bidirectional),
            _ => None,
        }
    }
}

/// One demultiplexed media unit handed to the output sink
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub payload: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: Option<i64>,
    pub frame: Option<FrameKind>,
}
