//! Subscription configuration
//!
//! Knobs forwarded opaquely into the `subscribe` request. The server is the
//! authority on what each transcode field means; the client only passes them
//! through.

use htsp_core::{Map, DEFAULT_QUEUE_DEPTH};

/// Server-side transcoding parameters, sent only when configured
#[derive(Debug, Clone, Default)]
pub struct Transcode {
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub subtitle_codec: Option<String>,
    pub language: Option<String>,
    pub max_resolution: Option<i64>,
    pub channels: Option<i64>,
    pub bandwidth: Option<i64>,
}

/// Options applied when subscribing to a channel
#[derive(Debug, Clone)]
pub struct SubscribeConfig {
    /// Drop video elementary streams and ask the server to stop sending them
    pub audio_only: bool,
    /// Named streaming profile on the server
    pub profile: Option<String>,
    pub transcode: Option<Transcode>,
    /// Server-side buffer depth in bytes
    pub queue_depth: u32,
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self {
            audio_only: false,
            profile: None,
            transcode: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl SubscribeConfig {
    /// Add the configured pass-through fields to a subscribe request
    pub(crate) fn apply(&self, root: &mut Map) {
        root.set("queueDepth", self.queue_depth);

        if let Some(profile) = self.profile.as_deref().filter(|p| !p.is_empty()) {
            root.set("profile", profile);
        }

        let Some(transcode) = &self.transcode else {
            return;
        };
        let strings = [
            ("videoCodec", &transcode.video_codec),
            ("audioCodec", &transcode.audio_codec),
            ("subtitleCodec", &transcode.subtitle_codec),
            ("language", &transcode.language),
        ];
        for (field, value) in strings {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                root.set(field, v);
            }
        }
        let integers = [
            ("maxResolution", transcode.max_resolution),
            ("channels", transcode.channels),
            ("bandwidth", transcode.bandwidth),
        ];
        for (field, value) in integers {
            if let Some(v) = value.filter(|v| *v != 0) {
                root.set(field, v);
            }
        }
    }
}
