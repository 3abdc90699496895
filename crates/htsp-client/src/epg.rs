//! Electronic program guide data
//!
//! Built once from a `getEvents` reply and handed to the collaborating EPG
//! sink; the client keeps a copy to attach to the output group when the
//! subscription starts.

use htsp_core::Message;

/// One program guide entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpgEvent {
    /// Start time, seconds since the epoch
    pub start: i64,
    /// `stop - start` from the wire entry
    pub duration: i64,
    pub title: String,
    pub summary: String,
    pub description: String,
}

/// Program guide for one channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Epg {
    pub events: Vec<EpgEvent>,
    /// Start time of the event covering "now", when one does
    pub current_start: Option<i64>,
}

impl Epg {
    /// Collect the events for `channel_id` out of a `getEvents` reply.
    /// Events for other channels are skipped; `now` decides which event is
    /// current.
    pub fn from_reply(reply: &Message, channel_id: u32, now: i64) -> Self {
        let mut epg = Epg::default();

        let Some(events) = reply.get_list("events") else {
            return epg;
        };

        for event in events.maps() {
            if event.get_u32("channelId") != channel_id {
                continue;
            }

            let start = event.get_s64("start");
            let stop = event.get_s64("stop");

            if now >= start && now < stop {
                epg.current_start = Some(start);
            }

            epg.events.push(EpgEvent {
                start,
                duration: stop - start,
                title: event.get_str("title").to_string(),
                summary: event.get_str("summary").to_string(),
                description: event.get_str("description").to_string(),
            });
        }

        epg
    }
}

/// One channel gathered during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub id: u32,
    pub name: String,
    /// Presentation order number, distinct from the id
    pub number: u32,
}
