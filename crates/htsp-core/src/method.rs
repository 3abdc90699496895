//! Protocol methods
//!
//! The server routes everything through a string `method` field; this enum
//! closes over the methods this client sends or handles, with an explicit
//! fallback for anything else, so dispatch happens on one `match` instead of
//! scattered string comparisons.

/// Known HTSP methods plus an unknown fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    // requests
    Hello,
    Authenticate,
    Subscribe,
    GetEvents,
    EnableAsyncMetadata,
    SubscriptionSpeed,
    SubscriptionSeek,
    SubscriptionFilterStream,
    // server pushes
    MuxPacket,
    SubscriptionStart,
    SubscriptionStop,
    SubscriptionStatus,
    SubscriptionSkip,
    QueueStatus,
    SignalStatus,
    TimeshiftStatus,
    ChannelAdd,
    InitialSyncCompleted,
    Unknown(String),
}

impl Method {
    pub fn from_name(name: &str) -> Self {
        match name {
            "hello" => Method::Hello,
            "authenticate" => Method::Authenticate,
            "subscribe" => Method::Subscribe,
            "getEvents" => Method::GetEvents,
            "enableAsyncMetadata" => Method::EnableAsyncMetadata,
            "subscriptionSpeed" => Method::SubscriptionSpeed,
            "subscriptionSeek" => Method::SubscriptionSeek,
            "subscriptionFilterStream" => Method::SubscriptionFilterStream,
            "muxpkt" => Method::MuxPacket,
            "subscriptionStart" => Method::SubscriptionStart,
            "subscriptionStop" => Method::SubscriptionStop,
            "subscriptionStatus" => Method::SubscriptionStatus,
            "subscriptionSkip" => Method::SubscriptionSkip,
            "queueStatus" => Method::QueueStatus,
            "signalStatus" => Method::SignalStatus,
            "timeshiftStatus" => Method::TimeshiftStatus,
            "channelAdd" => Method::ChannelAdd,
            "initialSyncCompleted" => Method::InitialSyncCompleted,
            other => Method::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Hello => "hello",
            Method::Authenticate => "authenticate",
            Method::Subscribe => "subscribe",
            Method::GetEvents => "getEvents",
            Method::EnableAsyncMetadata => "enableAsyncMetadata",
            Method::SubscriptionSpeed => "subscriptionSpeed",
            Method::SubscriptionSeek => "subscriptionSeek",
            Method::SubscriptionFilterStream => "subscriptionFilterStream",
            Method::MuxPacket => "muxpkt",
            Method::SubscriptionStart => "subscriptionStart",
            Method::SubscriptionStop => "subscriptionStop",
            Method::SubscriptionStatus => "subscriptionStatus",
            Method::SubscriptionSkip => "subscriptionSkip",
            Method::QueueStatus => "queueStatus",
            Method::SignalStatus => "signalStatus",
            Method::TimeshiftStatus => "timeshiftStatus",
            Method::ChannelAdd => "channelAdd",
            Method::InitialSyncCompleted => "initialSyncCompleted",
            Method::Unknown(s) => s.as_str(),
        }
    }
}
