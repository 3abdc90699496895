//! Request/response correlation over one connection
//!
//! Every synchronous request carries a `seq` field; the server echoes it in
//! the reply. Push messages (stream packets, status updates) arrive on the
//! same socket interleaved with replies, so while waiting for a reply the
//! session buffers everything else in arrival order and hands it back out
//! through [`Session::read_message`].

use crate::config::SubscribeConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use bytes::Bytes;
use htsp_core::{Message, Method, MAX_QUEUE_SIZE, PROTOCOL_VERSION, SUBSCRIPTION_ID};
use sha1::{Digest, Sha1};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Server identity from the `hello` exchange
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol: u32,
}

pub struct Session {
    conn: Connection,
    next_seq: u32,
    pending: VecDeque<Message>,
}

impl Session {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            next_seq: 1,
            pending: VecDeque::new(),
        }
    }

    /// Next message in arrival order: buffered push messages first, then
    /// the socket.
    pub async fn read_message(&mut self) -> Result<Message> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(msg);
        }
        self.conn.recv().await
    }

    // seq is a positive i32 on the wire; 0 means "not correlated" and is
    // never issued
    fn bump_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = if seq >= i32::MAX as u32 { 1 } else { seq + 1 };
        seq
    }

    /// Stamp a request with a fresh `seq`, send it, and read until the
    /// matching reply arrives. Unrelated messages received in the meantime
    /// are buffered; if the buffer grows past `MAX_QUEUE_SIZE` the call
    /// fails with [`ClientError::QueueOverflow`] but the buffered messages
    /// are kept for later consumption.
    pub async fn request(&mut self, mut msg: Message) -> Result<Message> {
        let seq = self.bump_seq();
        msg.root_mut().set("seq", seq as i64);
        self.conn.send(&msg).await?;

        loop {
            let reply = self.conn.recv().await?;
            if reply.get_u32("seq") == seq {
                return check_reply(reply);
            }
            if self.pending.len() >= MAX_QUEUE_SIZE {
                warn!(
                    "pending buffer full ({MAX_QUEUE_SIZE} messages) while \
                     waiting for seq {seq}"
                );
                return Err(ClientError::QueueOverflow);
            }
            self.pending.push_back(reply);
        }
    }

    /// `hello` exchange. Returns the server identity and the auth
    /// challenge, if the server issued one.
    pub async fn hello(&mut self, client_name: &str) -> Result<(ServerInfo, Option<Bytes>)> {
        let mut msg = Message::request(Method::Hello);
        msg.root_mut().set("clientname", client_name);
        msg.root_mut().set("htspversion", PROTOCOL_VERSION as i64);

        let reply = self.request(msg).await?;
        let info = ServerInfo {
            name: reply.get_str("servername").to_owned(),
            version: reply.get_str("serverversion").to_owned(),
            protocol: reply.get_u32("htspversion"),
        };
        let challenge = reply.get_bin("challenge").cloned();

        if info.protocol < PROTOCOL_VERSION {
            warn!(
                "server speaks protocol {} (client {}), some features may \
                 be unavailable",
                info.protocol, PROTOCOL_VERSION
            );
        } else if info.protocol > PROTOCOL_VERSION {
            info!(
                "server speaks newer protocol {} (client {})",
                info.protocol, PROTOCOL_VERSION
            );
        }
        info!(
            "connected to {} {} (protocol {})",
            info.name, info.version, info.protocol
        );

        Ok((info, challenge))
    }

    /// `authenticate`. With a password and a server challenge the request
    /// carries the SHA-1 digest of password ++ challenge; otherwise the
    /// username goes alone.
    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
        challenge: Option<&Bytes>,
    ) -> Result<()> {
        let mut msg = Message::request(Method::Authenticate);
        msg.root_mut().set("username", username);

        if let Some(challenge) = challenge.filter(|c| !c.is_empty() && !password.is_empty()) {
            let mut hasher = Sha1::new();
            hasher.update(password.as_bytes());
            hasher.update(challenge);
            let digest = hasher.finalize();
            msg.root_mut()
                .set("digest", Bytes::copy_from_slice(&digest));
        }

        self.request(msg).await?;
        debug!("authenticated as {username}");
        Ok(())
    }

    /// `subscribe` to a channel. Returns the timeshift period granted by
    /// the server, in seconds (0 when timeshift is unavailable).
    pub async fn subscribe(&mut self, channel_id: u32, config: &SubscribeConfig) -> Result<u32> {
        let mut msg = Message::request(Method::Subscribe);
        let root = msg.root_mut();
        root.set("channelId", channel_id as i64);
        root.set("subscriptionId", SUBSCRIPTION_ID as i64);
        root.set("timeshiftPeriod", u32::MAX as i64);
        root.set("normts", 1i64);
        config.apply(root);

        let reply = self.request(msg).await?;
        let period = reply.get_u32("timeshiftPeriod");
        info!("subscribed to channel {channel_id} (timeshift period {period}s)");
        Ok(period)
    }

    /// `getEvents` for one channel. The reply is handed back raw for the
    /// EPG layer to filter.
    pub async fn get_events(&mut self, channel_id: u32) -> Result<Message> {
        let mut msg = Message::request(Method::GetEvents);
        msg.root_mut().set("channelId", channel_id as i64);
        self.request(msg).await
    }

    /// `enableAsyncMetadata`: ask the server to start pushing its channel
    /// catalogue.
    pub async fn enable_async_metadata(&mut self) -> Result<()> {
        let msg = Message::request(Method::EnableAsyncMetadata);
        self.request(msg).await?;
        Ok(())
    }
}

/// Server-side failure is carried in-band: an `error` string or a nonzero
/// `noaccess` flag.
fn check_reply(reply: Message) -> Result<Message> {
    if reply.get_u32("noaccess") != 0 {
        return Err(ClientError::Auth);
    }
    if reply.contains("error") {
        return Err(ClientError::ServerError(reply.get_str("error").to_owned()));
    }
    Ok(reply)
}
