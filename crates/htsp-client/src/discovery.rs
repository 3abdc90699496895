//! Channel catalogue browsing
//!
//! Used when a locator names a server but no channel. The server pushes
//! one `channelAdd` per channel after `enableAsyncMetadata`, then marks
//! the end of the initial dump with `initialSyncCompleted`.

use crate::connection::Connection;
use crate::epg::ChannelEntry;
use crate::error::Result;
use crate::locator::Locator;
use crate::session::Session;
use htsp_core::Method;
use tracing::{debug, info};

/// Connect, authenticate if credentials are present, and collect the
/// channel catalogue, sorted by channel number.
pub async fn browse_channels(locator: &Locator, client_name: &str) -> Result<Vec<ChannelEntry>> {
    let conn = Connection::connect(&locator.address()).await?;
    let mut session = Session::new(conn);

    let (_, challenge) = session.hello(client_name).await?;
    if let Some(username) = &locator.username {
        session
            .authenticate(
                username,
                locator.password.as_deref().unwrap_or(""),
                challenge.as_ref(),
            )
            .await?;
    }
    session.enable_async_metadata().await?;

    let mut channels = Vec::new();
    loop {
        let msg = session.read_message().await?;
        match msg.method() {
            Method::ChannelAdd => {
                let entry = ChannelEntry {
                    id: msg.get_u32("channelId"),
                    name: msg.get_str("channelName").to_owned(),
                    number: msg.get_u32("channelNumber"),
                };
                debug!("channel {} ({})", entry.name, entry.id);
                channels.push(entry);
            }
            Method::InitialSyncCompleted => break,
            _ => {}
        }
    }

    channels.sort_by_key(|c| c.number);
    info!("discovered {} channels", channels.len());
    Ok(channels)
}
