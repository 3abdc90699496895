//! Background worker owning the transport
//!
//! The worker is the only task that touches the socket. It forwards
//! ordinary messages to the consumer over a bounded channel, applies
//! `timeshiftStatus` directly to the shared window (latest value wins, no
//! point queuing it), and performs the synchronous control round-trips
//! armed by the consumer. At most one request is in flight at a time.

use crate::control::{ControlSlots, TimeshiftWindow};
use crate::error::ClientError;
use crate::session::Session;
use htsp_core::{List, Message, Method, Value, SUBSCRIPTION_ID};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

/// One entry on the consumer FIFO. `Eof` is the terminal sentinel pushed
/// when the transport dies or the worker shuts down.
pub(crate) enum QueueItem {
    Message(Message),
    Eof,
}

pub(crate) struct Worker {
    session: Session,
    tx: mpsc::Sender<QueueItem>,
    slots: Arc<ControlSlots>,
    window: Arc<TimeshiftWindow>,
    shutdown: Arc<Notify>,
    /// Disable set last acknowledged by the server, baseline for the
    /// symmetric-difference filter request
    acked_disables: HashSet<u32>,
}

impl Worker {
    pub(crate) fn new(
        session: Session,
        tx: mpsc::Sender<QueueItem>,
        slots: Arc<ControlSlots>,
        window: Arc<TimeshiftWindow>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            session,
            tx,
            slots,
            window,
            shutdown,
            acked_disables: HashSet::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let msg = tokio::select! {
                _ = self.shutdown.notified() => {
                    debug!("worker shutting down");
                    break;
                }
                res = self.session.read_message() => match res {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!("transport closed: {e}");
                        break;
                    }
                },
            };

            if msg.method() == Method::TimeshiftStatus {
                if msg.get_u32("subscriptionId") == SUBSCRIPTION_ID {
                    self.window.update(
                        msg.get_s64("shift"),
                        msg.get_s64("start"),
                        msg.get_s64("end"),
                    );
                }
            } else if self.tx.send(QueueItem::Message(msg)).await.is_err() {
                // consumer gone
                break;
            }

            if !self.drain_control().await {
                break;
            }
        }
        let _ = self.tx.send(QueueItem::Eof).await;
    }

    /// Service each armed control slot at most once. Returns false when
    /// the transport died underneath a round-trip.
    async fn drain_control(&mut self) -> bool {
        if let Some(speed) = self.slots.take_speed() {
            let mut msg = Message::request(Method::SubscriptionSpeed);
            msg.root_mut().set("subscriptionId", SUBSCRIPTION_ID as i64);
            msg.root_mut().set("speed", speed as i64);
            if !self.send_control(msg, "speed").await {
                return false;
            }
        }

        if let Some(target) = self.slots.take_seek() {
            let mut msg = Message::request(Method::SubscriptionSeek);
            msg.root_mut().set("subscriptionId", SUBSCRIPTION_ID as i64);
            msg.root_mut().set("time", target);
            msg.root_mut().set("absolute", 1i64);
            if !self.send_control(msg, "seek").await {
                return false;
            }
        }

        if let Some(wanted) = self.slots.take_disables_if_dirty() {
            let enable: List = self
                .acked_disables
                .difference(&wanted)
                .map(|&i| Value::from(i as i64))
                .collect();
            let disable: List = wanted
                .difference(&self.acked_disables)
                .map(|&i| Value::from(i as i64))
                .collect();

            // no difference against the acknowledged baseline: skip the
            // round-trip entirely
            if !enable.is_empty() || !disable.is_empty() {
                let mut msg = Message::request(Method::SubscriptionFilterStream);
                msg.root_mut().set("subscriptionId", SUBSCRIPTION_ID as i64);
                msg.root_mut().set("enable", enable);
                msg.root_mut().set("disable", disable);
                if !self.send_control(msg, "filter").await {
                    return false;
                }
                self.acked_disables = wanted;
            }
        }

        true
    }

    async fn send_control(&mut self, msg: Message, what: &str) -> bool {
        match self.session.request(msg).await {
            Ok(_) => true,
            Err(ClientError::Disconnected) => false,
            Err(e) => {
                warn!("{what} request failed: {e}");
                true
            }
        }
    }
}
