//! Subscription client
//!
//! One `HtspClient` is one subscription on one connection. The background
//! worker reads the socket and feeds a bounded FIFO; the consumer drives
//! [`HtspClient::demux_step`] to drain it, one message per call, and uses
//! the control methods to arm seek/speed/filter requests that the worker
//! performs on its next pass.

use crate::config::SubscribeConfig;
use crate::connection::Connection;
use crate::control::{ControlSlots, TimeshiftWindow};
use crate::epg::Epg;
use crate::error::{ClientError, Result};
use crate::locator::Locator;
use crate::session::{ServerInfo, Session};
use crate::sink::{EpgSink, OutputSink};
use crate::streams::StreamTable;
use crate::worker::{QueueItem, Worker};
use htsp_core::{Method, MAX_QUEUE_SIZE, SUBSCRIPTION_ID};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of a subscription. `Streaming` is the only steady state;
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connecting,
    Authenticating,
    Subscribing,
    Streaming,
    Closed,
}

/// Outcome of one demux step.
#[derive(Debug, PartialEq, Eq)]
pub enum DemuxStatus {
    Continue,
    EndOfStream,
}

pub struct HtspClient {
    rx: mpsc::Receiver<QueueItem>,
    table: StreamTable,
    output: Box<dyn OutputSink>,
    slots: Arc<ControlSlots>,
    window: Arc<TimeshiftWindow>,
    current_pcr: Arc<AtomicI64>,
    timeshift_period: u32,
    server: ServerInfo,
    state: State,
    shutdown: Arc<Notify>,
    worker: Option<JoinHandle<()>>,
}

impl HtspClient {
    pub(crate) async fn connect(
        locator: Locator,
        client_name: String,
        config: SubscribeConfig,
        output: Box<dyn OutputSink>,
        mut epg_sink: Option<Box<dyn EpgSink>>,
        pts_delay: i64,
    ) -> Result<Self> {
        if locator.channel_id == 0 {
            return Err(ClientError::InvalidLocator(
                "no channel id in locator; browse the catalogue first".into(),
            ));
        }

        debug!(state = ?State::Connecting, "opening session");
        let conn = Connection::connect(&locator.address()).await?;
        let mut session = Session::new(conn);
        let (server, challenge) = session.hello(&client_name).await?;

        if let Some(username) = &locator.username {
            debug!(state = ?State::Authenticating, "authenticating");
            session
                .authenticate(
                    username,
                    locator.password.as_deref().unwrap_or(""),
                    challenge.as_ref(),
                )
                .await?;
        }

        debug!(state = ?State::Subscribing, "subscribing");
        let timeshift_period = session.subscribe(locator.channel_id, &config).await?;

        // EPG is best-effort; a server without EPG access still streams
        let epg = match session.get_events(locator.channel_id).await {
            Ok(reply) => {
                let now = unix_now();
                let epg = Epg::from_reply(&reply, locator.channel_id, now);
                if let Some(sink) = epg_sink.as_mut() {
                    for event in &epg.events {
                        sink.add_event(event);
                    }
                    if let Some(start) = epg.current_start {
                        sink.set_current(start);
                    }
                }
                Some(epg)
            }
            Err(e) => {
                warn!("event fetch failed: {e}");
                None
            }
        };

        let slots = Arc::new(ControlSlots::new());
        let window = Arc::new(TimeshiftWindow::new());
        let mut table = StreamTable::new(
            locator.channel_id,
            config.audio_only,
            pts_delay,
            Arc::clone(&slots),
            Arc::clone(&window),
        );
        if let Some(epg) = epg {
            table.set_pending_epg(epg);
        }
        let current_pcr = table.clock();

        let (tx, rx) = mpsc::channel(MAX_QUEUE_SIZE);
        let shutdown = Arc::new(Notify::new());
        let worker = Worker::new(
            session,
            tx,
            Arc::clone(&slots),
            Arc::clone(&window),
            Arc::clone(&shutdown),
        );
        let handle = tokio::spawn(worker.run());

        info!(state = ?State::Streaming, "session established");

        Ok(Self {
            rx,
            table,
            output,
            slots,
            window,
            current_pcr,
            timeshift_period,
            server,
            state: State::Streaming,
            shutdown,
            worker: Some(handle),
        })
    }

    /// Drain one message from the worker FIFO and dispatch it. Packet and
    /// stream-table failures are logged and recovered; only transport loss
    /// and `subscriptionStop` end the stream.
    pub async fn demux_step(&mut self) -> Result<DemuxStatus> {
        if self.state == State::Closed {
            return Ok(DemuxStatus::EndOfStream);
        }

        let msg = match self.rx.recv().await {
            Some(QueueItem::Message(msg)) => msg,
            Some(QueueItem::Eof) | None => {
                self.state = State::Closed;
                return Ok(DemuxStatus::EndOfStream);
            }
        };

        let method = msg.method();

        // subscription-scoped methods for someone else's subscription are
        // not ours to act on
        if msg.contains("subscriptionId") && msg.get_u32("subscriptionId") != SUBSCRIPTION_ID {
            return Ok(DemuxStatus::Continue);
        }

        match method {
            Method::MuxPacket => {
                if let Err(e) = self.table.on_mux_packet(&msg, self.output.as_mut()) {
                    warn!("dropping packet: {e}");
                }
            }
            Method::SubscriptionStart => {
                if let Err(e) = self.table.on_subscription_start(&msg, self.output.as_mut()) {
                    error!("subscription start rejected: {e}");
                }
            }
            Method::SubscriptionStop => {
                info!("subscription stopped by server");
                self.state = State::Closed;
                return Ok(DemuxStatus::EndOfStream);
            }
            Method::SubscriptionSkip => {
                self.table.on_subscription_skip(&msg, self.output.as_mut());
            }
            Method::QueueStatus => self.table.on_queue_status(&msg),
            Method::SubscriptionStatus => {
                let status = msg.get_str("status");
                if !status.is_empty() {
                    info!("subscription status: {status}");
                }
            }
            Method::SignalStatus | Method::SubscriptionSpeed => {}
            other => warn!("ignoring unhandled method {:?}", other.as_str()),
        }

        Ok(DemuxStatus::Continue)
    }

    /// Arm a playback-speed change, in percent (100 = realtime, 0 = pause).
    pub fn request_speed(&self, speed: i32) -> Result<()> {
        if self.timeshift_period == 0 {
            return Err(ClientError::TimeshiftUnavailable);
        }
        if !self.slots.request_speed(speed) {
            return Err(ClientError::ControlBusy);
        }
        Ok(())
    }

    /// Arm a seek. `time` is relative to the timeshift window start when
    /// `absolute`, otherwise an offset from the current playback time.
    pub fn request_seek(&self, time: i64, absolute: bool) -> Result<()> {
        if self.timeshift_period == 0 {
            return Err(ClientError::TimeshiftUnavailable);
        }
        let target = if absolute {
            self.window.start() + time
        } else {
            self.current_pcr.load(Ordering::Acquire) + time
        };
        if !self.slots.request_seek(target.max(0)) {
            return Err(ClientError::ControlBusy);
        }
        Ok(())
    }

    /// Re-enable and disable elementary streams by index. Takes effect on
    /// the worker's next pass; identical repeated requests cost nothing on
    /// the wire.
    pub fn request_stream_filter(&self, enable: &[u32], disable: &[u32]) {
        self.slots.update_disables(|set| {
            for index in enable {
                set.remove(index);
            }
            for index in disable {
                set.insert(*index);
            }
        });
    }

    /// Current playback time within the timeshift window, once the clock
    /// has been recovered.
    pub fn time(&self) -> Option<i64> {
        let pcr = self.current_pcr.load(Ordering::Acquire);
        (pcr != 0).then(|| pcr - self.window.start())
    }

    /// Span of the timeshift window.
    pub fn length(&self) -> Option<i64> {
        if self.timeshift_period == 0 || self.current_pcr.load(Ordering::Acquire) == 0 {
            return None;
        }
        Some(self.window.end() - self.window.start())
    }

    /// Playback position as a fraction of the timeshift window.
    pub fn position(&self) -> Option<f64> {
        let time = self.time()?;
        let length = self.length()?;
        if length <= 0 {
            return None;
        }
        Some((time as f64 / length as f64).clamp(0.0, 1.0))
    }

    pub fn can_timeshift(&self) -> bool {
        self.timeshift_period > 0
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Shut the worker down and release the remaining stream handles.
    pub async fn close(&mut self) {
        if self.state != State::Closed {
            self.state = State::Closed;
        }
        self.shutdown.notify_one();
        if let Some(handle) = self.worker.take() {
            let _ = handle.await;
        }
        self.table.teardown(self.output.as_mut());
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
