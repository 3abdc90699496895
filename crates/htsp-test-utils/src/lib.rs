//! Scripted in-process HTSP server for integration tests
//!
//! [`TestServer`] binds a real TCP socket, accepts one client, answers the
//! handshake methods from a canned script, and lets the test push
//! arbitrary server-initiated messages. Every request the client sends is
//! recorded for later assertions.

use anyhow::Result;
use htsp_core::{List, Map, Message, Value};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::debug;

/// Initialize test logging once, honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Canned behavior for the scripted server.
#[derive(Clone)]
pub struct ServerOptions {
    /// Challenge returned from `hello`; `None` omits the field
    pub challenge: Option<Vec<u8>>,
    /// Answer `authenticate` with `noaccess: 1`
    pub reject_auth: bool,
    /// `timeshiftPeriod` granted on subscribe
    pub timeshift_period: u32,
    /// Raw event maps returned from `getEvents`
    pub events: Vec<Map>,
    /// Raw channel maps pushed as `channelAdd` after `enableAsyncMetadata`
    pub channels: Vec<Map>,
    /// Uncorrelated messages injected ahead of every reply, to exercise
    /// the client's pending buffer
    pub noise_before_reply: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            challenge: Some(b"0123456789abcdef0123456789abcdef".to_vec()),
            reject_auth: false,
            timeshift_period: 3600,
            events: Vec::new(),
            channels: Vec::new(),
            noise_before_reply: 0,
        }
    }
}

pub struct TestServer {
    addr: SocketAddr,
    push_tx: mpsc::UnboundedSender<Message>,
    requests: Arc<Mutex<Vec<Message>>>,
}

impl TestServer {
    pub async fn spawn(options: ServerOptions) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            if let Err(e) = serve(listener, options, push_rx, recorded).await {
                debug!("test server stopped: {e}");
            }
        });

        Ok(Self {
            addr,
            push_tx,
            requests,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Locator for this server and the given channel id.
    pub fn url(&self, channel: u32) -> String {
        format!("htsp://user:secret@{}/{channel}", self.addr)
    }

    /// Locator without credentials or channel.
    pub fn bare_url(&self) -> String {
        format!("htsp://{}", self.addr)
    }

    /// Queue a server-initiated message for delivery to the client.
    pub fn push(&self, root: Map) {
        let _ = self.push_tx.send(Message::new(root));
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<Message> {
        self.requests.lock().clone()
    }

    /// Requests received so far carrying the given method.
    pub fn requests_for(&self, method: &str) -> Vec<Message> {
        self.requests
            .lock()
            .iter()
            .filter(|m| m.get_str("method") == method)
            .cloned()
            .collect()
    }
}

/// Poll a condition until it holds or the timeout elapses.
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

async fn serve(
    listener: TcpListener,
    options: ServerOptions,
    mut push_rx: mpsc::UnboundedReceiver<Message>,
    requests: Arc<Mutex<Vec<Message>>>,
) -> Result<()> {
    let (stream, _) = listener.accept().await?;
    let (mut reader, mut writer) = stream.into_split();

    // reads live on their own task: read_exact is not cancellation-safe
    // inside select!
    let (req_tx, mut req_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(msg) => {
                    if req_tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    loop {
        tokio::select! {
            pushed = push_rx.recv() => match pushed {
                Some(msg) => write_frame(&mut writer, &msg).await?,
                None => return Ok(()),
            },
            received = req_rx.recv() => match received {
                Some(msg) => {
                    requests.lock().push(msg.clone());
                    handle(&mut writer, &options, &msg).await?;
                }
                None => return Ok(()),
            },
        }
    }
}

async fn read_frame(stream: &mut OwnedReadHalf) -> Result<Message> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await?;
    let len = u32::from_be_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Message::decode(&body)?)
}

async fn write_frame(stream: &mut OwnedWriteHalf, msg: &Message) -> Result<()> {
    let frame = msg.encode()?;
    stream.write_all(&frame).await?;
    Ok(())
}

fn reply_for(req: &Message) -> Map {
    let mut root = Map::new();
    if req.contains("seq") {
        root.set("seq", req.get_s64("seq"));
    }
    root
}

async fn handle(stream: &mut OwnedWriteHalf, options: &ServerOptions, req: &Message) -> Result<()> {
    for n in 0..options.noise_before_reply {
        let mut noise = Map::new();
        noise.set("method", "queueStatus");
        noise.set("subscriptionId", 1i64);
        noise.set("packets", n as i64);
        write_frame(stream, &Message::new(noise)).await?;
    }

    let mut reply = reply_for(req);
    match req.get_str("method") {
        "hello" => {
            reply.set("servername", "scripted-tvh");
            reply.set("serverversion", "0.0-test");
            reply.set("htspversion", 12i64);
            if let Some(challenge) = &options.challenge {
                reply.set("challenge", challenge.clone());
            }
        }
        "authenticate" => {
            if options.reject_auth {
                reply.set("noaccess", 1i64);
            }
        }
        "subscribe" => {
            reply.set("timeshiftPeriod", options.timeshift_period as i64);
        }
        "getEvents" => {
            let events: List = options
                .events
                .iter()
                .map(|m| Value::from(m.clone()))
                .collect();
            reply.set("events", events);
        }
        "enableAsyncMetadata" => {
            write_frame(stream, &Message::new(reply)).await?;
            for channel in &options.channels {
                let mut add = channel.clone();
                add.set("method", "channelAdd");
                write_frame(stream, &Message::new(add)).await?;
            }
            let mut done = Map::new();
            done.set("method", "initialSyncCompleted");
            write_frame(stream, &Message::new(done)).await?;
            return Ok(());
        }
        _ => {}
    }
    write_frame(stream, &Message::new(reply)).await?;
    Ok(())
}
