//! Handshake and request/response correlation against a scripted server

use anyhow::Result;
use htsp_client::connection::Connection;
use htsp_client::session::Session;
use htsp_client::{ClientError, SubscribeConfig};
use htsp_test_utils::{init_tracing, ServerOptions, TestServer};

async fn open_session(server: &TestServer) -> Result<Session> {
    let conn = Connection::connect(&server.addr().to_string()).await?;
    Ok(Session::new(conn))
}

#[tokio::test]
async fn handshake_reports_server_identity() -> Result<()> {
    init_tracing();
    let server = TestServer::spawn(ServerOptions::default()).await?;
    let mut session = open_session(&server).await?;

    let (info, challenge) = session.hello("test-player").await?;
    assert_eq!(info.name, "scripted-tvh");
    assert_eq!(info.protocol, 12);
    assert!(challenge.is_some());

    let hellos = server.requests_for("hello");
    assert_eq!(hellos.len(), 1);
    assert_eq!(hellos[0].get_str("clientname"), "test-player");
    assert_eq!(hellos[0].get_u32("htspversion"), 12);
    Ok(())
}

#[tokio::test]
async fn rejected_credentials_surface_as_auth_error() -> Result<()> {
    init_tracing();
    let server = TestServer::spawn(ServerOptions {
        reject_auth: true,
        ..Default::default()
    })
    .await?;
    let mut session = open_session(&server).await?;

    let (_, challenge) = session.hello("test-player").await?;
    let err = session
        .authenticate("user", "wrong", challenge.as_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Auth));
    Ok(())
}

#[tokio::test]
async fn authenticate_sends_digest_only_with_challenge_and_password() -> Result<()> {
    init_tracing();
    let server = TestServer::spawn(ServerOptions::default()).await?;
    let mut session = open_session(&server).await?;

    let (_, challenge) = session.hello("test-player").await?;
    session
        .authenticate("user", "secret", challenge.as_ref())
        .await?;
    session.authenticate("user", "", challenge.as_ref()).await?;

    let auths = server.requests_for("authenticate");
    assert_eq!(auths.len(), 2);
    let digest = auths[0].get_bin("digest").unwrap();
    assert_eq!(digest.len(), 20);
    assert!(auths[1].get_bin("digest").is_none());
    Ok(())
}

#[tokio::test]
async fn subscribe_carries_fixed_fields_and_returns_period() -> Result<()> {
    init_tracing();
    let server = TestServer::spawn(ServerOptions {
        timeshift_period: 7200,
        ..Default::default()
    })
    .await?;
    let mut session = open_session(&server).await?;
    session.hello("test-player").await?;

    let period = session.subscribe(3, &SubscribeConfig::default()).await?;
    assert_eq!(period, 7200);

    let subs = server.requests_for("subscribe");
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].get_u32("channelId"), 3);
    assert_eq!(subs[0].get_u32("subscriptionId"), 1);
    assert_eq!(subs[0].get_u32("normts"), 1);
    assert_eq!(subs[0].get_u32("queueDepth"), 5 * 1024 * 1024);
    assert_eq!(subs[0].get_u32("timeshiftPeriod"), u32::MAX);
    Ok(())
}

// Push messages that arrive while a reply is pending come back out of
// read_message afterwards, in arrival order.
#[tokio::test]
async fn interleaved_push_messages_are_buffered_in_order() -> Result<()> {
    init_tracing();
    let server = TestServer::spawn(ServerOptions {
        noise_before_reply: 3,
        ..Default::default()
    })
    .await?;
    let mut session = open_session(&server).await?;

    session.hello("test-player").await?;

    for expected in 0..3 {
        let msg = session.read_message().await?;
        assert_eq!(msg.get_str("method"), "queueStatus");
        assert_eq!(msg.get_u32("packets"), expected);
    }
    Ok(())
}

// Exceeding the pending-buffer capacity fails the in-flight request but
// keeps everything buffered so far.
#[tokio::test]
async fn pending_buffer_overflow_fails_call_but_keeps_messages() -> Result<()> {
    init_tracing();
    let server = TestServer::spawn(ServerOptions {
        noise_before_reply: 1001,
        ..Default::default()
    })
    .await?;
    let mut session = open_session(&server).await?;

    let err = session.hello("test-player").await.unwrap_err();
    assert!(matches!(err, ClientError::QueueOverflow));

    // the thousand buffered messages are still there, in order
    let first = session.read_message().await?;
    assert_eq!(first.get_u32("packets"), 0);
    let second = session.read_message().await?;
    assert_eq!(second.get_u32("packets"), 1);
    Ok(())
}

#[tokio::test]
async fn get_events_round_trip() -> Result<()> {
    init_tracing();
    let server = TestServer::spawn(ServerOptions::default()).await?;
    let mut session = open_session(&server).await?;
    session.hello("test-player").await?;

    let reply = session.get_events(3).await?;
    assert!(reply.get_list("events").is_some());

    let requests = server.requests_for("getEvents");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].get_u32("channelId"), 3);
    Ok(())
}
