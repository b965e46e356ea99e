//! Integration tests for `ChatClient`: two or more clients talking through
//! a broker, over the in-process transport and over a real WebSocket.

use std::time::Duration;

use parley::prelude::*;
use parley::session::Clock;
use parley::transport::{event_channel, Connection, ConnectOptions, Publish};

// =========================================================================
// Helpers
// =========================================================================

/// Waits for the next view event matching `pred`, skipping others.
async fn expect_event(view: &mut ViewReceiver, pred: impl Fn(&ViewEvent) -> bool) -> ViewEvent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let event = tokio::time::timeout_at(deadline, view.recv())
            .await
            .expect("expected view event did not arrive")
            .expect("view queue closed");
        if pred(&event) {
            return event;
        }
    }
}

fn is_state(state: ConnectionState) -> impl Fn(&ViewEvent) -> bool {
    move |e| *e == ViewEvent::ConnectionStateChanged(state)
}

fn joined(username: &'static str) -> impl Fn(&ViewEvent) -> bool {
    move |e| matches!(e, ViewEvent::UserJoined { identity, .. } if identity.username() == username)
}

fn left(username: &'static str) -> impl Fn(&ViewEvent) -> bool {
    move |e| matches!(e, ViewEvent::UserLeft { identity, .. } if identity.username() == username)
}

fn chat() -> impl Fn(&ViewEvent) -> bool {
    |e| matches!(e, ViewEvent::ChatMessageReceived { .. })
}

/// Connects a client and waits until it has seen its own arrival.
async fn join<T: Transport>(
    transport: T,
    port: u16,
    username: &'static str,
) -> (ChatClient, ViewReceiver) {
    let (client, mut view) = ChatClient::new(transport);
    client
        .connect(ConnectRequest::new("127.0.0.1", port, username))
        .await
        .expect("connect should be accepted");
    expect_event(&mut view, is_state(ConnectionState::Connected)).await;
    expect_event(&mut view, joined(username)).await;
    (client, view)
}

async fn start_websocket_broker() -> (MemoryBroker, u16) {
    let broker = MemoryBroker::start(BrokerConfig::default());
    let server = WebSocketBroker::bind("127.0.0.1:0", broker.clone())
        .await
        .expect("should bind");
    let port = server.local_addr().expect("should have local addr").port();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    (broker, port)
}

// =========================================================================
// In-process broker
// =========================================================================

#[tokio::test]
async fn test_two_clients_see_each_other_and_chat() {
    let broker = MemoryBroker::start(BrokerConfig::default());
    let (alice, mut alice_view) = join(broker.clone(), 1883, "alice").await;
    let (bob, mut bob_view) = join(broker.clone(), 1883, "bob").await;

    // Bob found Alice in the retained replay before his own arrival.
    expect_event(&mut alice_view, joined("bob")).await;
    let seen_by_bob: Vec<String> = bob
        .participants()
        .await
        .unwrap()
        .iter()
        .map(|p| p.identity.username().to_string())
        .collect();
    assert_eq!(seen_by_bob, vec!["bob", "alice"]);

    bob.send("hi alice").await.unwrap();

    let at_alice = expect_event(&mut alice_view, chat()).await;
    assert!(matches!(
        at_alice,
        ViewEvent::ChatMessageReceived { ref identity, ref text, is_self: false }
            if identity.username() == "bob" && text == "hi alice"
    ));
    let at_bob = expect_event(&mut bob_view, chat()).await;
    assert!(matches!(at_bob, ViewEvent::ChatMessageReceived { is_self: true, .. }));

    let names: Vec<String> = alice
        .participants()
        .await
        .unwrap()
        .iter()
        .map(|p| p.identity.username().to_string())
        .collect();
    assert_eq!(names, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_disconnect_is_seen_by_peers() {
    let broker = MemoryBroker::start(BrokerConfig::default());
    let (alice, mut alice_view) = join(broker.clone(), 1883, "alice").await;
    let (_bob, mut bob_view) = join(broker.clone(), 1883, "bob").await;

    alice.disconnect().await.unwrap();

    expect_event(&mut alice_view, is_state(ConnectionState::Disconnecting)).await;
    expect_event(&mut alice_view, |e| *e == ViewEvent::ParticipantsCleared).await;
    expect_event(&mut alice_view, is_state(ConnectionState::Disconnected)).await;
    expect_event(&mut bob_view, left("alice")).await;
    assert_eq!(alice.state().await.unwrap(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_dropping_client_tears_session_down() {
    let broker = MemoryBroker::start(BrokerConfig::default());
    let (alice, _alice_view) = join(broker.clone(), 1883, "alice").await;
    let (_bob, mut bob_view) = join(broker.clone(), 1883, "bob").await;

    drop(alice);

    expect_event(&mut bob_view, left("alice")).await;
    let snapshot = broker.snapshot().await.unwrap();
    assert!(snapshot.retained.keys().all(|t| !t.starts_with("users/alice_")));
}

#[tokio::test]
async fn test_connect_while_connected_is_refused() {
    let broker = MemoryBroker::start(BrokerConfig::default());
    let (alice, _view) = join(broker, 1883, "alice").await;

    let err = alice
        .connect(ConnectRequest::new("127.0.0.1", 1883, "alice"))
        .await
        .unwrap_err();

    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn test_stale_presence_is_listed_without_join_notice() {
    let broker = MemoryBroker::start(BrokerConfig::default());

    // Plant a retained announcement from a minute ago.
    let (tx, _rx) = event_channel();
    let mut ghost = broker
        .connect(
            ConnectOptions {
                client_id: "carol_old".into(),
                ..ConnectOptions::default()
            },
            tx,
        )
        .unwrap();
    let minute_ago = SystemClock.now_millis() - 60_000;
    ghost
        .publish(Publish::retained(
            "users/carol_old",
            format!(r#"{{"timestamp":{minute_ago}}}"#).into_bytes(),
        ))
        .unwrap();
    ghost.disconnect().unwrap();

    let (client, mut view) = ChatClient::new(broker);
    client
        .connect(ConnectRequest::new("127.0.0.1", 1883, "dave"))
        .await
        .unwrap();

    let listed = expect_event(&mut view, |e| {
        matches!(e, ViewEvent::ParticipantListed { is_self: false, .. })
    })
    .await;
    assert!(matches!(
        listed,
        ViewEvent::ParticipantListed { ref identity, .. } if identity.username() == "carol"
    ));
    expect_event(&mut view, joined("dave")).await;

    while let Ok(event) = view.try_recv() {
        assert!(!joined("carol")(&event), "stale presence announced as join");
    }
}

#[tokio::test]
async fn test_broker_shutdown_reports_connection_lost() {
    let broker = MemoryBroker::start(BrokerConfig::default());
    let (_alice, mut view) = join(broker.clone(), 1883, "alice").await;

    broker.shutdown().unwrap();

    let fault = expect_event(&mut view, |e| matches!(e, ViewEvent::ErrorOccurred(_))).await;
    assert!(matches!(
        fault,
        ViewEvent::ErrorOccurred(SessionFault::ConnectionLost { code: 8, .. })
    ));
    expect_event(&mut view, is_state(ConnectionState::Disconnected)).await;
}

// =========================================================================
// WebSocket
// =========================================================================

#[tokio::test]
async fn test_websocket_clients_chat_and_leave() {
    let (_broker, port) = start_websocket_broker().await;
    let (alice, mut alice_view) = join(WebSocketTransport, port, "alice").await;
    let (bob, mut bob_view) = join(WebSocketTransport, port, "bob").await;

    alice.send("over the wire").await.unwrap();
    let at_bob = expect_event(&mut bob_view, chat()).await;
    assert!(matches!(
        at_bob,
        ViewEvent::ChatMessageReceived { ref text, .. } if text == "over the wire"
    ));

    bob.disconnect().await.unwrap();
    expect_event(&mut bob_view, is_state(ConnectionState::Disconnected)).await;
    expect_event(&mut alice_view, left("bob")).await;
}

#[tokio::test]
async fn test_websocket_unreachable_broker_reports_connection_failed() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (client, mut view) = ChatClient::new(WebSocketTransport);
    client
        .connect(ConnectRequest::new("127.0.0.1", port, "alice"))
        .await
        .unwrap();

    let fault = expect_event(&mut view, |e| matches!(e, ViewEvent::ErrorOccurred(_))).await;
    assert!(matches!(
        fault,
        ViewEvent::ErrorOccurred(SessionFault::ConnectionFailed { code: 7, .. })
    ));
    expect_event(&mut view, is_state(ConnectionState::Disconnected)).await;
}
