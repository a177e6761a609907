//! Two sessions talking to each other through a hand-driven "wire".
//!
//! Each test moves frames between a client-side `Session` and a
//! server-side `SessionManager` explicitly, so loss and reordering are
//! decided by the test, not by timing.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tether_protocol::{ClientToServerId, EncodedMessage, Message, SessionId};
use tether_session::{Frame, Session, SessionConfig, SessionManager, SessionState};

const MS: Duration = Duration::from_millis(1);

fn server_addr() -> SocketAddr {
    "127.0.0.1:7777".parse().unwrap()
}

fn client_addr() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

fn spawned(name: &str) -> EncodedMessage {
    Message::client(ClientToServerId::AvatarSpawned)
        .add(name)
        .finalize()
        .unwrap()
}

/// Delivers every queued client frame to the server, accepting on
/// `Connect` the way the relay does. Returns envelopes the server
/// session released.
fn client_to_server(
    client: &mut Session,
    server: &mut SessionManager,
    now: Duration,
) -> Vec<Bytes> {
    let mut delivered = Vec::new();
    for bytes in client.drain_outbox() {
        let frame = Frame::decode(bytes).unwrap();
        let id = match server.id_for(&client_addr()) {
            Some(id) => id,
            None => server.accept(client_addr(), client.nonce(), now).unwrap(),
        };
        delivered.extend(server.get_mut(id).unwrap().handle_frame(frame, now));
    }
    delivered
}

fn server_to_client(server: &mut SessionManager, client: &mut Session, now: Duration) -> Vec<Bytes> {
    let mut delivered = Vec::new();
    for session in server.iter_mut() {
        for bytes in session.drain_outbox() {
            let frame = Frame::decode(bytes).unwrap();
            delivered.extend(client.handle_frame(frame, now));
        }
    }
    delivered
}

fn connected_pair() -> (Session, SessionManager) {
    let mut client = Session::connecting(server_addr(), SessionConfig::default(), Duration::ZERO);
    let mut server = SessionManager::new(SessionConfig::default(), 10);
    client_to_server(&mut client, &mut server, Duration::ZERO);
    server_to_client(&mut server, &mut client, Duration::ZERO);
    assert!(client.is_connected());
    (client, server)
}

#[test]
fn test_handshake_assigns_session_id() {
    let (client, server) = connected_pair();
    assert_eq!(client.id(), Some(SessionId(1)));
    assert_eq!(server.connected_ids(), vec![SessionId(1)]);
}

#[test]
fn test_lost_accept_is_recovered_by_connect_retry() {
    let mut client = Session::connecting(server_addr(), SessionConfig::default(), Duration::ZERO);
    let mut server = SessionManager::new(SessionConfig::default(), 10);

    client_to_server(&mut client, &mut server, Duration::ZERO);
    // The Accept is lost.
    for session in server.iter_mut() {
        session.drain_outbox();
    }
    assert_eq!(client.state(), SessionState::Connecting);

    client.tick(100 * MS);
    client_to_server(&mut client, &mut server, 100 * MS);
    server_to_client(&mut server, &mut client, 100 * MS);

    assert_eq!(client.id(), Some(SessionId(1)));
    assert_eq!(server.len(), 1, "retry must not create a second session");
}

#[test]
fn test_accept_for_previous_connection_does_not_complete_new_one() {
    let (_, mut server) = connected_pair();

    // Same address, new attempt. The old server session still answers
    // with its own nonce, which the new client must not take.
    let mut client = Session::connecting(server_addr(), SessionConfig::default(), 10 * MS);
    let id = server.id_for(&client_addr()).unwrap();
    let stale = server.get(id).unwrap().nonce();
    assert_ne!(stale, client.nonce());

    client.handle_frame(
        Frame::Accept {
            session_id: id,
            nonce: stale,
        },
        10 * MS,
    );
    assert_eq!(client.state(), SessionState::Connecting);
}

#[test]
fn test_reliable_message_survives_loss() {
    let (mut client, mut server) = connected_pair();

    client.send(&spawned("Robot"), 10 * MS).unwrap();
    client.drain_outbox(); // lost in transit

    client.tick(110 * MS);
    let delivered = client_to_server(&mut client, &mut server, 110 * MS);
    assert_eq!(delivered, vec![spawned("Robot").into_bytes()]);

    // The ack makes it back; nothing further is resent.
    server_to_client(&mut server, &mut client, 110 * MS);
    assert_eq!(client.in_flight(), 0);
    client.tick(500 * MS);
    let resent = client
        .drain_outbox()
        .into_iter()
        .filter(|b| matches!(Frame::decode(b.clone()), Ok(Frame::Reliable { .. })))
        .count();
    assert_eq!(resent, 0);
}

#[test]
fn test_reliable_messages_delivered_in_send_order_despite_reordering() {
    let (mut client, mut server) = connected_pair();
    for name in ["a", "b", "c"] {
        client.send(&spawned(name), MS).unwrap();
    }
    let mut frames = client.drain_outbox();
    frames.reverse();

    let id = server.id_for(&client_addr()).unwrap();
    let session = server.get_mut(id).unwrap();
    let delivered: Vec<Bytes> = frames
        .into_iter()
        .flat_map(|b| session.handle_frame(Frame::decode(b).unwrap(), 2 * MS))
        .collect();

    assert_eq!(
        delivered,
        vec![
            spawned("a").into_bytes(),
            spawned("b").into_bytes(),
            spawned("c").into_bytes(),
        ]
    );
}

#[test]
fn test_graceful_disconnect_reaches_server() {
    let (mut client, mut server) = connected_pair();
    client.disconnect(MS);
    client_to_server(&mut client, &mut server, MS);

    let removed = server.remove_terminated();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].state(), SessionState::Disconnected);
    assert!(server.is_empty());
}

#[test]
fn test_heartbeats_keep_idle_link_alive() {
    let (mut client, mut server) = connected_pair();
    let mut now = Duration::ZERO;
    while now < Duration::from_secs(30) {
        now += 100 * MS;
        client.tick(now);
        server.tick_all(now);
        client_to_server(&mut client, &mut server, now);
        server_to_client(&mut server, &mut client, now);
    }
    assert!(client.is_connected());
    assert_eq!(server.connected_ids().len(), 1);
}
