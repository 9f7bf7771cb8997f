//! Protocol tests against a hand-driven peer.
//!
//! A plain `tokio::net::UdpSocket` stands in for one side so each test can
//! observe and inject exact datagrams.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use swp::{
    Endpoint, Packet, PacketError, PacketType, Receiver, ReceiverConfig, Sender, SenderConfig,
    SimulatorConfig, SwpError, TimerConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn raw_socket() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind raw socket");
    let addr = socket.local_addr().expect("local addr");
    (socket, addr)
}

async fn bind_receiver() -> Receiver {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Receiver::bind(addr, ReceiverConfig::default())
        .await
        .expect("bind receiver")
}

fn sender_config(timeout_ms: u64) -> SenderConfig {
    SenderConfig {
        timer: TimerConfig {
            timeout: Duration::from_millis(timeout_ms),
        },
        ..SenderConfig::default()
    }
}

/// Receive and decode one datagram, returning it with its source address.
async fn next_packet(socket: &UdpSocket, wait: Duration) -> Option<(Packet, Vec<u8>, SocketAddr)> {
    let mut buf = [0u8; 2048];
    let (n, from) = timeout(wait, socket.recv_from(&mut buf)).await.ok()?.ok()?;
    let raw = buf[..n].to_vec();
    let packet = Packet::decode(&raw).expect("peer sent a malformed packet");
    Some((packet, raw, from))
}

async fn expect_packet(socket: &UdpSocket) -> (Packet, Vec<u8>, SocketAddr) {
    next_packet(socket, Duration::from_secs(5))
        .await
        .expect("no datagram within 5s")
}

async fn recv_payload(receiver: &mut Receiver) -> Vec<u8> {
    timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("timed out waiting for payload")
        .expect("receiver stopped")
}

// ---------------------------------------------------------------------------
// Sender side
// ---------------------------------------------------------------------------

/// W sends go out immediately as DATA 0..W-1; the next blocks until an ACK
/// frees a slot, then goes out as DATA W.
#[tokio::test]
async fn test_window_saturation_and_slide() {
    let (peer, peer_addr) = raw_socket().await;
    let sender = Sender::connect(peer_addr, sender_config(10_000))
        .await
        .expect("connect");

    for i in 0..5u8 {
        sender.send(&[i]).await.expect("send");
    }

    let mut sender_addr = None;
    for expected in 0..5u32 {
        let (packet, _, from) = expect_packet(&peer).await;
        assert_eq!(packet.kind, PacketType::Data);
        assert_eq!(packet.seq_num, expected);
        assert_eq!(packet.payload, vec![expected as u8]);
        sender_addr = Some(from);
    }
    let sender_addr = sender_addr.unwrap();
    assert_eq!(sender.in_flight(), 5);

    assert!(timeout(Duration::from_millis(200), sender.send(b"x"))
        .await
        .is_err());

    peer.send_to(&Packet::ack(0).encode(), sender_addr)
        .await
        .unwrap();
    timeout(Duration::from_secs(2), sender.send(b"x"))
        .await
        .expect("send should unblock after ACK 0")
        .expect("send");

    let (packet, _, _) = expect_packet(&peer).await;
    assert_eq!(packet.seq_num, 5);
    assert_eq!(packet.payload, b"x");

    // One cumulative ACK covers the rest of the window.
    peer.send_to(&Packet::ack(5).encode(), sender_addr)
        .await
        .unwrap();
    timeout(Duration::from_secs(2), sender.flush())
        .await
        .expect("flush timed out")
        .expect("flush");
    assert_eq!(sender.in_flight(), 0);

    sender.shutdown().await.expect("shutdown");
}

/// An unacknowledged packet is resent byte-for-byte after the timeout, and
/// not again once acknowledged.
#[tokio::test]
async fn test_timeout_retransmits_identical_datagram() {
    let (peer, peer_addr) = raw_socket().await;
    let sender = Sender::connect(peer_addr, sender_config(100))
        .await
        .expect("connect");

    sender.send(b"hello").await.expect("send");

    let (first, first_raw, sender_addr) = expect_packet(&peer).await;
    assert_eq!(first.seq_num, 0);
    let (second, second_raw, _) = expect_packet(&peer).await;
    assert_eq!(second, first);
    assert_eq!(second_raw, first_raw);

    peer.send_to(&Packet::ack(0).encode(), sender_addr)
        .await
        .unwrap();
    timeout(Duration::from_secs(2), sender.flush())
        .await
        .expect("flush timed out")
        .expect("flush");

    assert!(next_packet(&peer, Duration::from_millis(350)).await.is_none());
    sender.shutdown().await.expect("shutdown");
}

/// Duplicate and stale ACKs are harmless.
#[tokio::test]
async fn test_stale_acks_free_nothing() {
    let (peer, peer_addr) = raw_socket().await;
    let sender = Sender::connect(peer_addr, sender_config(10_000))
        .await
        .expect("connect");

    for i in 0..3u8 {
        sender.send(&[i]).await.expect("send");
    }
    let mut sender_addr = None;
    for _ in 0..3 {
        sender_addr = Some(expect_packet(&peer).await.2);
    }
    let sender_addr = sender_addr.unwrap();

    for _ in 0..3 {
        peer.send_to(&Packet::ack(0).encode(), sender_addr)
            .await
            .unwrap();
    }
    // A DATA packet is not an acknowledgement.
    peer.send_to(&Packet::data(2, b"?".to_vec()).encode(), sender_addr)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sender.in_flight(), 2);

    sender.shutdown().await.expect("shutdown");
}

/// A malformed datagram terminates the driver; waiting callers see
/// `Closed` and `shutdown` reports the decode error.
#[tokio::test]
async fn test_malformed_datagram_stops_sender() {
    let (peer, peer_addr) = raw_socket().await;
    let sender = Sender::connect(peer_addr, sender_config(10_000))
        .await
        .expect("connect");

    sender.send(b"x").await.expect("send");
    let (_, _, sender_addr) = expect_packet(&peer).await;

    peer.send_to(&[b'A', 0], sender_addr).await.unwrap();

    let flushed = timeout(Duration::from_secs(2), sender.flush())
        .await
        .expect("flush should fail promptly");
    assert!(matches!(flushed, Err(SwpError::Closed)), "{flushed:?}");
    assert!(matches!(sender.send(b"y").await, Err(SwpError::Closed)));

    let outcome = sender.shutdown().await;
    assert!(
        matches!(
            outcome,
            Err(SwpError::Packet(PacketError::Malformed { len: 2 }))
        ),
        "{outcome:?}"
    );
}

/// With a 1 ms timeout the driver retransmits constantly, yet it still
/// handles the ACK, the flush and the shutdown.
#[tokio::test]
async fn test_tiny_timeout_keeps_driver_responsive() {
    let (peer, peer_addr) = raw_socket().await;
    let sender = Sender::connect(peer_addr, sender_config(1))
        .await
        .expect("connect");

    sender.send(b"x").await.expect("send");
    let (_, _, sender_addr) = expect_packet(&peer).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    peer.send_to(&Packet::ack(0).encode(), sender_addr)
        .await
        .unwrap();

    timeout(Duration::from_secs(2), sender.flush())
        .await
        .expect("flush timed out")
        .expect("flush");
    timeout(Duration::from_secs(2), sender.shutdown())
        .await
        .expect("shutdown timed out")
        .expect("shutdown");
}

// ---------------------------------------------------------------------------
// Receiver side
// ---------------------------------------------------------------------------

/// By the time an ACK reaches the peer, every payload it covers is already
/// readable from the receiver.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ack_follows_delivery() {
    let mut receiver = bind_receiver().await;
    let (peer, _) = raw_socket().await;
    let to = receiver.local_addr();

    for seq in 0..50u32 {
        peer.send_to(&Packet::data(seq, seq.to_be_bytes().to_vec()).encode(), to)
            .await
            .unwrap();
        let (ack, _, _) = expect_packet(&peer).await;
        assert_eq!(ack, Packet::ack(seq));

        // A zero timeout still polls once, so this only succeeds if the
        // payload was queued before the ACK went out.
        let payload = timeout(Duration::ZERO, receiver.recv())
            .await
            .unwrap_or_else(|_| panic!("ACK {seq} arrived before its payload"))
            .expect("receiver stopped");
        assert_eq!(payload, seq.to_be_bytes());
    }
}

/// Arrivals 2, 0, 1 are delivered as 0, 1, 2 with a single ACK 0; a later
/// duplicate is re-acknowledged with the frontier.
#[tokio::test]
async fn test_reordered_arrivals_are_delivered_in_order() {
    let mut receiver = bind_receiver().await;
    let (peer, _) = raw_socket().await;
    let to = receiver.local_addr();

    for seq in [2u32, 0, 1] {
        let packet = Packet::data(seq, format!("p{seq}").into_bytes());
        peer.send_to(&packet.encode(), to).await.unwrap();
    }

    assert_eq!(recv_payload(&mut receiver).await, b"p0");
    assert_eq!(recv_payload(&mut receiver).await, b"p1");
    assert_eq!(recv_payload(&mut receiver).await, b"p2");

    let (ack, _, _) = expect_packet(&peer).await;
    assert_eq!(ack, Packet::ack(0));
    assert!(
        next_packet(&peer, Duration::from_millis(200)).await.is_none(),
        "no ACK expected for the arrival that swept past itself"
    );

    peer.send_to(&Packet::data(1, b"p1".to_vec()).encode(), to)
        .await
        .unwrap();
    let (ack, _, _) = expect_packet(&peer).await;
    assert_eq!(ack, Packet::ack(2));
    assert!(timeout(Duration::from_millis(200), receiver.recv())
        .await
        .is_err());

    receiver.shutdown().await.expect("shutdown");
}

/// A receiver with a fixed peer ignores everybody else.
#[tokio::test]
async fn test_fixed_peer_filters_strangers() {
    let (peer, peer_addr) = raw_socket().await;
    let (stranger, _) = raw_socket().await;
    let config = ReceiverConfig {
        peer: Some(peer_addr),
        simulator: SimulatorConfig::default(),
    };
    let mut receiver = Receiver::bind("127.0.0.1:0".parse().unwrap(), config)
        .await
        .expect("bind");
    let to = receiver.local_addr();

    stranger
        .send_to(&Packet::data(0, b"intruder".to_vec()).encode(), to)
        .await
        .unwrap();
    peer.send_to(&Packet::data(0, b"friend".to_vec()).encode(), to)
        .await
        .unwrap();

    assert_eq!(recv_payload(&mut receiver).await, b"friend");
    assert_eq!(expect_packet(&peer).await.0, Packet::ack(0));
    assert!(next_packet(&stranger, Duration::from_millis(200))
        .await
        .is_none());
}

/// The first sender to speak becomes the only peer.
#[tokio::test]
async fn test_learned_peer_is_locked_in() {
    let mut receiver = bind_receiver().await;
    let (first, _) = raw_socket().await;
    let (second, _) = raw_socket().await;
    let to = receiver.local_addr();

    first
        .send_to(&Packet::data(0, b"first".to_vec()).encode(), to)
        .await
        .unwrap();
    assert_eq!(recv_payload(&mut receiver).await, b"first");
    assert_eq!(expect_packet(&first).await.0, Packet::ack(0));

    second
        .send_to(&Packet::data(1, b"second".to_vec()).encode(), to)
        .await
        .unwrap();
    assert!(timeout(Duration::from_millis(200), receiver.recv())
        .await
        .is_err());
}

/// A datagram shorter than the header stops the receiver.
#[tokio::test]
async fn test_malformed_datagram_stops_receiver() {
    let mut receiver = bind_receiver().await;
    let (peer, _) = raw_socket().await;

    peer.send_to(b"abc", receiver.local_addr()).await.unwrap();

    let end = timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("recv should return once the driver stops");
    assert!(end.is_none());

    let outcome = receiver.shutdown().await;
    assert!(
        matches!(
            outcome,
            Err(SwpError::Packet(PacketError::Malformed { len: 3 }))
        ),
        "{outcome:?}"
    );
}

/// An unknown type tag is a decode failure too.
#[tokio::test]
async fn test_unknown_type_stops_receiver() {
    let mut receiver = bind_receiver().await;
    let (peer, _) = raw_socket().await;

    peer.send_to(&[b'Z', 0, 0, 0, 0], receiver.local_addr())
        .await
        .unwrap();

    let end = timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("recv should return once the driver stops");
    assert!(end.is_none());
    assert!(matches!(
        receiver.shutdown().await,
        Err(SwpError::Packet(PacketError::UnknownType(b'Z')))
    ));
}

/// Stray ACKs sent to a receiver are ignored.
#[tokio::test]
async fn test_receiver_ignores_acks() {
    let mut receiver = bind_receiver().await;
    let (peer, _) = raw_socket().await;
    let to = receiver.local_addr();

    peer.send_to(&Packet::ack(3).encode(), to).await.unwrap();
    peer.send_to(&Packet::data(0, b"ok".to_vec()).encode(), to)
        .await
        .unwrap();

    assert_eq!(recv_payload(&mut receiver).await, b"ok");
    assert_eq!(expect_packet(&peer).await.0, Packet::ack(0));
    receiver.shutdown().await.expect("shutdown");
}

/// An endpoint without a fixed peer adopts the first sender's address.
#[tokio::test]
async fn test_endpoint_learns_peer() {
    let local: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let mut endpoint = Endpoint::bind(local, None, SimulatorConfig::default())
        .await
        .expect("bind");
    assert_eq!(endpoint.peer(), None);
    assert!(endpoint.send(b"nobody").await.is_err());

    let (peer, peer_addr) = raw_socket().await;
    peer.send_to(b"hello", endpoint.local_addr()).await.unwrap();

    let got = timeout(Duration::from_secs(2), endpoint.recv())
        .await
        .expect("recv timed out");
    assert_eq!(got.as_deref(), Some(&b"hello"[..]));
    assert_eq!(endpoint.peer(), Some(peer_addr));

    endpoint.send(b"reply").await.expect("send to learned peer");
    let mut buf = [0u8; 16];
    let (n, from) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .expect("reply timed out")
        .unwrap();
    assert_eq!(&buf[..n], b"reply");
    assert_eq!(from, endpoint.local_addr());
}

#[tokio::test]
async fn test_resolve_localhost() {
    let addr = swp::resolve("127.0.0.1", 9000).await.expect("resolve");
    assert_eq!(addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
}
