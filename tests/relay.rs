//! WebSocket-Relay und Signaling-Client über echte Sockets

use futures::{SinkExt, StreamExt};
use p2p_audio::connection::ConnectionState;
use p2p_audio::media::MediaConstraints;
use p2p_audio::relay::RelayServer;
use p2p_audio::signaling::{
    Envelope, IceCandidate, MessageKind, RoomRegistry, WebSocketSignaling,
};
use p2p_audio::testing::{FakeMediaSource, FakeTransportFactory};
use p2p_audio::{
    CallConfig, CallSessionController, JoinError, Role, RoomId, SignalingChannel, SignalingMessage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

async fn start_relay() -> (SocketAddr, RoomRegistry) {
    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());
    (addr, registry)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_roles_and_forwarding() {
    let (addr, _registry) = start_relay().await;
    let signaling = WebSocketSignaling::new(format!("ws://{}", addr));
    let room = RoomId::from("r1");

    let mut a = signaling.join(&room).await.unwrap();
    assert_eq!(a.role(), Role::Caller);

    // Offer geht raus, bevor B im Raum ist
    let offer = SignalingMessage::Offer {
        sdp: "v=0\r\n".to_string(),
    };
    a.send(offer.clone()).unwrap();

    let mut b = signaling.join(&room).await.unwrap();
    assert_eq!(b.role(), Role::Callee);
    assert_eq!(tokio::time::timeout(WAIT, b.recv()).await.unwrap(), Some(offer));

    let candidate = IceCandidate {
        candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".to_string(),
        sdp_mline_index: Some(0),
        sdp_mid: Some("0".to_string()),
    };
    b.send(SignalingMessage::Answer {
        sdp: "v=0\r\n".to_string(),
    })
    .unwrap();
    b.send(SignalingMessage::IceCandidate(candidate.clone()))
        .unwrap();

    assert!(matches!(
        tokio::time::timeout(WAIT, a.recv()).await.unwrap(),
        Some(SignalingMessage::Answer { .. })
    ));
    assert_eq!(
        tokio::time::timeout(WAIT, a.recv()).await.unwrap(),
        Some(SignalingMessage::IceCandidate(candidate))
    );
}

#[tokio::test]
async fn test_third_participant_is_rejected() {
    let (addr, registry) = start_relay().await;
    let signaling = WebSocketSignaling::new(format!("ws://{}", addr));
    let room = RoomId::from("r1");

    let _a = signaling.join(&room).await.unwrap();
    let _b = signaling.join(&room).await.unwrap();

    let err = signaling.join(&room).await.unwrap_err();
    assert_eq!(err, JoinError::RoomFull);
    assert_eq!(registry.occupancy(&room), 2);
}

#[tokio::test]
async fn test_close_and_drop_notify_peer() {
    let (addr, registry) = start_relay().await;
    let signaling = WebSocketSignaling::new(format!("ws://{}", addr));
    let room = RoomId::from("r1");

    let a = signaling.join(&room).await.unwrap();
    let mut b = signaling.join(&room).await.unwrap();

    a.close();
    assert_eq!(
        tokio::time::timeout(WAIT, b.recv()).await.unwrap(),
        Some(SignalingMessage::Bye)
    );
    wait_until(|| registry.occupancy(&room) == 1).await;

    // Ohne explizites Bye erzeugt der Relay eines
    let c = signaling.join(&room).await.unwrap();
    drop(c);
    assert_eq!(
        tokio::time::timeout(WAIT, b.recv()).await.unwrap(),
        Some(SignalingMessage::Bye)
    );
}

#[tokio::test]
async fn test_first_frame_must_be_join() {
    let (addr, _registry) = start_relay().await;
    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

    let offer = SignalingMessage::Offer {
        sdp: "v=0".to_string(),
    }
    .to_envelope(&RoomId::from("r1"));
    ws.send(Message::Text(offer.to_json().unwrap())).await.unwrap();

    let reply = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
    let Message::Text(text) = reply else {
        panic!("expected text frame, got {:?}", reply);
    };
    let envelope = Envelope::parse(&text).unwrap();
    assert_eq!(envelope.kind, MessageKind::Error);
    assert_eq!(envelope.error_message().as_deref(), Some("expected join"));
}

#[tokio::test]
async fn test_unreachable_relay() {
    // Port war kurz belegt und ist jetzt frei
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_addr = listener.local_addr().unwrap();
    drop(listener);

    let signaling = WebSocketSignaling::new(format!("ws://{}", closed_addr));
    let err = signaling.join(&RoomId::from("r1")).await.unwrap_err();
    assert!(matches!(err, JoinError::Unreachable(_)));
}

#[tokio::test]
async fn test_controllers_negotiate_over_relay() {
    let (addr, _registry) = start_relay().await;
    let url = format!("ws://{}", addr);

    let controller = || {
        CallSessionController::new(
            CallConfig {
                signaling_url: url.clone(),
                ..CallConfig::default()
            },
            Arc::new(FakeMediaSource::granting()),
            Arc::new(WebSocketSignaling::new(url.clone())),
            Arc::new(FakeTransportFactory::new()),
        )
    };
    let a = controller();
    let b = controller();

    for peer in [&a, &b] {
        peer.prepare_local_media(&MediaConstraints::audio())
            .await
            .unwrap();
    }
    assert_eq!(a.start_call("r1").await.unwrap(), Role::Caller);
    assert_eq!(b.start_call("r1").await.unwrap(), Role::Callee);

    wait_until(|| {
        a.connection_state() == ConnectionState::Connecting
            && b.connection_state() == ConnectionState::Connecting
    })
    .await;

    a.end_call().await;
    wait_until(|| !b.is_active()).await;
    assert_eq!(b.connection_state(), ConnectionState::Closed);
}
