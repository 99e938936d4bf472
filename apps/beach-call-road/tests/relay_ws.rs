use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use beach_call_road::router;
use call_signaling::{
    ClientEvent, IceCandidate, PeerId, Relay, ServerEvent, SessionDescription, WsSignaling,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tower::ServiceExt;

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(Arc::new(Relay::new()))).await;
    });
    addr
}

async fn next_event(events: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

async fn user_list(events: &mut UnboundedReceiver<ServerEvent>) -> Vec<PeerId> {
    match next_event(events).await {
        ServerEvent::UpdateUserList { users } => users,
        other => panic!("expected update-user-list, got {other:?}"),
    }
}

#[tokio::test]
async fn relays_offer_answer_and_candidates_with_sender_id() {
    let addr = spawn_server().await;

    let (alice, mut alice_events) = WsSignaling::connect(&addr.to_string())
        .await
        .expect("alice connects")
        .into_parts();
    assert!(user_list(&mut alice_events).await.is_empty());

    let (bob, mut bob_events) = WsSignaling::connect(&format!("ws://{addr}"))
        .await
        .expect("bob connects")
        .into_parts();
    let online_for_bob = user_list(&mut bob_events).await;
    assert_eq!(online_for_bob.len(), 1);
    let alice_id = online_for_bob[0].clone();

    let announced = user_list(&mut alice_events).await;
    assert_eq!(announced.len(), 1);
    let bob_id = announced[0].clone();
    assert_ne!(alice_id, bob_id);

    alice
        .emit(ClientEvent::CallUser {
            offer: SessionDescription::offer("v=0 offer"),
            to: bob_id.clone(),
        })
        .expect("call-user");
    match next_event(&mut bob_events).await {
        ServerEvent::CallMade { offer, socket } => {
            assert_eq!(offer.sdp, "v=0 offer");
            assert_eq!(socket, alice_id);
        }
        other => panic!("expected call-made, got {other:?}"),
    }

    bob.emit(ClientEvent::MakeAnswer {
        answer: SessionDescription::answer("v=0 answer"),
        to: alice_id.clone(),
    })
    .expect("make-answer");
    bob.emit(ClientEvent::IceCandidate {
        candidate: IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 9 typ host"),
        to: alice_id.clone(),
    })
    .expect("ice-candidate");

    match next_event(&mut alice_events).await {
        ServerEvent::AnswerMade { answer, socket } => {
            assert_eq!(answer.sdp, "v=0 answer");
            assert_eq!(socket, Some(bob_id.clone()));
        }
        other => panic!("expected answer-made, got {other:?}"),
    }
    match next_event(&mut alice_events).await {
        ServerEvent::IceCandidatePost { candidate, socket } => {
            assert!(candidate.candidate.starts_with("candidate:1"));
            assert_eq!(socket, Some(bob_id.clone()));
        }
        other => panic!("expected ice-candidate-post, got {other:?}"),
    }

    drop(bob);
    drop(bob_events);
    match next_event(&mut alice_events).await {
        ServerEvent::RemoveUser { socket_id } => assert_eq!(socket_id, bob_id),
        other => panic!("expected remove-user, got {other:?}"),
    }
}

#[tokio::test]
async fn events_for_offline_users_are_dropped() {
    let addr = spawn_server().await;
    let (alice, mut alice_events) = WsSignaling::connect(&addr.to_string())
        .await
        .expect("connect")
        .into_parts();
    assert!(user_list(&mut alice_events).await.is_empty());

    alice
        .emit(ClientEvent::CallUser {
            offer: SessionDescription::offer("v=0"),
            to: PeerId::from("nobody"),
        })
        .expect("emit");
    assert!(
        timeout(Duration::from_millis(200), alice_events.recv())
            .await
            .is_err(),
        "nothing should come back"
    );
}

#[tokio::test]
async fn health_reports_ok() {
    let response = router(Arc::new(Relay::new()))
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["online"], 0);
}
