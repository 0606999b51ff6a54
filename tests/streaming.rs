//! End-to-end event streaming over real WebSocket connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use futures::StreamExt;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;
use wot_gateway::SubscriptionRegistry;

mod common;
use common::{build_test_server, json_body, last_segment, request, sensor};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    addr: SocketAddr,
    app: axum::Router,
    subscriptions: Arc<SubscriptionRegistry>,
}

async fn start(device: Arc<wot_gateway::SimulatedDevice>) -> Harness {
    let server = build_test_server(device);
    let app = server.router();
    let subscriptions = server.subscriptions();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));

    Harness {
        addr,
        app,
        subscriptions,
    }
}

async fn subscribe(harness: &Harness) -> String {
    let response = harness
        .app
        .clone()
        .oneshot(request("POST", "/sensor/motion", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let links = json_body(response).await;
    last_segment(links["links"][0]["href"].as_str().unwrap())
}

async fn connect(harness: &Harness, id: &str) -> Client {
    let url = format!("ws://{}/sensor/motion/ws/{id}", harness.addr);
    let (client, _) = connect_async(url).await.expect("websocket handshake");
    client
}

async fn wait_for_clients(harness: &Harness, id: &str, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while harness.subscriptions.client_count(id).await != Some(expected) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("clients attached");
}

async fn next_frame(client: &mut Client) -> serde_json::Value {
    let msg = tokio::time::timeout(WAIT, client.next())
        .await
        .expect("frame in time")
        .expect("stream open")
        .expect("valid message");
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn motion_event_reaches_every_client() {
    let device = sensor();
    let harness = start(device.clone()).await;
    let id = subscribe(&harness).await;

    let mut first = connect(&harness, &id).await;
    let mut second = connect(&harness, &id).await;
    wait_for_clients(&harness, &id, 2).await;

    assert_eq!(device.emit("motionDetected", &json!({"motion": true})), 1);

    let a = next_frame(&mut first).await;
    let b = next_frame(&mut second).await;
    assert_eq!(a, b);
    assert_eq!(a["event"], json!({"motion": true}));
    assert!(a["timestamp"].is_string());
}

#[tokio::test]
async fn frames_arrive_in_publish_order() {
    let device = sensor();
    let harness = start(device.clone()).await;
    let id = subscribe(&harness).await;

    let mut client = connect(&harness, &id).await;
    wait_for_clients(&harness, &id, 1).await;

    for n in 0..5 {
        device.emit("motionDetected", &json!({"n": n}));
    }
    for n in 0..5 {
        assert_eq!(next_frame(&mut client).await["event"], json!({"n": n}));
    }
}

#[tokio::test]
async fn cancel_closes_attached_clients() {
    let device = sensor();
    let harness = start(device.clone()).await;
    let id = subscribe(&harness).await;

    let mut client = connect(&harness, &id).await;
    wait_for_clients(&harness, &id, 1).await;

    let response = harness
        .app
        .clone()
        .oneshot(request("DELETE", &format!("/sensor/motion/ws/{id}"), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let next = tokio::time::timeout(WAIT, client.next()).await.expect("close in time");
    match next {
        Some(Ok(Message::Close(_))) | None => {}
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(device.listener_count("motionDetected"), 0);
}

#[tokio::test]
async fn departed_client_does_not_affect_others() {
    let device = sensor();
    let harness = start(device.clone()).await;
    let id = subscribe(&harness).await;

    let leaving = connect(&harness, &id).await;
    let mut staying = connect(&harness, &id).await;
    wait_for_clients(&harness, &id, 2).await;
    drop(leaving);

    for n in 0..3 {
        device.emit("motionDetected", &json!({"n": n}));
    }
    for n in 0..3 {
        assert_eq!(next_frame(&mut staying).await["event"], json!({"n": n}));
    }
    assert!(harness.subscriptions.contains(&id).await);
}

#[tokio::test]
async fn unknown_subscription_is_rejected_at_upgrade() {
    let harness = start(sensor()).await;

    let url = format!("ws://{}/sensor/motion/ws/not-a-subscription", harness.addr);
    let err = connect_async(url).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), 404);
        }
        other => panic!("expected http rejection, got {other:?}"),
    }
}
