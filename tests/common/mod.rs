//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use wot_gateway::{Device, Server, ServerBuilder, SimulatedDevice, ThingDescription};

/// Description of a motion sensor with a writable property, an action and an event
pub const SENSOR_TD: &str = r#"{
    "name": "hall-sensor",
    "properties": [
        {"name": "threshold", "hrefs": ["threshold"], "writable": true, "valueType": "integer"},
        {"name": "label", "hrefs": ["label"], "writable": true, "valueType": "string"},
        {"name": "battery", "hrefs": ["battery"], "valueType": "number"}
    ],
    "actions": [
        {"name": "reboot", "hrefs": ["reboot"]}
    ],
    "events": [
        {"name": "motionDetected", "hrefs": ["motion"], "valueType": "object"}
    ]
}"#;

/// Base path the sensor is mounted under
pub const SENSOR_BASE: &str = "/sensor";

/// Fresh simulated sensor whose actions wait for `complete_next`
#[must_use]
pub fn sensor() -> Arc<SimulatedDevice> {
    let td = ThingDescription::from_json(SENSOR_TD).expect("valid test description");
    Arc::new(SimulatedDevice::new(td))
}

/// Build a server with the sensor mounted at [`SENSOR_BASE`]
#[must_use]
pub fn build_test_server(device: Arc<SimulatedDevice>) -> Server {
    ServerBuilder::new()
        .port(8080)
        .thing(SENSOR_BASE, device as Arc<dyn Device>)
        .build()
        .expect("sensor binds")
}

/// Build a server with one sensor at `/a` and an identical one at `/b`
#[must_use]
pub fn build_twin_server(a: Arc<SimulatedDevice>, b: Arc<SimulatedDevice>) -> Server {
    ServerBuilder::new()
        .port(8080)
        .thing("/a", a as Arc<dyn Device>)
        .thing("/b", b as Arc<dyn Device>)
        .build()
        .expect("twin sensors bind")
}

/// Build a request with an optional body
#[must_use]
pub fn request(method: &str, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .expect("valid request")
}

/// Collect a response body as JSON
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Collect a response body as text
pub async fn text_body(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Last path segment of a link href
#[must_use]
pub fn last_segment(href: &str) -> String {
    href.rsplit('/').next().unwrap_or_default().to_string()
}
