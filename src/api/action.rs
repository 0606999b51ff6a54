//! Action invoke and task polling handlers

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::http::HeaderMap;
use serde_json::Value;

use super::links::Links;
use super::{ApiError, ThingState};
use crate::actions::TaskSnapshot;
use crate::device::DeviceStatus;

/// `POST {base}/{href}`: start an action and return a link to its task
///
/// Returns as soon as the device accepts the invocation; the result is
/// fetched later from the task link.
///
/// # Errors
///
/// Returns 400 for undecodable input, 404 for unknown actions and 502 if
/// the device refuses to start
pub async fn invoke(
    thing: Arc<ThingState>,
    action: String,
    href: String,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Links>, ApiError> {
    let input_type = thing
        .device
        .description()
        .action(&action)
        .map(|a| a.input_type)
        .ok_or_else(|| ApiError::from(DeviceStatus::UnknownAction(action.clone())))?;

    let input = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        thing.server.codecs.decode(input_type, &body)?
    };

    let tracker = &thing.server.actions;
    let (task_id, completion) = tracker.create_slot(&thing.base, &action);

    if let Err(status) = thing.device.invoke_action(&action, input, completion) {
        tracker.discard(&task_id);
        tracing::warn!(thing = %thing.base, action = %action, status = %status, "action rejected");
        return Err(status.into());
    }
    tracker.accept(&task_id);

    tracing::info!(thing = %thing.base, action = %action, task_id = %task_id, "action started");

    let host = thing.link_host(&headers);
    Ok(Json(Links::task(format!(
        "http://{host}{}/{href}/{task_id}",
        thing.base
    ))))
}

/// `GET {base}/{href}/{taskid}`: current state of a task, never blocking
///
/// # Errors
///
/// Returns 404 if the task is unknown or belongs to another action or thing
pub async fn task_status(
    thing: Arc<ThingState>,
    action: String,
    task_id: String,
) -> Result<Json<TaskSnapshot>, ApiError> {
    thing
        .server
        .actions
        .get_for(&thing.base, &action, &task_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no task {task_id} for action {action}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::TaskStatus;
    use crate::api::ServerState;
    use crate::device::SimulatedDevice;
    use crate::thing::ThingDescription;
    use axum::http::StatusCode;
    use serde_json::json;

    fn printer() -> (Arc<SimulatedDevice>, Arc<ThingState>) {
        let td = ThingDescription::from_json(
            r#"{
                "name": "printer",
                "actions": [
                    {"name": "print", "hrefs": ["jobs"], "inputType": "string"},
                    {"name": "reboot"}
                ]
            }"#,
        )
        .unwrap();
        let device = Arc::new(SimulatedDevice::new(td));
        let thing = Arc::new(ThingState {
            base: "/printer".to_string(),
            device: device.clone(),
            server: Arc::new(ServerState::default()),
        });
        (device, thing)
    }

    fn task_id_of(links: &Links) -> String {
        links.links[0].href.rsplit('/').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn invoke_returns_task_link_and_poll_sees_pending() {
        let (device, thing) = printer();
        let Json(links) = invoke(
            thing.clone(),
            "print".to_string(),
            "jobs".to_string(),
            HeaderMap::new(),
            Bytes::from_static(b"\"hello\""),
        )
        .await
        .unwrap();

        assert_eq!(links.links[0].rel, "taskid");
        assert!(links.links[0].href.starts_with("http://localhost:"));
        assert!(links.links[0].href.contains("/printer/jobs/"));

        let task_id = task_id_of(&links);
        let Json(snapshot) = task_status(thing.clone(), "print".to_string(), task_id.clone())
            .await
            .unwrap();
        assert_eq!(snapshot.status, TaskStatus::Pending);

        device.complete_next("print", Ok(json!({"pages": 1})));
        let Json(snapshot) = task_status(thing, "print".to_string(), task_id).await.unwrap();
        assert_eq!(snapshot.status, TaskStatus::Done { result: json!({"pages": 1}) });
    }

    #[tokio::test]
    async fn empty_body_means_null_input() {
        let (device, thing) = printer();
        invoke(
            thing,
            "reboot".to_string(),
            "reboot".to_string(),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await
        .unwrap();
        assert_eq!(device.parked_count("reboot"), 1);
    }

    #[tokio::test]
    async fn task_of_other_action_is_not_found() {
        let (_device, thing) = printer();
        let Json(links) = invoke(
            thing.clone(),
            "reboot".to_string(),
            "reboot".to_string(),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await
        .unwrap();

        let err = task_status(thing, "print".to_string(), task_id_of(&links))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn undecodable_input_creates_no_task() {
        let (_device, thing) = printer();
        let err = invoke(
            thing.clone(),
            "print".to_string(),
            "jobs".to_string(),
            HeaderMap::new(),
            Bytes::from_static(b"42"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(thing.server.actions.is_empty());
    }
}
