//! Event subscribe and cancel handlers

use std::sync::Arc;

use axum::Json;
use axum::http::{HeaderMap, StatusCode};

use super::links::Links;
use super::{ApiError, ThingState};

/// `POST {base}/{href}`: create a subscription and link to its stream
///
/// # Errors
///
/// Returns 404 if the device does not know the event
pub async fn subscribe(
    thing: Arc<ThingState>,
    event: String,
    href: String,
    headers: HeaderMap,
) -> Result<Json<Links>, ApiError> {
    let id = thing
        .server
        .subscriptions
        .subscribe(Arc::clone(&thing.device), &thing.base, &event)
        .await?;

    let host = thing.link_host(&headers);
    Ok(Json(Links::task(format!(
        "ws://{host}{}/{href}/ws/{id}",
        thing.base
    ))))
}

/// `DELETE {base}/{href}/ws/{subscriptionID}`: cancel a subscription
///
/// # Errors
///
/// Returns 404 if the subscription does not exist for this event on this
/// thing
pub async fn cancel(
    thing: Arc<ThingState>,
    event: String,
    subscription_id: String,
) -> Result<StatusCode, ApiError> {
    let cancelled = thing
        .server
        .subscriptions
        .cancel_owned(&subscription_id, &thing.base, &event)
        .await;

    if cancelled {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "no subscription {subscription_id} for event {event}"
        )))
    }
}
