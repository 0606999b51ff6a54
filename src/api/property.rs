//! Property read and write handlers
//!
//! Each request owns the promise the device hands back and waits on it,
//! bounded by the configured property timeout. Waiting only parks the
//! request's own task.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use super::{ApiError, ThingState};
use crate::device::{DeviceStatus, Promise};
use crate::thing::DataType;

/// `GET {base}/{href}`
///
/// # Errors
///
/// Returns 404 for unknown properties, 502 for device failures and 504 if
/// the device does not answer in time
pub async fn read(thing: Arc<ThingState>, property: String) -> Result<Response, ApiError> {
    let value_type = declared_type(&thing, &property)?;

    let promise = thing.device.get_property(&property)?;
    let value = settle(&thing, &property, promise).await?;

    let encoded = thing.server.codecs.encode(value_type, &value)?;
    tracing::debug!(thing = %thing.base, property = %property, "property read");
    Ok(([(header::CONTENT_TYPE, encoded.content_type)], encoded.body).into_response())
}

/// `PUT {base}/{href}`
///
/// # Errors
///
/// Returns 400 if the body does not decode to the declared type, 502 for
/// device failures and 504 if the device does not acknowledge in time
pub async fn write(
    thing: Arc<ThingState>,
    property: String,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let value_type = declared_type(&thing, &property)?;
    let value = thing.server.codecs.decode(value_type, &body)?;

    let promise = thing.device.set_property(&property, value)?;
    settle(&thing, &property, promise).await?;

    tracing::debug!(thing = %thing.base, property = %property, "property written");
    Ok(StatusCode::OK)
}

fn declared_type(thing: &ThingState, property: &str) -> Result<DataType, ApiError> {
    thing
        .device
        .description()
        .property(property)
        .map(|p| p.value_type)
        .ok_or_else(|| DeviceStatus::UnknownProperty(property.to_string()).into())
}

async fn settle<T>(thing: &ThingState, property: &str, promise: Promise<T>) -> Result<T, ApiError> {
    let timeout = thing.server.property_timeout;
    match tokio::time::timeout(timeout, promise.wait()).await {
        Ok(outcome) => Ok(outcome?),
        Err(_) => {
            tracing::warn!(
                thing = %thing.base,
                property = %property,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "device did not answer property request"
            );
            Err(ApiError::Timeout(format!(
                "device did not answer for property {property} within {timeout:?}"
            )))
        }
    }
}
