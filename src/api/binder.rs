//! Thing description binder
//!
//! Turns a description into a route table once, at server build time, and
//! mounts the table on an axum router. Patterns shared by several routes
//! (a writable property's GET and PUT, say) become one method router, so a
//! method the description does not declare gets 405 from axum.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::routing::{MethodFilter, MethodRouter};
use serde::Serialize;

use super::{ThingState, action, event, property, stream};
use crate::thing::{Affordance, ThingDescription};
use crate::{Error, Result};

/// HTTP methods the binder emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }

    const fn filter(self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Put => MethodFilter::PUT,
            Self::Post => MethodFilter::POST,
            Self::Delete => MethodFilter::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which component serves a route, and for which affordance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteHandler {
    Index,
    Description,
    ReadProperty { property: String },
    WriteProperty { property: String },
    InvokeAction { action: String, href: String },
    TaskStatus { action: String },
    Subscribe { event: String, href: String },
    Stream { event: String },
    Cancel { event: String },
}

/// One entry of a bound route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: String,
    pub method: HttpMethod,
    pub pattern: String,
    pub handler: RouteHandler,
}

impl Route {
    fn new(name: impl Into<String>, method: HttpMethod, pattern: String, handler: RouteHandler) -> Self {
        Self {
            name: name.into(),
            method,
            pattern,
            handler,
        }
    }
}

impl Route {
    /// Pattern without the trailing parameter the binder appends to task and
    /// stream routes, and whether there was one
    fn literal_prefix(&self) -> (&str, bool) {
        let param = match self.handler {
            RouteHandler::TaskStatus { .. } => "/{taskid}",
            RouteHandler::Stream { .. } | RouteHandler::Cancel { .. } => "/{subscriptionID}",
            _ => return (self.pattern.as_str(), false),
        };
        self.pattern
            .strip_suffix(param)
            .map_or((self.pattern.as_str(), false), |literal| (literal, true))
    }
}

/// Normalize a base path: leading `/`, no trailing `/`, and `/` becomes empty
#[must_use]
pub fn normalize_base(base: &str) -> String {
    let trimmed = base.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn join(base: &str, element: &str) -> String {
    format!("{base}/{element}")
}

/// Derive the route table for a description mounted at `base`
#[must_use]
pub fn routes(base: &str, td: &ThingDescription) -> Vec<Route> {
    let base = normalize_base(base);
    let index = if base.is_empty() { "/".to_string() } else { base.clone() };

    let mut table = vec![
        Route::new("Index", HttpMethod::Get, index, RouteHandler::Index),
        Route::new(
            "model",
            HttpMethod::Get,
            join(&base, "description"),
            RouteHandler::Description,
        ),
    ];

    for prop in &td.properties {
        let href = prop.primary_href();
        let pattern = join(&base, href);
        table.push(Route::new(
            prop.name.as_str(),
            HttpMethod::Get,
            pattern.clone(),
            RouteHandler::ReadProperty {
                property: prop.name.clone(),
            },
        ));
        if prop.writable {
            table.push(Route::new(
                href,
                HttpMethod::Put,
                pattern,
                RouteHandler::WriteProperty {
                    property: prop.name.clone(),
                },
            ));
        }
    }

    for act in &td.actions {
        let href = act.primary_href();
        table.push(Route::new(
            href,
            HttpMethod::Post,
            join(&base, href),
            RouteHandler::InvokeAction {
                action: act.name.clone(),
                href: href.to_string(),
            },
        ));
        table.push(Route::new(
            format!("{href}Task"),
            HttpMethod::Get,
            join(&base, &format!("{href}/{{taskid}}")),
            RouteHandler::TaskStatus {
                action: act.name.clone(),
            },
        ));
    }

    for ev in &td.events {
        let href = ev.primary_href();
        let stream_pattern = join(&base, &format!("{href}/ws/{{subscriptionID}}"));
        table.push(Route::new(
            href,
            HttpMethod::Post,
            join(&base, href),
            RouteHandler::Subscribe {
                event: ev.name.clone(),
                href: href.to_string(),
            },
        ));
        table.push(Route::new(
            format!("{href}WebSocket"),
            HttpMethod::Get,
            stream_pattern.clone(),
            RouteHandler::Stream {
                event: ev.name.clone(),
            },
        ));
        table.push(Route::new(
            format!("{href}Cancel"),
            HttpMethod::Delete,
            stream_pattern,
            RouteHandler::Cancel {
                event: ev.name.clone(),
            },
        ));
    }

    table
}

/// Reject tables that axum could not mount
///
/// # Errors
///
/// Returns [`Error::Binding`] for a repeated (method, pattern) pair or an
/// href that would be read as a path parameter
pub fn check(table: &[Route]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut shapes: BTreeMap<String, &str> = BTreeMap::new();
    for route in table {
        let (literal, has_param) = route.literal_prefix();

        // Same shape under different parameter names cannot share a router
        let shape = if has_param {
            format!("{literal}/{{}}")
        } else {
            literal.to_string()
        };
        if let Some(other) = shapes.insert(shape, route.pattern.as_str())
            && other != route.pattern
        {
            return Err(Error::Binding(format!(
                "routes {other} and {} overlap",
                route.pattern
            )));
        }

        if !seen.insert((route.method, route.pattern.as_str())) {
            return Err(Error::Binding(format!(
                "duplicate route {} {} ({})",
                route.method, route.pattern, route.name
            )));
        }

        if literal.contains(['{', '}', '*']) {
            return Err(Error::Binding(format!(
                "route {} has reserved characters in its path: {}",
                route.name, route.pattern
            )));
        }
    }
    Ok(())
}

/// Build an axum router serving `thing`
///
/// # Errors
///
/// Returns [`Error::Binding`] if the description yields an unmountable
/// route table
pub fn bind(thing: Arc<ThingState>) -> Result<(Router, Vec<Route>)> {
    let table = routes(&thing.base, thing.device.description());
    check(&table)?;

    let router = {
        // Patterns in first-seen order so the mount order follows the table
        let mut order = Vec::new();
        let mut by_pattern: BTreeMap<&str, MethodRouter<Arc<ThingState>>> = BTreeMap::new();
        for route in &table {
            let method_router = by_pattern.remove(route.pattern.as_str()).unwrap_or_else(|| {
                order.push(route.pattern.as_str());
                MethodRouter::new()
            });
            by_pattern.insert(route.pattern.as_str(), add_handler(method_router, route));
        }

        let mut router = Router::new();
        for pattern in order {
            if let Some(method_router) = by_pattern.remove(pattern) {
                router = router.route(pattern, method_router);
            }
        }
        router
    };

    tracing::info!(thing = %thing.base, name = %thing.device.description().name, routes = table.len(), "thing bound");
    Ok((router.with_state(thing), table))
}

fn add_handler(
    method_router: MethodRouter<Arc<ThingState>>,
    route: &Route,
) -> MethodRouter<Arc<ThingState>> {
    let filter = route.method.filter();
    match route.handler.clone() {
        RouteHandler::Index => method_router.on(filter, |State(thing): State<Arc<ThingState>>| async move {
            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("Device information for -> {}", thing.device.description().name),
            )
        }),
        RouteHandler::Description => method_router.on(
            filter,
            |State(thing): State<Arc<ThingState>>, headers: HeaderMap| async move {
                let mut td = thing.device.description().clone();
                let uri = format!("http://{}{}", thing.link_host(&headers), thing.base);
                if !td.uris.contains(&uri) {
                    td.uris.push(uri);
                }
                axum::Json(td)
            },
        ),
        RouteHandler::ReadProperty { property: name } => method_router.on(
            filter,
            move |State(thing): State<Arc<ThingState>>| property::read(thing, name.clone()),
        ),
        RouteHandler::WriteProperty { property: name } => method_router.on(
            filter,
            move |State(thing): State<Arc<ThingState>>, body: Bytes| {
                property::write(thing, name.clone(), body)
            },
        ),
        RouteHandler::InvokeAction { action: name, href } => method_router.on(
            filter,
            move |State(thing): State<Arc<ThingState>>, headers: HeaderMap, body: Bytes| {
                action::invoke(thing, name.clone(), href.clone(), headers, body)
            },
        ),
        RouteHandler::TaskStatus { action: name } => method_router.on(
            filter,
            move |State(thing): State<Arc<ThingState>>, Path(task_id): Path<String>| {
                action::task_status(thing, name.clone(), task_id)
            },
        ),
        RouteHandler::Subscribe { event: name, href } => method_router.on(
            filter,
            move |State(thing): State<Arc<ThingState>>, headers: HeaderMap| {
                event::subscribe(thing, name.clone(), href.clone(), headers)
            },
        ),
        RouteHandler::Stream { event: name } => method_router.on(
            filter,
            move |State(thing): State<Arc<ThingState>>,
                  Path(subscription_id): Path<String>,
                  ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>| {
                stream::upgrade(thing, name.clone(), subscription_id, ws)
            },
        ),
        RouteHandler::Cancel { event: name } => method_router.on(
            filter,
            move |State(thing): State<Arc<ThingState>>, Path(subscription_id): Path<String>| {
                event::cancel(thing, name.clone(), subscription_id)
            },
        ),
    }
}

/// Render a route table as aligned text, one route per line
#[must_use]
pub fn render(table: &[Route]) -> String {
    let width = table.iter().map(|r| r.pattern.len()).max().unwrap_or(0);
    table
        .iter()
        .map(|r| format!("{:<6} {:<width$}  {}\n", r.method.as_str(), r.pattern, r.name))
        .collect()
}
