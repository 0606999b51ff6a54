//! HTTP and WebSocket binding for things
//!
//! Each thing is mounted under its own base path with routes derived from its
//! description by the [`binder`]. Requests are dispatched to the property,
//! action and event handlers; event streams run as long-lived sessions in
//! [`stream`].

pub mod action;
pub mod binder;
mod error;
pub mod event;
pub mod health;
pub mod links;
pub mod property;
pub mod stream;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderMap;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::actions::ActionTracker;
use crate::codec::CodecRegistry;
use crate::config::ServerConfig;
use crate::device::Device;
use crate::events::{DEFAULT_STREAM_BUFFER, SubscriptionRegistry};
use crate::{Error, Result};

pub use binder::{HttpMethod, Route, RouteHandler};
pub use error::ApiError;

/// Default bound on waiting for a property read or write
pub const DEFAULT_PROPERTY_TIMEOUT: Duration = Duration::from_secs(10);

/// State shared by every bound thing
#[derive(Debug)]
pub struct ServerState {
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub actions: Arc<ActionTracker>,
    pub codecs: CodecRegistry,
    pub property_timeout: Duration,
    pub stream_buffer: usize,
    pub public_host: Option<String>,
    pub port: u16,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            actions: Arc::new(ActionTracker::new()),
            codecs: CodecRegistry::new(),
            property_timeout: DEFAULT_PROPERTY_TIMEOUT,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            public_host: None,
            port: crate::config::DEFAULT_PORT,
        }
    }
}

/// Router state for one bound thing
pub struct ThingState {
    /// Normalized base path; empty for the root
    pub base: String,
    pub device: Arc<dyn Device>,
    pub server: Arc<ServerState>,
}

impl ThingState {
    /// Host to put in absolute links for this request
    #[must_use]
    pub fn link_host(&self, headers: &HeaderMap) -> String {
        links::link_host(self.server.public_host.as_deref(), headers, self.server.port)
    }
}

impl std::fmt::Debug for ThingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThingState")
            .field("base", &self.base)
            .field("thing", &self.device.description().name)
            .finish_non_exhaustive()
    }
}

/// Configuration for building a server
pub struct ServerBuilder {
    host: String,
    port: u16,
    public_host: Option<String>,
    property_timeout: Duration,
    stream_buffer: usize,
    codecs: CodecRegistry,
    things: Vec<(String, Arc<dyn Device>)>,
}

impl ServerBuilder {
    /// Create a new server builder with default settings
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: crate::config::DEFAULT_HOST.to_string(),
            port: crate::config::DEFAULT_PORT,
            public_host: None,
            property_timeout: DEFAULT_PROPERTY_TIMEOUT,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            codecs: CodecRegistry::new(),
            things: Vec::new(),
        }
    }

    /// Create a builder from resolved server configuration
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let codecs = if config.plain_text_strings {
            CodecRegistry::plain_text_strings()
        } else {
            CodecRegistry::new()
        };

        Self::new()
            .host(config.host.clone())
            .port(config.port)
            .public_host(config.public_host.clone())
            .property_timeout(config.property_timeout)
            .stream_buffer(config.stream_buffer)
            .codecs(codecs)
    }

    /// Set the listen host
    #[must_use]
    pub fn host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    /// Set the listen port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the host advertised in links
    #[must_use]
    pub fn public_host(mut self, host: Option<String>) -> Self {
        self.public_host = host;
        self
    }

    /// Set the property wait bound
    #[must_use]
    pub const fn property_timeout(mut self, timeout: Duration) -> Self {
        self.property_timeout = timeout;
        self
    }

    /// Set the per-client stream buffer, in frames
    #[must_use]
    pub const fn stream_buffer(mut self, frames: usize) -> Self {
        self.stream_buffer = frames;
        self
    }

    /// Set the codec registry
    #[must_use]
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Mount a device under `base`
    #[must_use]
    pub fn thing(mut self, base: &str, device: Arc<dyn Device>) -> Self {
        self.things.push((binder::normalize_base(base), device));
        self
    }

    /// Bind every thing and build the server
    ///
    /// # Errors
    ///
    /// Returns [`Error::Binding`] if a base path is bound twice or the
    /// combined route table has clashing routes
    pub fn build(self) -> Result<Server> {
        let state = Arc::new(ServerState {
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            actions: Arc::new(ActionTracker::new()),
            codecs: self.codecs,
            property_timeout: self.property_timeout,
            stream_buffer: self.stream_buffer.max(1),
            public_host: self.public_host,
            port: self.port,
        });

        let mut bases = HashSet::new();
        let mut combined = vec![Route {
            name: "health".to_string(),
            method: HttpMethod::Get,
            pattern: health::HEALTH_PATH.to_string(),
            handler: RouteHandler::Index,
        }];
        let mut routers = Vec::new();
        let mut things = Vec::new();

        for (base, device) in self.things {
            if !bases.insert(base.clone()) {
                return Err(Error::Binding(format!(
                    "base path {} is bound twice",
                    display_base(&base)
                )));
            }

            let thing = Arc::new(ThingState {
                base: base.clone(),
                device,
                server: Arc::clone(&state),
            });
            let (router, table) = binder::bind(thing)?;
            combined.extend(table.iter().cloned());
            // Clashes across things would make axum panic on merge
            binder::check(&combined)?;

            routers.push(router);
            things.push(BoundThing { base, routes: table });
        }

        let mut router = health::router(things.iter().map(|t| display_base(&t.base)).collect());
        for thing_router in routers {
            router = router.merge(thing_router);
        }

        // CORS layer for cross-origin requests from browsers
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let router = router.layer(cors).layer(TraceLayer::new_for_http());

        Ok(Server {
            state,
            router,
            host: self.host,
            things,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn display_base(base: &str) -> String {
    if base.is_empty() { "/".to_string() } else { base.to_string() }
}

/// A thing as mounted on the server
#[derive(Debug, Clone)]
pub struct BoundThing {
    pub base: String,
    pub routes: Vec<Route>,
}

/// Gateway HTTP server
#[derive(Debug)]
pub struct Server {
    state: Arc<ServerState>,
    router: Router,
    host: String,
    things: Vec<BoundThing>,
}

impl Server {
    /// Router serving every bound thing
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Things and their route tables
    #[must_use]
    pub fn things(&self) -> &[BoundThing] {
        &self.things
    }

    /// Subscription registry shared by all things
    #[must_use]
    pub fn subscriptions(&self) -> Arc<SubscriptionRegistry> {
        Arc::clone(&self.state.subscriptions)
    }

    /// Action tracker shared by all things
    #[must_use]
    pub fn actions(&self) -> Arc<ActionTracker> {
        Arc::clone(&self.state.actions)
    }

    /// Serve on an already bound listener until the process exits
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve on `listener` until `shutdown` completes
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, things = self.things.len(), "gateway listening");
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Server(format!("gateway server error: {e}")))
    }

    /// Bind the configured address and serve until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.state.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Server(format!("failed to bind {addr}: {e}")))?;

        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Run the server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;
    use crate::thing::ThingDescription;

    fn device(json: &str) -> Arc<dyn Device> {
        Arc::new(SimulatedDevice::new(ThingDescription::from_json(json).unwrap()))
    }

    #[test]
    fn builds_with_several_things() {
        let server = ServerBuilder::new()
            .thing("/lamp", device(r#"{"name": "lamp"}"#))
            .thing("door/", device(r#"{"name": "door"}"#))
            .build()
            .unwrap();

        let bases: Vec<_> = server.things().iter().map(|t| t.base.as_str()).collect();
        assert_eq!(bases, vec!["/lamp", "/door"]);
    }

    #[test]
    fn same_base_twice_is_rejected() {
        let err = ServerBuilder::new()
            .thing("/lamp", device(r#"{"name": "a"}"#))
            .thing("/lamp/", device(r#"{"name": "b"}"#))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Binding(_)));
    }

    #[test]
    fn clash_across_things_is_rejected() {
        let err = ServerBuilder::new()
            .thing(
                "/",
                device(r#"{"name": "root", "properties": [{"name": "lamp"}]}"#),
            )
            .thing("/lamp", device(r#"{"name": "lamp"}"#))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Binding(_)));
    }

    #[test]
    fn property_named_health_on_root_is_rejected() {
        let result = ServerBuilder::new()
            .thing(
                "/",
                device(r#"{"name": "root", "properties": [{"name": "health"}]}"#),
            )
            .build();
        assert!(result.is_err());
    }
}
