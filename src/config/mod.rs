//! Configuration management for the gateway
//!
//! Values resolve in order: environment, then the TOML file, then defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::Result;

pub use file::GatewayConfigFile;

/// Default listen host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default delay before a simulated action completes
pub const DEFAULT_ACTION_DELAY: Duration = Duration::from_secs(1);

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Things to mount
    pub things: Vec<ThingConfig>,

    /// Simulated device behaviour
    pub simulation: SimulationConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to listen on
    pub host: String,

    /// Port to listen on (from `WOT_PORT` or `PORT`)
    pub port: u16,

    /// Host advertised in links instead of the request's `Host` header
    pub public_host: Option<String>,

    /// Bound on waiting for a device to answer a property request
    pub property_timeout: Duration,

    /// Per-client stream buffer, in frames
    pub stream_buffer: usize,

    /// Serve `string` properties as `text/plain` instead of JSON
    pub plain_text_strings: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_host: None,
            property_timeout: crate::api::DEFAULT_PROPERTY_TIMEOUT,
            stream_buffer: crate::events::DEFAULT_STREAM_BUFFER,
            plain_text_strings: false,
        }
    }
}

/// A thing mounted from a description file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingConfig {
    pub base_path: String,
    pub description: PathBuf,
}

/// Simulated device behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// How long simulated actions take
    pub action_delay: Duration,

    /// Emit every declared event on this period; `None` disables
    pub event_interval: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            action_delay: DEFAULT_ACTION_DELAY,
            event_interval: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment and a config file
    ///
    /// Uses `path` when given, else the standard config file location.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly named config file cannot be loaded
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::load_from(path)?,
            None => file::load_config_file(),
        };
        Ok(Self::resolve(fc, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file with an environment lookup
    #[must_use]
    pub fn resolve(fc: GatewayConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let server = ServerConfig {
            host: env("WOT_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_env(&env, "WOT_PORT")
                .or_else(|| parse_env(&env, "PORT"))
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            public_host: env("WOT_PUBLIC_HOST")
                .or(fc.server.public_host)
                .filter(|h| !h.is_empty()),
            property_timeout: parse_env(&env, "WOT_PROPERTY_TIMEOUT_MS")
                .or(fc.server.property_timeout_ms)
                .map_or(crate::api::DEFAULT_PROPERTY_TIMEOUT, Duration::from_millis),
            stream_buffer: parse_env(&env, "WOT_STREAM_BUFFER")
                .or(fc.server.stream_buffer)
                .unwrap_or(crate::events::DEFAULT_STREAM_BUFFER)
                .max(1),
            plain_text_strings: parse_env(&env, "WOT_PLAIN_TEXT_STRINGS")
                .or(fc.server.plain_text_strings)
                .unwrap_or(false),
        };

        let simulation = SimulationConfig {
            action_delay: parse_env(&env, "WOT_ACTION_DELAY_MS")
                .or(fc.simulation.action_delay_ms)
                .map_or(DEFAULT_ACTION_DELAY, Duration::from_millis),
            event_interval: parse_env(&env, "WOT_EVENT_INTERVAL_MS")
                .or(fc.simulation.event_interval_ms)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        };

        let things = fc
            .things
            .into_iter()
            .map(|t| ThingConfig {
                base_path: t.base_path,
                description: t.description,
            })
            .collect();

        Self {
            server,
            things,
            simulation,
        }
    }
}

/// Parse an environment value, ignoring it with a warning if malformed
fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring malformed environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::resolve(GatewayConfigFile::default(), env_of(&[]));
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.property_timeout, Duration::from_secs(10));
        assert_eq!(config.server.stream_buffer, 64);
        assert!(!config.server.plain_text_strings);
        assert!(config.things.is_empty());
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn env_overrides_file() {
        let fc: GatewayConfigFile = toml::from_str(
            r#"
            [server]
            port = 9000
            public_host = "file.example"
            stream_buffer = 16
            "#,
        )
        .unwrap();

        let config = Config::resolve(
            fc,
            env_of(&[("WOT_PORT", "9100"), ("WOT_PROPERTY_TIMEOUT_MS", "250")]),
        );
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.public_host.as_deref(), Some("file.example"));
        assert_eq!(config.server.stream_buffer, 16);
        assert_eq!(config.server.property_timeout, Duration::from_millis(250));
    }

    #[test]
    fn generic_port_variable_is_a_fallback() {
        let config = Config::resolve(GatewayConfigFile::default(), env_of(&[("PORT", "7000")]));
        assert_eq!(config.server.port, 7000);

        let config = Config::resolve(
            GatewayConfigFile::default(),
            env_of(&[("PORT", "7000"), ("WOT_PORT", "7001")]),
        );
        assert_eq!(config.server.port, 7001);
    }

    #[test]
    fn malformed_env_falls_through() {
        let config = Config::resolve(
            GatewayConfigFile::default(),
            env_of(&[("WOT_PORT", "eighty"), ("WOT_STREAM_BUFFER", "0")]),
        );
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.stream_buffer, 1);
    }

    #[test]
    fn zero_event_interval_disables_emitter() {
        let config = Config::resolve(
            GatewayConfigFile::default(),
            env_of(&[("WOT_EVENT_INTERVAL_MS", "0"), ("WOT_ACTION_DELAY_MS", "0")]),
        );
        assert!(config.simulation.event_interval.is_none());
        assert_eq!(config.simulation.action_delay, Duration::ZERO);
    }

    #[test]
    fn things_come_from_the_file() {
        let fc: GatewayConfigFile = toml::from_str(
            r#"
            [[things]]
            base_path = "/lamp"
            description = "/etc/wot/lamp.json"
            "#,
        )
        .unwrap();
        let config = Config::resolve(fc, env_of(&[]));
        assert_eq!(
            config.things,
            vec![ThingConfig {
                base_path: "/lamp".to_string(),
                description: PathBuf::from("/etc/wot/lamp.json"),
            }]
        );
    }
}
