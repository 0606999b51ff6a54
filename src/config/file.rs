//! TOML configuration file loading
//!
//! Supports `~/.config/wot-gateway/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// Listener and protocol settings
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Things to mount, one `[[things]]` table each
    #[serde(default)]
    pub things: Vec<ThingFileConfig>,

    /// Simulated device behaviour
    #[serde(default)]
    pub simulation: SimulationFileConfig,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Host advertised in absolute links
    pub public_host: Option<String>,
    pub property_timeout_ms: Option<u64>,
    /// Per-client stream buffer, in frames
    pub stream_buffer: Option<usize>,
    /// Serve `string` properties as `text/plain`
    pub plain_text_strings: Option<bool>,
}

/// One mounted thing
#[derive(Debug, Clone, Deserialize)]
pub struct ThingFileConfig {
    pub base_path: String,
    /// Description JSON, relative to the config file's directory
    pub description: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulationFileConfig {
    pub action_delay_ms: Option<u64>,
    pub event_interval_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `GatewayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> GatewayConfigFile {
    let Some(path) = config_file_path() else {
        return GatewayConfigFile::default();
    };

    if !path.exists() {
        return GatewayConfigFile::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            GatewayConfigFile::default()
        }
    }
}

/// Load an explicitly named config file
///
/// Relative description paths are resolved against the file's directory.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_from(path: &Path) -> Result<GatewayConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut config: GatewayConfigFile = toml::from_str(&content)?;

    if let Some(dir) = path.parent() {
        for thing in &mut config.things {
            if thing.description.is_relative() {
                thing.description = dir.join(&thing.description);
            }
        }
    }

    tracing::info!(path = %path.display(), things = config.things.len(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/wot-gateway/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("wot-gateway").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let config: GatewayConfigFile = toml::from_str(
            r#"
            [server]
            port = 9000

            [[things]]
            base_path = "/lamp"
            description = "lamp.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, Some(9000));
        assert!(config.server.host.is_none());
        assert_eq!(config.things.len(), 1);
        assert!(config.simulation.action_delay_ms.is_none());
    }

    #[test]
    fn relative_descriptions_follow_the_file() {
        let dir = std::env::temp_dir().join(format!("wot-gateway-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            "[[things]]\nbase_path = \"/lamp\"\ndescription = \"lamp.json\"\n",
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.things[0].description, dir.join("lamp.json"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_from(Path::new("/nonexistent/wot-gateway.toml")).is_err());
    }
}
