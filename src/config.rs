use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub debug: bool,
    pub optimize_routes: bool,
    /// Directory served under `/static/` by the demo binary.
    pub static_root: Option<String>,
    /// Status code -> HTML file rendered for that error.
    pub error_pages: HashMap<u16, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub client_max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            client_max_body_size: 1024 * 1024,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&file_content).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_config(yaml: &str) -> Result<Config, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = parse_config("debug: true\n").unwrap();
        assert!(config.debug);
        assert!(!config.optimize_routes);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.client_max_body_size, 1024 * 1024);
    }

    #[test]
    fn full_config() {
        let yaml = "\
server:
  host: 0.0.0.0
  port: 9000
  client_max_body_size: 10
optimize_routes: true
static_root: ./public
error_pages:
  404: ./errors/404.html
";
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.client_max_body_size, 10);
        assert!(config.optimize_routes);
        assert_eq!(config.static_root.as_deref(), Some("./public"));
        assert_eq!(config.error_pages.get(&404).map(String::as_str), Some("./errors/404.html"));
    }

    #[test]
    fn unreadable_file_is_io_error() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
