use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::generator::GeneratorConfig;
use crate::pipeline::{PipelineConfig, RecoveryConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub generators: GeneratorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("storyreel.db")
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub recovery: RecoveryConfig,
    pub generators: SanitizedGeneratorConfig,
}

/// Sanitized generator config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGeneratorConfig {
    pub base_url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            pipeline: config.pipeline.clone(),
            recovery: config.recovery.clone(),
            generators: SanitizedGeneratorConfig {
                base_url: config.generators.base_url.clone(),
                api_key_configured: config
                    .generators
                    .api_key
                    .as_deref()
                    .is_some_and(|key| !key.is_empty()),
                timeout_secs: config.generators.timeout_secs,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[pipeline]
retry_after_secs = 1
driver_enabled = true

[recovery]
stale_after_secs = 60

[generators]
base_url = "http://gen.local"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.pipeline.retry_after_secs, 1);
        assert!(config.pipeline.driver_enabled);
        assert_eq!(config.recovery.stale_after_secs, 60);
        assert_eq!(config.generators.base_url, "http://gen.local");
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "storyreel.db");
        assert!(!config.pipeline.driver_enabled);
        assert!(config.recovery.enabled);
    }

    #[test]
    fn test_deserialize_with_custom_database_path() {
        let toml = r#"
[database]
path = "/data/stories.sqlite"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "/data/stories.sqlite");
    }

    #[test]
    fn test_sanitized_config_hides_api_key() {
        let mut config = Config::default();
        config.generators.api_key = Some("secret-key".to_string());

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.generators.api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-key"));
    }

    #[test]
    fn test_sanitized_config_empty_key_not_configured() {
        let mut config = Config::default();
        config.generators.api_key = Some(String::new());
        let sanitized = SanitizedConfig::from(&config);
        assert!(!sanitized.generators.api_key_configured);
        assert_eq!(sanitized.server.port, 8080);
    }
}
