use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Generator base URL is an http(s) URL
/// - Intervals and timeouts are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let base_url = config.generators.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "generators.base_url must be an http(s) URL, got {:?}",
            config.generators.base_url
        )));
    }

    if config.generators.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "generators.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.pipeline.driver_enabled {
        if config.pipeline.driver_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.driver_poll_interval_ms cannot be 0".to_string(),
            ));
        }
        if config.pipeline.max_concurrent_stories == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_concurrent_stories cannot be 0".to_string(),
            ));
        }
    }

    if config.recovery.enabled
        && (config.recovery.sweep_interval_secs == 0 || config.recovery.stale_after_secs == 0)
    {
        return Err(ConfigError::ValidationError(
            "recovery intervals cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_bad_base_url() {
        let mut config = Config::default();
        config.generators.base_url = "ftp://gen".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_driver_limits_only_when_enabled() {
        let mut config = Config::default();
        config.pipeline.max_concurrent_stories = 0;
        assert!(validate_config(&config).is_ok());

        config.pipeline.driver_enabled = true;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_recovery_zero_ttl() {
        let mut config = Config::default();
        config.recovery.stale_after_secs = 0;
        assert!(validate_config(&config).is_err());

        config.recovery.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
