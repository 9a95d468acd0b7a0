use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Engine sizes are at least 1 and default sizes stay within their limits
/// - Retry backoff never shrinks and its delays are ordered
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Engine validation
    let engine = &config.engine;
    for (name, value) in [
        ("engine.chunk_size", engine.chunk_size),
        ("engine.grid_size", engine.grid_size),
        ("engine.thread_pool_size", engine.thread_pool_size),
        ("engine.max_grid_size", engine.max_grid_size),
        ("engine.max_thread_pool_size", engine.max_thread_pool_size),
    ] {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be at least 1",
                name
            )));
        }
    }

    for (name, value, limit_name, limit) in [
        (
            "engine.grid_size",
            engine.grid_size,
            "engine.max_grid_size",
            engine.max_grid_size,
        ),
        (
            "engine.thread_pool_size",
            engine.thread_pool_size,
            "engine.max_thread_pool_size",
            engine.max_thread_pool_size,
        ),
    ] {
        if value > limit {
            return Err(ConfigError::ValidationError(format!(
                "{} ({}) exceeds {} ({})",
                name, value, limit_name, limit
            )));
        }
    }

    let retry = &engine.retry;
    if retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "engine.retry.backoff_multiplier must be at least 1.0".to_string(),
        ));
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        return Err(ConfigError::ValidationError(format!(
            "engine.retry.initial_delay_ms ({}) exceeds max_delay_ms ({})",
            retry.initial_delay_ms, retry.max_delay_ms
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::net::IpAddr;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Config::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_sizes_fail() {
        let mut config = Config::default();
        config.engine.grid_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("engine.grid_size"));

        let mut config = Config::default();
        config.engine.chunk_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_size_limits() {
        let mut config = Config::default();
        config.engine.max_grid_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.engine.thread_pool_size = 16;
        config.engine.max_thread_pool_size = 8;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("engine.max_thread_pool_size"));
    }

    #[test]
    fn test_validate_retry_policy() {
        let mut config = Config::default();
        config.engine.retry.backoff_multiplier = 0.5;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.engine.retry.initial_delay_ms = 10_000;
        config.engine.retry.max_delay_ms = 1_000;
        assert!(validate_config(&config).is_err());
    }
}
