use super::{types::Config, ConfigError};

/// True when `code` is a non-empty run of ASCII digits.
pub(crate) fn is_numeric_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_digit())
}

/// Validate configuration
/// Currently validates:
/// - Default client/module codes are numeric
/// - Timeouts are not 0
/// - Venue overrides name a system
/// - Aggregate field is set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;

    if !is_numeric_code(&pipeline.default_client_code) {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.default_client_code must be numeric, got {:?}",
            pipeline.default_client_code
        )));
    }

    if !is_numeric_code(&pipeline.default_module_code) {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.default_module_code must be numeric, got {:?}",
            pipeline.default_module_code
        )));
    }

    if pipeline.source_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.source_timeout_secs cannot be 0".to_string(),
        ));
    }

    if pipeline.batch_timeout_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "pipeline.batch_timeout_secs cannot be 0".to_string(),
        ));
    }

    if pipeline.aggregate_field.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "pipeline.aggregate_field cannot be empty".to_string(),
        ));
    }

    for (name, service) in &config.registry.systems {
        if service.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "registry.systems.{}.timeout_secs cannot be 0",
                name
            )));
        }
    }

    for (code, venue) in &config.registry.venues {
        if venue.system.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "registry.venues.{}.system cannot be empty",
                code
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SystemServiceConfig, VenueConfig};

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_non_numeric_client_code_fails() {
        let mut config = Config::default();
        config.pipeline.default_client_code = "VIP".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_empty_module_code_fails() {
        let mut config = Config::default();
        config.pipeline.default_module_code = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_timeouts_fail() {
        let mut config = Config::default();
        config.pipeline.source_timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.pipeline.batch_timeout_secs = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.registry.systems.insert(
            "pje".to_string(),
            SystemServiceConfig {
                url: "http://localhost/pje".to_string(),
                timeout_secs: 0,
            },
        );
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_venue_without_system_fails() {
        let mut config = Config::default();
        config.registry.venues.insert(
            "trt24".to_string(),
            VenueConfig {
                system: " ".to_string(),
                endpoint: "https://example".to_string(),
            },
        );
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_is_numeric_code() {
        assert!(is_numeric_code("0001"));
        assert!(is_numeric_code("3"));
        assert!(!is_numeric_code(""));
        assert!(!is_numeric_code("00a1"));
        assert!(!is_numeric_code("1.2"));
    }
}
