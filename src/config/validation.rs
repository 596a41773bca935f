use crate::config::types::{Config, NavigationConfig, OutputConfig, SiteConfig, WorkersConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_navigation_config(&config.navigation)?;
    validate_workers_config(&config.workers)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the target site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", config.base_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    Ok(())
}

/// Validates navigation timeouts
fn validate_navigation_config(config: &NavigationConfig) -> Result<(), ConfigError> {
    let timeouts = [
        ("selector_timeout_ms", config.selector_timeout_ms),
        ("navigation_timeout_ms", config.navigation_timeout_ms),
        ("detail_marker_timeout_ms", config.detail_marker_timeout_ms),
        ("poll_interval_ms", config.poll_interval_ms),
    ];
    for (name, value) in timeouts {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1ms, got {}ms",
                name, value
            )));
        }
    }

    if config.poll_interval_ms > config.selector_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms ({}ms) must not exceed selector_timeout_ms ({}ms)",
            config.poll_interval_ms, config.selector_timeout_ms
        )));
    }

    if config.next_step_attempts < 1 || config.next_step_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "next_step_attempts must be between 1 and 10, got {}",
            config.next_step_attempts
        )));
    }

    Ok(())
}

/// Validates worker partitioning
fn validate_workers_config(config: &WorkersConfig) -> Result<(), ConfigError> {
    if config.count < 1 || config.count > 64 {
        return Err(ConfigError::Validation(format!(
            "workers count must be between 1 and 64, got {}",
            config.count
        )));
    }

    if config.partition_dir.is_empty() {
        return Err(ConfigError::Validation(
            "partition_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.report_dir.is_empty() {
        return Err(ConfigError::Validation(
            "report_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
