use crate::config::types::{
    Config, NetworkSettings, OutputSettings, ResourceSettings, RetrySettings, SchedulerSettings,
    SearchSettings,
};
use crate::output::ReportFormat;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduler(&config.scheduler)?;
    validate_retry(&config.retry)?;
    validate_resources(&config.resources)?;
    validate_network(&config.network)?;
    validate_search(&config.search)?;
    validate_output(&config.output)?;
    for pattern in &config.security.blocked_domains {
        validate_domain_pattern(pattern)?;
    }
    Ok(())
}

fn validate_scheduler(config: &SchedulerSettings) -> Result<(), ConfigError> {
    if config.concurrency_cap < 1 || config.concurrency_cap > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency-cap must be between 1 and 100, got {}",
            config.concurrency_cap
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    require_positive("sample-interval-secs", config.sample_interval_secs)?;
    require_positive("admission-timeout-secs", config.admission_timeout_secs)?;
    require_non_negative("cancel-grace-secs", config.cancel_grace_secs)?;

    Ok(())
}

fn validate_retry(config: &RetrySettings) -> Result<(), ConfigError> {
    require_non_negative("retry-delay-secs", config.retry_delay_secs)
}

fn validate_resources(config: &ResourceSettings) -> Result<(), ConfigError> {
    for (key, value) in [
        ("max-memory-percent", config.max_memory_percent),
        ("max-cpu-percent", config.max_cpu_percent),
    ] {
        if !(value > 0.0 && value <= 100.0) {
            return Err(ConfigError::Validation(format!(
                "{key} must be in (0, 100], got {value}"
            )));
        }
    }

    if config.max_connections < 1 {
        return Err(ConfigError::Validation(
            "max-connections must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_network(config: &NetworkSettings) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }
    require_positive("connect-timeout-secs", config.connect_timeout_secs)?;
    require_positive("read-timeout-secs", config.read_timeout_secs)?;
    Ok(())
}

fn validate_search(config: &SearchSettings) -> Result<(), ConfigError> {
    if !config.url_template.contains("{query}") {
        return Err(ConfigError::Validation(format!(
            "url-template must contain '{{query}}', got '{}'",
            config.url_template
        )));
    }

    let sample = config.url_template.replace("{query}", "test");
    Url::parse(&sample).map_err(|e| {
        ConfigError::Validation(format!(
            "url-template '{}' is not a valid URL: {}",
            config.url_template, e
        ))
    })?;

    if config.max_results < 1 {
        return Err(ConfigError::Validation(
            "max-results must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_output(config: &OutputSettings) -> Result<(), ConfigError> {
    if config.formats.is_empty() {
        return Err(ConfigError::Validation(
            "output formats cannot be empty".to_string(),
        ));
    }

    for format in &config.formats {
        if ReportFormat::parse(format).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown output format '{}' (expected json, spreadsheet, markdown or sqlite)",
                format
            )));
        }
    }

    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    require_non_negative("save-retry-delay-secs", config.save_retry_delay_secs)
}

fn require_positive(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{key} must be > 0, got {value}"
        )))
    }
}

fn require_non_negative(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{key} must be >= 0, got {value}"
        )))
    }
}

/// Validates a blocked-domain pattern (supports a leading `*.` wildcard)
pub(crate) fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain pattern '{}' has no domain",
            pattern
        )));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) || domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_concurrency_cap_bounds() {
        let mut config = Config::default();
        config.scheduler.concurrency_cap = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));

        config.scheduler.concurrency_cap = 101;
        assert!(validate(&config).is_err());

        config.scheduler.concurrency_cap = 100;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_resource_percent_bounds() {
        let mut config = Config::default();
        config.resources.max_memory_percent = 0.0;
        assert!(validate(&config).is_err());

        config.resources.max_memory_percent = 100.0;
        assert!(validate(&config).is_ok());

        config.resources.max_cpu_percent = 120.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_search_template_requires_placeholder() {
        let mut config = Config::default();
        config.search.url_template = "https://search.example.com/?q=".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("{query}"));
    }

    #[test]
    fn test_unknown_output_format() {
        let mut config = Config::default();
        config.output.formats = vec!["xlsx".to_string()];
        assert!(validate(&config).is_err());

        config.output.formats = vec!["markdown".to_string(), "sqlite".to_string()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_domain_pattern() {
        assert!(validate_domain_pattern("example.com").is_ok());
        assert!(validate_domain_pattern("*.example.com").is_ok());
        assert!(validate_domain_pattern("localhost").is_ok());

        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.").is_err());
        assert!(validate_domain_pattern(".example.com").is_err());
        assert!(validate_domain_pattern("example..com").is_err());
        assert!(validate_domain_pattern("exa mple.com").is_err());
    }

    #[test]
    fn test_blocked_domains_are_checked() {
        let mut config = Config::default();
        config.security.blocked_domains = vec!["bad domain".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }
}
