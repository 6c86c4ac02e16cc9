use crate::config::types::{AccountEntry, Config, CrawlerConfig, SessionConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_session_config(&config.session)?;
    validate_output_config(&config.output)?;
    validate_extraction(config)?;
    validate_accounts(&config.accounts)?;
    validate_window(config)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.min_request_interval < 100 {
        return Err(ConfigError::Validation(format!(
            "min-request-interval must be >= 100ms, got {}ms",
            config.min_request_interval
        )));
    }

    if config.min_host_interval < config.min_request_interval {
        return Err(ConfigError::Validation(format!(
            "min-host-interval ({}ms) must be >= min-request-interval ({}ms)",
            config.min_host_interval, config.min_request_interval
        )));
    }

    if config.max_host_in_flight < 1 {
        return Err(ConfigError::Validation(format!(
            "max-host-in-flight must be >= 1, got {}",
            config.max_host_in_flight
        )));
    }

    if config.backoff_base < 1 {
        return Err(ConfigError::Validation(
            "backoff-base must be >= 1ms".to_string(),
        ));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request-timeout must be >= 1s".to_string(),
        ));
    }

    Ok(())
}

/// Validates session configuration
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.credentials_path.is_empty() {
        return Err(ConfigError::Validation(
            "credentials-path cannot be empty".to_string(),
        ));
    }

    let base = Url::parse(&config.api_base)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api-base: {}", e)))?;

    if base.scheme() != "https" && base.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "api-base must use http(s), got '{}'",
            base.scheme()
        )));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &crate::config::types::OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates extraction tuning
fn validate_extraction(config: &Config) -> Result<(), ConfigError> {
    if scraper::Selector::parse(&config.extraction.content_selector).is_err() {
        return Err(ConfigError::Validation(format!(
            "content-selector is not a valid CSS selector: '{}'",
            config.extraction.content_selector
        )));
    }

    if config.extraction.list_page_size < 1 {
        return Err(ConfigError::Validation(
            "list-page-size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates account entries
fn validate_accounts(accounts: &[AccountEntry]) -> Result<(), ConfigError> {
    if accounts.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[account]] entry is required".to_string(),
        ));
    }

    for entry in accounts {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "account name cannot be empty".to_string(),
            ));
        }

        if let Some(fakeid) = &entry.fakeid {
            if fakeid.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "account '{}' has an empty fakeid; omit the key to resolve it by search",
                    entry.name
                )));
            }
        }
    }

    Ok(())
}

/// Validates the publication window
fn validate_window(config: &Config) -> Result<(), ConfigError> {
    if let (Some(since), Some(until)) = (config.window.since, config.window.until) {
        if since > until {
            return Err(ConfigError::Validation(format!(
                "window.since ({}) is after window.until ({})",
                since, until
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ExtractionConfig, OutputConfig, WindowConfig};
    use chrono::TimeZone;
    use chrono::Utc;

    fn base_config() -> Config {
        Config {
            crawler: CrawlerConfig {
                workers: 4,
                max_retries: 3,
                min_request_interval: 1000,
                min_host_interval: 1500,
                max_host_in_flight: 2,
                backoff_base: 500,
                backoff_cap: 120,
                default_rate_limit_backoff: 60,
                request_timeout: 30,
            },
            session: SessionConfig {
                credentials_path: "./credentials.toml".to_string(),
                api_base: "https://mp.weixin.qq.com".to_string(),
                user_agent: "Mozilla/5.0".to_string(),
            },
            output: OutputConfig {
                database_path: "./harvest.db".to_string(),
            },
            extraction: ExtractionConfig::default(),
            window: WindowConfig::default(),
            accounts: vec![AccountEntry {
                name: "some-account".to_string(),
                fakeid: Some("MzA5MDAwMTIzNA==".to_string()),
            }],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = base_config();
        config.crawler.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_host_interval_below_global_rejected() {
        let mut config = base_config();
        config.crawler.min_host_interval = 500;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_api_base_rejected() {
        let mut config = base_config();
        config.session.api_base = "not a url".to_string();
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_no_accounts_rejected() {
        let mut config = base_config();
        config.accounts.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_fakeid_rejected() {
        let mut config = base_config();
        config.accounts[0].fakeid = Some("  ".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_content_selector_rejected() {
        let mut config = base_config();
        config.extraction.content_selector = ":::".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = base_config();
        config.extraction.list_page_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut config = base_config();
        config.window.since = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        config.window.until = Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert!(validate(&config).is_err());
    }
}
