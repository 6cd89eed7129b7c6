use crate::config::types::{
    ExtractionSettings, RunnerSettings, Settings, StorageSettings, TaskConfig, UserAgentSettings,
};
use crate::url::UrlFilter;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire settings file
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    validate_storage_settings(&settings.storage)?;
    validate_extraction_settings(&settings.extraction)?;
    validate_runner_settings(&settings.runner)?;
    validate_user_agent_settings(&settings.user_agent)?;
    Ok(())
}

/// Validates a task definition before it is stored or started
///
/// Checks the title, the seed URL, the include/exclude rules (regexes must
/// compile) and the CSS selectors. Runs once, up front, so no per-URL check
/// can fail on configuration later.
///
/// # Returns
///
/// * `Ok(Url)` - The parsed seed URL
/// * `Err(ConfigError)` - The first problem found
pub fn validate_task(title: &str, seed_url: &str, config: &TaskConfig) -> Result<Url, ConfigError> {
    if title.trim().is_empty() {
        return Err(ConfigError::Validation(
            "task title cannot be empty".to_string(),
        ));
    }

    let seed = validate_seed_url(seed_url)?;
    validate_task_config(&seed, config)?;
    Ok(seed)
}

/// Validates a task configuration against an already parsed seed URL
pub fn validate_task_config(seed: &Url, config: &TaskConfig) -> Result<(), ConfigError> {
    for pattern in config
        .include_patterns
        .iter()
        .chain(config.exclude_patterns.iter())
    {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidPattern(
                "URL pattern cannot be empty".to_string(),
            ));
        }
    }

    // Compiling the filter surfaces invalid regexes
    UrlFilter::new(seed, config)?;

    for selector in &config.content_selectors {
        validate_selector(selector)?;
    }

    Ok(())
}

/// Parses a seed URL, requiring an http(s) scheme and a host
fn validate_seed_url(seed_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(seed_url.trim())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed_url
        )));
    }

    Ok(url)
}

/// Checks that a CSS selector parses
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    if selector.trim().is_empty() {
        return Err(ConfigError::InvalidSelector(
            "CSS selector cannot be empty".to_string(),
        ));
    }

    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))?;

    Ok(())
}

/// Validates storage settings
fn validate_storage_settings(settings: &StorageSettings) -> Result<(), ConfigError> {
    if settings.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates reader service settings
fn validate_extraction_settings(settings: &ExtractionSettings) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&settings.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid extraction endpoint: {}", e)))?;

    if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Extraction endpoint '{}' must use http or https",
            settings.endpoint
        )));
    }

    if settings.engine.trim().is_empty() {
        return Err(ConfigError::Validation(
            "extraction engine cannot be empty".to_string(),
        ));
    }

    if settings.timeout_secs < 1 || settings.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be between 1 and 300, got {}",
            settings.timeout_secs
        )));
    }

    Ok(())
}

/// Validates runner settings
fn validate_runner_settings(settings: &RunnerSettings) -> Result<(), ConfigError> {
    if settings.batch_size < 1 || settings.batch_size > 1000 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and 1000, got {}",
            settings.batch_size
        )));
    }

    if settings.max_concurrent_fetches < 1 || settings.max_concurrent_fetches > 32 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 32, got {}",
            settings.max_concurrent_fetches
        )));
    }

    if settings.max_attempts < 1 || settings.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            settings.max_attempts
        )));
    }

    if settings.initial_backoff_ms > settings.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "initial_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
            settings.initial_backoff_ms, settings.max_backoff_ms
        )));
    }

    Ok(())
}

/// Validates user agent settings
fn validate_user_agent_settings(settings: &UserAgentSettings) -> Result<(), ConfigError> {
    if settings.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !settings
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            settings.crawler_name
        )));
    }

    if let Some(contact_url) = &settings.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    Ok(())
}
