use crate::config::types::{Config, OutputConfig, RendererConfig, ScraperConfig, SiteConfig};
use crate::render::Browser;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Page sizes the catalog's length selector offers
pub const SUPPORTED_PAGE_SIZES: [u32; 4] = [10, 25, 50, 100];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scraper_config(&config.scraper)?;
    validate_site_config(&config.site)?;
    validate_renderer_config(&config.renderer)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates pacing, concurrency and retry settings
fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be >= 1, got {}",
            config.retry_attempts
        )));
    }

    if config.retry_base_delay_ms > config.retry_max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry_base_delay_ms ({}) cannot exceed retry_max_delay_ms ({})",
            config.retry_base_delay_ms, config.retry_max_delay_ms
        )));
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.sessions_per_batch < 1 {
        return Err(ConfigError::Validation(format!(
            "sessions_per_batch must be >= 1, got {}",
            config.sessions_per_batch
        )));
    }

    if !SUPPORTED_PAGE_SIZES.contains(&config.page_size) {
        return Err(ConfigError::Validation(format!(
            "page_size must be one of {:?}, got {}",
            SUPPORTED_PAGE_SIZES, config.page_size
        )));
    }

    Ok(())
}

/// Validates the site URL, marker and selectors
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", config.base_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.detail_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "detail_marker cannot be empty".to_string(),
        ));
    }

    if config.next_selectors.is_empty() {
        return Err(ConfigError::Validation(
            "next_selectors must list at least one selector".to_string(),
        ));
    }

    if config.link_selectors.is_empty() {
        return Err(ConfigError::Validation(
            "link_selectors must list at least one selector".to_string(),
        ));
    }

    let single = [
        &config.content_root,
        &config.page_size_select,
        &config.info_selector,
        &config.pagination_button,
    ];
    for css in single
        .into_iter()
        .chain(config.next_selectors.iter())
        .chain(config.link_selectors.iter())
    {
        validate_selector(css)?;
    }

    Ok(())
}

/// Validates WebDriver connection settings
fn validate_renderer_config(config: &RendererConfig) -> Result<(), ConfigError> {
    Url::parse(&config.webdriver_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid webdriver_url '{}': {}", config.webdriver_url, e))
    })?;

    if Browser::from_name(&config.browser).is_none() {
        return Err(ConfigError::Validation(format!(
            "browser must be 'chrome' or 'firefox', got '{}'",
            config.browser
        )));
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.results_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "results_dir cannot be empty".to_string(),
        ));
    }

    if let Some(path) = &config.output_file {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "output_file cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates that a CSS selector parses
fn validate_selector(css: &str) -> Result<(), ConfigError> {
    if css.trim().is_empty() {
        return Err(ConfigError::InvalidSelector(
            "Selector cannot be empty".to_string(),
        ));
    }

    Selector::parse(css)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", css, e)))
}
