use crate::config::types::{
    BlockDetectionConfig, Config, CrawlerConfig, DownloadConfig, OpenAccessConfig, OutputConfig,
    TransportConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_transport_config(&config.transport)?;
    validate_crawler_config(&config.crawler)?;
    validate_download_config(&config.download)?;
    validate_output_config(&config.output)?;
    validate_block_detection(&config.block_detection)?;
    validate_open_access(&config.open_access)?;
    Ok(())
}

/// Validates pacing, retry and identity settings
fn validate_transport_config(config: &TransportConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms ({}) cannot exceed backoff_max_ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    if config.timeout_secs == 0 || config.download_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request timeouts must be at least one second".to_string(),
        ));
    }

    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one identity".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agents cannot contain blank entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates pagination settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_records < 1 {
        return Err(ConfigError::Validation(
            "max_records must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation("max_pages must be >= 1".to_string()));
    }

    if config.persist_every_pages < 1 {
        return Err(ConfigError::Validation(
            "persist_every_pages must be >= 1".to_string(),
        ));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation("page_size must be >= 1".to_string()));
    }

    Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    Ok(())
}

/// Validates artifact acquisition settings
fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.filename_max_length < 16 {
        return Err(ConfigError::Validation(format!(
            "filename_max_length must be >= 16, got {}",
            config.filename_max_length
        )));
    }

    if config.persist_every < 1 {
        return Err(ConfigError::Validation(
            "persist_every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output locations
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let paths = [
        ("state_file", &config.state_file),
        ("papers_dir", &config.papers_dir),
        ("download_log", &config.download_log),
        ("metadata_json", &config.metadata_json),
        ("metadata_csv", &config.metadata_csv),
    ];

    for (name, path) in paths {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

/// Validates challenge detection markers
fn validate_block_detection(config: &BlockDetectionConfig) -> Result<(), ConfigError> {
    if config.phrases.is_empty() && config.redirect_markers.is_empty() {
        return Err(ConfigError::Validation(
            "block detection needs at least one phrase or redirect marker".to_string(),
        ));
    }

    if config
        .phrases
        .iter()
        .chain(config.redirect_markers.iter())
        .any(|marker| marker.trim().is_empty())
    {
        return Err(ConfigError::Validation(
            "block detection markers cannot be blank".to_string(),
        ));
    }

    Ok(())
}

/// Validates the open-access lookup endpoints
fn validate_open_access(config: &OpenAccessConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    for (name, url) in [
        ("unpaywall_url", &config.unpaywall_url),
        ("crossref_url", &config.crossref_url),
    ] {
        Url::parse(url).map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;
    }

    if let Some(email) = &config.contact_email {
        if !email.contains('@') {
            return Err(ConfigError::Validation(format!(
                "contact_email must be an email address, got '{}'",
                email
            )));
        }
    }

    Ok(())
}
