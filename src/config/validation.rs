use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, ParserConfig, SeedConfig, TransportConfig,
    UserAgentConfig,
};
use crate::url::is_url_key;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_transport_config(&config.transport)?;
    validate_parser_config(&config.parser)?;
    validate_output_config(&config.output)?;
    validate_seed_config(&config.seed, &config.transport)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.request_delay_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_delay_ms must be >= 100ms, got {}ms",
            config.request_delay_ms
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.stale_claim_secs < 1 {
        return Err(ConfigError::Validation(
            "stale_claim_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    // Validate contact URL
    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    // Validate contact email (basic validation)
    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_transport_config(config: &TransportConfig) -> Result<(), ConfigError> {
    if let Some(template) = &config.url_template {
        validate_template(template, "{key}", "url_template")?;
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    validate_selector(&config.content_selector, "content_selector")?;
    validate_selector(&config.headword_selector, "headword_selector")?;

    if config.source_tag.trim().is_empty() {
        return Err(ConfigError::Validation(
            "source_tag cannot be empty".to_string(),
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

    if config.export_path.is_empty() {
        return Err(ConfigError::Validation(
            "export_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates seed sources against the transport they will be fetched with
fn validate_seed_config(seed: &SeedConfig, transport: &TransportConfig) -> Result<(), ConfigError> {
    for key in &seed.keys {
        if key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "seed keys cannot be empty".to_string(),
            ));
        }

        // Lemma keys can only be fetched through the template
        if !is_url_key(key) && transport.url_template.is_none() {
            return Err(ConfigError::Validation(format!(
                "seed key '{}' is not a URL and no url_template is configured",
                key
            )));
        }
    }

    if !seed.letters.is_empty() {
        let template = seed.index_url_template.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "index_url_template is required when letters are configured".to_string(),
            )
        })?;
        validate_template(template, "{code}", "index_url_template")?;
    } else if let Some(template) = &seed.index_url_template {
        validate_template(template, "{code}", "index_url_template")?;
    }

    if let Some(selector) = &seed.link_selector {
        validate_selector(selector, "link_selector")?;
    }

    Ok(())
}

/// Checks that a URL template carries its placeholder and is a valid URL once
/// the placeholder is filled
fn validate_template(template: &str, placeholder: &str, field: &str) -> Result<(), ConfigError> {
    if !template.contains(placeholder) {
        return Err(ConfigError::Validation(format!(
            "{} must contain {}, got '{}'",
            field, placeholder, template
        )));
    }

    let sample = template.replace(placeholder, "x");
    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", field, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} must use http or https, got '{}'",
            field,
            url.scheme()
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str, field: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", field, selector, e)))
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
