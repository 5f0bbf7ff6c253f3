use crate::config::types::{
    AuthConfig, Config, GroupEntry, NotifyConfig, RateLimitConfig, ResetConfig, StorageConfig,
    SyncConfig, UpstreamConfig, UserAgentConfig,
};
use crate::ConfigError;
use chrono::Weekday;
use std::collections::BTreeMap;
use url::Url;

/// Regions served by the upstream APIs
pub const KNOWN_REGIONS: &[&str] = &["us", "eu", "kr", "tw", "cn"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_sync_config(&config.sync)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_reset_config(&config.reset)?;
    validate_auth_config(&config.auth)?;
    validate_upstream_config(&config.upstream)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_notify_config(&config.notify)?;
    validate_groups(&config.groups)?;
    validate_dungeons(&config.dungeons)?;
    Ok(())
}

/// Parses a weekday name such as "tue" or "Tuesday"
pub fn parse_weekday(value: &str) -> Result<Weekday, ConfigError> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| ConfigError::Validation(format!("Unknown weekday '{}'", value)))
}

fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.interval_secs < 10 {
        return Err(ConfigError::Validation(format!(
            "sync interval-secs must be >= 10, got {}",
            config.interval_secs
        )));
    }

    if config.staleness_days < 1 {
        return Err(ConfigError::Validation(format!(
            "staleness-days must be >= 1, got {}",
            config.staleness_days
        )));
    }

    if config.min_level > config.max_level {
        return Err(ConfigError::Validation(format!(
            "min-level ({}) cannot exceed max-level ({})",
            config.min_level, config.max_level
        )));
    }

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.max_calls < 1 {
        return Err(ConfigError::Validation(format!(
            "rate-limit max-calls must be >= 1, got {}",
            config.max_calls
        )));
    }

    if config.period_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "rate-limit period-secs must be >= 1, got {}",
            config.period_secs
        )));
    }

    if config.max_in_flight < 1 || config.max_in_flight > 64 {
        return Err(ConfigError::Validation(format!(
            "rate-limit max-in-flight must be between 1 and 64, got {}",
            config.max_in_flight
        )));
    }

    Ok(())
}

fn validate_reset_config(config: &ResetConfig) -> Result<(), ConfigError> {
    parse_weekday(&config.weekday)?;

    if config.hour > 23 {
        return Err(ConfigError::Validation(format!(
            "reset hour must be between 0 and 23, got {}",
            config.hour
        )));
    }

    // A poll longer than an hour could step over the whole reset window
    if config.poll_secs < 10 || config.poll_secs > 3600 {
        return Err(ConfigError::Validation(format!(
            "reset poll-secs must be between 10 and 3600, got {}",
            config.poll_secs
        )));
    }

    Ok(())
}

fn validate_auth_config(config: &AuthConfig) -> Result<(), ConfigError> {
    if config.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth client-id cannot be empty".to_string(),
        ));
    }

    if config.client_secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth client-secret cannot be empty".to_string(),
        ));
    }

    validate_https_url("token-url", &config.token_url)?;
    validate_https_url("validate-url", &config.validate_url)?;

    Ok(())
}

fn validate_upstream_config(config: &UpstreamConfig) -> Result<(), ConfigError> {
    validate_https_url("profile-url", &config.profile_url)?;
    validate_https_url("roster-url", &config.roster_url.replace("{region}", "us"))?;

    if config.locale.is_empty() {
        return Err(ConfigError::Validation(
            "upstream locale cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 || config.timeout_secs > 120 {
        return Err(ConfigError::Validation(format!(
            "upstream timeout-secs must be between 1 and 120, got {}",
            config.timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.timeout_secs {
        return Err(ConfigError::Validation(format!(
            "upstream connect-timeout-secs must be between 1 and timeout-secs, got {}",
            config.connect_timeout_secs
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.bot_name.is_empty() {
        return Err(ConfigError::Validation("bot-name cannot be empty".to_string()));
    }

    if !config
        .bot_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "bot-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.bot_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_notify_config(config: &NotifyConfig) -> Result<(), ConfigError> {
    for (field, value) in [
        ("general-webhook", &config.general_webhook),
        ("operator-webhook", &config.operator_webhook),
    ] {
        if let Some(url) = value {
            validate_https_url(field, url)?;
        }
    }
    Ok(())
}

fn validate_groups(groups: &[GroupEntry]) -> Result<(), ConfigError> {
    for group in groups {
        if group.name.trim().is_empty() || group.realm.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Group entries need a name and a realm, got '{}' on '{}'",
                group.name, group.realm
            )));
        }
        validate_region(&group.region)?;
    }
    Ok(())
}

fn validate_dungeons(dungeons: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for (abbreviation, name) in dungeons {
        if abbreviation.is_empty() || abbreviation.contains('+') {
            return Err(ConfigError::Validation(format!(
                "Dungeon abbreviation '{}' must be non-empty and cannot contain '+'",
                abbreviation
            )));
        }
        if abbreviation.to_lowercase() != *abbreviation {
            return Err(ConfigError::Validation(format!(
                "Dungeon abbreviation '{}' must be lowercase",
                abbreviation
            )));
        }
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Dungeon '{}' needs a full name",
                abbreviation
            )));
        }
    }
    Ok(())
}

/// Checks a region against the regions the upstream APIs serve
pub(crate) fn validate_region(region: &str) -> Result<(), ConfigError> {
    let lowered = region.trim().to_lowercase();
    if !KNOWN_REGIONS.contains(&lowered.as_str()) {
        return Err(ConfigError::Validation(format!(
            "Unknown region '{}', expected one of {:?}",
            region, KNOWN_REGIONS
        )));
    }
    Ok(())
}

fn validate_https_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use HTTPS scheme",
            field, value
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact-email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
