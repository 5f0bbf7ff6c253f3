use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Reads, parses and validates the configuration file at `path`
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&fs::read_to_string(path)?)
}

/// Hex encoded SHA-256 of the configuration file content
///
/// The hash is stamped on every sync run so a run history shows which
/// configuration produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_content(&fs::read_to_string(path)?))
}

/// Loads a configuration together with the hash of the exact text that was parsed
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const MINIMAL: &str = r#"
[auth]
client-id = "abc"
client-secret = "shh"
token-url = "https://oauth.example.com/token"
validate-url = "https://oauth.example.com/validate"

[upstream]
profile-url = "https://profiles.example.com/api/v1"
roster-url = "https://{region}.api.example.com"

[user-agent]
bot-name = "Casper"
bot-version = "2.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[storage]
database-path = "./test.db"
"#;

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let file = create_temp_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.sync.interval_secs, 300);
        assert_eq!(config.sync.staleness_days, 30);
        assert_eq!(config.rate_limit.max_calls, 120);
        assert_eq!(config.rate_limit.period_secs, 60);
        assert_eq!(config.reset.weekday, "tue");
        assert_eq!(config.reset.hour, 15);
        assert_eq!(config.auth.retry_backoff_secs, 30);
        assert_eq!(config.upstream.locale, "en_US");
        assert!(config.groups.is_empty());
        assert!(config.notify.general_webhook.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let content = format!(
            r#"{}
[sync]
interval-secs = 600
staleness-days = 14
min-level = 70
max-level = 80

[rate-limit]
max-calls = 60
period-secs = 30
max-in-flight = 2

[reset]
weekday = "wed"
hour = 4
poll-secs = 120

[notify]
operator-webhook = "https://hooks.example.com/ops"

[[groups]]
name = "Felforged"
realm = "Wyrmrest Accord"
region = "us"

[dungeons]
fh = "Freehold"
ad = "Atal'Dazar"
"#,
            MINIMAL
        );

        let file = create_temp_config(&content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.sync.interval_secs, 600);
        assert_eq!(config.sync.min_level, 70);
        assert_eq!(config.rate_limit.max_in_flight, 2);
        assert_eq!(config.reset.weekday, "wed");
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].realm, "Wyrmrest Accord");
        assert_eq!(config.dungeons.get("fh").map(String::as_str), Some("Freehold"));
        assert_eq!(
            config.notify.operator_webhook.as_deref(),
            Some("https://hooks.example.com/ops")
        );
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = format!("{}\n[rate-limit]\nmax-calls = 0\n", MINIMAL);
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_hash_matches_parsed_content() {
        let file = create_temp_config(MINIMAL);

        let (_, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
        assert_eq!(hash.len(), 64);

        let edited = create_temp_config(&format!("{}
# edited
", MINIMAL));
        assert_ne!(hash, compute_config_hash(edited.path()).unwrap());
    }

    #[test]
    fn test_parse_config_without_file() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.user_agent.bot_name, "Casper");
        assert!(matches!(parse_config("[auth]"), Err(ConfigError::Parse(_))));
    }
}
