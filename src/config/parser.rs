use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so two runs can be told apart when their checkpoints
/// are compared.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlMode, OnFailure, VehicleType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const MINIMAL: &str = r#"
[api]
base-url = "https://veiculos.fipe.org.br/api/veiculos"

[cache]
directory = "cache/fipe_raw_responses"

[crawl]
checkpoint-path = "checkpoint.json"

[output]
database-path = "./fipe.db"
"#;

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let file = create_temp_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.api.pacing_ms, 500);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.cache.reference_ttl_secs, 2_592_000);
        assert_eq!(config.crawl.vehicle_type, VehicleType::Car);
        assert_eq!(config.crawl.mode, CrawlMode::All);
        assert_eq!(config.crawl.failure_policy.listing, OnFailure::Skip);
        assert_eq!(config.crawl.failure_policy.price, OnFailure::Abort);
        assert_eq!(config.crawl.year_from, None);
    }

    #[test]
    fn test_load_full_config() {
        let config_content = r#"
[api]
base-url = "http://127.0.0.1:8080/api/veiculos"
timeout-secs = 5
pacing-ms = 0

[retry]
max-retries = 6
base-delay-ms = 10

[cache]
directory = "/tmp/cache"
reference-ttl-secs = 60

[crawl]
vehicle-type = "motorcycle"
mode = "latest"
year-from = 2020
year-to = 2024
checkpoint-path = "cp.json"
progress-every = 10

[crawl.failure-policy]
listing = "abort"
price = "skip"

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.retry.max_retries, 6);
        assert_eq!(config.retry.base_delay_ms, 10);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.crawl.vehicle_type.id(), 2);
        assert_eq!(config.crawl.mode, CrawlMode::Latest);
        assert_eq!(config.crawl.year_from, Some(2020));
        assert_eq!(config.crawl.failure_policy.listing, OnFailure::Abort);
        assert_eq!(config.crawl.failure_policy.price, OnFailure::Skip);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/fipe.toml"));
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
        let content = MINIMAL.replace("checkpoint.json", "");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        assert_eq!(hash1, compute_config_hash(file1.path()).unwrap());
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, compute_config_hash(file2.path()).unwrap());
    }
}
