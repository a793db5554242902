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
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use scrapeflow::config::load_config;
///
/// let config = load_config(Path::new("scrapeflow.toml")).unwrap();
/// println!("Concurrency cap: {}", config.scheduler.concurrency_cap);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let config: Config = toml::from_str(&content)?;

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored with each run in the history database so runs made
/// under different settings can be told apart.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Loads the configuration at `path`, or the built-in defaults when no path is given
///
/// The hash of the defaults is the hash of an empty document, so runs without a
/// config file still carry a stable fingerprint.
pub fn load_config_or_default(path: Option<&Path>) -> Result<(Config, String), ConfigError> {
    match path {
        Some(path) => load_config_with_hash(path),
        None => {
            let config = Config::default();
            validate(&config)?;
            Ok((config, hex::encode(Sha256::digest(b""))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[scheduler]
concurrency-cap = 8
batch-size = 4
mode = "waves"

[retry]
max-retries = 2
retry-delay-secs = 1.5

[resources]
max-memory-percent = 60.0

[security]
blocked-domains = ["*.tracker.example"]

[output]
directory = "./reports"
formats = ["json", "markdown"]
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.scheduler.concurrency_cap, 8);
        assert_eq!(config.scheduler.batch_size, 4);
        assert_eq!(config.scheduler.mode, SchedulingMode::Waves);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.retry_delay().as_millis(), 1500);
        assert_eq!(config.resources.max_memory_percent, 60.0);
        assert_eq!(config.resources.max_cpu_percent, 85.0);
        assert_eq!(config.security.blocked_domains.len(), 1);
        assert_eq!(config.output.formats, vec!["json", "markdown"]);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.scheduler.concurrency_cap, 5);
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.resources.max_connections, 100);
        assert_eq!(config.network.max_redirects, 5);
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[scheduler]
concurrency-cap = 0
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let config_content = "test content";
        let file = create_temp_config(config_content);

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_default_config_hash_matches_empty_file() {
        let file = create_temp_config("");
        let (_, from_file) = load_config_or_default(Some(file.path())).unwrap();
        let (_, from_default) = load_config_or_default(None).unwrap();
        assert_eq!(from_file, from_default);
    }
}
