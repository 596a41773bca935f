use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Reads, parses and validates the configuration file at `path`
///
/// # Example
///
/// ```no_run
/// use leilao_sweep::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("sweep.toml")).unwrap();
/// println!("{} workers", config.workers.count);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&fs::read_to_string(path)?)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let parsed: Config = toml::from_str(content)?;
    validate(&parsed)?;
    Ok(parsed)
}

/// Hex-encoded SHA-256 digest of the configuration file's bytes
///
/// Reports carry this digest so a run can be matched to the exact settings
/// that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(digest(&fs::read(path)?))
}

/// Loads a configuration together with the digest of the text it came from
///
/// # Returns
///
/// * `Ok((Config, String))` - The validated configuration and its digest
/// * `Err(ConfigError)` - The file could not be read, parsed or validated
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = fs::read_to_string(path)?;
    let parsed = parse_config(&content)?;
    Ok((parsed, digest(content.as_bytes())))
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", text).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let config_content = r#"
[site]
base-url = "https://venda-imoveis.example.gov.br/sistema/busca-imovel.asp?sltTipoBusca=imoveis"

[navigation]
selector-timeout-ms = 8000
navigation-timeout-ms = 20000
action-delay-ms = 500
page-settle-ms = 1500
detail-marker-timeout-ms = 4000
detail-fallback-settle-ms = 700
next-step-attempts = 5
poll-interval-ms = 50

[workers]
count = 4
partition-dir = "parts"

[output]
database-path = "./imoveis.db"
report-dir = "./reports"
error-log-limit = 100

[browser]
headless = false
chrome-args = ["--no-sandbox"]
chrome-path = "/usr/bin/chromium"
"#;

        let file = write_toml(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.navigation.selector_timeout_ms, 8000);
        assert_eq!(config.navigation.next_step_attempts, 5);
        assert_eq!(config.workers.count, 4);
        assert_eq!(config.workers.partition_dir, "parts");
        assert_eq!(config.output.error_log_limit, 100);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.chrome_args, vec!["--no-sandbox"]);
        assert_eq!(config.browser.chrome_path.as_deref(), Some("/usr/bin/chromium"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
[site]
base-url = "https://example.com/busca"

[output]
database-path = "imoveis.db"
"#,
        )
        .unwrap();

        assert_eq!(config.navigation.selector_timeout_ms, 10_000);
        assert_eq!(config.navigation.detail_marker_timeout_ms, 5_000);
        assert_eq!(config.workers.count, 6);
        assert_eq!(config.workers.partition_dir, "temp");
        assert_eq!(config.output.report_dir, "temp");
        assert_eq!(config.output.error_log_limit, 500);
        assert!(config.browser.headless);
    }

    #[test]
    fn test_partial_navigation_section_keeps_other_defaults() {
        let config = parse_config(
            r#"
[site]
base-url = "https://example.com/busca"

[navigation]
page-settle-ms = 10

[output]
database-path = "imoveis.db"
"#,
        )
        .unwrap();

        assert_eq!(config.navigation.page_settle_ms, 10);
        assert_eq!(config.navigation.action_delay_ms, 800);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let missing = load_config(Path::new("/nonexistent/sweep.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let file = write_toml("[site\nbase-url = ");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_workers_fails_validation() {
        let config_content = r#"
[site]
base-url = "https://example.com/busca"

[workers]
count = 0

[output]
database-path = "imoveis.db"
"#;

        let file = write_toml(config_content);
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_digest_is_sha256_of_file_bytes() {
        let file = write_toml("abc");
        assert_eq!(
            compute_config_hash(file.path()).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_load_with_hash_matches_file_digest() {
        let file = write_toml(
            "[site]\nbase-url = \"https://example.com/busca\"\n\n[output]\ndatabase-path = \"a.db\"\n",
        );
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.output.database_path, "a.db");
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());

        let other = write_toml(
            "[site]\nbase-url = \"https://example.com/busca\"\n\n[output]\ndatabase-path = \"b.db\"\n",
        );
        assert_ne!(hash, load_config_with_hash(other.path()).unwrap().1);
    }
}
