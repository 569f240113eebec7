//! Application configuration for nbforge.
//!
//! User config lives at `~/.nbforge/nbforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NbforgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "nbforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".nbforge";

// ---------------------------------------------------------------------------
// Config structs (matching nbforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Working-directory roots.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Build execution settings.
    #[serde(default)]
    pub build: BuildSettings,

    /// CI provider settings.
    #[serde(default)]
    pub ci: CiConfig,

    /// Published-site page metadata.
    #[serde(default)]
    pub site: SiteConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root under which per-job build directories are materialized.
    #[serde(default = "default_build_root")]
    pub build_root: PathBuf,

    /// Root under which per-job artifact outputs are collected.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,

    /// Directory for per-job stdout/stderr log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Optional directory of template overrides (`*.hbs` files). Embedded
    /// defaults are used for any template not present here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            build_root: default_build_root(),
            artifact_root: default_artifact_root(),
            log_dir: default_log_dir(),
            template_dir: None,
        }
    }
}

fn default_build_root() -> PathBuf {
    PathBuf::from("/tmp/nbforge/build")
}
fn default_artifact_root() -> PathBuf {
    PathBuf::from("/tmp/nbforge/artifacts")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/nbforge/build-logs")
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Maximum concurrent worker processes for `build --max-workers`.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Scheduler poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Converter output format for built notebooks.
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Per-notebook execution timeout (seconds) passed into build scripts.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            output_format: default_output_format(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_workers() -> usize {
    4
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_output_format() -> String {
    "html".into()
}
fn default_timeout_secs() -> u64 {
    crate::types::DEFAULT_SCRIPT_TIMEOUT_SECS
}

/// `[ci]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiConfig {
    /// Base URL of the CI provider's REST API.
    #[serde(default = "default_ci_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ci_base_url(),
            token_env: default_token_env(),
        }
    }
}

fn default_ci_base_url() -> String {
    "https://circleci.com/api/v1.1".into()
}
fn default_token_env() -> String {
    "CIRCLECI_TOKEN".into()
}

/// `[site]` section — page metadata stamped into the published site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_title")]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub maintainer: String,

    #[serde(default = "default_locale")]
    pub locale: String,

    /// Canonical base URL of the published site, without trailing slash.
    #[serde(default)]
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_site_title(),
            description: String::new(),
            keywords: Vec::new(),
            author: String::new(),
            maintainer: String::new(),
            locale: default_locale(),
            base_url: String::new(),
        }
    }
}

fn default_site_title() -> String {
    "Notebook Collections".into()
}
fn default_locale() -> String {
    "en_US".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.nbforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NbforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.nbforge/nbforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NbforgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| NbforgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NbforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NbforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NbforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the CI provider token from the env var named in the config.
pub fn ci_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.ci.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(NbforgeError::config(format!(
            "CI provider token not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("build_root"));
        assert!(toml_str.contains("CIRCLECI_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.build.max_workers, 4);
        assert_eq!(parsed.build.output_format, "html");
        assert_eq!(parsed.ci.token_env, "CIRCLECI_TOKEN");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[site]
title = "Example Notebooks"
keywords = ["astronomy", "tutorials"]

[build]
max_workers = 8
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.site.title, "Example Notebooks");
        assert_eq!(config.site.locale, "en_US");
        assert_eq!(config.build.max_workers, 8);
        assert_eq!(config.build.timeout_secs, 600);
        assert_eq!(config.paths.build_root, PathBuf::from("/tmp/nbforge/build"));
    }

    #[test]
    fn ci_token_missing() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.ci.token_env = "NBFORGE_TEST_NONEXISTENT_TOKEN_12345".into();
        let result = ci_token(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token not found"));
    }
}
