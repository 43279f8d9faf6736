use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure for bkinsights.
///
/// Every value can be overridden on the command line. Configuration files are
/// loaded from the current directory, the user configuration directory, or an
/// explicit path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Buildkite connection settings
    #[serde(default)]
    pub buildkite: BuildkiteConfig,

    /// Defaults for fetching and filtering
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildkiteConfig {
    /// Buildkite API access token
    pub token: Option<String>,

    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Organization slug
    #[serde(default = "default_organization")]
    pub organization: String,

    /// Builds requested per page
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DefaultsConfig {
    /// Branch to analyze; "*" means every branch
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Page limit for step duration analysis
    #[serde(default = "default_max_fetches")]
    pub max_fetches: usize,

    /// Page limit for annotation search
    #[serde(default = "default_max_build_fetches")]
    pub max_build_fetches: usize,

    /// Result limit for annotation search
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

impl Default for BuildkiteConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            organization: default_organization(),
            per_page: default_per_page(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            max_fetches: default_max_fetches(),
            max_build_fetches: default_max_build_fetches(),
            max_results: default_max_results(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.buildkite.com/v2".to_string()
}

fn default_organization() -> String {
    "materialize".to_string()
}

fn default_per_page() -> usize {
    100
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_max_fetches() -> usize {
    3
}

fn default_max_build_fetches() -> usize {
    10
}

fn default_max_results() -> usize {
    50
}

const CANDIDATES: [&str; 4] = [
    "bkinsights.toml",
    "bkinsights.json",
    "bkinsights.yaml",
    "bkinsights.yml",
];

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path (must exist)
    /// 2. ./bkinsights.toml, ./bkinsights.json, ./bkinsights.yaml, ./bkinsights.yml
    /// 3. `<user config dir>/bkinsights/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let user_config = dirs::config_dir().map(|dir| dir.join("bkinsights").join("config.toml"));

        match Self::find_candidate(Path::new("."), user_config) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    fn find_candidate(dir: &Path, user_config: Option<PathBuf>) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .chain(user_config)
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.buildkite.api_url, "https://api.buildkite.com/v2");
        assert_eq!(config.buildkite.organization, "materialize");
        assert_eq!(config.buildkite.per_page, 100);
        assert_eq!(config.defaults.branch, "main");
        assert_eq!(config.defaults.max_fetches, 3);
        assert!(!config.output.pretty);
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[buildkite]
token = "bkua_test"
organization = "acme"
per-page = 50

[defaults]
branch = "*"
max-fetches = 7

[output]
pretty = true
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.buildkite.token, Some("bkua_test".to_string()));
        assert_eq!(config.buildkite.organization, "acme");
        assert_eq!(config.buildkite.per_page, 50);
        assert_eq!(config.buildkite.api_url, "https://api.buildkite.com/v2");
        assert_eq!(config.defaults.branch, "*");
        assert_eq!(config.defaults.max_fetches, 7);
        assert_eq!(config.defaults.max_build_fetches, 10);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "buildkite": {
    "api-url": "http://localhost:8080/v2",
    "request-timeout-secs": 5
  }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.buildkite.api_url, "http://localhost:8080/v2");
        assert_eq!(config.buildkite.request_timeout_secs, 5);
        assert_eq!(config.defaults.max_results, 50);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "defaults:\n  max-results: 5\n").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.defaults.max_results, 5);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        assert!(Config::load(Some(Path::new("nonexistent-bkinsights.toml"))).is_err());
    }

    #[test]
    fn test_invalid_config_is_error() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[buildkite\nper-page = ").unwrap();
        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_candidate_search_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let user_config = temp_dir.path().join("user.toml");
        assert_eq!(
            Config::find_candidate(temp_dir.path(), Some(user_config.clone())),
            None
        );

        std::fs::write(&user_config, "").unwrap();
        assert_eq!(
            Config::find_candidate(temp_dir.path(), Some(user_config.clone())),
            Some(user_config.clone())
        );

        let local = temp_dir.path().join("bkinsights.yaml");
        std::fs::write(&local, "").unwrap();
        assert_eq!(
            Config::find_candidate(temp_dir.path(), Some(user_config)),
            Some(local)
        );
    }
}
