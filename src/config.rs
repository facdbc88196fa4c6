//! Configuration and on-disk state under `~/.lokicli`

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lokicli_logs::DEFAULT_BATCH_SIZE;
use lokicli_types::{LokiError, Result};

const CONFIG_FILE: &str = "config.toml";
const PROJECT_FILE: &str = "project";
const TOKENS_FILE: &str = "tokens.json";
const LOG_FILE: &str = "lokicli.log";

/// Environment variable overriding the state directory
pub const HOME_ENV: &str = "LOKICLI_HOME";

/// Directory holding config, tokens and the log file
pub fn home_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".lokicli"))
        .ok_or_else(|| LokiError::Config("Cannot determine the home directory.".to_string()))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogReaderConfig {
    pub batch_size: usize,
    pub default_limit: usize,
}

impl Default for LogReaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            default_limit: 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Gateway URLs are `https://loki-gateway.<project>.<url_suffix>`
    pub url_suffix: String,
    pub projects: Vec<String>,
    pub log_reader: LogReaderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url_suffix: String::new(),
            projects: vec!["s2s".to_string(), "ao3".to_string(), "s2s-use1".to_string()],
            log_reader: LogReaderConfig::default(),
        }
    }
}

impl Config {
    /// Read `config.toml` from `dir`, writing the defaults if it is missing
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Self::default();
            fs::create_dir_all(dir)?;
            let content = toml::to_string_pretty(&config)
                .map_err(|e| LokiError::Config(format!("Cannot serialize config: {}", e)))?;
            fs::write(&path, content)?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| {
            tracing::error!("Error reading {}: {}", path.display(), e);
            LokiError::Config(format!("Invalid {}: {}", path.display(), e))
        })
    }

    pub fn check_project(&self, project: &str) -> Result<()> {
        if self.projects.iter().any(|p| p == project) {
            Ok(())
        } else {
            Err(LokiError::Config(format!("Invalid project: {}", project)))
        }
    }

    /// Gateway base URL for a project
    pub fn gateway_url(&self, project: &str) -> Result<String> {
        self.check_project(project)?;
        if self.url_suffix.is_empty() {
            return Err(LokiError::Config(format!(
                "url_suffix is not set in {}",
                CONFIG_FILE
            )));
        }
        Ok(format!(
            "https://loki-gateway.{}.{}",
            project,
            self.url_suffix.trim_start_matches('.')
        ))
    }
}

/// Files kept in the state directory
#[derive(Clone, Debug)]
pub struct StatePaths {
    dir: PathBuf,
}

impl StatePaths {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tokens(&self) -> PathBuf {
        self.dir.join(TOKENS_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// Currently selected project, if any
    pub fn load_project(&self) -> Result<Option<String>> {
        let path = self.dir.join(PROJECT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let project = fs::read_to_string(path)?.trim().to_string();
        Ok(Some(project).filter(|p| !p.is_empty()))
    }

    pub fn save_project(&self, project: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(PROJECT_FILE), project)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_written_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.log_reader.batch_size, 250);
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(Config::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "url_suffix = \"example.com\"\n[log_reader]\nbatch_size = 100\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.log_reader.batch_size, 100);
        assert_eq!(config.log_reader.default_limit, 1000);
        assert_eq!(
            config.gateway_url("s2s").unwrap(),
            "https://loki-gateway.s2s.example.com"
        );
    }

    #[test]
    fn test_gateway_url_errors() {
        let config = Config::default();
        assert!(matches!(config.gateway_url("s2s"), Err(LokiError::Config(_))));

        let config = Config {
            url_suffix: "example.com".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.gateway_url("nope"), Err(LokiError::Config(_))));
    }

    #[test]
    fn test_project_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::new(dir.path().join("state"));

        assert_eq!(paths.load_project().unwrap(), None);
        paths.save_project("ao3").unwrap();
        assert_eq!(paths.load_project().unwrap().as_deref(), Some("ao3"));
    }
}
