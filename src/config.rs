use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

use crate::models::DEFAULT_FREE_MAX_PROJECTS;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn redact<S: Serializer>(key: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match key {
        Some(_) => serializer.serialize_some("********"),
        None => serializer.serialize_none(),
    }
}

/// Remote server settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerSettings {
    /// Server URL (e.g., "http://localhost:8080" or "https://forge.example.com")
    pub server_url: Option<String>,
    /// API key for authentication
    #[serde(serialize_with = "redact")]
    pub api_key: Option<String>,
}

impl ServerSettings {
    /// Returns true if the server is configured (has both server_url and api_key)
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }
}

/// CLI configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database used when no server is configured
    pub database_path: ConfigValue<PathBuf>,
    /// User id the local database's account belongs to
    pub user: ConfigValue<String>,
    /// Free plan quota in the local database
    pub free_max_projects: ConfigValue<i64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub server: ServerSettings,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    user: Option<String>,
    free_max_projects: Option<i64>,
    server: Option<ServerSettings>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with(config_path, |name| std::env::var(name).ok())
    }

    fn load_with(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut database_path = ConfigValue::new(
            Self::default_data_dir().join("backforge.db"),
            ConfigSource::Default,
        );
        let mut user = ConfigValue::new("local".to_string(), ConfigSource::Default);
        let mut free_max_projects =
            ConfigValue::new(DEFAULT_FREE_MAX_PROJECTS, ConfigSource::Default);
        let mut config_file = None;
        let mut server = ServerSettings::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(id) = file_config.user {
                user = ConfigValue::new(id, ConfigSource::File);
            }
            if let Some(max) = file_config.free_max_projects {
                free_max_projects = ConfigValue::new(max, ConfigSource::File);
            }
            if let Some(settings) = file_config.server {
                server = settings;
            }
        }

        if let Some(db_path) = env("BACKFORGE_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(id) = env("BACKFORGE_USER") {
            user = ConfigValue::new(id, ConfigSource::Environment);
        }
        if let Some(max) = env("BACKFORGE_FREE_MAX_PROJECTS") {
            let max = max
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BACKFORGE_FREE_MAX_PROJECTS", max))?;
            free_max_projects = ConfigValue::new(max, ConfigSource::Environment);
        }
        if let Some(url) = env("BACKFORGE_SERVER_URL") {
            server.server_url = Some(url);
        }
        if let Some(key) = env("BACKFORGE_API_KEY") {
            server.api_key = Some(key);
        }

        Ok(Self {
            database_path,
            user,
            free_max_projects,
            config_file,
            server,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/backforge/
    /// - macOS: ~/Library/Application Support/backforge/
    /// - Windows: %APPDATA%/backforge/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("backforge")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/backforge/
    /// - macOS: ~/Library/Application Support/backforge/
    /// - Windows: %APPDATA%/backforge/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("backforge")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {1}", .0.display())]
    ReadError(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{}': {1}", .0.display())]
    ParseError(PathBuf, serde_yaml::Error),
    #[error("Invalid value for {0}: '{1}'")]
    InvalidValue(&'static str, String),
}
