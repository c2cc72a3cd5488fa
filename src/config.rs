use morel_core::{BackendConfig, ManagerOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

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

    fn set(&mut self, value: T, source: ConfigSource) {
        self.value = value;
        self.source = source;
    }
}

/// Where records are kept between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Sqlite,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Memory => write!(f, "memory"),
            StorageKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "sqlite" => Ok(StorageKind::Sqlite),
            other => Err(format!("unknown storage '{}' (expected memory or sqlite)", other)),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Remote endpoint receiving records
    pub url: ConfigValue<String>,
    pub appname: ConfigValue<String>,
    #[serde(skip_serializing)]
    pub appsecret: ConfigValue<String>,
    pub website_id: ConfigValue<i64>,
    pub survey_id: ConfigValue<i64>,
    pub storage: ConfigValue<StorageKind>,
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    pub timeout_secs: ConfigValue<u64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    url: Option<String>,
    appname: Option<String>,
    appsecret: Option<String>,
    website_id: Option<i64>,
    survey_id: Option<i64>,
    storage: Option<StorageKind>,
    database_path: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: ConfigValue::new(String::new(), ConfigSource::Default),
            appname: ConfigValue::new("morel".to_string(), ConfigSource::Default),
            appsecret: ConfigValue::new(String::new(), ConfigSource::Default),
            website_id: ConfigValue::new(0, ConfigSource::Default),
            survey_id: ConfigValue::new(0, ConfigSource::Default),
            storage: ConfigValue::new(StorageKind::Sqlite, ConfigSource::Default),
            database_path: ConfigValue::new(
                Self::default_data_dir().join("morel.db"),
                ConfigSource::Default,
            ),
            timeout_secs: ConfigValue::new(30, ConfigSource::Default),
            config_file: None,
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading overrides through `env`.
    pub fn load_with<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config.apply_file(file_config, &path);
            config.config_file = Some(path);
        }

        config.apply_env(env)?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile, path: &std::path::Path) {
        let source = ConfigSource::File;
        if let Some(url) = file.url {
            self.url.set(url, source.clone());
        }
        if let Some(appname) = file.appname {
            self.appname.set(appname, source.clone());
        }
        if let Some(appsecret) = file.appsecret {
            self.appsecret.set(appsecret, source.clone());
        }
        if let Some(website_id) = file.website_id {
            self.website_id.set(website_id, source.clone());
        }
        if let Some(survey_id) = file.survey_id {
            self.survey_id.set(survey_id, source.clone());
        }
        if let Some(storage) = file.storage {
            self.storage.set(storage, source.clone());
        }
        if let Some(db_path) = file.database_path {
            // Relative paths are relative to the config file
            let resolved = if db_path.is_relative() {
                path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
            } else {
                db_path
            };
            self.database_path.set(resolved, source.clone());
        }
        if let Some(timeout_secs) = file.timeout_secs {
            self.timeout_secs.set(timeout_secs, source);
        }
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = ConfigSource::Environment;
        if let Some(url) = env("MOREL_URL") {
            self.url.set(url, source.clone());
        }
        if let Some(appname) = env("MOREL_APPNAME") {
            self.appname.set(appname, source.clone());
        }
        if let Some(appsecret) = env("MOREL_APPSECRET") {
            self.appsecret.set(appsecret, source.clone());
        }
        if let Some(website_id) = env("MOREL_WEBSITE_ID") {
            self.website_id
                .set(parse_env("MOREL_WEBSITE_ID", &website_id)?, source.clone());
        }
        if let Some(survey_id) = env("MOREL_SURVEY_ID") {
            self.survey_id
                .set(parse_env("MOREL_SURVEY_ID", &survey_id)?, source.clone());
        }
        if let Some(storage) = env("MOREL_STORAGE") {
            self.storage
                .set(parse_env("MOREL_STORAGE", &storage)?, source.clone());
        }
        if let Some(db_path) = env("MOREL_DATABASE_PATH") {
            self.database_path.set(PathBuf::from(db_path), source);
        }
        Ok(())
    }

    /// Backend selection for the manager's storages
    pub fn backend(&self) -> BackendConfig {
        match self.storage.value {
            StorageKind::Memory => BackendConfig::Memory,
            StorageKind::Sqlite => BackendConfig::Sqlite {
                path: self.database_path.value.clone(),
            },
        }
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            url: self.url.value.clone(),
            appname: self.appname.value.clone(),
            appsecret: self.appsecret.value.clone(),
            website_id: self.website_id.value,
            survey_id: self.survey_id.value,
            storage: self.backend(),
            timeout_secs: self.timeout_secs.value,
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/morel/
    /// - macOS: ~/Library/Application Support/morel/
    /// - Windows: %APPDATA%/morel/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("morel")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/morel/
    /// - macOS: ~/Library/Application Support/morel/
    /// - Windows: %APPDATA%/morel/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("morel")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, e) => {
                write!(f, "Invalid value for {}: {}", key, e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load_with(Some(config_path), no_env).unwrap();
        assert!(config
            .database_path
            .value
            .to_string_lossy()
            .contains("morel.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert_eq!(config.appname.value, "morel");
        assert_eq!(config.storage.value, StorageKind::Sqlite);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "url: https://example.com/mobile/submit").unwrap();
        writeln!(file, "appname: test").unwrap();
        writeln!(file, "appsecret: mytest").unwrap();
        writeln!(file, "website_id: 23").unwrap();
        writeln!(file, "survey_id: 42").unwrap();
        writeln!(file, "storage: memory").unwrap();

        let config = Config::load_with(Some(config_path.clone()), no_env).unwrap();
        assert_eq!(config.url.value, "https://example.com/mobile/submit");
        assert_eq!(config.url.source, ConfigSource::File);
        assert_eq!(config.website_id.value, 23);
        assert_eq!(config.survey_id.value, 42);
        assert_eq!(config.storage.value, StorageKind::Memory);
        assert_eq!(config.config_file, Some(config_path));

        let options = config.manager_options();
        assert_eq!(options.appname, "test");
        assert_eq!(options.appsecret, "mytest");
        assert_eq!(options.storage, BackendConfig::Memory);
    }

    #[test]
    fn test_relative_database_path_resolved() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "database_path: data/morel.db\n").unwrap();

        let config = Config::load_with(Some(config_path), no_env).unwrap();
        assert_eq!(
            config.database_path.value,
            temp_dir.path().join("data/morel.db")
        );
        assert_eq!(
            config.backend(),
            BackendConfig::Sqlite {
                path: temp_dir.path().join("data/morel.db")
            }
        );
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "url: https://file.example.com\nsurvey_id: 1\n").unwrap();

        let env: HashMap<&str, &str> = [
            ("MOREL_URL", "https://env.example.com"),
            ("MOREL_SURVEY_ID", "99"),
            ("MOREL_STORAGE", "Memory"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::load_with(Some(config_path), |key| env.get(key).map(|v| v.to_string()))
                .unwrap();
        assert_eq!(config.url.value, "https://env.example.com");
        assert_eq!(config.url.source, ConfigSource::Environment);
        assert_eq!(config.survey_id.value, 99);
        assert_eq!(config.storage.value, StorageKind::Memory);
        assert_eq!(config.appname.source, ConfigSource::Default);
    }

    #[test]
    fn test_invalid_env_value() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let result = Config::load_with(Some(config_path), |key| {
            (key == "MOREL_WEBSITE_ID").then(|| "twenty-three".to_string())
        });
        let err = result.unwrap_err();
        assert!(err.to_string().contains("MOREL_WEBSITE_ID"));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load_with(Some(config_path), no_env);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_appsecret_not_serialized() {
        let temp_dir = tempdir().unwrap();
        let config = Config::load_with(Some(temp_dir.path().join("none.yaml")), |key| {
            (key == "MOREL_APPSECRET").then(|| "hunter2".to_string())
        })
        .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert_eq!(config.appsecret.value, "hunter2");
    }
}
