use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MAX_INTERVAL_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_disk_path")]
    pub disk_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            interval_secs: default_interval_secs(),
            disk_path: default_disk_path(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("некорректное значение переменной окружения {name}: '{value}'")]
    Env { name: String, value: String },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    /// Defaults, then the optional YAML file, then `DB_*`, `INTERVAL_SEC` and
    /// `DISK_PATH` from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env(|name| std::env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            self.database.port = parse_env("DB_PORT", v)?;
        }
        if let Some(v) = lookup("DB_NAME") {
            self.database.name = v;
        }
        if let Some(v) = lookup("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("DB_PASS") {
            self.database.password = v;
        }
        if let Some(v) = lookup("INTERVAL_SEC") {
            self.interval_secs = parse_env("INTERVAL_SEC", v)?;
        }
        if let Some(v) = lookup("DISK_PATH") {
            self.disk_path = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database.host не должен быть пустым".to_string(),
            ));
        }
        if self.database.port == 0 {
            return Err(ConfigError::Validation(
                "database.port должен быть в диапазоне 1..65535".to_string(),
            ));
        }
        if self.database.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database.name не должен быть пустым".to_string(),
            ));
        }
        if self.database.user.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database.user не должен быть пустым".to_string(),
            ));
        }
        if !self.interval_secs.is_finite()
            || self.interval_secs <= 0.0
            || self.interval_secs > MAX_INTERVAL_SECS
        {
            return Err(ConfigError::Validation(format!(
                "interval_secs должно быть в диапазоне (0, {MAX_INTERVAL_SECS}]"
            )));
        }
        if self.disk_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "disk_path не должен быть пустым".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn parse_env<T: FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        name: name.to_string(),
        value,
    })
}

fn default_db_host() -> String {
    "localhost".to_string()
}

const fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "postgres".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

const fn default_interval_secs() -> f64 {
    1.0
}

fn default_disk_path() -> String {
    "/host_root".to_string()
}
