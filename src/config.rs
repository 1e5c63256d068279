use crate::health::convert_interval_to_index;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Load-average windows the OS reports, in minutes.
pub const LOAD_WINDOWS: [u32; 3] = [1, 5, 15];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    pub interval_secs: u64,
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,
    #[serde(default)]
    pub expose_addresses: bool,
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// Limits a snapshot is judged against.
///
/// `cpu_utilization` is load per core (fraction), `available_memory` and
/// `disk_space` are decimal gigabytes, `interval` selects the load-average
/// window in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Thresholds {
    #[serde(default = "default_cpu_utilization")]
    pub cpu_utilization: f64,
    #[serde(default = "default_available_memory")]
    pub available_memory: f64,
    #[serde(default = "default_disk_space")]
    pub disk_space: f64,
    #[serde(default = "default_interval")]
    pub interval: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_utilization: default_cpu_utilization(),
            available_memory: default_available_memory(),
            disk_space: default_disk_space(),
            interval: default_interval(),
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
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        Self::from_yaml(&text, &path_display)
    }

    pub fn from_yaml(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле listen обязательно".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs должно быть >= 1".to_string(),
            ));
        }
        if self.disk_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "disk_path не должен быть пустым".to_string(),
            ));
        }

        validate_thresholds(&self.thresholds)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_thresholds(thresholds: &Thresholds) -> Result<(), ConfigError> {
    let limits = [
        ("cpu_utilization", thresholds.cpu_utilization),
        ("available_memory", thresholds.available_memory),
        ("disk_space", thresholds.disk_space),
    ];
    for (name, value) in limits {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "thresholds.{name} должно быть конечным числом >= 0"
            )));
        }
    }
    validate_interval(thresholds.interval)
}

pub fn validate_interval(interval: u32) -> Result<(), ConfigError> {
    convert_interval_to_index(interval).map(|_| ())
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

const fn default_cpu_utilization() -> f64 {
    0.8
}

const fn default_available_memory() -> f64 {
    0.2
}

const fn default_disk_space() -> f64 {
    0.5
}

const fn default_interval() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            listen: "127.0.0.1:9108".to_string(),
            interval_secs: 5,
            disk_path: PathBuf::from("/"),
            expose_addresses: false,
            thresholds: Thresholds::default(),
        }
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = Config::from_yaml(Config::example_yaml(), "config.yaml.example")
            .expect("пример конфигурации должен проходить валидацию");
        assert_eq!(cfg.thresholds, Thresholds::default());
        assert_eq!(cfg.disk_path, PathBuf::from("/"));
    }

    #[test]
    fn missing_threshold_keys_fall_back_to_defaults() {
        let yaml = "listen: \"127.0.0.1:9108\"\ninterval_secs: 10\nthresholds:\n  disk_space: 4\n";
        let cfg = Config::from_yaml(yaml, "inline").expect("валидный YAML");
        assert_eq!(cfg.thresholds.disk_space, 4.0);
        assert_eq!(cfg.thresholds.cpu_utilization, 0.8);
        assert_eq!(cfg.thresholds.available_memory, 0.2);
        assert_eq!(cfg.thresholds.interval, 1);
        assert!(!cfg.expose_addresses);
    }

    #[test]
    fn rejects_unknown_load_window() {
        let mut cfg = valid_config();
        cfg.thresholds.interval = 10;
        let err = cfg.validate().expect_err("интервал 10 недопустим");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_negative_threshold() {
        let mut cfg = valid_config();
        cfg.thresholds.available_memory = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_listen_address() {
        let mut cfg = valid_config();
        cfg.listen = "localhost".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_every_load_window() {
        for window in LOAD_WINDOWS {
            validate_interval(window).expect("окно из списка допустимо");
        }
        assert!(validate_interval(0).is_err());
    }
}
