use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub services_to_check: Vec<String>,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub email_alert: EmailAlertConfig,
    #[serde(default)]
    pub webhook_alert: WebhookAlertConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,
    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,
    #[serde(default = "default_disk_percent")]
    pub disk_percent: f64,
    #[serde(default = "default_top_process_count")]
    pub top_process_count: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamplingConfig {
    #[serde(default = "default_cpu_window_ms")]
    pub cpu_window_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailAlertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub smtp_password_env: Option<String>,
    #[serde(default = "default_starttls")]
    pub starttls: bool,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookAlertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            thresholds: ThresholdsConfig::default(),
            services_to_check: Vec::new(),
            sampling: SamplingConfig::default(),
            email_alert: EmailAlertConfig::default(),
            webhook_alert: WebhookAlertConfig::default(),
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            cpu_percent: default_cpu_percent(),
            memory_percent: default_memory_percent(),
            disk_percent: default_disk_percent(),
            top_process_count: default_top_process_count(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            cpu_window_ms: default_cpu_window_ms(),
        }
    }
}

impl Default for EmailAlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
            smtp_user: None,
            smtp_password: None,
            smtp_password_env: None,
            starttls: default_starttls(),
            from: String::new(),
            to: Vec::new(),
            timeout_secs: default_smtp_timeout_secs(),
        }
    }
}

impl Default for WebhookAlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

impl SamplingConfig {
    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }
}

impl EmailAlertConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn check(&self) -> Result<(), String> {
        if self.smtp_server.trim().is_empty() {
            return Err("email_alert.smtp_server не задан".to_string());
        }
        if self.smtp_port == 0 {
            return Err("email_alert.smtp_port должен быть в диапазоне 1..65535".to_string());
        }
        if self.timeout_secs < 1 {
            return Err("email_alert.timeout_secs должно быть >= 1".to_string());
        }
        if self.from.trim().is_empty() {
            return Err("email_alert.from не задан".to_string());
        }
        if self.to.is_empty() {
            return Err("email_alert.to должен содержать хотя бы одного получателя".to_string());
        }
        Ok(())
    }

    pub fn resolve_password(&self) -> Option<String> {
        let from_env = self
            .smtp_password_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|v| !v.trim().is_empty());
        from_env.or_else(|| {
            self.smtp_password
                .as_ref()
                .filter(|v| !v.is_empty())
                .cloned()
        })
    }
}

impl WebhookAlertConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn check(&self) -> Result<(), String> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err("webhook_alert.url не задан".to_string());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!(
                "webhook_alert.url '{url}' должен начинаться с http:// или https://"
            ));
        }
        if self.timeout_secs < 1 {
            return Err("webhook_alert.timeout_secs должно быть >= 1".to_string());
        }
        Ok(())
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

        Self::from_yaml_str(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path_display,
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "поле report_dir не должно быть пустым".to_string(),
            ));
        }
        if !(1..=60_000).contains(&self.sampling.cpu_window_ms) {
            return Err(ConfigError::Validation(
                "sampling.cpu_window_ms должно быть в диапазоне 1..60000".to_string(),
            ));
        }

        validate_thresholds(&self.thresholds)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_thresholds(cfg: &ThresholdsConfig) -> Result<(), ConfigError> {
    let percents = [
        ("cpu_percent", cfg.cpu_percent),
        ("memory_percent", cfg.memory_percent),
        ("disk_percent", cfg.disk_percent),
    ];
    for (name, value) in percents {
        if !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "thresholds.{name} должно быть в диапазоне 0..100"
            )));
        }
    }
    Ok(())
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("sample_reports")
}

const fn default_cpu_percent() -> f64 {
    85.0
}

const fn default_memory_percent() -> f64 {
    80.0
}

const fn default_disk_percent() -> f64 {
    90.0
}

const fn default_top_process_count() -> usize {
    5
}

const fn default_cpu_window_ms() -> u64 {
    1000
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_starttls() -> bool {
    true
}

const fn default_smtp_timeout_secs() -> u64 {
    10
}

const fn default_webhook_timeout_secs() -> u64 {
    5
}
