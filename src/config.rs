use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::highlighter::{DEFAULT_QUEUE_SIZE, DEFAULT_RENDER_TIMEOUT, DEFAULT_WORKERS, DispatcherOptions};

#[derive(Parser, Debug)]
#[command(name = "splinter")]
#[command(about = "Runs the splinter snippet service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Overrides `highlighter.workers` from the config file.
    #[arg(long = "highlight-workers")]
    pub highlight_workers: Option<usize>,

    /// Overrides `highlighter.queue_size` from the config file.
    #[arg(long = "highlight-queue-size")]
    pub highlight_queue_size: Option<usize>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".splinter")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Libsql,
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default = "default_database")]
    database: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            port: default_port(),
            storage: StorageKind::default(),
            database: default_database(),
        }
    }
}

fn default_port() -> u16 {
    5000
}

fn default_database() -> String {
    "splinter.db".to_string()
}

impl App {
    pub fn get_db(&self) -> &str {
        &self.database
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Highlighter {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_command")]
    pub command: String,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_size: default_queue_size(),
            timeout_seconds: default_timeout_seconds(),
            command: default_command(),
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_RENDER_TIMEOUT.as_secs()
}

fn default_command() -> String {
    "pygmentize".to_string()
}

impl Highlighter {
    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            queue_size: self.queue_size,
            render_timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Auth {
    pub secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: i64,
}

fn default_token_ttl() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub highlighter: Highlighter,
    pub auth: Auth,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies command line overrides on top of the file values.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<()> {
        if let Some(workers) = cli.highlight_workers {
            self.highlighter.workers = workers;
        }
        if let Some(queue_size) = cli.highlight_queue_size {
            self.highlighter.queue_size = queue_size;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.auth.secret.is_empty() {
            anyhow::bail!("auth.secret must not be empty");
        }
        // a zero-capacity queue could never accept a job without blocking
        if self.highlighter.queue_size == 0 {
            anyhow::bail!("highlighter.queue_size must be at least 1");
        }
        Ok(())
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!("environment variable '{}' not found", var_name);
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = Config::from_yaml("auth:\n  secret: abc\n").unwrap();
        assert_eq!(cfg.app.get_port(), 5000);
        assert_eq!(cfg.app.storage, StorageKind::Memory);
        assert_eq!(cfg.highlighter.workers, 8);
        assert_eq!(cfg.highlighter.queue_size, 256);
        assert_eq!(cfg.highlighter.command, "pygmentize");
        assert_eq!(cfg.auth.token_ttl_minutes, 100);
    }

    #[test]
    fn env_defaults_are_substituted() {
        let yaml = r#"
app:
  port: ${SPLINTER_TEST_UNSET_PORT:-6000}
  storage: libsql
  database: snippets.db
highlighter:
  workers: 2
  queue_size: 16
  timeout_seconds: 3
auth:
  secret: ${SPLINTER_TEST_UNSET_SECRET:-fallback}
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.app.get_port(), 6000);
        assert_eq!(cfg.app.storage, StorageKind::Libsql);
        assert_eq!(cfg.app.get_db(), "snippets.db");
        assert_eq!(cfg.auth.secret, "fallback");

        let options = cfg.highlighter.dispatcher_options();
        assert_eq!(options.queue_size, 16);
        assert_eq!(options.render_timeout, Duration::from_secs(3));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(Config::from_yaml("auth:\n  secret: \"\"\n").is_err());
    }

    #[test]
    fn cli_overrides_highlighter_settings() {
        let mut cfg = Config::from_yaml("auth:\n  secret: abc\n").unwrap();
        let cli = Cli::parse_from(["splinter", "--highlight-workers", "3", "--highlight-queue-size", "9"]);
        cfg.apply_cli(&cli).unwrap();
        assert_eq!(cfg.highlighter.workers, 3);
        assert_eq!(cfg.highlighter.queue_size, 9);
    }

    #[test]
    fn zero_queue_size_is_rejected() {
        let yaml = "highlighter:\n  queue_size: 0\nauth:\n  secret: abc\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("queue_size"));

        let mut cfg = Config::from_yaml("auth:\n  secret: abc\n").unwrap();
        let cli = Cli::parse_from(["splinter", "--highlight-queue-size", "0"]);
        assert!(cfg.apply_cli(&cli).is_err());
    }
}
