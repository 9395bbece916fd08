//! Configuration management for the Wandr backend.
//!
//! Configuration is read from environment variables:
//! - `APP_ENV` - Optional. `development`, `production` or `testing`. Defaults to `development`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `5000`.
//! - `DEBUG` - Optional. Debug flag. Defaults to `true` outside production.
//! - `CORS_ORIGINS` - Comma-separated allowed origins. Required in production.
//! - `GEMINI_API_KEY` - Optional at startup. Submissions fail with a configuration error without it.
//! - `GEMINI_MODEL` - Optional. Defaults to `gemini-2.0-flash-exp`.
//! - `GEMINI_API_BASE_URL` - Optional. Defaults to the public Generative Language endpoint.
//! - `LLM_TIMEOUT_SECS` - Optional. Upstream request timeout. Defaults to `60`.
//! - `TASK_STORE` - Optional. `memory` or `file`. Defaults to `file`.
//! - `TASK_RESULTS_DIR` - Optional. Directory for task records. Defaults to `task_results`.
//! - `MAX_CONCURRENT_TASKS` - Optional. Concurrent extractions. Defaults to `4`.
//! - `MAX_QUEUED_TASKS` - Optional. Accepted but unfinished tasks before submissions are refused. Defaults to `256`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::task::TaskStoreType;
use crate::util::{parse_bool, split_csv};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Deployment environment, mirroring the development/production/testing split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Testing => "testing",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "testing" | "test" => Ok(Self::Testing),
            other => Err(ConfigError::InvalidValue(
                "APP_ENV".to_string(),
                format!("unknown environment '{}'", other),
            )),
        }
    }
}

/// Upstream model configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Gemini API key; `None` means submissions are refused.
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// Base URL of the Generative Language API
    pub base_url: String,

    /// Bounded timeout for a single upstream call
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
        }
    }
}

impl LlmConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Task storage and execution limits.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub store_type: TaskStoreType,

    /// Directory holding one JSON record per task (file store only)
    pub results_dir: PathBuf,

    /// Maximum extractions running at once
    pub max_concurrent: usize,

    /// Maximum tasks accepted but not yet terminal
    pub max_queued: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            store_type: TaskStoreType::default(),
            results_dir: PathBuf::from("task_results"),
            max_concurrent: 4,
            max_queued: 256,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    pub debug: bool,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Allowed CORS origins; `*` allows any origin
    pub cors_origins: Vec<String>,

    pub llm: LlmConfig,

    pub tasks: TaskConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            debug: true,
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: vec!["*".to_string()],
            llm: LlmConfig::default(),
            tasks: TaskConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparsable values and
    /// `ConfigError::MissingEnvVar` if `CORS_ORIGINS` is unset in production.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV") {
            Some(value) => value.parse()?,
            None => Environment::default(),
        };

        let debug = lookup("DEBUG")
            .map(|v| parse_bool(&v))
            .unwrap_or(environment != Environment::Production);

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_number(&lookup, "PORT", 5000u16)?;

        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(value) => split_csv(&value),
            None => match environment {
                Environment::Development => vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
                Environment::Testing => vec!["http://localhost:3000".to_string()],
                Environment::Production => {
                    return Err(ConfigError::MissingEnvVar("CORS_ORIGINS".to_string()))
                }
            },
        };

        let timeout_secs = parse_number(&lookup, "LLM_TIMEOUT_SECS", DEFAULT_LLM_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "LLM_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let llm = LlmConfig {
            api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: lookup("GEMINI_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };

        let store_type = match lookup("TASK_STORE") {
            Some(value) => value.parse()?,
            None => TaskStoreType::default(),
        };

        let max_concurrent = parse_number(&lookup, "MAX_CONCURRENT_TASKS", 4usize)?;
        let max_queued = parse_number(&lookup, "MAX_QUEUED_TASKS", 256usize)?;
        if max_concurrent == 0 || max_queued == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONCURRENT_TASKS/MAX_QUEUED_TASKS".to_string(),
                "limits must be greater than zero".to_string(),
            ));
        }

        let tasks = TaskConfig {
            store_type,
            results_dir: lookup("TASK_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("task_results")),
            max_concurrent,
            max_queued,
        };

        Ok(Self {
            environment,
            debug,
            host,
            port,
            cors_origins,
            llm,
            tasks,
        })
    }

    /// Whether any origin is allowed.
    pub fn cors_allows_any(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}
