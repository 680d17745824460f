use std::path::{Path, PathBuf};
use std::time::Duration;

use autotest_engine::RunnerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gemini's OpenAI-compatible endpoint.
pub const DEFAULT_LLM_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "no API key configured; set AUTOTEST_LLM_API_KEY (or GEMINI_API_KEY) in the \
         environment or a .env file, or `api_key` in the config file"
    )]
    MissingApiKey,

    #[error("invalid value `{value}` for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration.
///
/// Precedence, lowest first: built-in defaults, the TOML file passed with
/// `--config`, environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutotestConfig {
    /// OpenAI-compatible chat-completions base URL.
    pub llm_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model used for test-case generation (Stage A).
    pub test_case_model: String,
    /// Model used for script generation (Stage B).
    pub script_model: String,
    pub temperature: f64,
    pub request_timeout_secs: u64,
    /// Characters of page markup handed to script generation.
    pub html_excerpt_max: usize,
    pub runner: RunnerConfig,
}

impl Default for AutotestConfig {
    fn default() -> Self {
        Self {
            llm_url: DEFAULT_LLM_URL.to_string(),
            api_key: None,
            test_case_model: "gemini-2.5-flash".to_string(),
            script_model: "gemini-2.5-pro".to_string(),
            temperature: 0.2,
            request_timeout_secs: 180,
            html_excerpt_max: 75_000,
            runner: RunnerConfig::default(),
        }
    }
}

impl AutotestConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `AUTOTEST_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("AUTOTEST_LLM_URL") {
            self.llm_url = url;
        }
        if let Some(key) = var("AUTOTEST_LLM_API_KEY").or_else(|| var("GEMINI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = var("AUTOTEST_TEST_CASE_MODEL") {
            self.test_case_model = model;
        }
        if let Some(model) = var("AUTOTEST_SCRIPT_MODEL") {
            self.script_model = model;
        }
        if let Some(secs) = var("AUTOTEST_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("AUTOTEST_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = var("AUTOTEST_EXECUTION_TIMEOUT_SECS") {
            self.runner.timeout_secs = parse_number("AUTOTEST_EXECUTION_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = var("AUTOTEST_GRACE_PERIOD_SECS") {
            self.runner.grace_period_secs = parse_number("AUTOTEST_GRACE_PERIOD_SECS", &secs)?;
        }
        if let Some(dir) = var("AUTOTEST_TESTS_DIR") {
            self.runner.work_dir = PathBuf::from(dir);
        }
        if let Some(interpreter) = var("AUTOTEST_INTERPRETER") {
            self.runner.interpreter = interpreter;
        }
        if let Some(max) = var("AUTOTEST_HTML_EXCERPT_MAX") {
            self.html_excerpt_max = parse_number("AUTOTEST_HTML_EXCERPT_MAX", &max)?;
        }
        Ok(())
    }

    /// The API key, required by every command that calls the model.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.runner.timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a non-negative integer",
        })
}
