//! Configuration types for the interview engine.
//!
//! This module provides the configuration structures controlling the
//! generative backend, the retry policy, confidence sampling and where
//! interview records and transcripts are written. It also defines the
//! per-session [`InterviewConfig`] chosen by the candidate.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "interview.json";

/// Default generative model.
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// Default base URL of the Generative Language REST API.
fn default_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

/// Default environment variable holding the API key.
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

/// Default per-request timeout in seconds.
const fn default_request_timeout() -> u32 {
    60
}

/// Default directory for interview records.
fn default_store_dir() -> String {
    ".interview/records".to_string()
}

/// Default output directory for transcripts.
fn default_output_dir() -> String {
    ".".to_string()
}

/// Default maximum attempts per generation call.
const fn default_max_attempts() -> u32 {
    3
}

/// Default delay before the first retry in milliseconds.
const fn default_initial_delay_ms() -> u64 {
    1000
}

/// Default cap on the delay between attempts in milliseconds.
const fn default_max_delay_ms() -> u64 {
    10_000
}

/// Default minimum spacing between confidence samples in milliseconds.
const fn default_sample_interval_ms() -> u64 {
    100
}

/// Default frame polling interval in milliseconds (about 60 Hz).
const fn default_frame_interval_ms() -> u64 {
    16
}

/// Main configuration for the interview engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Generative model used for questions and evaluations.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the generative backend.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout for a single backend request in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u32,

    /// Retry behavior for backend calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Confidence sampling settings.
    #[serde(default)]
    pub confidence: ConfidenceConfig,

    /// Directory holding interview records.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Output directory for generated transcripts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_seconds: default_request_timeout(),
            retry: RetryConfig::default(),
            confidence: ConfidenceConfig::default(),
            store_dir: default_store_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `interview.json` in the current directory. If not found,
    /// returns default configuration.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EngineError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `interview.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConfigParseError` if the file exists but contains
    /// invalid JSON, and `EngineError::Validation` if the values are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EngineError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EngineError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(EngineError::validation(
                "model must not be empty",
                "Set model (e.g. \"gemini-2.0-flash\") in your interview.json",
            ));
        }

        if self.api_base_url.trim().is_empty() {
            return Err(EngineError::validation(
                "apiBaseUrl must not be empty",
                "Remove apiBaseUrl from your interview.json to use the default endpoint",
            ));
        }

        if self.request_timeout_seconds == 0 {
            return Err(EngineError::validation(
                "requestTimeoutSeconds must be greater than 0",
                "Set requestTimeoutSeconds to at least 1 in your interview.json",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::validation(
                "retry.maxAttempts must be greater than 0",
                "Set retry.maxAttempts to at least 1 in your interview.json",
            ));
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(EngineError::validation(
                "retry.initialDelayMs must not exceed retry.maxDelayMs",
                "Lower retry.initialDelayMs or raise retry.maxDelayMs in your interview.json",
            ));
        }

        if self.confidence.frame_interval_ms == 0 {
            return Err(EngineError::validation(
                "confidence.frameIntervalMs must be greater than 0",
                "Set confidence.frameIntervalMs to at least 1 in your interview.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(EngineError::validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your interview.json (use '.' for current directory)",
            ));
        }

        Ok(())
    }

    /// Returns the backend request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout_seconds))
    }
}

/// Retry policy settings for generative backend calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for the delay between attempts in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Confidence sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceConfig {
    /// Minimum spacing between emitted samples in milliseconds.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// How often a frame is requested from the capture source.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

// ============================================================================
// Per-session configuration
// ============================================================================

/// Interview difficulty chosen by the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    /// Entry-level questions.
    Beginner,
    /// Mid-level questions.
    Intermediate,
    /// Senior-level questions.
    Advanced,
}

impl Difficulty {
    /// Parses a string into a `Difficulty`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Returns the lower-case name used in prompts and records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_str_case_insensitive(s).ok_or_else(|| {
            EngineError::validation(
                format!("invalid difficulty '{s}'"),
                "Choose one of 'beginner', 'intermediate', 'advanced'",
            )
        })
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid difficulty '{s}': expected one of 'beginner', 'intermediate', 'advanced'"
            ))
        })
    }
}

impl Serialize for Difficulty {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Settings for one interview, fixed once the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewConfig {
    /// Question difficulty.
    pub difficulty: Difficulty,
    /// Technical domain, e.g. "System Design".
    pub domain: String,
    /// Interview length in minutes.
    pub duration_minutes: u32,
}

impl InterviewConfig {
    /// Creates a new `InterviewConfig`.
    #[must_use]
    pub fn new(difficulty: Difficulty, domain: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            difficulty,
            domain: domain.into(),
            duration_minutes,
        }
    }

    /// Validates the domain and duration.
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(EngineError::validation(
                "Please select difficulty level, duration, and domain",
                "Choose a domain such as 'Backend Development' or 'System Design'",
            ));
        }

        if self.duration_minutes == 0 {
            return Err(EngineError::validation(
                "Please select difficulty level, duration, and domain",
                "Choose a duration of at least 1 minute",
            ));
        }

        Ok(())
    }

    /// Returns the countdown length in seconds.
    #[must_use]
    pub const fn duration_seconds(&self) -> u32 {
        self.duration_minutes.saturating_mul(60)
    }
}
