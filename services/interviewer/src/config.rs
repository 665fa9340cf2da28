//! Application Configuration Module
//!
//! This module centralizes the configuration for the interviewer service.
//! It loads settings from environment variables and provides a single
//! struct that is handed to the driver at startup.

use interview_core::session_state::InterviewLimits;
use std::env;
use std::path::PathBuf;
use tracing::Level;

/// The question bank shipped with this crate, independent of the working directory.
pub const BUNDLED_QUESTION_BANK: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/questions.json");

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeProvider {
    OpenAI,
    Offline,
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: JudgeProvider,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub log_level: Level,
    pub question_bank: PathBuf,
    pub prompts_dir: PathBuf,
    pub transcript_dir: PathBuf,
    pub limits: InterviewLimits,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `JUDGE_PROVIDER`: "openai" or "offline". Defaults to "openai".
    /// *   `OPENAI_API_KEY`: Your secret key for the OpenAI API. Required if provider is "openai".
    /// *   `CHAT_MODEL`: (Optional) The model used as the judge. Defaults to "gpt-4o".
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    /// *   `QUESTION_BANK`: (Optional) Path to the question bank. Defaults to the bundled bank.
    /// *   `PROMPTS_DIR`: (Optional) Directory of prompt overrides. Defaults to "prompts".
    /// *   `TRANSCRIPT_DIR`: (Optional) Where transcripts are written. Defaults to "output".
    /// *   `MAX_QUESTIONS` / `MAX_HINTS`: (Optional) Interview budgets. Default to 5 and 1.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider_str = lookup("JUDGE_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "offline" => JudgeProvider::Offline,
            "openai" => JudgeProvider::OpenAI,
            other => {
                return Err(ConfigError::InvalidValue(
                    "JUDGE_PROVIDER".to_string(),
                    format!("'{other}' is not one of: openai, offline"),
                ));
            }
        };

        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let path_or = |key: &str, default: &str| {
            PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
        };
        let question_bank = path_or("QUESTION_BANK", BUNDLED_QUESTION_BANK);
        let prompts_dir = path_or("PROMPTS_DIR", "prompts");
        let transcript_dir = path_or("TRANSCRIPT_DIR", "output");

        let defaults = InterviewLimits::default();
        let limits = InterviewLimits {
            max_questions: parse_or(&lookup, "MAX_QUESTIONS", defaults.max_questions)?,
            max_hints: parse_or(&lookup, "MAX_HINTS", defaults.max_hints)?,
            ..defaults
        };

        // Validate that the required API key is present for the selected provider.
        if provider == JudgeProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for openai provider".to_string(),
            ));
        }

        Ok(Self {
            provider,
            openai_api_key,
            chat_model,
            log_level,
            question_bank,
            prompts_dir,
            transcript_dir,
            limits,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}
