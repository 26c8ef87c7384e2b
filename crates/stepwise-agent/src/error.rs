//! Agent error types.
//!
//! Per-invocation failures never show up here; they travel inside
//! `tool-result` parts (see [`crate::llm::types::ToolFailure`]).  This module
//! covers what can end a turn, what a model caller can report, and what can
//! go wrong while loading configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::invocation::TransitionError;

// ---------------------------------------------------------------------------
// Model caller errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`crate::llm::ModelCaller`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The provider could not be reached or failed internally.
    #[error("model unavailable: {reason}")]
    Unavailable { reason: String },

    /// The provider is throttling requests.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The provider rejected the request, or replied with something that
    /// cannot be a valid assistant message.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl ModelError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable {
            reason: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Turn errors
// ---------------------------------------------------------------------------

/// Errors that end a turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    /// The model provider is unreachable or failing.
    #[error("model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    /// The model provider is throttling requests.
    #[error("rate limited by model provider{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The request or the model's reply was malformed.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The caller cancelled the turn.
    #[error("turn cancelled")]
    Cancelled,

    /// Catch-all for broken internal invariants.
    #[error("internal orchestrator error: {0}")]
    Internal(String),
}

impl TurnError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

impl From<ModelError> for TurnError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Unavailable { reason } => Self::ModelUnavailable { reason },
            ModelError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            ModelError::InvalidRequest { reason } => Self::InvalidRequest { reason },
        }
    }
}

impl From<TransitionError> for TurnError {
    fn from(err: TransitionError) -> Self {
        Self::Internal(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Configuration loading or validation failed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or otherwise unusable.
    #[error("invalid config: {reason}")]
    Invalid { reason: String },

    /// The API key environment variable is unset or empty.
    #[error("missing api key: set the `{env_var}` environment variable")]
    MissingApiKey { env_var: String },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
