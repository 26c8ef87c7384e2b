//! Configuration loading.
//!
//! Settings come from a TOML file with three sections (`[provider]`,
//! `[agent]`, `[tools]`), and a small set of `STEPWISE_*` environment
//! variables override the file.  The API key itself is never stored in the
//! file; `provider.api_key_env` names the variable that holds it.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::llm::client::{DEFAULT_API_KEY_ENV, OPENAI_BASE_URL, OpenAiConfig};
use crate::runtime::{AgentConfig, BudgetPolicy, DEFAULT_STEP_BUDGET};

/// Environment variable overriding `provider.model`.
pub const ENV_MODEL: &str = "STEPWISE_MODEL";
/// Environment variable overriding `provider.base_url`.
pub const ENV_BASE_URL: &str = "STEPWISE_BASE_URL";
/// Environment variable overriding `agent.step_budget`.
pub const ENV_STEP_BUDGET: &str = "STEPWISE_STEP_BUDGET";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepwiseConfig {
    pub provider: ProviderConfig,
    pub agent: AgentSettings,
    pub tools: ToolsConfig,
}

/// `[provider]`: the OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Use SSE streaming.
    pub stream: bool,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_owned(),
            model: "gpt-4o-mini".to_owned(),
            api_key_env: DEFAULT_API_KEY_ENV.to_owned(),
            max_tokens: Some(1024),
            temperature: None,
            stream: true,
            timeout_secs: 120,
        }
    }
}

/// `[agent]`: orchestrator behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub step_budget: u32,
    pub budget_policy: BudgetPolicy,
    /// Optional system message prepended to every turn.
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            budget_policy: BudgetPolicy::default(),
            system_prompt: None,
        }
    }
}

/// `[tools]`: which registered tools to expose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tool names left out of the registry.
    pub disabled: Vec<String>,
}

impl ToolsConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.iter().any(|d| d == name)
    }
}

impl StepwiseConfig {
    /// Load configuration from `path` (if given), then apply environment
    /// overrides and validate.
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                let config = Self::from_toml_str(&content)?;
                info!(path = %path.display(), "configuration loaded from file");
                config
            }
            Some(path) => {
                warn!(path = %path.display(), "configuration file does not exist, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document.  Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `STEPWISE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup.  Empty values are ignored,
    /// as are step budgets that do not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = lookup(ENV_MODEL) {
            debug!(model = %model, "model overridden from environment");
            self.provider.model = model;
        }
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            debug!(base_url = %base_url, "base url overridden from environment");
            self.provider.base_url = base_url;
        }
        if let Some(raw) = lookup(ENV_STEP_BUDGET) {
            match raw.trim().parse::<u32>() {
                Ok(budget) => self.agent.step_budget = budget,
                Err(e) => warn!(value = %raw, error = %e, "ignoring unparseable {ENV_STEP_BUDGET}"),
            }
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.agent.step_budget == 0 {
            return Err(ConfigError::Invalid {
                reason: "agent.step_budget must be at least 1".into(),
            });
        }
        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "provider.model must not be empty".into(),
            });
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "provider.base_url must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Read the API key from the variable named by `provider.api_key_env`.
    pub fn api_key(&self) -> ConfigResult<String> {
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                env_var: self.provider.api_key_env.clone(),
            })
    }

    /// Orchestrator settings.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            step_budget: self.agent.step_budget,
            budget_policy: self.agent.budget_policy,
        }
    }

    /// Client settings for the given API key.
    pub fn openai_config(&self, api_key: impl Into<String>) -> OpenAiConfig {
        let mut config = OpenAiConfig::compatible(
            api_key,
            self.provider.model.clone(),
            self.provider.base_url.clone(),
        );
        config.api_key_env = self.provider.api_key_env.clone();
        config.max_tokens = self.provider.max_tokens;
        config.temperature = self.provider.temperature;
        config.stream = self.provider.stream;
        config.timeout = Duration::from_secs(self.provider.timeout_secs);
        config
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
