//! Executor configuration.
//!
//! [`GraphConfig`] is read from a TOML file (or JSON when the file has a
//! `.json` extension), then overridden from `CHATFLOW_*` environment
//! variables, then validated.  Every field has a default, so an empty or
//! missing file is a valid configuration.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::trim::TrimConfig;

/// Checkpoint store limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Evict the least recently updated idle thread beyond this many threads.
    pub max_threads: Option<usize>,
}

/// Configuration for the agent execution graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Model identifier passed with every model call.
    pub model: String,

    /// Optional system prompt placed before the conversation.
    pub system_prompt: Option<String>,

    /// Maximum number of node executions per run.
    pub max_steps: u32,

    /// Optional temperature for sampling.
    pub temperature: Option<f32>,

    /// Optional max tokens per response.
    pub max_tokens: Option<u32>,

    /// Upper bound on one model turn, in seconds.
    pub model_timeout_secs: u64,

    /// Upper bound on one tool call, in seconds.
    pub tool_timeout_secs: u64,

    /// Capacity of the per-run event channel.
    pub event_buffer: usize,

    /// History trimming applied before every model call.
    pub trim: TrimConfig,

    /// Checkpoint store limits.
    pub checkpoint: CheckpointConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            model: "sim".to_owned(),
            system_prompt: None,
            max_steps: 25,
            temperature: Some(0.7),
            max_tokens: Some(4096),
            model_timeout_secs: 120,
            tool_timeout_secs: 60,
            event_buffer: 64,
            trim: TrimConfig::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl GraphConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ConfigError`] if the file cannot be read, and
    /// [`AgentError::Toml`] or [`AgentError::Json`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "configuration file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let config: Self = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        info!(path = %path.display(), "configuration loaded from file");
        Ok(config)
    }

    /// Apply `CHATFLOW_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `CHATFLOW_*` overrides from `lookup`.
    ///
    /// Recognised keys: `CHATFLOW_MODEL`, `CHATFLOW_SYSTEM_PROMPT`,
    /// `CHATFLOW_MAX_STEPS`, `CHATFLOW_TRIM_MAX_UNITS`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(model) = lookup("CHATFLOW_MODEL") {
            self.model = model;
        }
        if let Some(prompt) = lookup("CHATFLOW_SYSTEM_PROMPT") {
            self.system_prompt = Some(prompt).filter(|p| !p.trim().is_empty());
        }
        if let Some(steps) = parse_override(&lookup, "CHATFLOW_MAX_STEPS")? {
            self.max_steps = steps;
        }
        if let Some(units) = parse_override(&lookup, "CHATFLOW_TRIM_MAX_UNITS")? {
            self.trim.max_units = units;
        }
        Ok(())
    }

    /// Reject configurations the executor cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(AgentError::ConfigError {
                reason: reason.to_owned(),
            })
        };

        if self.max_steps == 0 {
            return invalid("max_steps must be at least 1");
        }
        if self.event_buffer == 0 {
            return invalid("event_buffer must be at least 1");
        }
        if self.trim.max_units == 0 {
            return invalid("trim.max_units must be at least 1");
        }
        if self.checkpoint.max_threads == Some(0) {
            return invalid("checkpoint.max_threads must be at least 1 when set");
        }
        Ok(())
    }

    /// Model turn timeout.
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    /// Tool call timeout.
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn parse_override<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| AgentError::ConfigError {
                reason: format!("invalid value for {key}: {e}"),
            })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::trim::SizeCounter;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = GraphConfig::default();
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.model, "sim");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = GraphConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, GraphConfig::default());
    }

    #[test]
    fn loads_partial_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chatflow.toml");
        std::fs::write(
            &path,
            r#"
max_steps = 8
system_prompt = "Be brief."

[trim]
max_units = 10
counter = "messages"

[checkpoint]
max_threads = 100
"#,
        )
        .unwrap();

        let config = GraphConfig::load(&path).unwrap();
        assert_eq!(config.max_steps, 8);
        assert_eq!(config.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(config.trim.counter, SizeCounter::Messages);
        assert_eq!(config.trim.max_units, 10);
        assert_eq!(config.checkpoint.max_threads, Some(100));
        assert_eq!(config.tool_timeout_secs, 60);
    }

    #[test]
    fn loads_json_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chatflow.json");
        std::fs::write(&path, r#"{"max_steps": 3, "model": "custom"}"#).unwrap();

        let config = GraphConfig::load(&path).unwrap();
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.model, "custom");
    }

    #[test]
    fn malformed_files_report_the_parser_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "max_steps = \"many\"").unwrap();
        assert!(matches!(GraphConfig::load(&path), Err(AgentError::Toml(_))));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"max_steps\": -1}").unwrap();
        assert!(matches!(GraphConfig::load(&path), Err(AgentError::Json(_))));
    }

    #[test]
    fn overrides_apply_and_validate() {
        let mut config = GraphConfig::default();
        config
            .apply_overrides(lookup(&[
                ("CHATFLOW_MAX_STEPS", "5"),
                ("CHATFLOW_TRIM_MAX_UNITS", "1200"),
                ("CHATFLOW_SYSTEM_PROMPT", "You are terse."),
            ]))
            .unwrap();
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.trim.max_units, 1200);
        assert_eq!(config.system_prompt.as_deref(), Some("You are terse."));

        let err = config
            .apply_overrides(lookup(&[("CHATFLOW_MAX_STEPS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("CHATFLOW_MAX_STEPS"));
    }

    #[test]
    fn zero_step_budget_is_rejected() {
        let config = GraphConfig {
            max_steps: 0,
            ..GraphConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
