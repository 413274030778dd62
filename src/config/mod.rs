//! Configuration for pipeline runs.
//!
//! A [`PipelineConfig`] controls how a [`Pipeline`](crate::pipeline::Pipeline)
//! wires and supervises its stages. It is plain serde data and can be stored
//! as TOML (default) or JSON, picked by file extension.
//!
//! # Config Location
//!
//! Without an explicit path the config is read from the platform config
//! directory:
//! - **Linux**: `~/.config/dev.hxyulin.pipewright/pipeline.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.pipewright/pipeline.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.pipewright\pipeline.toml`
//!
//! # Example
//!
//! ```toml
//! channel_capacity = 64
//! error_policy = "abort"
//! join_grace_ms = 250
//! thread_name_prefix = "grep"
//! ```

use crate::pipeline::channel::OutputChannel;
use crate::pipeline::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.pipewright";

/// Config filename inside the app config directory
pub const CONFIG_FILE: &str = "pipeline.toml";

/// Default prefix for stage thread names
pub const DEFAULT_THREAD_PREFIX: &str = "pipewright";

/// What a stage does with a processing error it receives from upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Errors flow downstream as data; the destination decides what they mean.
    #[default]
    Forward,
    /// The first error cancels the run and is returned from `run`.
    Abort,
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorPolicy::Forward => write!(f, "forward"),
            ErrorPolicy::Abort => write!(f, "abort"),
        }
    }
}

/// Settings for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of channels built with [`PipelineConfig::output_channel`].
    /// `None` means unbounded, `Some(0)` a rendezvous channel.
    pub channel_capacity: Option<usize>,

    /// Stage error handling for every run.
    pub error_policy: ErrorPolicy,

    /// How long `run` waits for stage threads after the destination finished.
    /// `None` detaches them immediately.
    pub join_grace_ms: Option<u64>,

    /// Prefix for the names of spawned stage threads.
    pub thread_name_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: None,
            error_policy: ErrorPolicy::Forward,
            join_grace_ms: None,
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_capacity(mut self, capacity: Option<usize>) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_join_grace(mut self, grace: Duration) -> Self {
        self.join_grace_ms = Some(grace.as_millis() as u64);
        self
    }

    pub fn join_grace(&self) -> Option<Duration> {
        self.join_grace_ms.map(Duration::from_millis)
    }

    /// Build an output channel sized by this config.
    pub fn output_channel<T>(&self, name: impl Into<String>) -> OutputChannel<T> {
        OutputChannel::new(name, self.channel_capacity)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(PipelineError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(PipelineError::Config(
                "thread_name_prefix must not contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a config file. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                PipelineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                PipelineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load pipeline config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> PipelineResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| {
                PipelineError::Config(format!("Failed to serialize config: {}", e))
            })?
        } else {
            toml::to_string_pretty(self).map_err(|e| {
                PipelineError::Config(format!("Failed to serialize config: {}", e))
            })?
        };

        std::fs::write(path, content)
            .map_err(|e| PipelineError::Config(format!("Failed to write config: {}", e)))
    }
}

/// Get the platform config directory for this application
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path of the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
