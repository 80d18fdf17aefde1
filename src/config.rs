//! Bridge configuration
//!
//! Loaded from TOML; every field has a default so an empty file (or no
//! file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "EMACS_BRIDGE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeConfig {
    #[serde(default)]
    pub callbacks: CallbackConfig,

    #[serde(default)]
    pub errors: ErrorConfig,

    #[serde(default)]
    pub logging: LogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CallbackConfig {
    /// Maximum number of deferred callback records waiting for an env
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    #[serde(default)]
    pub on_mismatch: MismatchPolicy,

    /// Run queued callbacks as soon as a new env is constructed
    #[serde(default = "default_true")]
    pub drain_on_entry: bool,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            overflow: OverflowPolicy::default(),
            on_mismatch: MismatchPolicy::default(),
            drain_on_entry: true,
        }
    }
}

/// What to do with a callback record when the queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Refuse the new record
    #[default]
    Reject,
    /// Evict the oldest queued record to make room
    DropOldest,
}

/// What to do when captured arguments don't fit the callback's shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchPolicy {
    Ignore,
    #[default]
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ErrorConfig {
    /// Error symbol used to surface native failures to Lisp
    #[serde(default = "default_error_symbol")]
    pub symbol: String,

    /// Message passed to `define-error`
    #[serde(default = "default_error_message")]
    pub message: String,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            symbol: default_error_symbol(),
            message: default_error_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogSection {
    /// trace, debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Write to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_capacity() -> usize {
    1024
}

fn default_error_symbol() -> String {
    "rust-error".to_string()
}

fn default_error_message() -> String {
    "Exception from a Rust module".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `EMACS_BRIDGE_CONFIG` if set, defaults otherwise
    ///
    /// A broken file is reported on stderr and ignored; module loading
    /// must not fail because of logging or queue tuning.
    pub fn from_env() -> Self {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)).unwrap_or_else(|e| {
                eprintln!("emacs-bridge: {}; using defaults", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.callbacks.capacity == 0 {
            return Err(Error::Config("callbacks.capacity must be at least 1".into()));
        }
        if self.errors.symbol.is_empty() || !self.errors.symbol.is_ascii() {
            return Err(Error::Config(format!(
                "errors.symbol {:?} is not a valid symbol name",
                self.errors.symbol
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))
    }

    /// Set the callback queue bound; zero is raised to 1
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.callbacks.capacity = capacity.max(1);
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.callbacks.overflow = overflow;
        self
    }

    pub fn with_mismatch(mut self, policy: MismatchPolicy) -> Self {
        self.callbacks.on_mismatch = policy;
        self
    }

    pub fn with_drain_on_entry(mut self, enabled: bool) -> Self {
        self.callbacks.drain_on_entry = enabled;
        self
    }
}
