// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Engine configuration.
//!
//! Values come from, in increasing priority: the defaults, a `momentum.toml`
//! file, and `MOMENTUM_*` environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the project-level configuration file.
pub const CONFIG_FILE: &str = "momentum.toml";

/// Configuration for an engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of active call frames per task
    pub max_call_depth: usize,

    /// Extension appended to extension-less import paths
    pub module_extension: String,

    /// Maximum number of frames kept in an error trace
    pub trace_limit: usize,

    /// Default tracing filter used by the CLI when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            module_extension: "mn".to_string(),
            trace_limit: 16,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `momentum.toml` in `dir` (if present) and
    /// the environment.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut config = Config::default();

        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            config = Self::from_file(&path)?;
        }

        config.load_from_env();
        Ok(config)
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables.
    fn load_from_env(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("MOMENTUM_") {
                let config_key = config_key.to_lowercase().replace('_', "-");
                self.set(&config_key, &value);
            }
        }
    }

    /// Set a configuration value by its dashed key. Unknown keys and
    /// unparsable numbers are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "max-call-depth" => {
                if let Ok(n) = value.parse() {
                    self.max_call_depth = n;
                }
            }
            "module-extension" => {
                self.module_extension = value.trim_start_matches('.').to_string()
            }
            "trace-limit" => {
                if let Ok(n) = value.parse() {
                    self.trace_limit = n;
                }
            }
            "log-level" => self.log_level = value.to_string(),
            _ => {}
        }
    }
}
