//! Service configuration and the per-job training configuration derived from it.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Service configuration. Keys the router does not know about are kept and
/// handed to training jobs untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Durable storage root, one sub-directory per agent.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Directory for the query log, disabled when absent.
    #[serde(default)]
    pub response_log: Option<PathBuf>,
    /// Emulation mode tag.
    #[serde(default)]
    pub emulate: Option<String>,
    /// Shared secret clients must present.
    #[serde(default)]
    pub token: Option<String>,
    /// Training executable launched for every job.
    #[serde(default = "default_trainer")]
    pub trainer: PathBuf,
    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_path() -> PathBuf {
    PathBuf::from("models")
}

fn default_trainer() -> PathBuf {
    PathBuf::from("trainer")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: default_path(),
            response_log: None,
            emulate: None,
            token: None,
            trainer: default_trainer(),
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Read a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Flat key/value view of the configuration.
    pub fn as_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Merge request overrides onto this configuration, key by key, overrides winning.
    /// The token never reaches a training job.
    pub fn merge(&self, overrides: &Map<String, Value>) -> TrainingConfig {
        let mut map = self.as_map();
        for (key, value) in overrides {
            map.insert(key.clone(), value.clone());
        }
        map.remove("token");
        TrainingConfig(map)
    }
}

/// Configuration of one training job, written for the training process to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingConfig(Map<String, Value>);

impl TrainingConfig {
    /// Target agent name, when present and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.0
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Durable storage root the trained model is published under.
    pub fn path(&self) -> PathBuf {
        self.0
            .get("path")
            .and_then(Value::as_str)
            .map_or_else(default_path, PathBuf::from)
    }

    /// Raw value of a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a key.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Key/value view.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Read a configuration file written by the supervisor.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
