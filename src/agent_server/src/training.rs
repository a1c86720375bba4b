//! What the `trainer` executable does with the configuration it is handed.

use chrono::Utc;
use interpreter::{
    formats::{self, DataFormat},
    KeywordModel,
};
use orchestrator::{agent::valid_agent_name, TrainingConfig};
use serde_json::Value;
use std::{fs, io, path::PathBuf};
use thiserror::Error;

/// Why a training job failed.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// No usable agent name in the configuration.
    #[error("training configuration names no valid agent")]
    MissingName,

    /// No training data file in the configuration.
    #[error("training configuration has no training data")]
    MissingData,

    /// Data could not be read or the model could not be built.
    #[error(transparent)]
    Interpreter(#[from] interpreter::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Name of a model directory created now. Names sort in creation order.
pub fn model_dir_name() -> String {
    format!("model_{}", Utc::now().format("%Y%m%d-%H%M%S-%6f"))
}

/// Train a keyword model on the data named by `config` and publish it as a
/// new model version of the agent. Returns the model directory.
pub fn train_and_persist(config: &TrainingConfig) -> Result<PathBuf, TrainingError> {
    let name = config
        .name()
        .filter(|name| valid_agent_name(name))
        .ok_or(TrainingError::MissingName)?;
    let data = config
        .get("data")
        .and_then(Value::as_str)
        .ok_or(TrainingError::MissingData)?;
    let format = match config.get("data_format").and_then(Value::as_str) {
        Some(format) => Some(format.parse::<DataFormat>()?),
        None => None,
    };

    let bytes = fs::read(data)?;
    let training_data = formats::load(&bytes, format)?;
    log::info!(
        "Training agent '{}' on {} examples, {} intents",
        name,
        training_data.training_examples.len(),
        training_data.intents().len()
    );
    let model = KeywordModel::train(&training_data)?;
    let dir = config.path().join(name).join(model_dir_name());
    model.persist(&dir)?;
    log::info!("Published model {}", dir.display());
    Ok(dir)
}
