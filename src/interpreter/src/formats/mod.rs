//! Training data readers.
//! Every export format is read into the same [`TrainingData`].

mod native;
mod watson;

pub use native::NativeReader;
pub use watson::WatsonReader;

use crate::{Error, Result, TrainingData};
use serde_json::Value;
use std::{fmt, str::FromStr};

/// A reader for one training data export format.
pub trait TrainingDataReader {
    /// Read an already decoded JSON document.
    fn read_from_json(&self, js: &Value) -> Result<TrainingData>;

    /// Decode and read raw uploaded bytes.
    fn read(&self, bytes: &[u8]) -> Result<TrainingData> {
        let js: Value = serde_json::from_slice(bytes)?;
        self.read_from_json(&js)
    }
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// `{"nlu_data": {...}}`
    Native,
    /// IBM Watson Assistant workspace export.
    Watson,
}

impl DataFormat {
    /// Reader for this format.
    pub fn reader(self) -> Box<dyn TrainingDataReader> {
        match self {
            DataFormat::Native => Box::new(NativeReader),
            DataFormat::Watson => Box::new(WatsonReader),
        }
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "native" | "json" => Ok(DataFormat::Native),
            "watson" => Ok(DataFormat::Watson),
            _ => Err(Error::InvalidData(format!("unknown data format '{}'", s))),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Native => f.write_str("native"),
            DataFormat::Watson => f.write_str("watson"),
        }
    }
}

/// Guess the format of a decoded document from its top-level shape.
pub fn guess_format(js: &Value) -> DataFormat {
    if js.get("nlu_data").is_some() {
        return DataFormat::Native;
    }
    let watson_intents = js
        .get("intents")
        .and_then(Value::as_array)
        .map_or(false, |intents| {
            intents
                .iter()
                .any(|i| i.get("intent").is_some() && i.get("examples").is_some())
        });
    if watson_intents || js.get("workspace_id").is_some() {
        DataFormat::Watson
    } else {
        DataFormat::Native
    }
}

/// Read raw training data bytes, guessing the format unless one is given.
pub fn load(bytes: &[u8], format: Option<DataFormat>) -> Result<TrainingData> {
    let js: Value = serde_json::from_slice(bytes)?;
    let format = format.unwrap_or_else(|| guess_format(&js));
    log::debug!("Reading training data as {} format", format);
    format.reader().read_from_json(&js)
}
