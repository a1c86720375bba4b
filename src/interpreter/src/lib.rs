//! Keyword interpreter backend for the agent router.
//! It reads training data exports, trains a small bag-of-words intent model with
//! phrase-lookup entity extraction, and persists it as one model directory.
#![warn(missing_docs)]

mod error;
pub mod formats;
mod model;
mod training_data;

pub use error::{Error, Result};
pub use model::{EntityMatch, IntentScore, KeywordModel, ParseResult, MODEL_FILE};
pub use training_data::{EntityAnnotation, Message, RegexFeature, TrainingData};
