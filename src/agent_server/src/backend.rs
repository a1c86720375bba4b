//! Keyword interpreter models behind the router's model traits.

use interpreter::KeywordModel;
use orchestrator::{error::BoxError, Inference, ModelLoader};
use serde_json::Value;
use std::path::Path;

/// A loaded keyword model.
pub struct Model(KeywordModel);

impl Inference for Model {
    fn parse(&self, text: &str, _time: Option<&str>) -> Result<Value, BoxError> {
        Ok(serde_json::to_value(self.0.parse(text))?)
    }
}

/// Loads model directories written by the trainer.
#[derive(Debug, Default, Clone, Copy)]
pub struct Loader;

impl ModelLoader for Loader {
    fn load(&self, dir: &Path) -> Result<Box<dyn Inference>, BoxError> {
        let model = KeywordModel::load(dir)?;
        log::debug!("Loaded keyword model from {}", dir.display());
        Ok(Box::new(Model(model)))
    }
}
