//! Agents: the loaded artifact behind a registry entry.

use crate::error::{BoxError, Error, Result};
use serde_json::{json, Value};
use std::{
    collections::BTreeMap,
    fs, io,
    path::Path,
};

/// Name of the agent that answers when a request names none.
pub const DEFAULT_AGENT_NAME: &str = "default";

/// All backend models managed by the router have the Inference trait.
/// A model is immutable once loaded, hence Send + Sync.
pub trait Inference: Send + Sync {
    /// Interpret `text`; the result must carry `text`, `intent`,
    /// `intent_ranking` and `entities`.
    fn parse(&self, text: &str, time: Option<&str>) -> std::result::Result<Value, BoxError>;
}

/// Builds a model from one model directory on durable storage.
pub trait ModelLoader: Send + Sync {
    /// Load the model stored in `dir`.
    fn load(&self, dir: &Path) -> std::result::Result<Box<dyn Inference>, BoxError>;
}

/// Whether `name` can be used as an agent directory name.
pub fn valid_agent_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && !name.contains(|c| c == '/' || c == '\\')
}

/// Agent names found on durable storage, sorted. A missing root holds no agents.
pub fn list_agents(root: &Path) -> io::Result<Vec<String>> {
    let mut names = vec![];
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(err) => return Err(err),
    };
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if valid_agent_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// The model versions of one agent. Versions are sub-directories of the
/// agent directory; the greatest name is the newest and answers by default.
pub struct Agent {
    models: BTreeMap<String, Box<dyn Inference>>,
}

impl Agent {
    /// Placeholder for an agent that has not been trained yet.
    pub fn empty() -> Self {
        Agent {
            models: BTreeMap::new(),
        }
    }

    /// Load every model version of `name` under `root`.
    pub fn load(root: &Path, name: &str, loader: &dyn ModelLoader) -> Result<Self> {
        let dir = root.join(name);
        let mut models = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let model_name = entry.file_name().to_string_lossy().into_owned();
            // staging directories of a publish in progress are hidden
            if !entry.file_type()?.is_dir() || model_name.starts_with('.') {
                continue;
            }
            let model = loader.load(&entry.path()).map_err(|e| {
                Error::invalid_model_with(
                    format!("Failed to load model '{}' of agent '{}'.", model_name, name),
                    e,
                )
            })?;
            models.insert(model_name, model);
        }
        log::debug!("Loaded agent '{}' with {} model(s)", name, models.len());
        Ok(Agent { models })
    }

    /// Whether no model has been trained for this agent yet.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model version names, oldest first.
    pub fn models(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// The version used when a request names none.
    pub fn default_model(&self) -> Option<&str> {
        self.models.keys().next_back().map(String::as_str)
    }

    /// Interpret `text` with the given model version, or the newest one.
    pub fn parse(&self, text: &str, time: Option<&str>, model: Option<&str>) -> Result<Value> {
        let inference = match model {
            Some(model) => self.models.get(model).ok_or_else(|| {
                Error::invalid_model(format!("No model found with name '{}'.", model))
            })?,
            None => match self.models.values().next_back() {
                Some(inference) => inference,
                None => return Ok(not_trained(text)),
            },
        };
        inference
            .parse(text, time)
            .map_err(|e| Error::invalid_model_with("Model failed to interpret the text.", e))
    }
}

fn not_trained(text: &str) -> Value {
    json!({
        "text": text,
        "intent": null,
        "intent_ranking": [],
        "entities": [],
    })
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::{
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    /// Reads `reply.txt` from the model directory and always answers with
    /// that intent.
    #[derive(Clone, Default)]
    pub(crate) struct FakeLoader {
        pub loads: Arc<AtomicUsize>,
    }

    impl ModelLoader for FakeLoader {
        fn load(&self, dir: &Path) -> std::result::Result<Box<dyn Inference>, BoxError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let reply = fs::read_to_string(dir.join("reply.txt"))?;
            Ok(Box::new(FakeModel {
                reply: reply.trim().to_string(),
            }))
        }
    }

    struct FakeModel {
        reply: String,
    }

    impl Inference for FakeModel {
        fn parse(&self, text: &str, _time: Option<&str>) -> std::result::Result<Value, BoxError> {
            let intent = json!({"name": self.reply, "confidence": 1.0});
            Ok(json!({
                "text": text,
                "intent": intent,
                "intent_ranking": [intent],
                "entities": [],
            }))
        }
    }

    pub(crate) fn publish(root: &Path, agent: &str, model: &str, reply: &str) {
        let dir = root.join(agent).join(model);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("reply.txt"), reply).unwrap();
    }

    /// A model directory the fake loader cannot read.
    pub(crate) fn publish_broken(root: &Path, agent: &str, model: &str) {
        fs::create_dir_all(root.join(agent).join(model)).unwrap();
    }
}
