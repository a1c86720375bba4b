use super::TrainingDataReader;
use crate::{Message, RegexFeature, Result, TrainingData};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reads IBM Watson Assistant workspace exports.
///
/// Intent examples become labelled messages. Entity values of type `synonyms`
/// map the value and each of its synonyms onto the entity name, values of type
/// `patterns` become regex features named `<entity>_<value>`.
pub struct WatsonReader;

impl WatsonReader {
    fn extract_entities(js: &Value) -> (BTreeMap<String, String>, Vec<RegexFeature>) {
        let mut entity_synonyms = BTreeMap::new();
        let mut regex_features = vec![];
        for entity in array(js, "entities") {
            let entity_name = match entity.get("entity").and_then(Value::as_str) {
                Some(name) => name,
                None => continue,
            };
            for value in array(entity, "values") {
                let value_name = value.get("value").and_then(Value::as_str).unwrap_or("");
                match value.get("type").and_then(Value::as_str) {
                    Some("synonyms") => {
                        if !value_name.is_empty() {
                            entity_synonyms.insert(value_name.to_string(), entity_name.to_string());
                        }
                        for synonym in array(value, "synonyms").iter().filter_map(Value::as_str) {
                            entity_synonyms.insert(synonym.to_string(), entity_name.to_string());
                        }
                    }
                    Some("patterns") => {
                        for pattern in array(value, "patterns").iter().filter_map(Value::as_str) {
                            regex_features.push(RegexFeature {
                                name: format!("{}_{}", entity_name, value_name),
                                pattern: pattern.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
        (entity_synonyms, regex_features)
    }

    fn extract_intents(js: &Value) -> Vec<Message> {
        let mut training_examples = vec![];
        for intent in array(js, "intents") {
            let intent_name = match intent.get("intent").and_then(Value::as_str) {
                Some(name) => name,
                None => continue,
            };
            for example in array(intent, "examples") {
                if let Some(text) = example.get("text").and_then(Value::as_str) {
                    training_examples.push(Message::new(text, intent_name));
                }
            }
        }
        training_examples
    }
}

impl TrainingDataReader for WatsonReader {
    fn read_from_json(&self, js: &Value) -> Result<TrainingData> {
        let (entity_synonyms, regex_features) = Self::extract_entities(js);
        let training_examples = Self::extract_intents(js);
        Ok(TrainingData::new(
            training_examples,
            entity_synonyms,
            regex_features,
        ))
    }
}

fn array<'a>(js: &'a Value, key: &str) -> &'a [Value] {
    js.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
