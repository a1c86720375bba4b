use super::TrainingDataReader;
use crate::{Error, Message, RegexFeature, Result, TrainingData};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Reads the router's own format:
///
/// ```json
/// {"nlu_data": {
///     "common_examples": [{"text": "...", "intent": "...", "entities": []}],
///     "entity_synonyms": [{"value": "new york", "synonyms": ["nyc"]}],
///     "regex_features": [{"name": "zip", "pattern": "\\d{5}"}]
/// }}
/// ```
///
/// Synonyms map onto their canonical `value`.
pub struct NativeReader;

#[derive(Deserialize, Default)]
struct NluData {
    #[serde(default)]
    common_examples: Vec<Message>,
    #[serde(default)]
    entity_synonyms: Vec<SynonymDef>,
    #[serde(default)]
    regex_features: Vec<RegexFeature>,
}

#[derive(Deserialize)]
struct SynonymDef {
    value: String,
    #[serde(default)]
    synonyms: Vec<String>,
}

impl TrainingDataReader for NativeReader {
    fn read_from_json(&self, js: &Value) -> Result<TrainingData> {
        let section = js
            .get("nlu_data")
            .ok_or_else(|| Error::InvalidData("missing `nlu_data` section".to_string()))?;
        let data: NluData = serde_json::from_value(section.clone())?;
        for example in &data.common_examples {
            for entity in &example.entities {
                if entity.start >= entity.end || entity.end > example.text.chars().count() {
                    return Err(Error::InvalidData(format!(
                        "entity span {}..{} is outside of '{}'",
                        entity.start, entity.end, example.text
                    )));
                }
            }
        }
        let mut entity_synonyms = BTreeMap::new();
        for def in data.entity_synonyms {
            for synonym in def.synonyms {
                entity_synonyms.insert(synonym, def.value.clone());
            }
        }
        Ok(TrainingData::new(
            data.common_examples,
            entity_synonyms,
            data.regex_features,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::EntityAnnotation;
    use serde_json::json;

    #[test]
    fn test_read() {
        let js = json!({"nlu_data": {
            "common_examples": [
                {"text": "hi", "intent": "greet"},
                {"text": "fly to nyc", "intent": "book", "entities": [
                    {"start": 7, "end": 10, "value": "nyc", "entity": "city"}
                ]}
            ],
            "entity_synonyms": [{"value": "new york", "synonyms": ["nyc", "big apple"]}],
            "regex_features": [{"name": "zip", "pattern": "\\d{5}"}]
        }});
        let data = NativeReader.read_from_json(&js).unwrap();
        assert_eq!(data.training_examples.len(), 2);
        assert_eq!(
            data.training_examples[1].entities,
            vec![EntityAnnotation {
                start: 7,
                end: 10,
                value: "nyc".to_string(),
                entity: "city".to_string(),
            }]
        );
        assert_eq!(data.entity_synonyms["big apple"], "new york");
        assert_eq!(data.regex_features[0].name, "zip");
    }

    #[test]
    fn test_reject_bad_span() {
        let js = json!({"nlu_data": {"common_examples": [
            {"text": "hi", "intent": "greet", "entities": [
                {"start": 1, "end": 9, "value": "i", "entity": "x"}
            ]}
        ]}});
        assert!(matches!(
            NativeReader.read_from_json(&js),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_missing_section() {
        assert!(NativeReader.read(br#"{"intents": []}"#).is_err());
    }
}
