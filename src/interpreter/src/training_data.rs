use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An entity span inside a training example, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAnnotation {
    /// First character.
    pub start: usize,
    /// One past the last character.
    pub end: usize,
    /// Annotated text.
    pub value: String,
    /// Entity type.
    pub entity: String,
}

/// One labelled training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Example text.
    pub text: String,
    /// Intent label.
    #[serde(default)]
    pub intent: Option<String>,
    /// Entity spans.
    #[serde(default)]
    pub entities: Vec<EntityAnnotation>,
}

impl Message {
    /// An example labelled with an intent and no entities.
    pub fn new(text: &str, intent: &str) -> Self {
        Message {
            text: text.to_string(),
            intent: Some(intent.to_string()),
            entities: vec![],
        }
    }
}

/// A named pattern handed through to the model as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexFeature {
    /// Feature name.
    pub name: String,
    /// Pattern source.
    pub pattern: String,
}

/// Parsed training data, independent of the export format it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingData {
    /// Labelled examples.
    pub training_examples: Vec<Message>,
    /// Phrase to target mapping.
    pub entity_synonyms: BTreeMap<String, String>,
    /// Pattern features.
    pub regex_features: Vec<RegexFeature>,
}

impl TrainingData {
    /// Bundle the three parts.
    pub fn new(
        training_examples: Vec<Message>,
        entity_synonyms: BTreeMap<String, String>,
        regex_features: Vec<RegexFeature>,
    ) -> Self {
        TrainingData {
            training_examples,
            entity_synonyms,
            regex_features,
        }
    }

    /// Distinct intent labels.
    pub fn intents(&self) -> BTreeSet<&str> {
        self.training_examples
            .iter()
            .filter_map(|m| m.intent.as_deref())
            .collect()
    }

    /// Distinct annotated entity types.
    pub fn entity_types(&self) -> BTreeSet<&str> {
        self.training_examples
            .iter()
            .flat_map(|m| m.entities.iter().map(|e| e.entity.as_str()))
            .collect()
    }

    /// Whether there is nothing to learn from.
    pub fn is_empty(&self) -> bool {
        self.training_examples.is_empty() && self.entity_synonyms.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_intents_and_entity_types() {
        let mut book = Message::new("book a table in paris", "book");
        book.entities.push(EntityAnnotation {
            start: 16,
            end: 21,
            value: "paris".to_string(),
            entity: "city".to_string(),
        });
        let data = TrainingData::new(
            vec![Message::new("hi", "greet"), Message::new("hello", "greet"), book],
            BTreeMap::new(),
            vec![],
        );
        assert_eq!(data.intents().into_iter().collect::<Vec<_>>(), vec!["book", "greet"]);
        assert_eq!(data.entity_types().into_iter().collect::<Vec<_>>(), vec!["city"]);
        assert!(!data.is_empty());
        assert!(TrainingData::default().is_empty());
    }
}
