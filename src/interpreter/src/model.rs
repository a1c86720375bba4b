use crate::{Error, RegexFeature, Result, TrainingData};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
    fs,
    path::Path,
    process,
};

/// File holding the trained model inside its model directory.
pub const MODEL_FILE: &str = "model.json";
const MODEL_VERSION: u32 = 1;
const INTENT_RANKING_LENGTH: usize = 10;
const EXTRACTOR_NAME: &str = "keyword_lookup";

/// An intent with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentScore {
    /// Intent label.
    pub name: String,
    /// Normalized confidence in `[0, 1]`.
    pub confidence: f64,
}

/// An extracted entity, character offsets half-open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    /// First character.
    pub start: usize,
    /// One past the last character.
    pub end: usize,
    /// Matched text, or its canonical value when it is a synonym.
    pub value: String,
    /// Entity type.
    pub entity: String,
    /// Component that produced the match.
    pub extractor: String,
}

/// Outcome of interpreting one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Input text.
    pub text: String,
    /// Top ranked intent.
    pub intent: Option<IntentScore>,
    /// Ranked intents, best first.
    pub intent_ranking: Vec<IntentScore>,
    /// Extracted entities in text order.
    pub entities: Vec<EntityMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct IntentStats {
    examples: u64,
    token_total: u64,
    token_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Lookup {
    entity: String,
    #[serde(default)]
    canonical: Option<String>,
}

/// Multinomial naive Bayes over lower-cased word tokens for intents, and a
/// phrase table built from annotations and synonyms for entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordModel {
    version: u32,
    intents: BTreeMap<String, IntentStats>,
    vocabulary: usize,
    lookup: BTreeMap<String, Lookup>,
    #[serde(default)]
    regex_features: Vec<RegexFeature>,
    #[serde(skip)]
    longest_phrase: usize,
}

struct Token {
    lower: String,
    start: usize,
    end: usize,
    byte_start: usize,
    byte_end: usize,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = vec![];
    let mut current: Option<Token> = None;
    for (char_idx, (byte_idx, c)) in text.char_indices().enumerate() {
        if c.is_alphanumeric() {
            let token = current.get_or_insert_with(|| Token {
                lower: String::new(),
                start: char_idx,
                end: char_idx,
                byte_start: byte_idx,
                byte_end: byte_idx,
            });
            token.lower.extend(c.to_lowercase());
            token.end = char_idx + 1;
            token.byte_end = byte_idx + c.len_utf8();
        } else if let Some(token) = current.take() {
            tokens.push(token);
        }
    }
    tokens.extend(current);
    tokens
}

fn phrase_key(phrase: &str) -> String {
    tokenize(phrase)
        .into_iter()
        .map(|t| t.lower)
        .collect::<Vec<_>>()
        .join(" ")
}

impl KeywordModel {
    /// Train on parsed training data. Fails when no example carries an intent.
    pub fn train(data: &TrainingData) -> Result<Self> {
        let mut intents: BTreeMap<String, IntentStats> = BTreeMap::new();
        let mut vocabulary = BTreeSet::new();
        for message in &data.training_examples {
            let intent = match &message.intent {
                Some(intent) => intent,
                None => continue,
            };
            let stats = intents.entry(intent.clone()).or_default();
            stats.examples += 1;
            for token in tokenize(&message.text) {
                stats.token_total += 1;
                vocabulary.insert(token.lower.clone());
                *stats.token_counts.entry(token.lower).or_insert(0) += 1;
            }
        }
        if intents.is_empty() {
            return Err(Error::InvalidData(
                "training data contains no labelled examples".to_string(),
            ));
        }

        let mut lookup = BTreeMap::new();
        let mut annotated = HashMap::new();
        for message in &data.training_examples {
            for entity in &message.entities {
                let key = phrase_key(&entity.value);
                if key.is_empty() {
                    continue;
                }
                annotated.insert(key.clone(), entity.entity.clone());
                lookup.insert(
                    key,
                    Lookup {
                        entity: entity.entity.clone(),
                        canonical: None,
                    },
                );
            }
        }
        // A synonym either points at an annotated value (canonical form) or
        // directly at an entity type.
        for (phrase, target) in &data.entity_synonyms {
            let key = phrase_key(phrase);
            let target_key = phrase_key(target);
            if key.is_empty() {
                continue;
            }
            match annotated.get(&target_key) {
                Some(entity) => {
                    let canonical = if key == target_key {
                        None
                    } else {
                        Some(target.clone())
                    };
                    lookup.insert(
                        key,
                        Lookup {
                            entity: entity.clone(),
                            canonical,
                        },
                    );
                }
                None => {
                    lookup.entry(key).or_insert(Lookup {
                        entity: target.clone(),
                        canonical: None,
                    });
                }
            }
        }

        log::info!(
            "Trained keyword model: {} intents, {} words, {} entity phrases",
            intents.len(),
            vocabulary.len(),
            lookup.len()
        );
        Ok(KeywordModel {
            version: MODEL_VERSION,
            intents,
            vocabulary: vocabulary.len(),
            lookup,
            regex_features: data.regex_features.clone(),
            longest_phrase: 0,
        }
        .index())
    }

    fn index(mut self) -> Self {
        self.longest_phrase = self
            .lookup
            .keys()
            .map(|k| k.split(' ').count())
            .max()
            .unwrap_or(0);
        self
    }

    /// Intent labels known to the model.
    pub fn intents(&self) -> impl Iterator<Item = &str> {
        self.intents.keys().map(String::as_str)
    }

    /// Regex features carried over from the training data.
    pub fn regex_features(&self) -> &[RegexFeature] {
        &self.regex_features
    }

    /// Interpret a text.
    pub fn parse(&self, text: &str) -> ParseResult {
        let tokens = tokenize(text);
        let intent_ranking = self.rank_intents(&tokens);
        ParseResult {
            text: text.to_string(),
            intent: intent_ranking.first().cloned(),
            intent_ranking,
            entities: self.extract_entities(text, &tokens),
        }
    }

    fn is_known(&self, word: &str) -> bool {
        self.intents
            .values()
            .any(|stats| stats.token_counts.contains_key(word))
    }

    fn rank_intents(&self, tokens: &[Token]) -> Vec<IntentScore> {
        let total_examples: u64 = self.intents.values().map(|s| s.examples).sum();
        let vocabulary = self.vocabulary.max(1) as f64;
        let known: Vec<&str> = tokens
            .iter()
            .map(|t| t.lower.as_str())
            .filter(|w| self.is_known(w))
            .collect();
        let log_scores: Vec<(&String, f64)> = self
            .intents
            .iter()
            .map(|(name, stats)| {
                let prior = (stats.examples as f64 / total_examples as f64).ln();
                let likelihood: f64 = known
                    .iter()
                    .map(|w| {
                        let count = stats.token_counts.get(*w).copied().unwrap_or(0) as f64;
                        ((count + 1.0) / (stats.token_total as f64 + vocabulary)).ln()
                    })
                    .sum();
                (name, prior + likelihood)
            })
            .collect();
        let max = log_scores
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        let norm: f64 = log_scores.iter().map(|(_, s)| (s - max).exp()).sum();
        let mut ranking: Vec<IntentScore> = log_scores
            .into_iter()
            .map(|(name, s)| IntentScore {
                name: name.clone(),
                confidence: (s - max).exp() / norm,
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        ranking.truncate(INTENT_RANKING_LENGTH);
        ranking
    }

    // longest match first, matches never overlap
    fn extract_entities(&self, text: &str, tokens: &[Token]) -> Vec<EntityMatch> {
        let mut entities = vec![];
        let mut i = 0;
        while i < tokens.len() {
            let longest = self.longest_phrase.min(tokens.len() - i);
            let matched = (1..=longest).rev().find_map(|len| {
                let key = tokens[i..i + len]
                    .iter()
                    .map(|t| t.lower.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.lookup.get(&key).map(|lookup| (len, lookup))
            });
            match matched {
                Some((len, lookup)) => {
                    let first = &tokens[i];
                    let last = &tokens[i + len - 1];
                    entities.push(EntityMatch {
                        start: first.start,
                        end: last.end,
                        value: lookup
                            .canonical
                            .clone()
                            .unwrap_or_else(|| text[first.byte_start..last.byte_end].to_string()),
                        entity: lookup.entity.clone(),
                        extractor: EXTRACTOR_NAME.to_string(),
                    });
                    i += len;
                }
                None => i += 1,
            }
        }
        entities
    }

    /// Write the model into `dir`. The directory is staged next to its final
    /// location and renamed into place, so readers never see a partial model.
    /// An existing `dir` is never replaced.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        let invalid = || Error::InvalidData(format!("'{}' is not a model directory", dir.display()));
        let parent = dir.parent().ok_or_else(invalid)?;
        let dir_name = dir.file_name().ok_or_else(invalid)?.to_string_lossy();
        fs::create_dir_all(parent)?;
        if dir.exists() {
            return Err(Error::AlreadyExists(dir.to_path_buf()));
        }
        let staging = parent.join(format!(".{}.{}.partial", dir_name, process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        fs::write(staging.join(MODEL_FILE), serde_json::to_vec_pretty(self)?)?;
        // renaming onto a directory published in the meantime fails
        if let Err(err) = fs::rename(&staging, dir) {
            let _ = fs::remove_dir_all(&staging);
            return Err(if dir.exists() {
                Error::AlreadyExists(dir.to_path_buf())
            } else {
                err.into()
            });
        }
        log::debug!("Persisted keyword model to {}", dir.display());
        Ok(())
    }

    /// Read a model directory written by [`KeywordModel::persist`].
    pub fn load(dir: &Path) -> Result<Self> {
        let bytes = fs::read(dir.join(MODEL_FILE))?;
        let model: KeywordModel = serde_json::from_slice(&bytes)?;
        if model.version != MODEL_VERSION {
            return Err(Error::UnsupportedVersion(model.version));
        }
        Ok(model.index())
    }
}
