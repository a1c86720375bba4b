use crate::{
    entities, field, inclusive_end, intent_ranking, query_text, routing_fields, Emulator, Error,
    ParseQuery,
};
use serde_json::{json, Value};

/// Microsoft LUIS shapes.
pub struct LuisEmulator;

impl LuisEmulator {
    fn top_intent(data: &Value) -> Value {
        match data.get("intent") {
            Some(intent) if intent.is_object() => json!({
                "intent": field(intent, "name"),
                "score": field(intent, "confidence"),
            }),
            _ => Value::Null,
        }
    }

    fn ranking(data: &Value) -> Vec<Value> {
        let ranking = intent_ranking(data);
        if ranking.is_empty() {
            return match Self::top_intent(data) {
                Value::Null => vec![],
                top => vec![top],
            };
        }
        ranking
            .iter()
            .map(|el| json!({"intent": field(el, "name"), "score": field(el, "confidence")}))
            .collect()
    }
}

impl Emulator for LuisEmulator {
    fn name(&self) -> &'static str {
        "luis"
    }

    fn normalise_request(&self, data: &Value) -> Result<ParseQuery, Error> {
        let text = query_text(data, "q")?;
        Ok(routing_fields(data, text))
    }

    fn normalise_response(&self, data: &Value) -> Value {
        let entities: Vec<Value> = entities(data)
            .iter()
            .map(|e| {
                json!({
                    "entity": field(e, "value"),
                    "type": field(e, "entity"),
                    "startIndex": field(e, "start"),
                    "endIndex": inclusive_end(e),
                    "score": field(e, "confidence"),
                })
            })
            .collect();
        json!({
            "query": field(data, "text"),
            "topScoringIntent": Self::top_intent(data),
            "intents": Self::ranking(data),
            "entities": entities,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_response() {
        let data = json!({
            "text": "weather in paris",
            "intent": {"name": "weather", "confidence": 0.8},
            "intent_ranking": [
                {"name": "weather", "confidence": 0.8},
                {"name": "greet", "confidence": 0.2}
            ],
            "entities": [{"entity": "city", "value": "paris", "start": 11, "end": 16}],
        });
        assert_eq!(
            LuisEmulator.normalise_response(&data),
            json!({
                "query": "weather in paris",
                "topScoringIntent": {"intent": "weather", "score": 0.8},
                "intents": [
                    {"intent": "weather", "score": 0.8},
                    {"intent": "greet", "score": 0.2}
                ],
                "entities": [{
                    "entity": "paris",
                    "type": "city",
                    "startIndex": 11,
                    "endIndex": 15,
                    "score": null,
                }],
            })
        );
    }

    #[test]
    fn test_ranking_falls_back_to_top_intent() {
        let data = json!({
            "text": "hi",
            "intent": {"name": "greet", "confidence": 1.0},
            "entities": [],
        });
        let response = LuisEmulator.normalise_response(&data);
        assert_eq!(response["intents"], json!([{"intent": "greet", "score": 1.0}]));
    }

    #[test]
    fn test_untrained_response() {
        let data = json!({"text": "hi", "intent": null, "intent_ranking": [], "entities": []});
        let response = LuisEmulator.normalise_response(&data);
        assert_eq!(response["topScoringIntent"], Value::Null);
        assert_eq!(response["intents"], json!([]));
    }
}
