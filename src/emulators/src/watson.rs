use crate::{
    entities, field, inclusive_end, intent_ranking, routing_fields, Emulator, Error, ParseQuery,
};
use serde_json::{json, Value};

/// IBM Watson Assistant message shapes.
///
/// Requests carry the text under `input.text`. Responses bucket the ranking into
/// `intents` and report entity spans as `location: [start, last]`, `last` being
/// the index of the final character rather than the exclusive end.
pub struct WatsonEmulator;

impl Emulator for WatsonEmulator {
    fn name(&self) -> &'static str {
        "watson"
    }

    fn normalise_request(&self, data: &Value) -> Result<ParseQuery, Error> {
        let text = data
            .get("input")
            .and_then(|input| input.get("text"))
            .and_then(Value::as_str)
            .ok_or(Error::MissingField("input.text"))?;
        Ok(routing_fields(data, text.to_string()))
    }

    fn normalise_response(&self, data: &Value) -> Value {
        let intents: Vec<Value> = intent_ranking(data)
            .iter()
            .map(|el| {
                json!({
                    "intent": field(el, "name"),
                    "confidence": field(el, "confidence"),
                })
            })
            .collect();
        let entities: Vec<Value> = entities(data)
            .iter()
            .map(|e| {
                json!({
                    "entity": field(e, "entity"),
                    "location": [field(e, "start"), inclusive_end(e)],
                    "value": field(e, "value"),
                    "confidence": field(e, "confidence"),
                })
            })
            .collect();
        json!({
            "intents": intents,
            "entities": entities,
            "input": {"text": field(data, "text")},
        })
    }
}
