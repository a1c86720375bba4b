use crate::{entities, field, query_text, routing_fields, Emulator, Error, ParseQuery};
use serde_json::{json, Map, Value};

/// wit.ai message shapes: `q` in, a single-element outcome list out with
/// entities keyed by their type.
pub struct WitEmulator;

impl Emulator for WitEmulator {
    fn name(&self) -> &'static str {
        "wit"
    }

    fn normalise_request(&self, data: &Value) -> Result<ParseQuery, Error> {
        let text = query_text(data, "q")?;
        Ok(routing_fields(data, text))
    }

    fn normalise_response(&self, data: &Value) -> Value {
        let mut by_type = Map::new();
        for e in entities(data) {
            if let Some(entity) = e.get("entity").and_then(Value::as_str) {
                by_type.insert(
                    entity.to_string(),
                    json!({
                        "confidence": null,
                        "type": "value",
                        "value": field(e, "value"),
                        "start": field(e, "start"),
                        "end": field(e, "end"),
                    }),
                );
            }
        }
        let intent = field(data, "intent");
        json!([{
            "_text": field(data, "text"),
            "confidence": field(&intent, "confidence"),
            "intent": field(&intent, "name"),
            "entities": by_type,
        }])
    }
}
