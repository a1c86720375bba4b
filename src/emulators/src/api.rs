use crate::{entities, field, optional_string, query_text, routing_fields, Emulator, Error, ParseQuery};
use chrono::Local;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// api.ai (Dialogflow v1) query shapes.
pub struct ApiEmulator;

impl Emulator for ApiEmulator {
    fn name(&self) -> &'static str {
        "api"
    }

    fn normalise_request(&self, data: &Value) -> Result<ParseQuery, Error> {
        let text = match optional_string(data, "query") {
            Some(text) => text,
            None => query_text(data, "q")?,
        };
        Ok(routing_fields(data, text))
    }

    fn normalise_response(&self, data: &Value) -> Value {
        let mut parameters = Map::new();
        for e in entities(data) {
            if let Some(entity) = e.get("entity").and_then(Value::as_str) {
                let values = parameters
                    .entry(entity.to_string())
                    .or_insert_with(|| Value::Array(vec![]));
                if let Value::Array(values) = values {
                    values.push(field(e, "value"));
                }
            }
        }
        json!({
            "id": Uuid::new_v4().to_string(),
            "timestamp": Local::now().to_rfc3339(),
            "result": {
                "source": "agent",
                "resolvedQuery": field(data, "text"),
                "action": null,
                "actionIncomplete": null,
                "parameters": parameters,
                "contexts": [],
                "metadata": {
                    "intentId": Uuid::new_v4().to_string(),
                    "webhookUsed": "false",
                    "intentName": field(&field(data, "intent"), "name"),
                },
                "fulfillment": {},
                "score": field(&field(data, "intent"), "confidence"),
            },
            "status": {"code": 200, "errorType": "success"},
            "sessionId": Uuid::new_v4().to_string(),
        })
    }
}
