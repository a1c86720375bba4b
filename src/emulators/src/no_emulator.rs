use crate::{query_text, routing_fields, Emulator, Error, ParseQuery};
use serde_json::Value;

/// Native shapes: `{text, agent?, model?, time?}` in, the parse result out as is.
/// `q` is accepted in place of `text` for query-string style clients.
pub struct NoEmulator;

impl Emulator for NoEmulator {
    fn name(&self) -> &'static str {
        "none"
    }

    fn normalise_request(&self, data: &Value) -> Result<ParseQuery, Error> {
        // an empty text is still a text
        let text = match query_text(data, "text") {
            Ok(text) => text,
            Err(_) => query_text(data, "q").map_err(|_| Error::MissingField("text"))?,
        };
        Ok(routing_fields(data, text))
    }

    fn normalise_response(&self, data: &Value) -> Value {
        data.clone()
    }
}
