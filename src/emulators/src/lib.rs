#![warn(missing_docs)]
#![warn(clippy::all)]

//! Emulators reshape parse requests and responses so that clients written for
//! another NLU vendor can talk to the agent router unchanged.
//! The set of variants is closed and picked once, at configuration time.

mod api;
mod luis;
mod no_emulator;
mod watson;
mod wit;

pub use api::ApiEmulator;
pub use luis::LuisEmulator;
pub use no_emulator::NoEmulator;
pub use watson::WatsonEmulator;
pub use wit::WitEmulator;

use serde_json::Value;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// A parse request in the router's own terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseQuery {
    /// Text to interpret.
    pub text: String,
    /// Target agent, the default agent when absent.
    pub agent: Option<String>,
    /// Model version inside the agent, the latest when absent.
    pub model: Option<String>,
    /// Reference time forwarded to the model.
    pub time: Option<String>,
}

/// Errors raised while normalising a request.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// The request body lacks the field holding the text.
    #[error("missing field `{0}` in request body")]
    MissingField(&'static str),
    /// Emulation mode tag is not one of the known variants.
    #[error("unknown emulation mode: {0}")]
    UnknownMode(String),
}

/// Request/response shape adapter for one client convention.
pub trait Emulator: Send + Sync {
    /// Tag this emulator is selected by.
    fn name(&self) -> &'static str;

    /// Extract the parse query from a raw request body.
    fn normalise_request(&self, data: &Value) -> Result<ParseQuery, Error>;

    /// Turn an internal parse result into the client's response shape.
    fn normalise_response(&self, data: &Value) -> Value;
}

/// The closed set of emulation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorKind {
    /// Native request and response shapes.
    None,
    /// IBM Watson Assistant.
    Watson,
    /// wit.ai
    Wit,
    /// Microsoft LUIS.
    Luis,
    /// api.ai / Dialogflow.
    Api,
}

impl EmulatorKind {
    /// Resolve an optional mode tag, no tag meaning [`EmulatorKind::None`].
    pub fn from_tag(tag: Option<&str>) -> Result<Self, Error> {
        match tag {
            None => Ok(EmulatorKind::None),
            Some(tag) => tag.parse(),
        }
    }

    /// Instantiate the emulator.
    pub fn build(self) -> Box<dyn Emulator> {
        match self {
            EmulatorKind::None => Box::new(NoEmulator),
            EmulatorKind::Watson => Box::new(WatsonEmulator),
            EmulatorKind::Wit => Box::new(WitEmulator),
            EmulatorKind::Luis => Box::new(LuisEmulator),
            EmulatorKind::Api => Box::new(ApiEmulator),
        }
    }
}

impl FromStr for EmulatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(EmulatorKind::None),
            "watson" => Ok(EmulatorKind::Watson),
            "wit" => Ok(EmulatorKind::Wit),
            "luis" => Ok(EmulatorKind::Luis),
            "api" => Ok(EmulatorKind::Api),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for EmulatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            EmulatorKind::None => "none",
            EmulatorKind::Watson => "watson",
            EmulatorKind::Wit => "wit",
            EmulatorKind::Luis => "luis",
            EmulatorKind::Api => "api",
        };
        f.write_str(tag)
    }
}

// `q` may be sent as a query-string list, only the first value counts.
pub(crate) fn query_text(data: &Value, key: &'static str) -> Result<String, Error> {
    let value = match data.get(key) {
        Some(Value::Array(values)) => values.first(),
        other => other,
    };
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(Error::MissingField(key))
}

pub(crate) fn optional_string(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn routing_fields(data: &Value, text: String) -> ParseQuery {
    ParseQuery {
        text,
        agent: optional_string(data, "agent"),
        model: optional_string(data, "model"),
        time: optional_string(data, "time"),
    }
}

pub(crate) fn entities(data: &Value) -> &[Value] {
    data.get("entities")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn intent_ranking(data: &Value) -> &[Value] {
    data.get("intent_ranking")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Internal offsets are half-open, vendors expect the last character index.
pub(crate) fn inclusive_end(entity: &Value) -> Value {
    entity
        .get("end")
        .and_then(Value::as_i64)
        .map_or(Value::Null, |end| Value::from(end - 1))
}

pub(crate) fn field(data: &Value, key: &str) -> Value {
    data.get(key).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_tag() {
        assert_eq!(EmulatorKind::from_tag(None).unwrap(), EmulatorKind::None);
        assert_eq!(
            EmulatorKind::from_tag(Some("Watson")).unwrap(),
            EmulatorKind::Watson
        );
        assert_eq!("luis".parse::<EmulatorKind>().unwrap(), EmulatorKind::Luis);
        assert_eq!(
            "dialogflow".parse::<EmulatorKind>(),
            Err(Error::UnknownMode("dialogflow".to_string()))
        );
    }

    #[test]
    fn test_build_matches_tag() {
        for kind in &[
            EmulatorKind::None,
            EmulatorKind::Watson,
            EmulatorKind::Wit,
            EmulatorKind::Luis,
            EmulatorKind::Api,
        ] {
            assert_eq!(kind.build().name(), kind.to_string());
        }
    }

    #[test]
    fn test_query_text_takes_first_of_list() {
        let data = json!({"q": ["hello", "ignored"]});
        assert_eq!(query_text(&data, "q").unwrap(), "hello");
        assert_eq!(
            query_text(&json!({}), "q"),
            Err(Error::MissingField("q"))
        );
    }

    #[test]
    fn test_inclusive_end() {
        assert_eq!(inclusive_end(&json!({"end": 15})), json!(14));
        assert_eq!(inclusive_end(&json!({"start": 3})), Value::Null);
    }
}
