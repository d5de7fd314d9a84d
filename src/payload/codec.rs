use serde_json::Value;
use tracing::trace;

/// A decoded inbound payload.
///
/// Listeners on the same topic all receive a reference to one shared decoded
/// value; anyone who needs to mutate it clones first.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Structurally valid JSON (object, array or primitive)
    Json(Value),
    /// Anything that did not parse as JSON, passed through as text
    Raw(String),
}

/// Decodes raw wire bytes into a structured value.
///
/// Never fails: malformed JSON falls back to the raw text, invalid UTF-8 is
/// replaced lossily. Callers always get some value.
pub fn decode(raw: &[u8]) -> Payload {
    let text = String::from_utf8_lossy(raw);
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Payload::Json(value),
        Err(e) => {
            trace!("Payload is not JSON ({}), passing through as text", e);
            Payload::Raw(text.into_owned())
        }
    }
}

/// Serializes a structured value for publishing. Round-trips with [`decode`]
/// for every JSON-representable value.
pub fn encode(value: &Value) -> Vec<u8> {
    // Value serialization cannot fail for Value itself
    serde_json::to_vec(value).unwrap_or_default()
}
